//! Composable file search.

use rusqlite::{params_from_iter, Connection};

use super::files::{like_escape, query_records, BoxedParam, FILE_COLUMNS};
use super::models::{FileRecord, FileType};
use crate::Result;

/// Column to sort search results by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Path,
    Name,
    Size,
    Created,
    Modified,
}

impl SortField {
    const fn column(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Name => "name",
            Self::Size => "size",
            Self::Created => "created_at",
            Self::Modified => "modified_at",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Multi-criteria file search. All set criteria must match.
#[derive(Debug, Clone, Default)]
pub struct FileQuery {
    name_contains: Option<String>,
    file_type: Option<FileType>,
    modified_after: Option<i64>,
    modified_before: Option<i64>,
    min_size: Option<i64>,
    max_size: Option<i64>,
    sort: SortField,
    order: SortOrder,
    limit: Option<usize>,
}

impl FileQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Match names containing `pattern`.
    #[must_use]
    pub fn name_contains(mut self, pattern: impl Into<String>) -> Self {
        self.name_contains = Some(pattern.into());
        self
    }

    #[must_use]
    pub const fn file_type(mut self, file_type: FileType) -> Self {
        self.file_type = Some(file_type);
        self
    }

    /// Restrict `modified_at` to `[after, before]`.
    #[must_use]
    pub const fn modified_between(mut self, after: Option<i64>, before: Option<i64>) -> Self {
        self.modified_after = after;
        self.modified_before = before;
        self
    }

    /// Restrict size to `[min, max]`.
    #[must_use]
    pub const fn size_between(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.min_size = min;
        self.max_size = max;
        self
    }

    #[must_use]
    pub const fn sort_by(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort = field;
        self.order = order;
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn to_sql(&self) -> (String, Vec<BoxedParam>) {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<BoxedParam> = Vec::new();

        if let Some(pattern) = &self.name_contains {
            clauses.push("name LIKE ? ESCAPE '\\'");
            params.push(Box::new(format!("%{}%", like_escape(pattern))));
        }
        if let Some(file_type) = self.file_type {
            clauses.push("file_type = ?");
            params.push(Box::new(file_type.as_str()));
        }
        if let Some(after) = self.modified_after {
            clauses.push("modified_at >= ?");
            params.push(Box::new(after));
        }
        if let Some(before) = self.modified_before {
            clauses.push("modified_at <= ?");
            params.push(Box::new(before));
        }
        if let Some(min) = self.min_size {
            clauses.push("size >= ?");
            params.push(Box::new(min));
        }
        if let Some(max) = self.max_size {
            clauses.push("size <= ?");
            params.push(Box::new(max));
        }

        let mut sql = format!("SELECT {FILE_COLUMNS} FROM file_index");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let direction = match self.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        sql.push_str(&format!(" ORDER BY {} {direction}, path ASC", self.sort.column()));

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        (sql, params)
    }

    /// Execute against an open connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn run(&self, conn: &Connection) -> Result<Vec<FileRecord>> {
        let (sql, params) = self.to_sql();
        query_records(conn, &sql, params_from_iter(params.iter()))
    }
}
