//! Change propagation: session lifecycle, diff application and the engine facade.

mod applier;
mod engine;
mod state;

pub use applier::{committed_snapshot, ApplyFailure, ApplyReport, ChangeApplier, ChangeKind};
pub use engine::{CycleOutcome, ReconcileReport, SyncEngine};
pub use state::{SessionState, StateCell};
