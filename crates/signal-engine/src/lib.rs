//! Pure decision logic: entry rules, exit rules, near-miss detection.
//!
//! Nothing in this crate performs I/O. The control loop fetches snapshots,
//! draws the contrarian gate, and passes everything in; the evaluators map
//! (snapshot, state) to at most one `Signal` or `ExitSignal` per call.

mod entry;
mod exit;
pub mod params;
mod state;

pub use entry::{evaluate_entry, EntryContext, EntryEvaluation, NearMiss};
pub use exit::{evaluate_exit, ExitThresholds};
pub use state::AgentState;
