//! Incremental sync engine
//!
//! A pass pages the Gmail history log from the stored checkpoint, resolves
//! every added message and its attachments, and only then commits the new
//! checkpoint. Any failure leaves the checkpoint where it was, so a retry
//! starts over from the same point.

mod history;
mod orchestrator;
mod resolve;

#[cfg(test)]
pub(crate) mod fakes;

pub use history::list_changes_since;
pub use orchestrator::{SyncOrchestrator, SyncOutcome, SyncPhase, SyncReport};
pub use resolve::{ResolveStats, message_ids, resolve_all, resolve_all_with_stats};
