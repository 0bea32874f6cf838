//! Message types for the dashboard actor
//!
//! Commands travel over an mpsc channel to the single actor; events are
//! broadcast so any number of presenters can subscribe.

use tokio::sync::oneshot;

use crate::Snapshot;
use crate::aggregator::AggregateError;
use crate::control::SwitchError;

/// Outcome of one refresh, broadcast to every subscriber
///
/// Slow subscribers may lag and miss events; the next refresh supersedes them.
#[derive(Debug, Clone)]
pub enum DashboardEvent {
    Snapshot(Box<Snapshot>),
    Failed(AggregateError),
}

/// Result of a switch request: the switch itself, then the follow-up refresh
pub type SwitchOutcome = Result<Result<Snapshot, AggregateError>, SwitchError>;

#[derive(Debug)]
pub enum DashboardCommand {
    /// Refresh immediately, bypassing the interval timer
    RefreshNow {
        respond_to: oneshot::Sender<Result<Snapshot, AggregateError>>,
    },

    /// Switch the exit node, then refresh
    ///
    /// No refresh happens when the switch fails.
    SwitchNode {
        name: String,
        respond_to: oneshot::Sender<SwitchOutcome>,
    },

    /// New interval takes effect from the next tick
    UpdateInterval { interval_secs: u64 },

    /// Stop after the current refresh, if any
    Shutdown,
}
