//! Long-running dashboard refresh
//!
//! ```text
//!   DashboardHandle ──commands──▶ DashboardActor ──aggregate──▶ Aggregator
//!                                       │
//!                                       └──DashboardEvent──▶ broadcast subscribers
//! ```
//!
//! The actor owns the aggregator and node control. Handles are cheap to clone
//! and talk to it over an mpsc channel, with oneshot replies for requests.

pub mod dashboard;
pub mod messages;

pub use dashboard::{DashboardActor, DashboardHandle};
pub use messages::{DashboardCommand, DashboardEvent, SwitchOutcome};
