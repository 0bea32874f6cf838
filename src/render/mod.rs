//! Chat presentation of dashboard snapshots
//!
//! Every chat platform renders the same two things: the snapshot as a message
//! and the exit-node candidates as selectable controls. Platforms implement
//! [`DashboardRenderer`]; the wire types of each live in its own module.

pub mod discord;
pub mod telegram;

use crate::Snapshot;
use crate::aggregator::AggregateError;

pub use discord::DiscordRenderer;
pub use telegram::TelegramRenderer;

/// What a pressed control asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    Refresh,
    SelectNode(String),
}

pub trait DashboardRenderer {
    type Message;
    type Controls;

    fn render_snapshot(&self, snapshot: &Snapshot) -> Self::Message;

    /// Node selection controls plus a refresh control.
    fn render_controls(&self, snapshot: &Snapshot) -> Self::Controls;

    /// Single generic message shown when no snapshot could be built.
    fn render_failure(&self, error: &AggregateError) -> Self::Message;

    /// Maps a control identifier coming back from the platform.
    fn parse_action(&self, id: &str) -> Option<ControlAction>;
}

/// Control id shared by every platform for the refresh control
pub const REFRESH_ID: &str = "refresh";

/// Display name without the tunnel prefixes.
pub fn short_node_name(node: &str) -> String {
    node.replace("WG-Solid-", "").replace("WG-", "")
}

/// `42ms`, or `N/A` for unmeasured nodes.
pub fn delay_label(delay_ms: u32) -> String {
    if delay_ms > 0 {
        format!("{delay_ms}ms")
    } else {
        "N/A".to_string()
    }
}

/// Placeholder for empty values.
pub(crate) fn or_na(value: &str) -> &str {
    if value.is_empty() { "N/A" } else { value }
}
