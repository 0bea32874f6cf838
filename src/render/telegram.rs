use serde::Serialize;

use super::{ControlAction, DashboardRenderer, REFRESH_ID, delay_label, or_na, short_node_name};
use crate::aggregator::AggregateError;
use crate::{Snapshot, SourceResult, WorkloadKind};

const SELECT_PREFIX: &str = "set|";
const BUTTONS_PER_ROW: usize = 2;

/// `reply_markup` payload of a Telegram message
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

/// Renders snapshots as Markdown text with an inline keyboard
#[derive(Debug, Clone, Default)]
pub struct TelegramRenderer;

impl DashboardRenderer for TelegramRenderer {
    type Message = String;
    type Controls = InlineKeyboard;

    fn render_snapshot(&self, snapshot: &Snapshot) -> String {
        let mut text = String::from("🖥️ *HOMELAB DASHBOARD*\n\n");

        text.push_str("🏗️ *PROXMOX VE*\n");
        match &snapshot.hypervisor {
            SourceResult::Ok(info) => {
                text.push_str(&format!("Node: `{}` | Up: `{}`\n", info.node, info.uptime));
                for workload in &info.workloads {
                    let icon = match workload.kind {
                        WorkloadKind::Vm => "🖥️",
                        WorkloadKind::Container => "📦",
                    };
                    let state = if workload.running { "running" } else { "stopped" };
                    text.push_str(&format!("  {icon} {}: {state}\n", workload.name));
                }
                if let Some(note) = &info.workload_error {
                    text.push_str(&format!("  ⚠️ Guests unavailable: {note}\n"));
                }
            }
            SourceResult::Failed(_) => text.push_str("❌ Connection error\n"),
        }

        text.push_str("\n📟 *MIKROTIK*\n");
        match &snapshot.router {
            SourceResult::Ok(info) => {
                text.push_str(&format!(
                    "Router: `{}`\nCPU: `{}%` | RAM: `{}`\nUptime: `{}`\n",
                    or_na(&info.name),
                    info.cpu,
                    or_na(&info.ram),
                    or_na(&info.uptime),
                ));
                match &snapshot.bandwidth {
                    SourceResult::Ok(rates) => text.push_str(&format!(
                        "WAN: ↓ `{:.2} Mbps` | ↑ `{:.2} Mbps`\n",
                        rates.rx_mbps, rates.tx_mbps
                    )),
                    SourceResult::Failed(_) => text.push_str("WAN: unavailable\n"),
                }
            }
            SourceResult::Failed(e) => text.push_str(&format!("❌ Error: {e}\n")),
        }

        text.push_str("\n⚡ *VPN EXIT NODE*\n");
        match &snapshot.proxy {
            SourceResult::Ok(info) => {
                text.push_str(&format!("Selected: `{}`\n", or_na(&info.current)))
            }
            SourceResult::Failed(e) => text.push_str(&format!("❌ Error: {e}\n")),
        }

        text.push_str(&format!("\n🕒 Updated: `{}`", snapshot.timestamp));
        text
    }

    fn render_controls(&self, snapshot: &Snapshot) -> InlineKeyboard {
        let mut rows: Vec<Vec<InlineButton>> = Vec::new();

        if let SourceResult::Ok(proxy) = &snapshot.proxy {
            let buttons: Vec<InlineButton> = proxy
                .candidates
                .iter()
                .map(|node| {
                    let marker = if proxy.is_current(node) { "🟢" } else { "🌐" };
                    InlineButton {
                        text: format!(
                            "{marker} {} ({})",
                            short_node_name(node),
                            delay_label(proxy.delay_of(node))
                        ),
                        callback_data: format!("{SELECT_PREFIX}{node}"),
                    }
                })
                .collect();

            rows.extend(buttons.chunks(BUTTONS_PER_ROW).map(<[InlineButton]>::to_vec));
        }

        rows.push(vec![InlineButton {
            text: "🔄 Refresh".to_string(),
            callback_data: REFRESH_ID.to_string(),
        }]);

        InlineKeyboard {
            inline_keyboard: rows,
        }
    }

    fn render_failure(&self, _error: &AggregateError) -> String {
        "❌ Failed to load dashboard data. Please try again.".to_string()
    }

    fn parse_action(&self, id: &str) -> Option<ControlAction> {
        if id == REFRESH_ID {
            return Some(ControlAction::Refresh);
        }
        id.strip_prefix(SELECT_PREFIX)
            .filter(|node| !node.is_empty())
            .map(|node| ControlAction::SelectNode(node.to_string()))
    }
}
