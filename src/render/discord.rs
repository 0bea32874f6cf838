use super::{ControlAction, DashboardRenderer, REFRESH_ID, delay_label, or_na, short_node_name};
use crate::aggregator::AggregateError;
use crate::discord::{ActionRow, Button, ButtonStyle, Embed, EmbedField, Message, MessageBuilder};
use crate::{
    BandwidthSample, HypervisorInfo, ProxyInfo, RouterInfo, Snapshot, SourceResult, WorkloadKind,
};

const NODE_PREFIX: &str = "node_";
const EMBED_COLOR: u32 = 0x3498db;

/// Discord allows five rows of five buttons; one slot is kept for refresh.
pub const MAX_NODE_BUTTONS: usize = 24;

/// Renders snapshots as a Discord embed with button rows
#[derive(Debug, Clone, Default)]
pub struct DiscordRenderer;

impl DashboardRenderer for DiscordRenderer {
    type Message = Message;
    type Controls = Vec<ActionRow>;

    fn render_snapshot(&self, snapshot: &Snapshot) -> Message {
        let embed = Embed {
            title: Some("🖥️ Homelab Dashboard".to_string()),
            description: None,
            color: Some(EMBED_COLOR),
            fields: vec![
                EmbedField {
                    name: "🏗️ PROXMOX VE".to_string(),
                    value: hypervisor_field(&snapshot.hypervisor),
                    inline: false,
                },
                EmbedField {
                    name: "📟 MIKROTIK".to_string(),
                    value: router_field(&snapshot.router, &snapshot.bandwidth),
                    inline: false,
                },
                EmbedField {
                    name: "⚡ VPN EXIT NODE".to_string(),
                    value: proxy_field(&snapshot.proxy, &snapshot.timestamp),
                    inline: false,
                },
            ],
            footer: None,
            timestamp: Some(snapshot.captured_at.to_rfc3339()),
        };

        MessageBuilder::new().add_embed(embed).build()
    }

    fn render_controls(&self, snapshot: &Snapshot) -> Vec<ActionRow> {
        let mut buttons: Vec<Button> = match &snapshot.proxy {
            SourceResult::Ok(proxy) => proxy
                .candidates
                .iter()
                .take(MAX_NODE_BUTTONS)
                .map(|node| node_button(proxy, node))
                .collect(),
            SourceResult::Failed(_) => Vec::new(),
        };
        buttons.push(Button::new(ButtonStyle::Primary, "Refresh", REFRESH_ID).emoji("🔄"));

        let mut rows = Vec::new();
        let mut remaining = buttons.into_iter().peekable();
        while remaining.peek().is_some() {
            rows.push(ActionRow::new(
                remaining.by_ref().take(ActionRow::MAX_BUTTONS).collect(),
            ));
        }
        rows
    }

    fn render_failure(&self, _error: &AggregateError) -> Message {
        MessageBuilder::new()
            .content("❌ Failed to load dashboard data. Please try again.")
            .build()
    }

    fn parse_action(&self, id: &str) -> Option<ControlAction> {
        if id == REFRESH_ID {
            return Some(ControlAction::Refresh);
        }
        id.strip_prefix(NODE_PREFIX)
            .filter(|node| !node.is_empty())
            .map(|node| ControlAction::SelectNode(node.to_string()))
    }
}

fn node_button(proxy: &ProxyInfo, node: &str) -> Button {
    let label = format!("{} ({})", short_node_name(node), delay_label(proxy.delay_of(node)));
    let id = format!("{NODE_PREFIX}{node}");

    if proxy.is_current(node) {
        Button::new(ButtonStyle::Success, label, id).emoji("🟢")
    } else {
        Button::new(ButtonStyle::Secondary, label, id).emoji("🌐")
    }
}

fn hypervisor_field(result: &SourceResult<HypervisorInfo>) -> String {
    let info = match result {
        SourceResult::Ok(info) => info,
        SourceResult::Failed(_) => return "❌ Connection error".to_string(),
    };

    let mut value = format!("**Node:** `{}`\n**Uptime:** `{}`\n", info.node, info.uptime);
    for workload in &info.workloads {
        let icon = match workload.kind {
            WorkloadKind::Vm => "🖥️",
            WorkloadKind::Container => "📦",
        };
        let status = if workload.running { "✅" } else { "❌" };
        value.push_str(&format!("{icon} {}: {status}\n", workload.name));
    }
    if let Some(note) = &info.workload_error {
        value.push_str(&format!("⚠️ Guests unavailable: {note}\n"));
    }
    value
}

fn router_field(router: &SourceResult<RouterInfo>, bandwidth: &SourceResult<BandwidthSample>) -> String {
    let info = match router {
        SourceResult::Ok(info) => info,
        SourceResult::Failed(e) => return format!("❌ Error: {e}"),
    };

    let wan = match bandwidth {
        SourceResult::Ok(rates) => format!(
            "↓ `{:.2} Mbps` | ↑ `{:.2} Mbps`",
            rates.rx_mbps, rates.tx_mbps
        ),
        SourceResult::Failed(_) => "❌ unavailable".to_string(),
    };

    format!(
        "**Router:** `{}`\n**CPU:** `{}%` | **RAM:** `{}`\n**Uptime:** `{}`\n**WAN:** {wan}",
        or_na(&info.name),
        info.cpu,
        or_na(&info.ram),
        or_na(&info.uptime),
    )
}

fn proxy_field(result: &SourceResult<ProxyInfo>, timestamp: &str) -> String {
    let selected = match result {
        SourceResult::Ok(info) => format!("**Selected:** `{}`", or_na(&info.current)),
        SourceResult::Failed(e) => format!("❌ Error: {e}"),
    };
    format!("{selected}\n🕒 Updated: `{timestamp}`")
}
