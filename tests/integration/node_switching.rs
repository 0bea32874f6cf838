//! Exit-node switching through the dashboard actor

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use homedash::actors::{DashboardEvent, DashboardHandle};
use homedash::aggregator::Aggregator;
use homedash::control::{NodeControl, SwitchError};
use homedash::render::{ControlAction, DashboardRenderer, DiscordRenderer};
use homedash::sources::proxy::ProxyApi;
use tokio::sync::broadcast;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn spawn_dashboard(
    hypervisor: &MockServer,
    proxy: &MockServer,
    agent: &FakeAgent,
) -> (DashboardHandle, broadcast::Receiver<DashboardEvent>) {
    let config = test_config(hypervisor, proxy, agent.addr);
    let aggregator = Arc::new(Aggregator::from_config(&config).unwrap());
    let control = NodeControl::new(ProxyApi::new(config.proxy.clone()).unwrap());

    let (event_tx, event_rx) = broadcast::channel(16);
    let handle = DashboardHandle::spawn(aggregator, control, event_tx, Duration::from_secs(600));
    (handle, event_rx)
}

#[tokio::test]
async fn test_button_press_switches_and_refreshes() {
    let hypervisor = MockServer::start().await;
    let proxy = MockServer::start().await;
    let agent = FakeAgent::start().await;
    mount_hypervisor(&hypervisor).await;
    mount_delays(&proxy).await;

    // first listing answers the initial refresh, the second the post-switch one
    Mock::given(method("GET"))
        .and(path("/proxies"))
        .respond_with(proxy_listing("WG-Solid-SG"))
        .up_to_n_times(1)
        .mount(&proxy)
        .await;
    Mock::given(method("GET"))
        .and(path("/proxies"))
        .respond_with(proxy_listing("WG-JP"))
        .mount(&proxy)
        .await;
    Mock::given(method("PUT"))
        .and(path("/proxies/ExitNode"))
        .and(body_json(serde_json::json!({"name": "WG-JP"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&proxy)
        .await;

    let (handle, mut events) = spawn_dashboard(&hypervisor, &proxy, &agent).await;

    let DashboardEvent::Snapshot(initial) = events.recv().await.unwrap() else {
        panic!("initial refresh failed");
    };

    let rows = DiscordRenderer.render_controls(&initial);
    let jp = rows
        .iter()
        .flat_map(|row| &row.components)
        .find(|button| button.label.starts_with("JP"))
        .unwrap();
    assert_eq!(jp.label, "JP (80ms)");

    let Some(ControlAction::SelectNode(node)) = DiscordRenderer.parse_action(&jp.custom_id) else {
        panic!("node button did not map to a selection");
    };

    let refreshed = handle.switch_node(node).await.unwrap();
    assert!(refreshed.proxy.ok().unwrap().is_current("WG-JP"));
    assert_matches!(events.recv().await.unwrap(), DashboardEvent::Snapshot(_));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rejected_switch_reports_status() {
    let hypervisor = MockServer::start().await;
    let proxy = MockServer::start().await;
    let agent = FakeAgent::start().await;
    mount_hypervisor(&hypervisor).await;
    mount_proxy(&proxy, "WG-Solid-SG").await;

    Mock::given(method("PUT"))
        .and(path("/proxies/ExitNode"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&proxy)
        .await;

    let (handle, mut events) = spawn_dashboard(&hypervisor, &proxy, &agent).await;
    events.recv().await.unwrap();

    let err = handle.switch_node("WG-Gone").await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<SwitchError>(),
        Some(&SwitchError::UnexpectedStatus(404))
    );
    assert_eq!(err.to_string(), "failed to switch node: status 404");

    handle.shutdown().await.unwrap();
}
