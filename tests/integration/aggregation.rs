//! Full aggregation rounds against fake upstreams

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use homedash::aggregator::{AggregateError, Aggregator};
use homedash::render::{DashboardRenderer, DiscordRenderer, TelegramRenderer};
use homedash::{BandwidthSample, SourceResult, WorkloadKind};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_all_sources_merge_into_snapshot() {
    let hypervisor = MockServer::start().await;
    let proxy = MockServer::start().await;
    let agent = FakeAgent::start().await;
    mount_hypervisor(&hypervisor).await;
    mount_proxy(&proxy, "WG-Solid-SG").await;

    let config = test_config(&hypervisor, &proxy, agent.addr);
    let aggregator = Aggregator::from_config(&config).unwrap();

    let snapshot = aggregator.aggregate(&CancellationToken::new()).await.unwrap();
    assert!(snapshot.failures().is_empty(), "{:?}", snapshot.failures());

    let host = snapshot.hypervisor.ok().unwrap();
    assert_eq!(host.node, "pve");
    assert_eq!(host.uptime, "2d 03h");
    assert_eq!(
        host.workloads
            .iter()
            .map(|w| (w.name.as_str(), w.kind, w.running))
            .collect::<Vec<_>>(),
        vec![
            ("adguard", WorkloadKind::Container, true),
            ("windows", WorkloadKind::Vm, false),
        ]
    );

    let router = snapshot.router.ok().unwrap();
    assert_eq!(router.name, "edge-router");
    assert_eq!(router.cpu, "12");
    assert_eq!(router.ram, "200/1024 MB");
    assert_eq!(router.uptime, "1d 01:01");

    // 262144 octets per 200ms read on rx, half that on tx
    assert_eq!(
        snapshot.bandwidth,
        SourceResult::Ok(BandwidthSample {
            rx_mbps: 10.0,
            tx_mbps: 5.0,
        })
    );

    let exit = snapshot.proxy.ok().unwrap();
    assert_eq!(exit.current, "WG-Solid-SG");
    assert_eq!(exit.candidates, vec!["WG-Solid-SG", "WG-JP"]);
    assert_eq!(exit.delay_of("WG-JP"), 80);

    // three GETs: router, and two counter samples
    assert_eq!(agent.requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failed_sources_do_not_block_others() {
    let hypervisor = MockServer::start().await;
    let proxy = MockServer::start().await;
    let agent = FakeAgent::start().await;
    mount_hypervisor(&hypervisor).await;

    Mock::given(method("GET"))
        .and(path("/proxies"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&proxy)
        .await;

    let config = test_config(&hypervisor, &proxy, agent.addr);
    let snapshot = Aggregator::from_config(&config)
        .unwrap()
        .aggregate(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(snapshot.failures().len(), 1);
    assert!(snapshot.proxy.failure().unwrap().contains("401"));
    assert!(snapshot.hypervisor.is_ok());
    assert!(snapshot.router.is_ok());
    assert!(snapshot.bandwidth.is_ok());

    let message = DiscordRenderer.render_snapshot(&snapshot);
    assert!(message.embeds[0].fields[2].value.starts_with("❌ Error:"));
}

#[tokio::test]
async fn test_silent_router_fails_snmp_sections() {
    let hypervisor = MockServer::start().await;
    let proxy = MockServer::start().await;
    let agent = FakeAgent::silent().await;
    mount_hypervisor(&hypervisor).await;
    mount_proxy(&proxy, "WG-JP").await;

    let config = test_config(&hypervisor, &proxy, agent.addr);
    let snapshot = Aggregator::from_config(&config)
        .unwrap()
        .aggregate(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        snapshot.router.failure(),
        Some("SNMP request timed out after 1 attempts")
    );
    assert_eq!(
        snapshot.bandwidth.failure(),
        Some("SNMP request timed out after 1 attempts")
    );
    assert!(snapshot.proxy.is_ok());

    let text = TelegramRenderer.render_snapshot(&snapshot);
    assert!(text.contains("❌ Error: SNMP request timed out"));
    assert!(text.contains("Selected: `WG-JP`"));
}

#[tokio::test]
async fn test_slow_hypervisor_exceeds_deadline() {
    let hypervisor = MockServer::start().await;
    let proxy = MockServer::start().await;
    let agent = FakeAgent::start().await;
    mount_proxy(&proxy, "WG-JP").await;

    Mock::given(method("GET"))
        .and(path("/api2/json/nodes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"data": [{"node": "pve", "uptime": 1}]}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&hypervisor)
        .await;

    let mut config = test_config(&hypervisor, &proxy, agent.addr);
    config.hypervisor.timeout_secs = 10;
    config.aggregator.deadline_secs = 1;

    let started = Instant::now();
    let result = Aggregator::from_config(&config)
        .unwrap()
        .aggregate(&CancellationToken::new())
        .await;

    assert_matches!(
        result,
        Err(AggregateError::DeadlineExceeded { ref pending, .. }) if pending == &vec!["hypervisor"]
    );
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_cancelled_round_returns_promptly() {
    let hypervisor = MockServer::start().await;
    let proxy = MockServer::start().await;
    let agent = FakeAgent::silent().await;
    mount_hypervisor(&hypervisor).await;
    mount_proxy(&proxy, "WG-JP").await;

    let config = test_config(&hypervisor, &proxy, agent.addr);
    let aggregator = Aggregator::from_config(&config).unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let result = aggregator.aggregate(&token).await;

    assert_eq!(result.unwrap_err(), AggregateError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(1));
}
