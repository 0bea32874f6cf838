//! Watch-loop delivery: actor events rendered and posted to a webhook

use std::sync::Arc;
use std::time::Duration;

use homedash::actors::{DashboardEvent, DashboardHandle};
use homedash::aggregator::Aggregator;
use homedash::config::Discord;
use homedash::control::NodeControl;
use homedash::discord::WebhookNotifier;
use homedash::render::{DashboardRenderer, DiscordRenderer};
use homedash::sources::proxy::ProxyApi;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_snapshot_event_is_posted() {
    let hypervisor = MockServer::start().await;
    let proxy = MockServer::start().await;
    let webhook = MockServer::start().await;
    let agent = FakeAgent::start().await;
    mount_hypervisor(&hypervisor).await;
    mount_proxy(&proxy, "WG-JP").await;

    Mock::given(method("POST"))
        .and(path("/api/webhooks/1/token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&webhook)
        .await;

    let config = test_config(&hypervisor, &proxy, agent.addr);
    let (event_tx, mut events) = broadcast::channel(16);
    let handle = DashboardHandle::spawn(
        Arc::new(Aggregator::from_config(&config).unwrap()),
        NodeControl::new(ProxyApi::new(config.proxy.clone()).unwrap()),
        event_tx,
        Duration::from_secs(600),
    );

    let DashboardEvent::Snapshot(snapshot) = events.recv().await.unwrap() else {
        panic!("refresh failed");
    };

    let url = url::Url::parse(&webhook.uri())
        .unwrap()
        .join("/api/webhooks/1/token")
        .unwrap();
    let notifier = WebhookNotifier::new(Discord {
        url: url.to_string(),
    });

    let message = DiscordRenderer.render_snapshot(&snapshot);
    assert!(message.embeds[0].fields[2].value.contains("`WG-JP`"));
    notifier.send_message(&message).await.unwrap();

    handle.shutdown().await.unwrap();
}
