//! Alerting integration tests: cooldown lifecycle and webhook delivery

use std::sync::Arc;
use std::time::Duration;

use sitewatch::cache::MemoryCache;
use sitewatch::config::AlertingConfig;
use sitewatch::email::{MemoryMailer, WebhookMailer};
use sitewatch::repo::MemoryRepository;
use sitewatch::services::alerting::AlertingHandle;
use sitewatch::{AlertStatus, ProbeStatus};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn down_window(repo: &MemoryRepository, endpoint_id: &str, count: usize) {
    let now = chrono::Utc::now();
    for i in 0..count {
        repo.insert_log_at(
            endpoint_id,
            ProbeStatus::Down,
            None,
            now - chrono::Duration::minutes(i as i64 + 1),
        )
        .await;
    }
}

#[tokio::test]
async fn test_cooldown_expiry_reopens_alerting() {
    let repo = Arc::new(MemoryRepository::new());
    let (_user, endpoints) = seed_fleet(&repo, &test_urls(1)).await;
    down_window(&repo, &endpoints[0], 12).await;

    let mailer = Arc::new(MemoryMailer::new());
    let config = AlertingConfig {
        sweep_interval: Duration::from_secs(3600),
        cooldown_ttl: Duration::from_millis(300),
        ..AlertingConfig::default()
    };
    let handle = AlertingHandle::spawn(
        config,
        repo.clone(),
        Arc::new(MemoryCache::new()),
        mailer.clone(),
    );

    // the boot sweep alerts once and arms the cooldown
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(mailer.sent().await.len(), 1);

    let sweep = handle.check_now().await.unwrap();
    assert_eq!(sweep.suppressed, 1);
    assert_eq!(mailer.sent().await.len(), 1);

    // once the flag expires the persisting outage alerts again
    tokio::time::sleep(Duration::from_millis(400)).await;
    let sweep = handle.check_now().await.unwrap();
    assert_eq!(sweep.alerted, 1);
    assert_eq!(mailer.sent().await.len(), 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_alert_email_reaches_the_webhook() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mail"))
        .and(body_partial_json(serde_json::json!({
            "to": "owner@example.com",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let repo = Arc::new(MemoryRepository::new());
    let (_user, endpoints) = seed_fleet(&repo, &test_urls(1)).await;
    down_window(&repo, &endpoints[0], 12).await;

    let mailer = Arc::new(WebhookMailer::new(
        reqwest::Client::new(),
        format!("{}/mail", mock_server.uri()),
        "alerts@sitewatch.test".to_string(),
    ));
    let config = AlertingConfig {
        sweep_interval: Duration::from_secs(3600),
        ..AlertingConfig::default()
    };
    let handle = AlertingHandle::spawn(config, repo.clone(), Arc::new(MemoryCache::new()), mailer);

    tokio::time::sleep(Duration::from_millis(100)).await;

    // the cooldown from the boot sweep keeps this to exactly one email
    let sweep = handle.check_now().await.unwrap();
    assert_eq!(sweep.suppressed, 1);

    let alerts = repo.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, AlertStatus::Sent);
    assert!(alerts[0].message.contains("has been DOWN for"));

    handle.shutdown().await;
}
