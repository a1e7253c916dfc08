//! Periodic loop: scheduled passes, refresh requests and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cfgagent_core::{InstanceId, Manifest};
use cfgagent_daemon::run_with;
use cfgagent_renderer::TeraRenderer;
use cfgagent_sync::ReconciliationEngine;
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};

use common::FakeClient;

fn engine(client: Arc<FakeClient>) -> ReconciliationEngine {
    ReconciliationEngine::builder(client, Arc::new(TeraRenderer::new()))
        .instance(InstanceId::from("zone-1"), vec![])
        .build()
}

async fn wait_for(client: &FakeClient, at_least: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.fetches() < at_least {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("expected fetches did not happen in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn passes_repeat_until_shutdown() {
    let client = Arc::new(FakeClient::default().serve("zone-1", vec![]));
    let (_refresh_tx, refresh_rx) = mpsc::channel(1);
    let (shutdown_tx, _) = broadcast::channel(4);

    let handle = tokio::spawn(run_with(
        engine(Arc::clone(&client)),
        Duration::from_millis(20),
        refresh_rx,
        shutdown_tx.clone(),
    ));

    wait_for(&client, 3).await;
    shutdown_tx.send(()).expect("send shutdown");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stops after shutdown")
        .expect("join")
        .expect("clean exit");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_runs_an_extra_pass() {
    let client = Arc::new(FakeClient::default().serve("zone-1", vec![]));
    let (refresh_tx, refresh_rx) = mpsc::channel(1);
    let (shutdown_tx, _) = broadcast::channel(4);

    let handle = tokio::spawn(run_with(
        engine(Arc::clone(&client)),
        Duration::from_secs(3600),
        refresh_rx,
        shutdown_tx.clone(),
    ));

    wait_for(&client, 1).await;
    refresh_tx.send(()).await.expect("send refresh");
    wait_for(&client, 2).await;

    shutdown_tx.send(()).expect("send shutdown");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stops after shutdown")
        .expect("join")
        .expect("clean exit");
    assert_eq!(client.fetches(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_lets_the_running_pass_finish() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("a.conf");
    let client = Arc::new(
        FakeClient::default()
            .serve("zone-1", vec![Manifest::new("a", &path, "value")])
            .with_delay(Duration::from_millis(300)),
    );
    let (_refresh_tx, refresh_rx) = mpsc::channel(1);
    let (shutdown_tx, _) = broadcast::channel(4);

    let handle = tokio::spawn(run_with(
        engine(Arc::clone(&client)),
        Duration::from_secs(3600),
        refresh_rx,
        shutdown_tx.clone(),
    ));

    wait_for(&client, 1).await;
    shutdown_tx.send(()).expect("send shutdown");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stops after shutdown")
        .expect("join")
        .expect("clean exit");

    assert_eq!(std::fs::read_to_string(&path).expect("read"), "value");
    assert!(!tmp.path().join("a.conf.cfgagent.tmp").exists(), "no temp file left behind");
    assert_eq!(client.fetches(), 1);
}
