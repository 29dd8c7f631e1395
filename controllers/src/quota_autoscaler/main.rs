#[macro_use]
extern crate lazy_static;

use std::sync::Arc;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use resources::config::ClusterConfig;
use resources::informer::run_reflector;
use resources::objects::event::{Event, REASON_FAILED_CREATE, REASON_PRESENT_ERROR};
use resources::objects::quota_autoscaler::QuotaAutoscaler;
use resources::objects::resource_quota::ResourceQuota;
use tokio::sync::{mpsc, RwLock};

mod attribution;
mod cluster;
mod policy;
mod serializer;
mod utils;
mod validated_scaler;
mod watch_loop;

use cluster::{default_resize_fn, http_resize_fn};
use utils::HttpClusterClient;
use serializer::ResizeSerializer;
use watch_loop::WatchLoop;

lazy_static! {
    pub static ref CONFIG: ClusterConfig = Config::builder()
        .add_source(File::with_name("/etc/rminik8s/controller-manager.yaml").required(false))
        .add_source(Environment::default())
        .build()
        .unwrap_or_default()
        .try_deserialize::<ClusterConfig>()
        .with_context(|| "Failed to parse config".to_string())
        .unwrap_or_default();
}

/// Default sync period in seconds
pub static SYNC_PERIOD: u32 = 15;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cluster: Arc<HttpClusterClient> = Arc::new(HttpClusterClient::default());

    let resize_fn = if CONFIG.ichp_api_endpoint.is_empty() {
        default_resize_fn(cluster.clone())
    } else {
        let token = std::fs::read_to_string("/var/run/secrets/kubernetes.io/serviceaccount/token")
            .unwrap_or_default();
        http_resize_fn(CONFIG.ichp_api_endpoint.clone(), CONFIG.workload.clone(), token)
    };

    loop {
        if let Err(e) = run_once(cluster.clone(), resize_fn.clone()).await {
            tracing::error!("quota autoscaler watch loop exited: {:#}", e);
        }
        tokio::time::sleep(std::time::Duration::from_secs(SYNC_PERIOD as u64)).await;
    }
}

async fn run_once(cluster: Arc<HttpClusterClient>, resize_fn: serializer::ResizeFn) -> Result<()> {
    let scaler_store = Arc::new(RwLock::new(std::collections::HashMap::new()));
    let quota_store = Arc::new(RwLock::new(std::collections::HashMap::new()));

    let (scaler_tx, scaler_rx) = mpsc::channel(256);
    let (quota_tx, quota_rx) = mpsc::channel(256);
    let (pod_failed_tx, pod_failed_rx) = mpsc::channel::<Event>(256);
    let (cert_manager_tx, cert_manager_rx) = mpsc::channel::<Event>(256);

    let scaler_lw = utils::create_lister_watcher::<QuotaAutoscaler>("quotaautoscalers".to_string());
    let quota_lw = utils::create_lister_watcher::<ResourceQuota>("resourcequotas".to_string());
    let pod_failed_lw = utils::create_lister_watcher_with_query::<Event>(
        "events".to_string(),
        Some(format!("fieldSelector=reason={REASON_FAILED_CREATE}")),
    );
    let cert_manager_lw = utils::create_lister_watcher_with_query::<Event>(
        "events".to_string(),
        Some(format!("fieldSelector=reason={REASON_PRESENT_ERROR}")),
    );

    // Seed the loop's per-namespace state from what's already on the
    // cluster before any incremental watch events arrive.
    let scalers: Vec<QuotaAutoscaler> = (scaler_lw.lister)(())
        .await?
        .into_iter()
        .map(|(_, s)| s)
        .collect();
    let quotas: Vec<ResourceQuota> = (quota_lw.lister)(())
        .await?
        .into_iter()
        .map(|(_, q)| q)
        .collect();
    {
        let mut store = scaler_store.write().await;
        for s in &scalers {
            store.insert(s.metadata.name.clone(), s.clone());
        }
    }
    {
        let mut store = quota_store.write().await;
        for q in &quotas {
            store.insert(q.metadata.name.clone(), q.clone());
        }
    }

    tokio::spawn(run_reflector(scaler_lw, scaler_store, scaler_tx));
    tokio::spawn(run_reflector(quota_lw, quota_store, quota_tx));
    tokio::spawn(pump_events(pod_failed_lw, pod_failed_tx));
    tokio::spawn(pump_events(cert_manager_lw, cert_manager_tx));

    let serializer = ResizeSerializer::start(resize_fn);
    let mut watch_loop = WatchLoop::new(cluster, serializer);
    watch_loop.seed(scalers, quotas);
    watch_loop
        .run(scaler_rx, quota_rx, pod_failed_rx, cert_manager_rx)
        .await;

    Ok(())
}

/// Events carry no meaningful prior state to reconcile against (each one
/// is a fresh observation), so this forwards every listed and watched
/// `Event` straight onto the channel rather than running a full reflector.
async fn pump_events(
    lw: resources::informer::ListerWatcher<Event>,
    tx: mpsc::Sender<Event>,
) -> Result<()> {
    for (_, event) in (lw.lister)(()).await? {
        let _ = tx.send(event).await;
    }
    let mut stream = (lw.watcher)(()).await?;
    use futures_util::stream::StreamExt;
    use tokio_tungstenite::tungstenite::Message;
    while let Some(msg) = stream.next().await {
        let Message::Text(text) = msg? else { continue };
        let watch_event: resources::models::etcd::WatchEvent = serde_json::from_str(&text)?;
        let event: Event = match watch_event {
            resources::models::etcd::WatchEvent::Put(e) => serde_json::from_str(&e.object)?,
            resources::models::etcd::WatchEvent::Delete(_) => continue,
        };
        let _ = tx.send(event).await;
    }
    Ok(())
}
