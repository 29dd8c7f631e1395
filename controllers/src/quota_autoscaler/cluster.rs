use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures_util::future::BoxFuture;
use resources::objects::event::EventType;
use resources::objects::object_reference::ObjectReference;
use resources::objects::quota_autoscaler::QuotaAutoscaler;
use resources::objects::resource_quota::ResourceQuota;
use resources::objects::workload::{WorkloadController, WorkloadKind};
use tokio::sync::RwLock;

use crate::attribution::WorkloadLookup;
use crate::serializer::{ResizeEvent, ResizeFn};

/// The cluster capabilities the decision subsystem consumes: watch/list of
/// scalers and quotas is handled by the informer/reflector layer directly;
/// this trait covers the remaining point lookups, the resize patch, and
/// event publication.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_quota(&self, namespace: &str, name: &str) -> Result<ResourceQuota>;
    async fn get_workload(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadController>;
    async fn create_event(
        &self,
        involved_object: ObjectReference,
        reason: &str,
        type_: EventType,
        message: String,
    ) -> Result<()>;
    /// Strategic-merge patch of `spec.hard` on a namespace's ResourceQuota.
    /// Preserves the upstream's literal `limits.memory: "<N>m"` field (see
    /// `default_resize_fn`).
    async fn patch_quota(&self, namespace: &str, name: &str, new: resources::resources_algebra::Resources) -> Result<()>;
}

/// An in-memory `ClusterClient` used in tests: quotas and workloads are
/// preloaded, and published events/patches are recorded for assertions
/// instead of sent anywhere.
#[cfg_attr(not(test), allow(dead_code))]
#[derive(Default)]
pub struct FakeClusterClient {
    pub quotas: RwLock<HashMap<(String, String), ResourceQuota>>,
    pub workloads: RwLock<HashMap<(String, String), WorkloadController>>,
    pub published_events: RwLock<Vec<(ObjectReference, String, EventType, String)>>,
    pub patches: RwLock<Vec<(String, String, resources::resources_algebra::Resources)>>,
}

#[async_trait::async_trait]
impl ClusterClient for FakeClusterClient {
    async fn get_quota(&self, namespace: &str, name: &str) -> Result<ResourceQuota> {
        self.quotas
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("quota {}/{} not found", namespace, name))
    }

    async fn get_workload(
        &self,
        _kind: WorkloadKind,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadController> {
        self.workloads
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("workload {}/{} not found", namespace, name))
    }

    async fn create_event(
        &self,
        involved_object: ObjectReference,
        reason: &str,
        type_: EventType,
        message: String,
    ) -> Result<()> {
        self.published_events
            .write()
            .await
            .push((involved_object, reason.to_string(), type_, message));
        Ok(())
    }

    async fn patch_quota(&self, namespace: &str, name: &str, new: resources::resources_algebra::Resources) -> Result<()> {
        self.patches
            .write()
            .await
            .push((namespace.to_string(), name.to_string(), new));
        Ok(())
    }
}

/// Any `ClusterClient` can resolve attribution lookups directly through its
/// `get_workload` GET.
#[async_trait::async_trait]
impl<T: ClusterClient + ?Sized> WorkloadLookup for T {
    async fn lookup(&self, kind: WorkloadKind, namespace: &str, name: &str) -> Option<WorkloadController> {
        self.get_workload(kind, namespace, name).await.ok()
    }
}

/// Builds an [`ObjectReference`] pointing at a `QuotaAutoscaler`, for use as
/// the `involvedObject` of a resize-outcome Event.
pub fn scaler_reference(scaler: &QuotaAutoscaler) -> ObjectReference {
    ObjectReference {
        kind: "QuotaAutoscaler".to_string(),
        name: scaler.metadata.name.clone(),
        namespace: scaler.metadata.namespace.clone(),
    }
}

/// The default in-cluster resize backend: applies a strategic-merge-style
/// patch directly to the `ResourceQuota`'s `spec.hard`. Preserves the
/// upstream's `limits.memory: "<N>m"` field exactly as observed — almost
/// certainly meant to be `M`, but changing the unit would change observable
/// behavior, so it is kept and flagged rather than silently fixed.
pub fn default_resize_fn(client: Arc<dyn ClusterClient>) -> ResizeFn {
    Arc::new(move |event: ResizeEvent| -> BoxFuture<'static, Result<(), String>> {
        let client = client.clone();
        Box::pin(async move {
            tracing::info!(
                namespace = %event.namespace,
                cpu = event.new.cpu,
                memory = event.new.memory,
                "patching ResourceQuota spec.hard: cpu={}m limits.cpu={}m memory={}M limits.memory={}m",
                event.new.cpu,
                event.new.cpu * 10,
                event.new.memory,
                event.new.memory,
            );
            client
                .patch_quota(&event.namespace, &event.resource_quota_name, event.new)
                .await
                .map_err(|e| e.to_string())
        })
    })
}

/// An HTTP-backed resize function matching the optional Resize API contract:
/// `PATCH ${ICHP_API_ENDPOINT}/api/v1/namespace` with bearer auth read from
/// the mounted service-account token. A 5-minute client timeout mirrors the
/// upstream contract.
pub fn http_resize_fn(endpoint: String, workload: String, token: String) -> ResizeFn {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .expect("failed to build resize HTTP client");

    Arc::new(move |event: ResizeEvent| -> BoxFuture<'static, Result<(), String>> {
        let client = client.clone();
        let endpoint = endpoint.clone();
        let workload = workload.clone();
        let token = token.clone();
        Box::pin(async move {
            let body = serde_json::json!({
                "name": event.namespace,
                "workload": workload,
                "spec": {
                    "quota": {
                        "cpu": event.new.cpu,
                        "memory": event.new.memory,
                        "storage": event.new.storage,
                    }
                }
            });
            let response = client
                .patch(format!("{endpoint}/api/v1/namespace"))
                .bearer_auth(token)
                .json(&body)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            if !response.status().is_success() {
                return Err(format!("resize API returned {}", response.status()));
            }
            Ok(())
        })
    })
}
