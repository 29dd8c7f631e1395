use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use resources::informer::WatchEvent;
use resources::objects::event::{Event, EventType};
use resources::objects::quota_autoscaler::QuotaAutoscaler;
use resources::objects::resource_quota::{QuotaResourceName, ResourceQuota};
use resources::quantity::parse_milli;
use resources::resources_algebra::Resources;
use tokio::sync::mpsc::Receiver;
use tokio::time::interval;

use crate::attribution::{calculate_headroom, get_normalized_used_cpu};
use crate::cluster::{scaler_reference, ClusterClient};
use crate::policy::{clamp_to_scaler, compute_policy_desired};
use crate::serializer::{ResizeEvent, ResizeResult, ResizeSerializer};
use crate::validated_scaler::validate_scaler;

const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// The per-namespace state the watch loop folds cluster streams into: the
/// latest known scaler and bound quota, and any failure events accumulated
/// since the last tick.
#[derive(Default)]
struct NamespaceState {
    scaler: Option<QuotaAutoscaler>,
    quota: Option<ResourceQuota>,
    events: Vec<Event>,
}

/// Multiplexes the scaler/quota/pod-failed-event/cert-manager-event streams
/// plus a 5-second ticker and the resize-result channel into a single
/// decision loop, mirroring the teacher's `PodAutoscaler::run` select shape.
pub struct WatchLoop<C: ClusterClient + 'static> {
    cluster: Arc<C>,
    serializer: ResizeSerializer,
    state: HashMap<String, NamespaceState>,
}

impl<C: ClusterClient + 'static> WatchLoop<C> {
    pub fn new(cluster: Arc<C>, serializer: ResizeSerializer) -> Self {
        Self {
            cluster,
            serializer,
            state: HashMap::new(),
        }
    }

    /// Seeds initial state from an existing list of scalers and quotas,
    /// matching by `namespace` and `scaler.spec.resourceQuota == quota.name`.
    pub fn seed(&mut self, scalers: Vec<QuotaAutoscaler>, quotas: Vec<ResourceQuota>) {
        let mut quotas_by_ns: HashMap<String, Vec<ResourceQuota>> = HashMap::new();
        for quota in quotas {
            quotas_by_ns
                .entry(quota.metadata.namespace.clone())
                .or_default()
                .push(quota);
        }
        for scaler in scalers {
            let ns = scaler.metadata.namespace.clone();
            let quota = quotas_by_ns
                .get(&ns)
                .and_then(|qs| qs.iter().find(|q| q.metadata.name == scaler.spec.resource_quota))
                .cloned();
            let entry = self.state.entry(ns).or_default();
            entry.quota = quota;
            entry.scaler = Some(scaler);
        }
    }

    pub async fn run(
        &mut self,
        mut scaler_events: Receiver<WatchEvent<QuotaAutoscaler>>,
        mut quota_events: Receiver<WatchEvent<ResourceQuota>>,
        mut pod_failed_events: Receiver<Event>,
        mut cert_manager_events: Receiver<Event>,
    ) {
        let mut ticker = interval(TICK_INTERVAL);
        let mut pending_ticks: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                Some(ev) = scaler_events.recv() => {
                    self.handle_scaler_event(ev).await;
                },
                Some(ev) = quota_events.recv() => {
                    if let Some(ns) = self.handle_quota_event(ev) {
                        pending_ticks.insert(ns);
                    }
                },
                Some(ev) = pod_failed_events.recv() => {
                    if let Some(ns) = self.bucket_event(ev) {
                        pending_ticks.insert(ns);
                    }
                },
                Some(ev) = cert_manager_events.recv() => {
                    if let Some(ns) = self.bucket_event(ev) {
                        pending_ticks.insert(ns);
                    }
                },
                Some(result) = self.serializer.recv_result() => {
                    self.publish_result(result).await;
                },
                _ = ticker.tick() => {
                    for ns in pending_ticks.drain() {
                        self.recompute(&ns, true).await;
                        if let Some(state) = self.state.get_mut(&ns) {
                            state.events.clear();
                        }
                    }
                },
                else => break,
            }
        }
    }

    async fn handle_scaler_event(&mut self, event: WatchEvent<QuotaAutoscaler>) {
        let scaler = match event {
            WatchEvent::Delete(scaler) => {
                self.state.remove(&scaler.metadata.namespace);
                return;
            },
            WatchEvent::Add(scaler) | WatchEvent::Update(_, scaler) => scaler,
        };

        let namespace = scaler.metadata.namespace.clone();
        let quota_name = scaler.spec.resource_quota.clone();
        let needs_quota = self
            .state
            .get(&namespace)
            .map(|s| s.quota.is_none())
            .unwrap_or(true);

        self.state.entry(namespace.clone()).or_default().scaler = Some(scaler);

        if needs_quota {
            if let Ok(quota) = self.cluster.get_quota(&namespace, &quota_name).await {
                if let Some(state) = self.state.get_mut(&namespace) {
                    state.quota = Some(quota);
                }
            }
        }
        self.recompute(&namespace, false).await;
    }

    /// Returns `Some(namespace)` if this update should be aggregated on the
    /// next tick rather than recomputed immediately.
    fn handle_quota_event(&mut self, event: WatchEvent<ResourceQuota>) -> Option<String> {
        match event {
            WatchEvent::Delete(quota) => {
                let ns = quota.metadata.namespace.clone();
                if let Some(state) = self.state.get_mut(&ns) {
                    state.quota = None;
                }
                None
            },
            WatchEvent::Add(quota) | WatchEvent::Update(_, quota) => {
                let ns = quota.metadata.namespace.clone();
                let binds = self
                    .state
                    .get(&ns)
                    .and_then(|s| s.scaler.as_ref())
                    .map(|s| s.spec.resource_quota == quota.metadata.name)
                    .unwrap_or(false);
                if !binds {
                    return None;
                }
                if let Some(state) = self.state.get_mut(&ns) {
                    state.quota = Some(quota);
                }
                Some(ns)
            },
        }
    }

    fn bucket_event(&mut self, event: Event) -> Option<String> {
        let namespace = event.involved_object.namespace.clone();
        let state = self.state.get_mut(&namespace)?;
        state.scaler.as_ref()?;
        state.events.push(event);
        Some(namespace)
    }

    async fn recompute(&mut self, namespace: &str, read_events: bool) {
        let Some(state) = self.state.get(namespace) else {
            return;
        };
        let (Some(scaler), Some(mut quota)) = (state.scaler.clone(), state.quota.clone()) else {
            return;
        };
        let events = state.events.clone();

        let validated = validate_scaler(&scaler.spec);

        // Normalize used CPU per the cluster's 1:10 request/limit ratio and
        // write it back into `status.used` so downstream policy reads see
        // the adjusted figure, matching the upstream watch loop.
        let requested_cpu = quota.status.used_cpu_milli();
        let limit_cpu = quota
            .status
            .used
            .get(&QuotaResourceName::LimitsCpu)
            .map(|q| parse_milli(q))
            .unwrap_or(requested_cpu);
        let normalized_cpu = get_normalized_used_cpu(requested_cpu, limit_cpu);
        quota
            .status
            .used
            .insert(QuotaResourceName::Cpu, format!("{normalized_cpu}m"));
        quota.status.used.remove(&QuotaResourceName::LimitsCpu);

        let scale_down = scaler.spec.behavior.scale_down.policies.clone();
        let scale_up = scaler.spec.behavior.scale_up.policies.clone();
        let mut desired = compute_policy_desired(&quota, &validated, &scale_down, &scale_up);

        if read_events && !events.is_empty() {
            let headroom = calculate_headroom(&events, self.cluster.as_ref()).await;
            if !headroom.is_empty() {
                let used = Resources::new(
                    quota.status.used_cpu_milli(),
                    quota.status.used_memory_mega(),
                    0,
                );
                desired = used.add(headroom).max(desired);
            }
        }

        desired = clamp_to_scaler(desired, &validated);
        let storage = quota.spec.hard_storage_giga();
        desired = Resources::new(desired.cpu, desired.memory, storage);

        let current = Resources::from_quota_hard(&quota);
        let scale_up_happened = desired.cpu > current.cpu || desired.memory > current.memory;
        desired = desired.force_no_scale_down_when_scale_up(current, scale_up_happened);

        if desired.differs_from(current) {
            self.serializer
                .submit(ResizeEvent {
                    namespace: namespace.to_string(),
                    resource_quota_name: quota.metadata.name.clone(),
                    current,
                    new: desired,
                })
                .await;
        }
    }

    async fn publish_result(&self, result: ResizeResult) {
        let Some(state) = self.state.get(&result.event.namespace) else {
            return;
        };
        let Some(scaler) = &state.scaler else {
            return;
        };
        let involved = scaler_reference(scaler);
        let (type_, message) = match &result.outcome {
            Ok(()) => (
                EventType::Normal,
                format!(
                    "Namespace ResourceQuota resized from CPU: {}m Memory: {}M to CPU: {}m Memory: {}M",
                    result.event.current.cpu,
                    result.event.current.memory,
                    result.event.new.cpu,
                    result.event.new.memory,
                ),
            ),
            Err(e) => (EventType::Warning, format!("resize failed: {e}")),
        };
        let cluster = self.cluster.clone();
        tokio::spawn(async move {
            let _ = tokio::time::timeout(
                Duration::from_secs(10),
                cluster.create_event(involved, "QuotaResize", type_, message),
            )
            .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use resources::objects::event::{Event, EventType as EvType, REASON_FAILED_CREATE};
    use resources::objects::object_reference::ObjectReference;
    use resources::objects::quota_autoscaler::{
        QuotaAutoscalerBehavior, QuotaAutoscalerSpec, QuotaScaleBehavior, QuotaScalePolicy,
        ScaleMethod,
    };
    use resources::objects::resource_quota::{QuotaResourceName, ResourceQuotaSpec, ResourceQuotaStatus};
    use resources::objects::workload::{
        Container, PodSpec, PodTemplateSpec, ResourceList, ResourceRequirements, WorkloadController,
        WorkloadSpec, WorkloadStatus,
    };
    use resources::objects::{Labels, Metadata};

    use super::*;
    use crate::cluster::FakeClusterClient;
    use crate::serializer::ResizeFn;

    fn metadata(name: &str, ns: &str) -> Metadata {
        Metadata {
            name: name.to_string(),
            namespace: ns.to_string(),
            uid: None,
            labels: Labels::default(),
        }
    }

    fn scaler(ns: &str, scale_up: Vec<QuotaScalePolicy>) -> QuotaAutoscaler {
        QuotaAutoscaler {
            metadata: metadata("autoscaler", ns),
            spec: QuotaAutoscalerSpec {
                resource_quota: "quota".into(),
                min_cpu: None,
                max_cpu: None,
                min_cpu_step: None,
                max_cpu_step: None,
                min_memory: None,
                max_memory: None,
                min_memory_step: None,
                max_memory_step: None,
                behavior: QuotaAutoscalerBehavior {
                    scale_up: QuotaScaleBehavior { policies: scale_up },
                    scale_down: QuotaScaleBehavior::default(),
                },
            },
        }
    }

    fn quota(ns: &str, hard_cpu: &str, hard_mem: &str, used_cpu: &str, used_mem: &str) -> ResourceQuota {
        let mut hard = HashMap::new();
        hard.insert(QuotaResourceName::Cpu, hard_cpu.to_string());
        hard.insert(QuotaResourceName::Memory, hard_mem.to_string());
        let mut used = HashMap::new();
        used.insert(QuotaResourceName::Cpu, used_cpu.to_string());
        used.insert(QuotaResourceName::Memory, used_mem.to_string());
        ResourceQuota {
            metadata: metadata("quota", ns),
            spec: ResourceQuotaSpec { hard },
            status: ResourceQuotaStatus {
                hard: HashMap::new(),
                used,
            },
        }
    }

    fn capturing_resize_fn(calls: Arc<tokio::sync::Mutex<Vec<ResizeEvent>>>) -> ResizeFn {
        Arc::new(move |event: ResizeEvent| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.lock().await.push(event);
                Ok(())
            })
        })
    }

    /// Scenario: a ReplicaSet failed to schedule 2 of its 5 replicas; the
    /// missing pods' requested resources are added as headroom on top of
    /// whatever the scale-up policies alone would have produced.
    #[tokio::test]
    async fn event_driven_bump_adds_headroom_on_top_of_policy_desired() {
        let cluster = Arc::new(FakeClusterClient::default());
        cluster.workloads.write().await.insert(
            ("ns".to_string(), "rs".to_string()),
            WorkloadController {
                metadata: metadata("rs", "ns"),
                spec: WorkloadSpec {
                    replicas: 5,
                    template: PodTemplateSpec {
                        spec: PodSpec {
                            containers: vec![Container {
                                name: "c".into(),
                                resources: ResourceRequirements {
                                    requests: ResourceList {
                                        cpu: Some("100m".into()),
                                        memory: Some("200Mi".into()),
                                    },
                                    limits: ResourceList::default(),
                                },
                            }],
                        },
                    },
                },
                status: WorkloadStatus { replicas: 3 },
            },
        );

        let calls = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let serializer = ResizeSerializer::start(capturing_resize_fn(calls.clone()));
        let mut watch_loop = WatchLoop::new(cluster, serializer);

        let scaler = scaler(
            "ns",
            vec![QuotaScalePolicy {
                method: ScaleMethod::Cpu,
                value: 100,
                period_minutes: 0,
            }],
        );
        let quota = quota("ns", "2000m", "4000M", "1500m", "3000M");
        watch_loop.state.insert(
            "ns".to_string(),
            NamespaceState {
                scaler: Some(scaler),
                quota: Some(quota),
                events: vec![Event {
                    metadata: metadata("evt", "ns"),
                    involved_object: ObjectReference {
                        kind: "ReplicaSet".into(),
                        name: "rs".into(),
                        namespace: "ns".into(),
                    },
                    reason: REASON_FAILED_CREATE.into(),
                    type_: EvType::Warning,
                    message: String::new(),
                    reporting_controller: String::new(),
                }],
            },
        );

        watch_loop.recompute("ns", true).await;

        let submitted = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let calls = calls.lock().await;
                if !calls.is_empty() {
                    return calls[0].clone();
                }
                drop(calls);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("resize should have been submitted");

        // headroom = 2 missing replicas * {cpu:100m, mem:200Mi->mega}
        assert_eq!(submitted.new.cpu, 1500 + 200);
        assert_eq!(submitted.new.memory, 3000 + 418);
    }

    /// Scenario: cpu is scaling up while memory alone would scale down;
    /// `ForceNoScaleDownWhenScaleUp` must hold memory at its current value.
    #[tokio::test]
    async fn anti_scaledown_when_scaleup_holds_the_other_axis() {
        let cluster = Arc::new(FakeClusterClient::default());
        let calls = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let serializer = ResizeSerializer::start(capturing_resize_fn(calls.clone()));
        let mut watch_loop = WatchLoop::new(cluster, serializer);

        let scaler = scaler(
            "ns",
            vec![
                QuotaScalePolicy {
                    method: ScaleMethod::Cpu,
                    value: 50,
                    period_minutes: 0,
                },
                QuotaScalePolicy {
                    method: ScaleMethod::Memory,
                    value: 50,
                    period_minutes: 0,
                },
            ],
        );
        // cpu at 90% (scales up), memory at 10% (scale-up policy does not fire,
        // but whatever downstream shrink would have applied must be clamped).
        let quota = quota("ns", "1000m", "2000M", "900m", "200M");
        watch_loop.state.insert(
            "ns".to_string(),
            NamespaceState {
                scaler: Some(scaler),
                quota: Some(quota),
                events: Vec::new(),
            },
        );

        watch_loop.recompute("ns", true).await;

        let submitted = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let calls = calls.lock().await;
                if !calls.is_empty() {
                    return calls[0].clone();
                }
                drop(calls);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("resize should have been submitted");

        assert!(submitted.new.cpu > 1000);
        assert_eq!(submitted.new.memory, 2000);
    }

    /// `status.used["limits.cpu"]` must feed only the *limit* side of the
    /// 1:10 normalization, not also be read back as the *request* side: a
    /// plain `used.cpu=100m` with `limits.cpu=2000m` normalizes to
    /// `max(100, 200) = 200m`, not `max(2000, 200) = 2000m`.
    #[tokio::test]
    async fn limits_cpu_does_not_corrupt_the_request_side_of_normalization() {
        let cluster = Arc::new(FakeClusterClient::default());
        let calls = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let serializer = ResizeSerializer::start(capturing_resize_fn(calls.clone()));
        let mut watch_loop = WatchLoop::new(cluster, serializer);

        let scaler = scaler(
            "ns",
            vec![QuotaScalePolicy {
                method: ScaleMethod::Cpu,
                value: 15,
                period_minutes: 0,
            }],
        );
        let mut quota = quota("ns", "1000m", "150000M", "100m", "0M");
        quota
            .status
            .used
            .insert(QuotaResourceName::LimitsCpu, "2000m".to_string());
        watch_loop.state.insert(
            "ns".to_string(),
            NamespaceState {
                scaler: Some(scaler),
                quota: Some(quota),
                events: Vec::new(),
            },
        );

        watch_loop.recompute("ns", true).await;

        let submitted = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let calls = calls.lock().await;
                if !calls.is_empty() {
                    return calls[0].clone();
                }
                drop(calls);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("resize should have been submitted");

        // normalized used = max(100, 2000/10) = 200m; usage% = floor(200/1000*100) = 20
        // fires (20 > 15); ratio target = 20*1000/15 = 1333, within step bounds.
        assert_eq!(submitted.new.cpu, 1333);
    }
}
