use std::collections::HashSet;

use resources::objects::event::{Event, REASON_FAILED_CREATE, REASON_PRESENT_ERROR};
use resources::objects::workload::{
    Container, PodTemplateSpec, ResourceList, ResourceRequirements, WorkloadController, WorkloadKind,
};
use resources::quantity::{parse_mega, parse_milli};
use resources::resources_algebra::Resources;

/// A container ratio of 1:10 between the requests the cluster bills quota
/// against and the limits it allows a container to burst up to.
const RATIO: i64 = 10;

/// Looks up the workload behind a scheduling-failure event, synthesizing
/// the `Challenge` kind's pod template since it has none of its own.
#[async_trait::async_trait]
pub trait WorkloadLookup: Send + Sync {
    async fn lookup(&self, kind: WorkloadKind, namespace: &str, name: &str) -> Option<WorkloadController>;
}

/// Resolves a batch of failure events collected during one tick for one
/// namespace into the extra headroom they imply. Unresolvable events are
/// logged and skipped; this function never fails.
pub async fn calculate_headroom(events: &[Event], lookup: &dyn WorkloadLookup) -> Resources {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut total = Resources::default();

    for event in events {
        if event.reason != REASON_FAILED_CREATE && event.reason != REASON_PRESENT_ERROR {
            continue;
        }
        let obj = &event.involved_object;
        let key = (obj.kind.clone(), obj.name.clone());
        if !seen.insert(key) {
            continue;
        }
        if obj.kind == "DaemonSet" {
            continue;
        }

        let Some(kind) = WorkloadKind::from_kind_str(&obj.kind) else {
            tracing::debug!("unsupported workload kind {} in event attribution", obj.kind);
            continue;
        };

        let resolved = match kind {
            WorkloadKind::Challenge => Some((challenge_template(), 1)),
            _ => lookup
                .lookup(kind, &obj.namespace, &obj.name)
                .await
                .and_then(|workload| resolve_missing(kind, &workload)),
        };

        let Some((template, missing)) = resolved else {
            tracing::debug!("could not resolve pod template for {}/{}", obj.kind, obj.name);
            continue;
        };

        total = total.add(calculate_pod_resources(&template, missing));
    }

    total
}

fn resolve_missing(kind: WorkloadKind, workload: &WorkloadController) -> Option<(PodTemplateSpec, i32)> {
    match kind {
        WorkloadKind::ReplicaSet | WorkloadKind::StatefulSet => {
            let missing = workload.spec.replicas - workload.status.replicas;
            Some((workload.spec.template.clone(), missing))
        },
        WorkloadKind::Job => Some((workload.spec.template.clone(), 1)),
        WorkloadKind::ReplicationController => {
            let missing = workload.spec.replicas - workload.status.replicas;
            Some((workload.spec.template.clone(), missing))
        },
        WorkloadKind::Challenge => unreachable!("handled before lookup"),
    }
}

fn challenge_template() -> PodTemplateSpec {
    PodTemplateSpec {
        spec: resources::objects::workload::PodSpec {
            containers: vec![Container {
                name: "challenge".into(),
                resources: ResourceRequirements {
                    requests: ResourceList {
                        cpu: Some("10m".into()),
                        memory: Some("64Mi".into()),
                    },
                    limits: ResourceList {
                        cpu: Some("100m".into()),
                        memory: Some("64Mi".into()),
                    },
                },
            }],
        },
    }
}

/// Sums required headroom across a template's containers, multiplied by
/// the number of missing replicas. Returns the zero value when `missing <= 0`.
pub fn calculate_pod_resources(template: &PodTemplateSpec, missing: i32) -> Resources {
    if missing <= 0 {
        return Resources::default();
    }

    let mut per_replica = Resources::default();
    for container in &template.spec.containers {
        let mut cpu_req = container
            .resources
            .requests
            .cpu
            .as_deref()
            .map(parse_milli)
            .unwrap_or(0);
        let mut mem_req = container
            .resources
            .requests
            .memory
            .as_deref()
            .map(parse_mega)
            .unwrap_or(0);

        if let Some(limit_mem) = container.resources.limits.memory.as_deref() {
            mem_req = parse_mega(limit_mem);
        }
        if let Some(limit_cpu) = container.resources.limits.cpu.as_deref() {
            cpu_req = get_normalized_used_cpu(cpu_req, parse_milli(limit_cpu));
        }

        per_replica = per_replica.add(Resources::new(cpu_req, mem_req, 0));
    }

    Resources::new(
        per_replica.cpu * missing as i64,
        per_replica.memory * missing as i64,
        0,
    )
}

/// Bills a container's CPU as `max(request, limit / RATIO)`: a limit more
/// than 10x its request effectively consumes more quota than the request
/// alone implies.
pub fn get_normalized_used_cpu(request_milli: i64, limit_milli: i64) -> i64 {
    let ratioed = limit_milli / RATIO;
    ratioed.max(request_milli)
}
