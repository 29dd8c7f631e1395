use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Metadata;

/// The pod template carried by a workload controller's spec. Only the
/// fields the attribution subsystem reads are modeled.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct PodTemplateSpec {
    #[serde(default)]
    pub spec: PodSpec,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Container {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: ResourceList,
    #[serde(default)]
    pub limits: ResourceList,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ResourceList {
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
}

/// The subset of fields common to ReplicaSet/StatefulSet/Job/ReplicationController
/// that event attribution needs: how many replicas the controller wants versus
/// has, and the pod template it's trying to create.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct WorkloadController {
    pub metadata: Metadata,
    pub spec: WorkloadSpec,
    #[serde(default)]
    pub status: WorkloadStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct WorkloadSpec {
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub template: PodTemplateSpec,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct WorkloadStatus {
    #[serde(default)]
    pub replicas: i32,
}

/// The workload kinds an Event's `involved_object.kind` may name. `Challenge`
/// has no pod template of its own; it is attributed a fixed synthetic
/// single-container request by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    ReplicaSet,
    StatefulSet,
    Job,
    ReplicationController,
    Challenge,
}

impl WorkloadKind {
    pub fn from_kind_str(kind: &str) -> Option<Self> {
        match kind {
            "ReplicaSet" => Some(Self::ReplicaSet),
            "StatefulSet" => Some(Self::StatefulSet),
            "Job" => Some(Self::Job),
            "ReplicationController" => Some(Self::ReplicationController),
            "Challenge" => Some(Self::Challenge),
            _ => None,
        }
    }
}

pub type WorkloadStore = HashMap<String, WorkloadController>;
