use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

pub mod event;
pub mod object_reference;
pub mod quota_autoscaler;
pub mod resource_quota;
pub mod workload;

/// Common behavior of a cluster kind, mirrored on every object in this crate
/// so informers and watch loops can log and key on it generically.
pub trait Object {
    fn kind(&self) -> &'static str;
    fn name(&self) -> &String;
}

/// A label selector / label set, matched the way the api-server matches
/// Service and ReplicaSet selectors: every key in `self` must be present in
/// `other` with an equal value.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Labels(pub HashMap<String, String>);

impl Labels {
    pub fn matches(&self, selector: &Labels) -> bool {
        selector.0.iter().all(|(k, v)| self.0.get(k) == Some(v))
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        write!(f, "{}", pairs.join(","))
    }
}

/// Metadata shared by every namespaced kind the controller reads or writes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uid: Option<uuid::Uuid>,
    #[serde(default)]
    pub labels: Labels,
}
