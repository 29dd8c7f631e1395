use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::quantity::{parse_giga, parse_mega, parse_milli};

use super::{Metadata, Object};

/// A namespace's ResourceQuota: hard limits plus the api-server's live
/// tally of what's currently used against them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ResourceQuota {
    pub metadata: Metadata,
    pub spec: ResourceQuotaSpec,
    #[serde(default)]
    pub status: ResourceQuotaStatus,
}

impl Object for ResourceQuota {
    fn kind(&self) -> &'static str {
        "ResourceQuota"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ResourceQuotaSpec {
    #[serde(default)]
    pub hard: QuotaResourceList,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ResourceQuotaStatus {
    #[serde(default)]
    pub hard: QuotaResourceList,
    #[serde(default)]
    pub used: QuotaResourceList,
}

pub type QuotaResourceList = HashMap<QuotaResourceName, String>;

/// A quota-trackable resource name. Serializes to the same dotted strings
/// the api-server uses so a `QuotaResourceList` round-trips as the wire
/// format's `map[string]resource.Quantity`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaResourceName {
    #[serde(rename = "cpu")]
    Cpu,
    #[serde(rename = "memory")]
    Memory,
    #[serde(rename = "limits.cpu")]
    LimitsCpu,
    #[serde(rename = "limits.memory")]
    LimitsMemory,
    #[serde(rename = "requests.cpu")]
    RequestsCpu,
    #[serde(rename = "requests.memory")]
    RequestsMemory,
    #[serde(rename = "requests.storage")]
    RequestsStorage,
}

impl ResourceQuotaStatus {
    /// Used CPU, millicores. Always reads the plain `cpu` key: the
    /// limits-based adjustment is applied separately, via the explicit
    /// `GetNormalizedUsedCpu` ratio formula against `limits.cpu`, not by
    /// preferring it here.
    pub fn used_cpu_milli(&self) -> i64 {
        self.used
            .get(&QuotaResourceName::Cpu)
            .map(|q| parse_milli(q))
            .unwrap_or(0)
    }

    /// Used memory, megabytes. Prefers `limits.memory` over `memory`/`requests.memory`.
    pub fn used_memory_mega(&self) -> i64 {
        self.used
            .get(&QuotaResourceName::LimitsMemory)
            .or_else(|| self.used.get(&QuotaResourceName::Memory))
            .or_else(|| self.used.get(&QuotaResourceName::RequestsMemory))
            .map(|q| parse_mega(q))
            .unwrap_or(0)
    }

    pub fn used_storage_giga(&self) -> i64 {
        self.used
            .get(&QuotaResourceName::RequestsStorage)
            .map(|q| parse_giga(q))
            .unwrap_or(0)
    }
}

impl ResourceQuotaSpec {
    /// `currentMaximum` for cpu: always the plain `cpu` hard value, never
    /// `limits.cpu` — the limits preference is a `used`-side memory-only
    /// concern, not a hard-reading one.
    pub fn hard_cpu_milli(&self) -> i64 {
        self.hard
            .get(&QuotaResourceName::Cpu)
            .map(|q| parse_milli(q))
            .unwrap_or(0)
    }

    /// `currentMaximum` for memory: always the plain `memory` hard value.
    pub fn hard_memory_mega(&self) -> i64 {
        self.hard
            .get(&QuotaResourceName::Memory)
            .map(|q| parse_mega(q))
            .unwrap_or(0)
    }

    pub fn hard_storage_giga(&self) -> i64 {
        self.hard
            .get(&QuotaResourceName::RequestsStorage)
            .map(|q| parse_giga(q))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_cpu_ignores_limits_cpu() {
        let mut used = QuotaResourceList::new();
        used.insert(QuotaResourceName::Cpu, "500m".to_string());
        used.insert(QuotaResourceName::LimitsCpu, "1200m".to_string());
        let status = ResourceQuotaStatus {
            used,
            ..Default::default()
        };
        assert_eq!(status.used_cpu_milli(), 500);
    }

    #[test]
    fn hard_cpu_ignores_limits_cpu() {
        let mut hard = QuotaResourceList::new();
        hard.insert(QuotaResourceName::Cpu, "1000m".to_string());
        hard.insert(QuotaResourceName::LimitsCpu, "10000m".to_string());
        let spec = ResourceQuotaSpec { hard };
        assert_eq!(spec.hard_cpu_milli(), 1000);
    }

    #[test]
    fn falls_back_when_limit_absent() {
        let mut used = QuotaResourceList::new();
        used.insert(QuotaResourceName::Memory, "256Mi".to_string());
        let status = ResourceQuotaStatus {
            used,
            ..Default::default()
        };
        assert_eq!(status.used_memory_mega(), 268);
    }
}
