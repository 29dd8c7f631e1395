use serde::{de, Deserialize, Deserializer, Serialize};

use super::{Metadata, Object};

/// QuotaAutoscaler binds a target ResourceQuota to min/max bounds, per-step
/// bounds, and scale-up/scale-down policies. At most one exists per
/// namespace.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QuotaAutoscaler {
    pub metadata: Metadata,
    pub spec: QuotaAutoscalerSpec,
}

impl Object for QuotaAutoscaler {
    fn kind(&self) -> &'static str {
        "QuotaAutoscaler"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaAutoscalerSpec {
    /// Name of the ResourceQuota this autoscaler resizes.
    pub resource_quota: String,

    #[serde(default)]
    pub min_cpu: Option<String>,
    #[serde(default)]
    pub max_cpu: Option<String>,
    #[serde(default)]
    pub min_cpu_step: Option<String>,
    #[serde(default)]
    pub max_cpu_step: Option<String>,

    #[serde(default)]
    pub min_memory: Option<String>,
    #[serde(default)]
    pub max_memory: Option<String>,
    #[serde(default)]
    pub min_memory_step: Option<String>,
    #[serde(default)]
    pub max_memory_step: Option<String>,

    #[serde(default)]
    pub behavior: QuotaAutoscalerBehavior,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuotaAutoscalerBehavior {
    #[serde(default)]
    pub scale_up: QuotaScaleBehavior,
    #[serde(default)]
    pub scale_down: QuotaScaleBehavior,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct QuotaScaleBehavior {
    #[serde(default)]
    pub policies: Vec<QuotaScalePolicy>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QuotaScalePolicy {
    pub method: ScaleMethod,
    /// Percent threshold, 0-100. 100 is the sentinel meaning "event-driven only".
    pub value: u8,
    /// Unused by the core decision subsystem; carried for forward compatibility.
    #[serde(default)]
    pub period_minutes: u32,
}

/// Which axis a [`QuotaScalePolicy`] scales. Parsed case-insensitively from
/// the wire string, matching the Go source's `strings.ToLower(policy.Method)`.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMethod {
    Cpu,
    Memory,
}

impl<'de> Deserialize<'de> for ScaleMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.to_lowercase().as_str() {
            "cpu" => Ok(ScaleMethod::Cpu),
            "memory" => Ok(ScaleMethod::Memory),
            other => Err(de::Error::custom(format!("unknown scale method: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_method_parses_case_insensitively() {
        let policy: QuotaScalePolicy =
            serde_json::from_str(r#"{"method":"CPU","value":80}"#).unwrap();
        assert_eq!(policy.method, ScaleMethod::Cpu);
        let policy: QuotaScalePolicy =
            serde_json::from_str(r#"{"method":"Memory","value":80}"#).unwrap();
        assert_eq!(policy.method, ScaleMethod::Memory);
    }
}
