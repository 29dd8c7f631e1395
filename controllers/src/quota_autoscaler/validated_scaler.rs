use resources::objects::quota_autoscaler::QuotaAutoscalerSpec;
use resources::quantity::{parse_quantity_with_default, QuantityKind};

/// Hard-coded ceilings no scaler may exceed, regardless of what it requests.
pub const DEFAULT_MAX_CPU: i64 = 35_000;
pub const DEFAULT_MAX_MEMORY: i64 = 150_000;

/// The numeric, fully-defaulted form of a [`QuotaAutoscalerSpec`]. All cpu
/// fields are millicores, all memory fields are megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedScaler {
    pub min_cpu: i64,
    pub max_cpu: i64,
    pub min_cpu_step: i64,
    pub max_cpu_step: i64,
    pub min_memory: i64,
    pub max_memory: i64,
    pub min_memory_step: i64,
    pub max_memory_step: i64,
}

/// Parses a scaler spec into numeric form, substituting defaults for any
/// field that is absent or fails to parse. Never errors: a malformed field
/// is logged and defaulted rather than rejecting the whole scaler.
pub fn validate_scaler(spec: &QuotaAutoscalerSpec) -> ValidatedScaler {
    let min_cpu = parse_field(spec.min_cpu.as_deref(), QuantityKind::Milli, 400);
    let max_cpu = parse_field(spec.max_cpu.as_deref(), QuantityKind::Milli, DEFAULT_MAX_CPU);
    let min_cpu_step = parse_field(spec.min_cpu_step.as_deref(), QuantityKind::Milli, 10);
    // Mirrors the upstream ValidateScaler: MaxCpuStep is seeded from the
    // MinCpuStep spec field, not MaxCpuStep, when unset.
    let max_cpu_step = parse_field(
        spec.max_cpu_step.as_deref().or(spec.min_cpu_step.as_deref()),
        QuantityKind::Milli,
        DEFAULT_MAX_CPU,
    );

    let min_memory = parse_field(spec.min_memory.as_deref(), QuantityKind::Mega, 1_000);
    let max_memory = parse_field(
        spec.max_memory.as_deref(),
        QuantityKind::Mega,
        DEFAULT_MAX_MEMORY,
    );
    let min_memory_step = parse_field(spec.min_memory_step.as_deref(), QuantityKind::Mega, 10);
    let max_memory_step = parse_field(
        spec.max_memory_step
            .as_deref()
            .or(spec.min_memory_step.as_deref()),
        QuantityKind::Mega,
        DEFAULT_MAX_MEMORY,
    );

    force_limit_to_default_max(ValidatedScaler {
        min_cpu,
        max_cpu,
        min_cpu_step,
        max_cpu_step,
        min_memory,
        max_memory,
        min_memory_step,
        max_memory_step,
    })
}

fn parse_field(raw: Option<&str>, kind: QuantityKind, default: i64) -> i64 {
    match raw {
        Some(raw) if !raw.trim().is_empty() => parse_quantity_with_default(raw, kind, default),
        _ => default,
    }
}

/// Caps `max_cpu`/`max_memory` at the hard-coded defaults; a scaler cannot
/// request a ceiling higher than the system-wide maximum.
fn force_limit_to_default_max(mut scaler: ValidatedScaler) -> ValidatedScaler {
    scaler.max_cpu = scaler.max_cpu.min(DEFAULT_MAX_CPU);
    scaler.max_memory = scaler.max_memory.min(DEFAULT_MAX_MEMORY);
    scaler
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_absent_fields() {
        let spec = QuotaAutoscalerSpec {
            resource_quota: "quota".into(),
            min_cpu: None,
            max_cpu: None,
            min_cpu_step: None,
            max_cpu_step: None,
            min_memory: None,
            max_memory: None,
            min_memory_step: None,
            max_memory_step: None,
            behavior: Default::default(),
        };
        let validated = validate_scaler(&spec);
        assert_eq!(validated.min_cpu, 400);
        assert_eq!(validated.max_cpu, DEFAULT_MAX_CPU);
        assert_eq!(validated.min_cpu_step, 10);
        assert_eq!(validated.max_cpu_step, DEFAULT_MAX_CPU);
        assert_eq!(validated.min_memory, 1_000);
        assert_eq!(validated.max_memory, DEFAULT_MAX_MEMORY);
    }

    #[test]
    fn max_step_falls_back_to_min_step_field() {
        let spec = QuotaAutoscalerSpec {
            resource_quota: "quota".into(),
            min_cpu: None,
            max_cpu: None,
            min_cpu_step: Some("50m".into()),
            max_cpu_step: None,
            min_memory: None,
            max_memory: None,
            min_memory_step: None,
            max_memory_step: None,
            behavior: Default::default(),
        };
        let validated = validate_scaler(&spec);
        assert_eq!(validated.min_cpu_step, 50);
        assert_eq!(validated.max_cpu_step, 50);
    }

    #[test]
    fn force_limit_to_default_max_caps_requested_ceiling() {
        let spec = QuotaAutoscalerSpec {
            resource_quota: "quota".into(),
            min_cpu: None,
            max_cpu: Some("999999m".into()),
            min_cpu_step: None,
            max_cpu_step: None,
            min_memory: None,
            max_memory: Some("999999999M".into()),
            min_memory_step: None,
            max_memory_step: None,
            behavior: Default::default(),
        };
        let validated = validate_scaler(&spec);
        assert_eq!(validated.max_cpu, DEFAULT_MAX_CPU);
        assert_eq!(validated.max_memory, DEFAULT_MAX_MEMORY);
    }
}
