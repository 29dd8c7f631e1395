use resources::objects::quota_autoscaler::{QuotaScalePolicy, ScaleMethod};
use resources::objects::resource_quota::ResourceQuota;
use resources::resources_algebra::Resources;

use crate::validated_scaler::ValidatedScaler;

/// Which direction a policy is being evaluated for. Scale-up and scale-down
/// policies use the same projection and activation math with opposite
/// comparisons and opposite quota-limit/step selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ScaleUp,
    ScaleDown,
}

/// One policy projected against the current quota state, ready to be
/// activated for its axis and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivePolicy {
    pub is_cpu: bool,
    pub current_maximum: i64,
    pub current_usage_percentage: i64,
    pub policy_threshold: i64,
    pub quota_limit: i64,
    pub minimal_step: i64,
    pub maximum_step: i64,
    pub used: i64,
}

pub fn to_active_policy(
    direction: Direction,
    policy: &QuotaScalePolicy,
    quota: &ResourceQuota,
    scaler: &ValidatedScaler,
) -> ActivePolicy {
    let is_cpu = policy.method == ScaleMethod::Cpu;

    let current_maximum = if is_cpu {
        quota.spec.hard_cpu_milli()
    } else {
        quota.spec.hard_memory_mega()
    };
    let used = if is_cpu {
        quota.status.used_cpu_milli()
    } else {
        quota.status.used_memory_mega()
    };
    let current_usage_percentage = if current_maximum != 0 {
        (used as f64 / current_maximum as f64 * 100.0).floor() as i64
    } else {
        0
    };

    let (quota_limit, minimal_step, maximum_step) = match (is_cpu, direction) {
        (true, Direction::ScaleUp) => (scaler.max_cpu, scaler.min_cpu_step, scaler.max_cpu_step),
        (true, Direction::ScaleDown) => (scaler.min_cpu, scaler.min_cpu_step, scaler.max_cpu_step),
        (false, Direction::ScaleUp) => (
            scaler.max_memory,
            scaler.min_memory_step,
            scaler.max_memory_step,
        ),
        (false, Direction::ScaleDown) => (
            scaler.min_memory,
            scaler.min_memory_step,
            scaler.max_memory_step,
        ),
    };

    ActivePolicy {
        is_cpu,
        current_maximum,
        current_usage_percentage,
        policy_threshold: policy.value as i64,
        quota_limit,
        minimal_step,
        maximum_step,
        used,
    }
}

/// Decides whether a projected policy fires for its direction, returning the
/// axis value it proposes. `0` means inactive.
pub fn activate_policy(policy: &ActivePolicy, direction: Direction) -> i64 {
    if policy.policy_threshold == 100 {
        // Event-driven sentinel: never scales up from usage alone.
        return match direction {
            Direction::ScaleUp => 0,
            Direction::ScaleDown => {
                if policy.used != policy.current_maximum {
                    policy.used.max(policy.quota_limit)
                } else {
                    0
                }
            },
        };
    }

    match direction {
        Direction::ScaleUp => {
            if policy.current_usage_percentage <= policy.policy_threshold {
                return 0;
            }
            let desired = ratio_target(policy);
            let lower = policy.current_maximum + policy.minimal_step;
            let upper = policy
                .quota_limit
                .min(policy.current_maximum + policy.maximum_step);
            desired.max(lower).min(upper)
        },
        Direction::ScaleDown => {
            if policy.current_usage_percentage >= policy.policy_threshold {
                return 0;
            }
            let desired = ratio_target(policy);
            let upper = policy.current_maximum - policy.minimal_step;
            let lower = policy
                .quota_limit
                .max(policy.current_maximum - policy.maximum_step);
            desired.min(upper).max(lower)
        },
    }
}

/// Mirrors the original's two-step truncation: `CurrentUsagePercentage` is
/// already floored to an int64 before this divides by the threshold, so the
/// result is not the same as computing straight off the raw `used` value.
fn ratio_target(policy: &ActivePolicy) -> i64 {
    if policy.policy_threshold == 0 {
        return policy.current_maximum;
    }
    policy.current_usage_percentage * policy.current_maximum / policy.policy_threshold
}

/// Writes an activated policy's axis value into `target` using `Replace`
/// semantics: later writes on the same axis override earlier ones, and
/// writing `0` (inactive) leaves the axis untouched.
fn apply_policy(
    target: Resources,
    policy: &ActivePolicy,
    direction: Direction,
) -> Resources {
    let value = activate_policy(policy, direction);
    if value == 0 {
        return target;
    }
    let contribution = if policy.is_cpu {
        Resources::new(value, 0, 0)
    } else {
        Resources::new(0, value, 0)
    };
    target.replace(contribution)
}

/// Runs every scale-down policy then every scale-up policy against `quota`,
/// folding the results with `Replace` (last writer wins), matching the
/// upstream ordering in `UpdateQuotaIfRequired`.
pub fn compute_policy_desired(
    quota: &ResourceQuota,
    scaler: &ValidatedScaler,
    scale_down_policies: &[QuotaScalePolicy],
    scale_up_policies: &[QuotaScalePolicy],
) -> Resources {
    let mut desired = Resources::default();
    for policy in scale_down_policies {
        let active = to_active_policy(Direction::ScaleDown, policy, quota, scaler);
        desired = apply_policy(desired, &active, Direction::ScaleDown);
    }
    for policy in scale_up_policies {
        let active = to_active_policy(Direction::ScaleUp, policy, quota, scaler);
        desired = apply_policy(desired, &active, Direction::ScaleUp);
    }
    desired
}

/// Clamps a computed desired value against the scaler's bounds: raise to
/// `min`, then cap at `max`. Storage is left untouched by the caller.
pub fn clamp_to_scaler(desired: Resources, scaler: &ValidatedScaler) -> Resources {
    let min = Resources::new(scaler.min_cpu, scaler.min_memory, 0);
    let max = Resources::new(scaler.max_cpu, scaler.max_memory, i64::MAX);
    desired.max(min).limit(max)
}
