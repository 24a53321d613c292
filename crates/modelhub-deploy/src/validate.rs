//! Field constraints for deployment configuration.

use crate::error::{HubError, HubResult};
use crate::types::{AutoscalePolicy, DeploymentRecord, DeploymentSpec, ResourceLimits};

const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;
const CPU_RANGE: (f64, f64) = (0.1, 8.0);
const MEMORY_RANGE_MB: (u32, u32) = (128, 8192);
const MAX_REPLICAS_RANGE: (u32, u32) = (1, 10);
const MIN_REPLICAS_RANGE: (u32, u32) = (1, 5);

/// Validate a creation request.
pub fn spec(spec: &DeploymentSpec) -> HubResult<()> {
    config(
        &spec.name,
        spec.description.as_deref(),
        &spec.resources,
        &spec.autoscale,
        &spec.health_check_path,
    )
}

/// Validate a record after a patch has been merged into it.
pub fn record(record: &DeploymentRecord) -> HubResult<()> {
    config(
        &record.name,
        record.description.as_deref(),
        &record.resources,
        &record.autoscale,
        &record.health_check_path,
    )
}

fn config(
    name: &str,
    description: Option<&str>,
    resources: &ResourceLimits,
    autoscale: &AutoscalePolicy,
    health_check_path: &str,
) -> HubResult<()> {
    let name_len = name.trim().chars().count();
    if name_len == 0 || name.chars().count() > MAX_NAME_LEN {
        return Err(HubError::validation(format!(
            "name must be 1-{MAX_NAME_LEN} characters"
        )));
    }

    if description.is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN) {
        return Err(HubError::validation(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }

    if !(CPU_RANGE.0..=CPU_RANGE.1).contains(&resources.cpu_cores) {
        return Err(HubError::validation(format!(
            "cpu_cores must be between {} and {}",
            CPU_RANGE.0, CPU_RANGE.1
        )));
    }

    within("memory_mb", resources.memory_mb, MEMORY_RANGE_MB)?;
    within("max_replicas", resources.max_replicas, MAX_REPLICAS_RANGE)?;
    within("min_replicas", resources.min_replicas, MIN_REPLICAS_RANGE)?;

    if resources.min_replicas > resources.max_replicas {
        return Err(HubError::validation(
            "min_replicas must not exceed max_replicas",
        ));
    }

    for (field, value) in [
        ("scale_up_threshold", autoscale.scale_up_threshold),
        ("scale_down_threshold", autoscale.scale_down_threshold),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(HubError::validation(format!(
                "{field} must be between 0 and 100"
            )));
        }
    }

    if autoscale.scale_down_threshold >= autoscale.scale_up_threshold {
        return Err(HubError::validation(
            "scale_down_threshold must be below scale_up_threshold",
        ));
    }

    if !health_check_path.starts_with('/') {
        return Err(HubError::validation(
            "health_check_path must start with '/'",
        ));
    }

    Ok(())
}

fn within(field: &str, value: u32, (min, max): (u32, u32)) -> HubResult<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(HubError::validation(format!(
            "{field} must be between {min} and {max}"
        )))
    }
}
