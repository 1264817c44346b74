//! Per-run measurement context loaded from environment variables.

use std::path::PathBuf;

use chrono::NaiveDate;

use kneeflex_core::measurement::MeasurementKind;
use kneeflex_core::types::{InjuryTag, Side};
use kneeflex_estimation::config::ConfigError;

/// Context attached to every capture run.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub injured_side: Option<Side>,
    pub injury_context: Option<InjuryTag>,
    pub measurement_kind: MeasurementKind,
    /// Used to stamp the post-op week on saved records.
    pub surgery_date: Option<NaiveDate>,
    /// JSON-lines file records are appended to; nothing is saved when unset.
    pub measurements_path: Option<PathBuf>,
}

impl CaptureConfig {
    /// Load capture context from environment variables with defaults.
    ///
    /// | Env Var             | Default   |
    /// |---------------------|-----------|
    /// | `INJURED_SIDE`      | unset     |
    /// | `INJURY_CONTEXT`    | unset     |
    /// | `MEASUREMENT_KIND`  | `flexion` |
    /// | `SURGERY_DATE`      | unset     |
    /// | `MEASUREMENTS_PATH` | unset     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let injured_side = get("INJURED_SIDE")
            .map(|raw| Side::from_name(&raw).map_err(|e| invalid("INJURED_SIDE", raw, e)))
            .transpose()?;

        let injury_context = get("INJURY_CONTEXT")
            .map(|raw| InjuryTag::from_name(&raw).map_err(|e| invalid("INJURY_CONTEXT", raw, e)))
            .transpose()?;

        let measurement_kind = match get("MEASUREMENT_KIND") {
            Some(raw) => MeasurementKind::from_name(&raw)
                .map_err(|e| invalid("MEASUREMENT_KIND", raw, e))?,
            None => MeasurementKind::Flexion,
        };

        let surgery_date = get("SURGERY_DATE")
            .map(|raw| {
                raw.trim()
                    .parse::<NaiveDate>()
                    .map_err(|e| invalid("SURGERY_DATE", raw, e))
            })
            .transpose()?;

        Ok(Self {
            injured_side,
            injury_context,
            measurement_kind,
            surgery_date,
            measurements_path: get("MEASUREMENTS_PATH").map(PathBuf::from),
        })
    }
}

fn invalid(var: &'static str, value: String, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        var,
        value,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<CaptureConfig, ConfigError> {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        CaptureConfig::from_lookup(|key| map.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn empty_environment_gives_flexion_without_context() {
        let config = load(&[]).unwrap();
        assert_eq!(config.injured_side, None);
        assert_eq!(config.injury_context, None);
        assert_eq!(config.measurement_kind, MeasurementKind::Flexion);
        assert_eq!(config.surgery_date, None);
        assert_eq!(config.measurements_path, None);
    }

    #[test]
    fn all_fields_parse() {
        let config = load(&[
            ("INJURED_SIDE", "right"),
            ("INJURY_CONTEXT", "knee_replacement"),
            ("MEASUREMENT_KIND", "Extension"),
            ("SURGERY_DATE", "2026-09-01"),
            ("MEASUREMENTS_PATH", "/tmp/knee/measurements.jsonl"),
        ])
        .unwrap();

        assert_eq!(config.injured_side, Some(Side::Right));
        assert_eq!(config.injury_context, Some(InjuryTag::KneeReplacement));
        assert_eq!(config.measurement_kind, MeasurementKind::Extension);
        assert_eq!(config.surgery_date, NaiveDate::from_ymd_opt(2026, 9, 1));
        assert_eq!(
            config.measurements_path,
            Some(PathBuf::from("/tmp/knee/measurements.jsonl"))
        );
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = load(&[("INJURED_SIDE", "  "), ("SURGERY_DATE", "")]).unwrap();
        assert_eq!(config.injured_side, None);
        assert_eq!(config.surgery_date, None);
    }

    #[test]
    fn unknown_injury_tag_lists_valid_options() {
        let err = load(&[("INJURY_CONTEXT", "broken_toe")]).unwrap_err();
        assert_matches!(err, ConfigError::Invalid { var: "INJURY_CONTEXT", .. });
        assert!(err.to_string().contains("acl_reconstruction"));
    }

    #[test]
    fn bad_side_and_date_rejected() {
        assert_matches!(
            load(&[("INJURED_SIDE", "middle")]),
            Err(ConfigError::Invalid { var: "INJURED_SIDE", .. })
        );
        assert_matches!(
            load(&[("SURGERY_DATE", "01/09/2026")]),
            Err(ConfigError::Invalid { var: "SURGERY_DATE", .. })
        );
    }
}
