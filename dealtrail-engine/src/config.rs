//! Engine tuning loaded from JSON, with every field defaulted.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    CHECKIN_POINTS, DEFAULT_MAX_DISTANCE_MILES, DEFAULT_MAX_STOPS, DWELL_MINUTES_PER_STOP,
    JOURNEY_HISTORY_LIMIT, JOURNEY_LEASE_HOURS, MAX_STOPS_CEILING, MILESTONE_COUNT,
    MILESTONE_POINTS, MIN_QR_COMPLIANCE, MINUTES_PER_MILE, QR_SKIPPED_POINTS,
};

/// Errors raised when configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be at least {min} (got {value})")]
    MinViolation {
        field: &'static str,
        min: f64,
        value: f64,
    },
    #[error("{field} must be between {min} and {max} (got {value})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("default stop count {default} exceeds ceiling {ceiling}")]
    DefaultStopsAboveCeiling { default: usize, ceiling: usize },
    #[error("config is not valid JSON: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "PlannerConfig::default_max_stops")]
    pub default_max_stops: usize,
    #[serde(default = "PlannerConfig::default_max_stops_ceiling")]
    pub max_stops_ceiling: usize,
    #[serde(default = "PlannerConfig::default_max_distance_miles")]
    pub default_max_distance_miles: f64,
    #[serde(default = "PlannerConfig::default_minutes_per_mile")]
    pub minutes_per_mile: f64,
    #[serde(default = "PlannerConfig::default_dwell_minutes_per_stop")]
    pub dwell_minutes_per_stop: f64,
}

impl PlannerConfig {
    const fn default_max_stops() -> usize {
        DEFAULT_MAX_STOPS
    }

    const fn default_max_stops_ceiling() -> usize {
        MAX_STOPS_CEILING
    }

    const fn default_max_distance_miles() -> f64 {
        DEFAULT_MAX_DISTANCE_MILES
    }

    const fn default_minutes_per_mile() -> f64 {
        MINUTES_PER_MILE
    }

    const fn default_dwell_minutes_per_stop() -> f64 {
        DWELL_MINUTES_PER_STOP
    }

    /// Clamp a requested stop count into `1..=max_stops_ceiling`. The ceiling
    /// itself never exceeds the hard cap of 10.
    #[must_use]
    pub fn effective_max_stops(&self, requested: Option<usize>) -> usize {
        let ceiling = self.max_stops_ceiling.clamp(1, MAX_STOPS_CEILING);
        requested.unwrap_or(self.default_max_stops).clamp(1, ceiling)
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_max_stops: Self::default_max_stops(),
            max_stops_ceiling: Self::default_max_stops_ceiling(),
            default_max_distance_miles: Self::default_max_distance_miles(),
            minutes_per_mile: Self::default_minutes_per_mile(),
            dwell_minutes_per_stop: Self::default_dwell_minutes_per_stop(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyConfig {
    #[serde(default = "JourneyConfig::default_lease_hours")]
    pub lease_hours: u32,
    #[serde(default = "JourneyConfig::default_history_limit")]
    pub history_limit: usize,
}

impl JourneyConfig {
    const fn default_lease_hours() -> u32 {
        JOURNEY_LEASE_HOURS
    }

    const fn default_history_limit() -> usize {
        JOURNEY_HISTORY_LIMIT
    }

    #[must_use]
    pub fn lease(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.lease_hours))
    }
}

impl Default for JourneyConfig {
    fn default() -> Self {
        Self {
            lease_hours: Self::default_lease_hours(),
            history_limit: Self::default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    #[serde(default = "RewardConfig::default_checkin_points")]
    pub checkin_points: u32,
    #[serde(default = "RewardConfig::default_qr_skipped_points")]
    pub qr_skipped_points: u32,
    #[serde(default = "RewardConfig::default_milestone_points")]
    pub milestone_points: u32,
    #[serde(default = "RewardConfig::default_milestone_count")]
    pub milestone_count: u32,
    #[serde(default = "RewardConfig::default_min_qr_compliance")]
    pub min_qr_compliance: f64,
}

impl RewardConfig {
    const fn default_checkin_points() -> u32 {
        CHECKIN_POINTS
    }

    const fn default_qr_skipped_points() -> u32 {
        QR_SKIPPED_POINTS
    }

    const fn default_milestone_points() -> u32 {
        MILESTONE_POINTS
    }

    const fn default_milestone_count() -> u32 {
        MILESTONE_COUNT
    }

    const fn default_min_qr_compliance() -> f64 {
        MIN_QR_COMPLIANCE
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            checkin_points: Self::default_checkin_points(),
            qr_skipped_points: Self::default_qr_skipped_points(),
            milestone_points: Self::default_milestone_points(),
            milestone_count: Self::default_milestone_count(),
            min_qr_compliance: Self::default_min_qr_compliance(),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub journey: JourneyConfig,
    #[serde(default)]
    pub rewards: RewardConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON config; missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let planner = &self.planner;
        if !(1..=MAX_STOPS_CEILING).contains(&planner.max_stops_ceiling) {
            return Err(ConfigError::RangeViolation {
                field: "planner.max_stops_ceiling",
                min: 1.0,
                max: count(MAX_STOPS_CEILING),
                value: count(planner.max_stops_ceiling),
            });
        }
        ensure_min("planner.default_max_stops", count(planner.default_max_stops), 1.0)?;
        if planner.default_max_stops > planner.max_stops_ceiling {
            return Err(ConfigError::DefaultStopsAboveCeiling {
                default: planner.default_max_stops,
                ceiling: planner.max_stops_ceiling,
            });
        }
        let distance = planner.default_max_distance_miles;
        if distance.is_nan() || distance <= 0.0 {
            return Err(ConfigError::MinViolation {
                field: "planner.default_max_distance_miles",
                min: f64::MIN_POSITIVE,
                value: planner.default_max_distance_miles,
            });
        }
        ensure_min("planner.minutes_per_mile", planner.minutes_per_mile, 0.0)?;
        ensure_min(
            "planner.dwell_minutes_per_stop",
            planner.dwell_minutes_per_stop,
            0.0,
        )?;
        ensure_min(
            "journey.lease_hours",
            f64::from(self.journey.lease_hours),
            1.0,
        )?;
        ensure_min(
            "journey.history_limit",
            count(self.journey.history_limit),
            1.0,
        )?;
        ensure_min(
            "rewards.milestone_count",
            f64::from(self.rewards.milestone_count),
            1.0,
        )?;
        let compliance = self.rewards.min_qr_compliance;
        if !(0.0..=1.0).contains(&compliance) {
            return Err(ConfigError::RangeViolation {
                field: "rewards.min_qr_compliance",
                min: 0.0,
                max: 1.0,
                value: compliance,
            });
        }
        Ok(())
    }
}

fn count(value: usize) -> f64 {
    crate::numbers::usize_to_f64(value)
}

fn ensure_min(field: &'static str, value: f64, min: f64) -> Result<(), ConfigError> {
    if value.is_nan() || value < min {
        return Err(ConfigError::MinViolation { field, min, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_documented_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.planner.default_max_stops, 5);
        assert_eq!(config.planner.max_stops_ceiling, 10);
        assert_eq!(config.journey.lease_hours, 24);
        assert_eq!(config.journey.history_limit, 20);
        assert_eq!(config.rewards.checkin_points, 10);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config =
            EngineConfig::from_json(r#"{ "planner": { "default_max_distance_miles": 50 } }"#)
                .unwrap();
        assert!((config.planner.default_max_distance_miles - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.planner.default_max_stops, 5);
    }

    #[test]
    fn effective_stops_clamp_to_ceiling() {
        let planner = PlannerConfig::default();
        assert_eq!(planner.effective_max_stops(None), 5);
        assert_eq!(planner.effective_max_stops(Some(0)), 1);
        assert_eq!(planner.effective_max_stops(Some(25)), 10);
    }

    #[test]
    fn stop_ceiling_cannot_be_raised_past_hard_cap() {
        assert!(matches!(
            EngineConfig::from_json(r#"{ "planner": { "max_stops_ceiling": 50 } }"#),
            Err(ConfigError::RangeViolation { field: "planner.max_stops_ceiling", .. })
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "planner": { "max_stops_ceiling": 0 } }"#),
            Err(ConfigError::RangeViolation { field: "planner.max_stops_ceiling", .. })
        ));

        let planner = PlannerConfig {
            max_stops_ceiling: 50,
            ..PlannerConfig::default()
        };
        assert_eq!(planner.effective_max_stops(Some(15)), 10);
        let small = PlannerConfig {
            max_stops_ceiling: 3,
            default_max_stops: 2,
            ..PlannerConfig::default()
        };
        assert_eq!(small.effective_max_stops(Some(15)), 3);
    }

    #[test]
    fn validation_rejects_impossible_values() {
        let mut config = EngineConfig::default();
        config.planner.default_max_stops = 12;
        assert_eq!(
            config.validate(),
            Err(ConfigError::DefaultStopsAboveCeiling {
                default: 12,
                ceiling: 10
            })
        );

        let mut config = EngineConfig::default();
        config.rewards.min_qr_compliance = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RangeViolation { field: "rewards.min_qr_compliance", .. })
        ));

        let mut config = EngineConfig::default();
        config.journey.lease_hours = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MinViolation { field: "journey.lease_hours", .. })
        ));

        assert!(matches!(
            EngineConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
