use crate::milestone::Milestone;
use crate::policy::{MetricPolicy, PolicyError, PolicyVersion};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SIGNER_POWER_FIELD: &str = "total-power-of-signers";
pub const DEFAULT_COMMIT_POWER_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Commit power threshold must be within (0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("Signer power field name is empty")]
    EmptySignerPowerField,

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Engine configuration. Every field has a default so partial config files work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Metric ordering policy version.
    pub policy: PolicyVersion,

    /// Sequence used when `policy` is `custom`.
    pub custom_sequence: Vec<Milestone>,

    /// Fold every reported interval into a running mean.
    pub averages: bool,

    /// Field of a commit vote carrying the fraction of signing power.
    pub signer_power_field: String,

    /// Signing power strictly above this fraction records `95%-committed`.
    pub commit_power_threshold: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        TimelineConfig {
            policy: PolicyVersion::default(),
            custom_sequence: Vec::new(),
            averages: false,
            signer_power_field: DEFAULT_SIGNER_POWER_FIELD.to_string(),
            commit_power_threshold: DEFAULT_COMMIT_POWER_THRESHOLD,
        }
    }
}

impl TimelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.commit_power_threshold > 0.0 && self.commit_power_threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(self.commit_power_threshold));
        }
        if self.signer_power_field.trim().is_empty() {
            return Err(ConfigError::EmptySignerPowerField);
        }
        self.metric_policy()?;
        Ok(())
    }

    pub fn metric_policy(&self) -> Result<MetricPolicy, PolicyError> {
        match self.policy {
            PolicyVersion::Custom => MetricPolicy::custom(self.custom_sequence.clone()),
            version => Ok(MetricPolicy::builtin(version)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TimelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.metric_policy().unwrap(), MetricPolicy::default());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TimelineConfig =
            serde_json::from_str(r#"{"policy":"extended","averages":true}"#).unwrap();
        assert_eq!(config.policy, PolicyVersion::Extended);
        assert!(config.averages);
        assert_eq!(config.signer_power_field, DEFAULT_SIGNER_POWER_FIELD);
    }

    #[test]
    fn test_threshold_bounds() {
        let mut config = TimelineConfig::default();
        config.commit_power_threshold = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidThreshold(0.0)));
        config.commit_power_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_policy_requires_sequence() {
        let mut config = TimelineConfig {
            policy: PolicyVersion::Custom,
            ..TimelineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Policy(PolicyError::Empty)));

        config.custom_sequence = vec![Milestone::SentAnnounce, Milestone::SentPrepare];
        assert_eq!(config.metric_policy().unwrap().len(), 2);
    }
}
