//! Session level planner configuration.

use anyhow::ensure;
use serde::{Deserialize, Serialize};

use crate::error::{OptError, OptResult};
use crate::heuristic::MatchOrder;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Whether table and column names are matched case sensitively.
    pub case_sensitive: bool,
    /// Match order used by heuristic programs that do not set their own.
    pub hep_match_order: MatchOrder,
    /// Max number of iterations of a heuristic program.
    pub hep_max_iter_times: usize,
    pub materializations_enabled: bool,
    pub lattices_enabled: bool,
    /// Row count reported for a subset none of whose members could be estimated.
    pub subset_row_count_default: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            hep_match_order: MatchOrder::TopDown,
            hep_max_iter_times: 1000,
            materializations_enabled: true,
            lattices_enabled: true,
            subset_row_count_default: 1e6,
        }
    }
}

impl PlannerConfig {
    /// Parses a config from json, missing keys take their default values.
    pub fn from_json(json: &str) -> OptResult<Self> {
        let config: PlannerConfig = serde_json::from_str(json)
            .map_err(|e| OptError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OptResult<()> {
        ensure!(
            self.hep_max_iter_times > 0,
            OptError::InvalidConfig("hep_max_iter_times must be positive".to_string())
        );
        ensure!(
            self.subset_row_count_default >= 0.0,
            OptError::InvalidConfig("subset_row_count_default must not be negative".to_string())
        );
        Ok(())
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_hep_max_iter_times(mut self, times: usize) -> Self {
        self.hep_max_iter_times = times;
        self
    }

    pub fn with_hep_match_order(mut self, match_order: MatchOrder) -> Self {
        self.hep_match_order = match_order;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PlannerConfig::from_json(r#"{"case_sensitive": false}"#).unwrap();
        assert!(!config.case_sensitive);
        assert_eq!(1000, config.hep_max_iter_times);
        assert_eq!(MatchOrder::TopDown, config.hep_match_order);
    }

    #[test]
    fn test_match_order_from_json() {
        let config = PlannerConfig::from_json(r#"{"hep_match_order": "BottomUp"}"#).unwrap();
        assert_eq!(MatchOrder::BottomUp, config.hep_match_order);
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let err = PlannerConfig::from_json(r#"{"hep_max_iter_times": 0}"#).unwrap_err();
        assert!(err.to_string().contains("hep_max_iter_times"));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(PlannerConfig::from_json("{not json").is_err());
    }
}
