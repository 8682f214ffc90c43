use std::fs::read_to_string;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ctxrs_annotation::AnnotationFilter;

use crate::differential::DifferentialParams;
use crate::error::EnrichmentError;
use crate::recovery::RecoveryParams;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] EnrichmentError),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Settings of a run that are not engine parameters.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Minimum share of either interval a peak must overlap to map onto a
    /// database region.
    pub fraction_overlap: f64,
    /// Worker threads; all cores when unset.
    pub threads: Option<usize>,
    /// Abort after this many seconds.
    pub timeout_secs: Option<u64>,
    /// Fail a region set that has regions outside the database instead of
    /// dropping them.
    pub abort_on_missing_region: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            fraction_overlap: 0.4,
            threads: None,
            timeout_secs: None,
            abort_on_missing_region: false,
        }
    }
}

///
/// Configuration file of an enrichment run.
///
/// ```toml
/// [recovery]
/// nes_threshold = 3.0
/// leading_edge = "background-corrected"
///
/// [differential]
/// target_cutoff = "youden"
///
/// [annotation]
/// tiers = ["direct", "orthology"]
///
/// [run]
/// fraction_overlap = 0.4
/// ```
///
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub recovery: RecoveryParams,
    pub differential: DifferentialParams,
    pub annotation: AnnotationFilter,
    pub run: RunConfig,
}

impl EnrichmentConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.recovery.validate()?;
        self.differential.validate()?;
        if !(self.run.fraction_overlap > 0.0 && self.run.fraction_overlap <= 1.0) {
            return Err(EnrichmentError::InvalidParameter(format!(
                "fraction_overlap must be in (0, 1], got {}",
                self.run.fraction_overlap
            ))
            .into());
        }
        Ok(())
    }
}

impl TryFrom<&Path> for EnrichmentConfig {
    type Error = ConfigError;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        let toml_str = read_to_string(path)?;
        let config: EnrichmentConfig = toml::from_str(&toml_str)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::differential::TargetCutoff;
    use crate::recovery::LeadingEdge;
    use ctxrs_annotation::ConfidenceTier;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::path::PathBuf;

    #[rstest]
    fn test_try_from_toml() {
        let path = PathBuf::from("../tests/data/config/enrichment.toml");
        let config = EnrichmentConfig::try_from(path.as_path()).unwrap();

        assert_eq!(config.recovery.nes_threshold, 2.5);
        assert_eq!(config.recovery.rank_threshold, 5000);
        assert_eq!(config.recovery.leading_edge, LeadingEdge::BackgroundCorrected);
        // unset fields keep their defaults
        assert_eq!(config.recovery.auc_threshold, 0.005);
        assert_eq!(config.differential.target_cutoff, TargetCutoff::Youden);
        assert_eq!(
            config.annotation.tiers,
            vec![ConfidenceTier::Direct, ConfidenceTier::Orthology]
        );
        assert_eq!(config.run.threads, Some(2));
        assert_eq!(config.run.fraction_overlap, 0.4);
    }

    #[rstest]
    fn test_empty_config_is_default() {
        let config: EnrichmentConfig = toml::from_str("").unwrap();
        assert_eq!(config, EnrichmentConfig::default());
        assert_eq!(config.recovery.nes_threshold, 3.0);
        assert_eq!(config.annotation.motif_similarity_fdr, 0.001);
    }

    #[rstest]
    fn test_percentile_cutoff_table() {
        let config: EnrichmentConfig =
            toml::from_str("[differential]\ntarget_cutoff = { background-percentile = 0.9 }\n")
                .unwrap();
        assert_eq!(
            config.differential.target_cutoff,
            TargetCutoff::BackgroundPercentile(0.9)
        );
    }

    #[rstest]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[recovery]\nauc_threshold = 0.0\n").unwrap();

        let err = EnrichmentConfig::try_from(path.as_path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
