//! Customer value score and price-tier band selection.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::customer::CustomerProfile;
use crate::domain::product::PriceColumn;

pub const WEIGHT_ACCUMULATION: f64 = 20.72;
pub const WEIGHT_FREQUENCY: f64 = 28.5;
pub const WEIGHT_TENURE: f64 = 16.84;
pub const WEIGHT_BUSINESS_CLASS: f64 = 33.94;
pub const WEIGHT_SUM: f64 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DimensionStats {
    pub mean: f64,
    pub sd: f64,
}

impl DimensionStats {
    fn from_pair(mean: Option<f64>, sd: Option<f64>) -> Option<Self> {
        match (mean, sd) {
            (Some(mean), Some(sd)) if mean.is_finite() && sd.is_finite() => Some(Self { mean, sd }),
            _ => None,
        }
    }

    /// Population mean and standard deviation (ddof = 0), ignoring non-finite samples.
    pub fn from_samples(samples: impl IntoIterator<Item = f64>) -> Option<Self> {
        let values: Vec<f64> = samples.into_iter().filter(|value| value.is_finite()).collect();
        if values.is_empty() {
            return None;
        }
        let count = values.len() as f64;
        let mean = values.iter().sum::<f64>() / count;
        let variance = values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / count;
        Some(Self { mean, sd: variance.sqrt() })
    }

    /// Normal-CDF percentile of `value`, scaled to [0, 100]. Degenerate stats score 0.
    pub fn percentile_score(&self, value: f64) -> f64 {
        if self.sd == 0.0 || !value.is_finite() {
            return 0.0;
        }
        let z = (value - self.mean) / self.sd;
        let percentile = (libm::erf(z / std::f64::consts::SQRT_2) + 1.0) / 2.0;
        let score = percentile * 100.0;
        if score.is_finite() {
            score
        } else {
            0.0
        }
    }
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("could not read normalization stats `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse normalization stats `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("normalization stats file `{0}` contains an empty list")]
    Empty(PathBuf),
    #[error("could not write normalization stats `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

/// Reference distribution per scored dimension; loaded once and shared read-only.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizationStats {
    pub accumulation: Option<DimensionStats>,
    pub frequency: Option<DimensionStats>,
    pub tenure: Option<DimensionStats>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NormalizationStatsFile {
    pub accum_6m_ln_mean: Option<f64>,
    pub accum_6m_ln_sd: Option<f64>,
    pub frequency_mean: Option<f64>,
    pub frequency_sd: Option<f64>,
    pub tenure_mean: Option<f64>,
    pub tenure_sd: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatsDocument {
    List(Vec<NormalizationStatsFile>),
    Single(NormalizationStatsFile),
}

impl NormalizationStats {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.accumulation.is_some() && self.frequency.is_some() && self.tenure.is_some()
    }

    pub fn load(path: &Path) -> Result<Self, StatsError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| StatsError::Read { path: path.to_path_buf(), source })?;
        let document = serde_json::from_str::<StatsDocument>(&raw)
            .map_err(|source| StatsError::Parse { path: path.to_path_buf(), source })?;

        let file = match document {
            StatsDocument::Single(file) => file,
            StatsDocument::List(list) => list
                .into_iter()
                .next()
                .ok_or_else(|| StatsError::Empty(path.to_path_buf()))?,
        };
        Ok(Self::from(file))
    }

    /// Writes the one-element list layout that `load` reads back.
    pub fn write(&self, path: &Path) -> Result<(), StatsError> {
        let file = NormalizationStatsFile {
            accum_6m_ln_mean: self.accumulation.map(|stats| stats.mean),
            accum_6m_ln_sd: self.accumulation.map(|stats| stats.sd),
            frequency_mean: self.frequency.map(|stats| stats.mean),
            frequency_sd: self.frequency.map(|stats| stats.sd),
            tenure_mean: self.tenure.map(|stats| stats.mean),
            tenure_sd: self.tenure.map(|stats| stats.sd),
        };
        let json = serde_json::to_string_pretty(&[file])
            .map_err(|source| StatsError::Parse { path: path.to_path_buf(), source })?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| StatsError::Write { path: path.to_path_buf(), source })?;
        }
        fs::write(path, json).map_err(|source| StatsError::Write { path: path.to_path_buf(), source })
    }

    /// Recomputes the reference distribution from a customer population.
    pub fn from_population(profiles: &[PopulationSample]) -> Self {
        Self {
            accumulation: DimensionStats::from_samples(
                profiles.iter().filter_map(|sample| sample.accum_6m_revenue).map(f64::ln_1p),
            ),
            frequency: DimensionStats::from_samples(
                profiles.iter().filter_map(|sample| sample.purchase_frequency),
            ),
            tenure: DimensionStats::from_samples(
                profiles.iter().filter_map(|sample| sample.tenure_years),
            ),
        }
    }
}

impl From<NormalizationStatsFile> for NormalizationStats {
    fn from(file: NormalizationStatsFile) -> Self {
        Self {
            accumulation: DimensionStats::from_pair(file.accum_6m_ln_mean, file.accum_6m_ln_sd),
            frequency: DimensionStats::from_pair(file.frequency_mean, file.frequency_sd),
            tenure: DimensionStats::from_pair(file.tenure_mean, file.tenure_sd),
        }
    }
}

/// One customer's raw signals, as used to rebuild the normalization file.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PopulationSample {
    pub tenure_years: Option<f64>,
    pub accum_6m_revenue: Option<f64>,
    pub purchase_frequency: Option<f64>,
}

/// Price-tier transition, ordered from retail toward preferential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TierBand {
    #[serde(rename = "R2->R1")]
    R2ToR1,
    #[serde(rename = "R1->W2")]
    R1ToW2,
    #[serde(rename = "W2->W1")]
    W2ToW1,
    #[serde(rename = "W1->P")]
    W1ToP,
    #[serde(rename = "P->P")]
    PToP,
}

impl Default for TierBand {
    fn default() -> Self {
        Self::R2ToR1
    }
}

impl TierBand {
    pub fn label(self) -> &'static str {
        match self {
            Self::R2ToR1 => "R2->R1",
            Self::R1ToW2 => "R1->W2",
            Self::W2ToW1 => "W2->W1",
            Self::W1ToP => "W1->P",
            Self::PToP => "P->P",
        }
    }

    /// (low, high) price columns interpolated between.
    pub fn columns(self) -> (PriceColumn, PriceColumn) {
        match self {
            Self::R2ToR1 => (PriceColumn::R1, PriceColumn::R2),
            Self::R1ToW2 => (PriceColumn::W2, PriceColumn::R1),
            Self::W2ToW1 => (PriceColumn::W1, PriceColumn::W2),
            Self::W1ToP => (PriceColumn::P, PriceColumn::W1),
            Self::PToP => (PriceColumn::P, PriceColumn::P),
        }
    }

    /// Normalizes arrows, dashes and whitespace before matching a label.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .replace('→', "->")
            .replace(['–', '—'], "-")
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        match normalized.as_str() {
            "R2->R1" => Some(Self::R2ToR1),
            "R1->W2" => Some(Self::R1ToW2),
            "W2->W1" => Some(Self::W2ToW1),
            "W1->P" => Some(Self::W1ToP),
            "P->P" => Some(Self::PToP),
            _ => None,
        }
    }

    /// Unmapped labels fall back to the default band.
    pub fn parse_or_default(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_default()
    }

    /// Fixed cutoffs over [0, 100]; anything else is unknown.
    pub fn from_score(score: f64) -> Option<Self> {
        if !score.is_finite() {
            return None;
        }
        if (0.0..40.0).contains(&score) {
            Some(Self::R2ToR1)
        } else if (40.0..70.0).contains(&score) {
            Some(Self::R1ToW2)
        } else if (70.0..=100.0).contains(&score) {
            Some(Self::W2ToW1)
        } else {
            None
        }
    }
}

impl fmt::Display for TierBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub accumulation: f64,
    pub frequency: f64,
    pub tenure: f64,
    pub business_class: f64,
    pub composite: f64,
}

#[derive(Clone, Debug)]
pub struct CustomerScoringModel {
    stats: Arc<NormalizationStats>,
}

impl CustomerScoringModel {
    pub fn new(stats: Arc<NormalizationStats>) -> Self {
        Self { stats }
    }

    pub fn stats(&self) -> &NormalizationStats {
        &self.stats
    }

    /// Never fails: missing signals or stats contribute 0 against the full weight sum.
    pub fn score(&self, profile: &CustomerProfile) -> ScoreBreakdown {
        let accumulation = dimension_score(
            self.stats.accumulation,
            profile.accum_6m_revenue.map(f64::ln_1p),
        );
        let frequency = dimension_score(self.stats.frequency, profile.purchase_frequency);
        let tenure = dimension_score(self.stats.tenure, profile.tenure_years);
        let business_class =
            profile.business_class().map(|class| class.weight() * 100.0).unwrap_or(0.0);

        let composite = (accumulation * WEIGHT_ACCUMULATION
            + frequency * WEIGHT_FREQUENCY
            + tenure * WEIGHT_TENURE
            + business_class * WEIGHT_BUSINESS_CLASS)
            / WEIGHT_SUM;

        ScoreBreakdown { accumulation, frequency, tenure, business_class, composite }
    }

    pub fn tier(&self, profile: &CustomerProfile) -> (ScoreBreakdown, TierBand) {
        let breakdown = self.score(profile);
        (breakdown, TierBand::from_score(breakdown.composite).unwrap_or_default())
    }
}

fn dimension_score(stats: Option<DimensionStats>, value: Option<f64>) -> f64 {
    match (stats, value) {
        (Some(stats), Some(value)) => stats.percentile_score(value),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use proptest::prelude::*;
    use tempfile::TempDir;

    use super::{
        CustomerScoringModel, DimensionStats, NormalizationStats, PopulationSample, TierBand,
    };
    use crate::domain::customer::CustomerProfile;

    fn stats() -> NormalizationStats {
        NormalizationStats {
            accumulation: Some(DimensionStats { mean: 11.0, sd: 2.0 }),
            frequency: Some(DimensionStats { mean: 12.0, sd: 6.0 }),
            tenure: Some(DimensionStats { mean: 6.0, sd: 4.0 }),
        }
    }

    #[test]
    fn percentile_at_mean_is_fifty() {
        let stats = DimensionStats { mean: 10.0, sd: 2.0 };
        assert!((stats.percentile_score(10.0) - 50.0).abs() < 1e-9);
        assert_eq!(DimensionStats { mean: 10.0, sd: 0.0 }.percentile_score(12.0), 0.0);
    }

    #[test]
    fn missing_stats_degrade_to_business_class_only() {
        let model = CustomerScoringModel::new(Arc::new(NormalizationStats::unavailable()));
        let profile = CustomerProfile {
            code: Some("C001".to_string()),
            tenure_years: Some(12.0),
            accum_6m_revenue: Some(1_000_000.0),
            business_class: Some("R".to_string()),
            ..CustomerProfile::default()
        };

        let breakdown = model.score(&profile);
        assert_eq!(breakdown.tenure, 0.0);
        assert!((breakdown.composite - 27.0 * 33.94 / 100.0).abs() < 1e-9);
    }

    #[test]
    fn new_customer_without_revenue_lands_in_lowest_band() {
        let model = CustomerScoringModel::new(Arc::new(stats()));
        let profile = CustomerProfile {
            code: Some("C002".to_string()),
            tenure_years: Some(5.0),
            accum_6m_revenue: Some(0.0),
            purchase_frequency: Some(0.0),
            business_class: Some("P".to_string()),
            ..CustomerProfile::default()
        };

        let (breakdown, band) = model.tier(&profile);
        assert!(breakdown.composite < 40.0);
        assert_eq!(band, TierBand::R2ToR1);
    }

    #[test]
    fn tier_labels_are_normalized() {
        assert_eq!(TierBand::parse("R1→W2"), Some(TierBand::R1ToW2));
        assert_eq!(TierBand::parse(" w2 – w1\n"), Some(TierBand::W2ToW1));
        assert_eq!(TierBand::parse("W1—P"), Some(TierBand::W1ToP));
        assert_eq!(TierBand::parse_or_default("Unknown"), TierBand::R2ToR1);
    }

    #[test]
    fn cutoffs_map_scores_to_bands() {
        assert_eq!(TierBand::from_score(0.0), Some(TierBand::R2ToR1));
        assert_eq!(TierBand::from_score(39.999), Some(TierBand::R2ToR1));
        assert_eq!(TierBand::from_score(40.0), Some(TierBand::R1ToW2));
        assert_eq!(TierBand::from_score(70.0), Some(TierBand::W2ToW1));
        assert_eq!(TierBand::from_score(100.0), Some(TierBand::W2ToW1));
        assert_eq!(TierBand::from_score(100.5), None);
        assert_eq!(TierBand::from_score(f64::NAN), None);
    }

    #[test]
    fn stats_file_accepts_list_or_object_layout() -> Result<(), String> {
        let dir = TempDir::new().map_err(|err| err.to_string())?;
        let list = dir.path().join("list.json");
        fs::write(
            &list,
            r#"[{"accum_6m_ln_mean": 11.2, "accum_6m_ln_sd": 2.1, "frequency_mean": 9.0,
                 "frequency_sd": 4.0, "tenure_mean": 7.0, "tenure_sd": 3.5}]"#,
        )
        .map_err(|err| err.to_string())?;
        let object = dir.path().join("object.json");
        fs::write(&object, r#"{"tenure_mean": 7.0, "tenure_sd": 3.5}"#)
            .map_err(|err| err.to_string())?;

        let from_list = NormalizationStats::load(&list).map_err(|err| err.to_string())?;
        let from_object = NormalizationStats::load(&object).map_err(|err| err.to_string())?;

        assert!(from_list.is_complete());
        assert_eq!(from_object.tenure, Some(DimensionStats { mean: 7.0, sd: 3.5 }));
        assert_eq!(from_object.frequency, None);
        Ok(())
    }

    #[test]
    fn population_stats_use_population_sd_and_write_back() -> Result<(), String> {
        let samples = [
            PopulationSample { tenure_years: Some(2.0), accum_6m_revenue: Some(0.0), purchase_frequency: Some(1.0) },
            PopulationSample { tenure_years: Some(4.0), accum_6m_revenue: None, purchase_frequency: Some(3.0) },
        ];
        let stats = NormalizationStats::from_population(&samples);

        assert_eq!(stats.tenure, Some(DimensionStats { mean: 3.0, sd: 1.0 }));
        assert_eq!(stats.accumulation, Some(DimensionStats { mean: 0.0, sd: 0.0 }));

        let dir = TempDir::new().map_err(|err| err.to_string())?;
        let path = dir.path().join("data").join("normalization_stats.json");
        stats.write(&path).map_err(|err| err.to_string())?;
        let reloaded = NormalizationStats::load(&path).map_err(|err| err.to_string())?;
        assert_eq!(reloaded, stats);
        Ok(())
    }

    proptest! {
        #[test]
        fn tier_is_monotonic_in_score(a in 0.0f64..=100.0, b in 0.0f64..=100.0) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let low_band = TierBand::from_score(low);
            let high_band = TierBand::from_score(high);
            prop_assert!(low_band.is_some() && high_band.is_some());
            prop_assert!(low_band <= high_band);
        }

        #[test]
        fn composite_stays_within_bounds(
            tenure in -50.0f64..200.0,
            accum in 0.0f64..1.0e9,
            frequency in 0.0f64..500.0,
        ) {
            let model = CustomerScoringModel::new(Arc::new(stats()));
            let profile = CustomerProfile {
                code: Some("C".to_string()),
                tenure_years: Some(tenure),
                accum_6m_revenue: Some(accum),
                purchase_frequency: Some(frequency),
                business_class: Some("R".to_string()),
                ..CustomerProfile::default()
            };
            let composite = model.score(&profile).composite;
            prop_assert!((0.0..=100.0).contains(&composite));
        }
    }
}
