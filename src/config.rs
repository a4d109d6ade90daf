//! Engine configuration: severity weights, fusion thresholds, the statutory
//! deadline table, actor-resolution tolerances, risk scoring constants, and
//! AI reasoning service settings.
//!
//! Exact weight constants are configuration, not contract — the defaults
//! below are documented, testable choices. `validate()` runs at engine
//! startup; an invalid configuration is fatal and never partially applied.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::enums::{EventType, ViolationCategory};

pub const APP_NAME: &str = "CaseLens";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Highest severity on the 1–5 scale.
pub const MAX_SEVERITY: u8 = 5;

/// Default log filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    "caselens=info".to_string()
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub severity: SeverityWeights,
    pub fusion: FusionConfig,
    pub timeline: TimelineConfig,
    pub resolution: ResolutionConfig,
    pub risk: RiskConfig,
    pub ai: AiConfig,
    pub search: SearchConfig,
}

impl EngineConfig {
    /// Validate every section. Called once at engine startup; any failure is
    /// a `Configuration` error and the engine must not start.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.severity.validate()?;
        self.fusion.validate()?;
        self.timeline.validate()?;
        self.resolution.validate()?;
        self.risk.validate()?;
        self.ai.validate()?;
        self.search.validate()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SeverityWeights
// ---------------------------------------------------------------------------

/// Base severity (1–5) per violation category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub constitutional: u8,
    pub due_process: u8,
    pub procedural: u8,
    pub cps_specific: u8,
    pub custody: u8,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            constitutional: 5,
            due_process: 4,
            procedural: 2,
            cps_specific: 3,
            custody: 3,
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, category: ViolationCategory) -> u8 {
        match category {
            ViolationCategory::Constitutional => self.constitutional,
            ViolationCategory::DueProcess => self.due_process,
            ViolationCategory::Procedural => self.procedural,
            ViolationCategory::CpsSpecific => self.cps_specific,
            ViolationCategory::Custody => self.custody,
        }
    }

    fn validate(&self) -> Result<(), EngineError> {
        for category in ViolationCategory::all() {
            let w = self.weight(category);
            if w == 0 || w > MAX_SEVERITY {
                return Err(EngineError::Configuration(format!(
                    "severity weight for {} must be 1..={MAX_SEVERITY}, got {w}",
                    category.as_str()
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FusionConfig
// ---------------------------------------------------------------------------

/// Controls how pattern-lane and AI-lane candidates are merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Candidates sharing a category merge when their ranges overlap by more
    /// than this fraction of the shorter range.
    pub overlap_threshold: f64,
    /// Same category recurring at least this many times in one document
    /// raises severity by one tier (capped at `MAX_SEVERITY`).
    pub repetition_boost_threshold: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.5,
            repetition_boost_threshold: 3,
        }
    }
}

impl FusionConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if !(self.overlap_threshold > 0.0 && self.overlap_threshold <= 1.0) {
            return Err(EngineError::Configuration(format!(
                "fusion overlap_threshold must be in (0, 1], got {}",
                self.overlap_threshold
            )));
        }
        if self.repetition_boost_threshold < 2 {
            return Err(EngineError::Configuration(
                "repetition_boost_threshold must be at least 2".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TimelineConfig
// ---------------------------------------------------------------------------

/// A statutory deadline between two event types: the `to_type` event must
/// occur within `max_days` of the `from_type` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadlineRule {
    pub from_type: EventType,
    pub to_type: EventType,
    pub max_days: i64,
    pub description: String,
    /// Severity a promoted violation would carry.
    pub severity: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub deadlines: Vec<DeadlineRule>,
    /// Any two consecutive dated court events further apart than this are
    /// flagged as an excessive delay. `None` disables the check.
    pub consecutive_delay_days: Option<i64>,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            deadlines: vec![
                DeadlineRule {
                    from_type: EventType::Incident,
                    to_type: EventType::Hearing,
                    max_days: 14,
                    description: "first hearing must follow a removal within 14 days".into(),
                    severity: 3,
                },
                DeadlineRule {
                    from_type: EventType::Filing,
                    to_type: EventType::Hearing,
                    max_days: 90,
                    description: "hearing must follow a filing within 90 days".into(),
                    severity: 2,
                },
            ],
            consecutive_delay_days: Some(180),
        }
    }
}

impl TimelineConfig {
    fn validate(&self) -> Result<(), EngineError> {
        for rule in &self.deadlines {
            if rule.max_days <= 0 {
                return Err(EngineError::Configuration(format!(
                    "deadline rule '{}' must have positive max_days",
                    rule.description
                )));
            }
            if rule.severity == 0 || rule.severity > MAX_SEVERITY {
                return Err(EngineError::Configuration(format!(
                    "deadline rule '{}' severity must be 1..={MAX_SEVERITY}",
                    rule.description
                )));
            }
        }
        if let Some(days) = self.consecutive_delay_days {
            if days <= 0 {
                return Err(EngineError::Configuration(
                    "consecutive_delay_days must be positive".into(),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ResolutionConfig
// ---------------------------------------------------------------------------

/// Actor-resolution tolerances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Two mentions with the same role resolve to one actor when their
    /// normalized names are within this edit distance.
    pub max_edit_distance: usize,
    /// Fuzzy matching only applies to names at least this long; shorter
    /// names must match exactly.
    pub min_len_for_fuzzy: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_edit_distance: 2,
            min_len_for_fuzzy: 6,
        }
    }
}

impl ResolutionConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if self.max_edit_distance > 4 {
            return Err(EngineError::Configuration(format!(
                "max_edit_distance above 4 would merge distinct people, got {}",
                self.max_edit_distance
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RiskConfig
// ---------------------------------------------------------------------------

/// Actor risk scoring: raw exposure is the sum of linked violation
/// severities; the score is `raw / (raw + saturation)`, so additional
/// low-severity violations contribute diminishing marginal score. Tier
/// boundaries are fixed thresholds over the normalized score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub saturation: f64,
    pub medium_threshold: f64,
    pub high_threshold: f64,
    pub critical_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            saturation: 12.0,
            medium_threshold: 0.25,
            high_threshold: 0.50,
            critical_threshold: 0.75,
        }
    }
}

impl RiskConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if self.saturation <= 0.0 {
            return Err(EngineError::Configuration(
                "risk saturation must be positive".into(),
            ));
        }
        let ascending = 0.0 < self.medium_threshold
            && self.medium_threshold < self.high_threshold
            && self.high_threshold < self.critical_threshold
            && self.critical_threshold < 1.0;
        if !ascending {
            return Err(EngineError::Configuration(format!(
                "risk tier thresholds must be ascending within (0, 1): {} / {} / {}",
                self.medium_threshold, self.high_threshold, self.critical_threshold
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AiConfig
// ---------------------------------------------------------------------------

/// AI reasoning service settings. `enabled = false` is development mode:
/// detection runs pattern-lane-only without ever contacting the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Excerpts sent to the service are truncated to this many characters.
    pub max_excerpt_chars: usize,
    /// Confidence assumed when the service reports none.
    pub default_confidence: f64,
    /// Consecutive failures before the lane is considered unavailable for
    /// the remainder of the process (circuit breaker).
    pub failure_threshold: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:11434".into(),
            model: "llama3.1:8b".into(),
            timeout_secs: 60,
            max_excerpt_chars: 3000,
            default_confidence: 0.5,
            failure_threshold: 3,
        }
    }
}

impl AiConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if self.enabled {
            if self.timeout_secs == 0 {
                return Err(EngineError::Configuration(
                    "ai timeout_secs must be positive when the lane is enabled".into(),
                ));
            }
            if self.max_excerpt_chars < 100 {
                return Err(EngineError::Configuration(
                    "ai max_excerpt_chars below 100 cannot carry a meaningful excerpt".into(),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.default_confidence) {
            return Err(EngineError::Configuration(format!(
                "ai default_confidence must be in [0, 1], got {}",
                self.default_confidence
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SearchConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Bound on the derived document-vector cache. Eviction drops only the
    /// derived vector, never a document's canonical text.
    pub vector_cache_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { vector_cache_capacity: 256 }
    }
}

impl SearchConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if self.vector_cache_capacity == 0 {
            return Err(EngineError::Configuration(
                "vector_cache_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_severity_weight_rejected() {
        let mut config = EngineConfig::default();
        config.severity.constitutional = 0;
        assert!(matches!(config.validate(), Err(EngineError::Configuration(_))));
    }

    #[test]
    fn overlap_threshold_bounds() {
        let mut config = EngineConfig::default();
        config.fusion.overlap_threshold = 0.0;
        assert!(config.validate().is_err());
        config.fusion.overlap_threshold = 1.0;
        assert!(config.validate().is_ok());
        config.fusion.overlap_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_deadline_rejected() {
        let mut config = EngineConfig::default();
        config.timeline.deadlines[0].max_days = -5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn risk_thresholds_must_ascend() {
        let mut config = EngineConfig::default();
        config.risk.high_threshold = 0.2; // below medium
        assert!(config.validate().is_err());
    }

    #[test]
    fn ai_timeout_checked_only_when_enabled() {
        let mut config = EngineConfig::default();
        config.ai.timeout_secs = 0;
        assert!(config.validate().is_ok(), "disabled lane skips timeout check");
        config.ai.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_deserializes_with_partial_fields() {
        let json = r#"{ "fusion": { "overlap_threshold": 0.7 } }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert!((config.fusion.overlap_threshold - 0.7).abs() < 1e-9);
        assert_eq!(config.severity.constitutional, 5);
        assert!(config.validate().is_ok());
    }
}
