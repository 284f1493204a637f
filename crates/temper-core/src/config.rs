//! TOML configuration for the whole runtime.
//!
//! Every section and every field has a default, so an empty document is a
//! valid configuration:
//!
//! ```toml
//! [refinement]
//! max_rounds = 20
//! early_stopping_threshold = 0.95
//! ema_alpha = 0.3
//!
//! [thresholds]
//! specification = 0.85
//! planning = 0.85
//! implementation = 0.85
//! validation = 0.85
//!
//! [weights]
//! completeness = 0.35
//! compliance = 0.25
//! coverage = 0.25
//! alignment = 0.15
//!
//! [debug]
//! max_iterations = 5
//!
//! [retrieval]
//! latency_budget_ms = 2000
//! keyword_reserve_ms = 200
//! top_k = 5
//! embedding_dimension = 256
//!
//! [[routes]]
//! agent = "backend-agent"
//! domain = "backend"
//! keywords = ["api", "endpoint"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use temper_contracts::{
    agent::Phase,
    error::{TemperError, TemperResult},
    refinement::LoopSettings,
    routing::{RouteEntry, RoutingTable},
    verify::Dimension,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    pub max_rounds: u32,
    pub early_stopping_threshold: f64,
    pub ema_alpha: f64,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        let settings = LoopSettings::default();
        Self {
            max_rounds: settings.max_rounds,
            early_stopping_threshold: settings.early_stopping_threshold,
            ema_alpha: settings.ema_alpha,
        }
    }
}

/// Quality threshold applied by the gate in each phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseThresholds {
    pub specification: f64,
    pub planning: f64,
    pub implementation: f64,
    pub validation: f64,
}

impl Default for PhaseThresholds {
    fn default() -> Self {
        let threshold = LoopSettings::default().quality_threshold;
        Self {
            specification: threshold,
            planning: threshold,
            implementation: threshold,
            validation: threshold,
        }
    }
}

impl PhaseThresholds {
    pub fn for_phase(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Specification => self.specification,
            Phase::Planning => self.planning,
            Phase::Implementation => self.implementation,
            Phase::Validation => self.validation,
        }
    }
}

/// Relative weight of each dimension in the quality score. Only the ratios
/// matter: the gate renormalizes over the dimensions that apply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionWeights {
    pub completeness: f64,
    pub compliance: f64,
    pub coverage: f64,
    pub alignment: f64,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            completeness: 0.35,
            compliance: 0.25,
            coverage: 0.25,
            alignment: 0.15,
        }
    }
}

impl DimensionWeights {
    pub fn weight(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Completeness => self.completeness,
            Dimension::Compliance => self.compliance,
            Dimension::Coverage => self.coverage,
            Dimension::Alignment => self.alignment,
        }
    }

    pub fn validate(&self) -> TemperResult<()> {
        let all = [
            self.completeness,
            self.compliance,
            self.coverage,
            self.alignment,
        ];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(TemperError::Config {
                reason: format!("dimension weights must be finite and non-negative: {all:?}"),
            });
        }
        if all.iter().all(|w| *w == 0.0) {
            return Err(TemperError::Config {
                reason: "at least one dimension weight must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub max_iterations: u32,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self { max_iterations: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Total time a search may take, end to end.
    pub latency_budget_ms: u64,
    /// Part of the budget held back for the keyword fallback.
    pub keyword_reserve_ms: u64,
    pub top_k: usize,
    pub embedding_dimension: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            latency_budget_ms: 2000,
            keyword_reserve_ms: 200,
            top_k: 5,
            embedding_dimension: 256,
        }
    }
}

/// The top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperConfig {
    pub refinement: RefinementConfig,
    pub thresholds: PhaseThresholds,
    pub weights: DimensionWeights,
    pub debug: DebugConfig,
    pub retrieval: RetrievalConfig,
    pub routes: Vec<RouteEntry>,
}

impl TemperConfig {
    /// Parse and validate a TOML document.
    ///
    /// Returns `TemperError::Config` if the TOML is malformed, does not
    /// match the schema, or holds out-of-range values.
    pub fn from_toml_str(s: &str) -> TemperResult<Self> {
        let config: TemperConfig = toml::from_str(s).map_err(|e| TemperError::Config {
            reason: format!("failed to parse configuration TOML: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> TemperResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| TemperError::Config {
            reason: format!("failed to read configuration file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> TemperResult<()> {
        for phase in Phase::ALL {
            self.loop_settings(phase).validate()?;
        }
        self.weights.validate()?;
        if !(1..=5).contains(&self.debug.max_iterations) {
            return Err(TemperError::Config {
                reason: format!(
                    "debug.max_iterations {} outside 1..=5",
                    self.debug.max_iterations
                ),
            });
        }
        let retrieval = &self.retrieval;
        if retrieval.top_k == 0 || retrieval.embedding_dimension == 0 {
            return Err(TemperError::Config {
                reason: "retrieval.top_k and retrieval.embedding_dimension must be at least 1"
                    .to_string(),
            });
        }
        if retrieval.keyword_reserve_ms >= retrieval.latency_budget_ms {
            return Err(TemperError::Config {
                reason: format!(
                    "retrieval.keyword_reserve_ms {} must be below latency_budget_ms {}",
                    retrieval.keyword_reserve_ms, retrieval.latency_budget_ms
                ),
            });
        }
        self.routing_table().validate()?;
        Ok(())
    }

    /// The loop settings that apply in `phase`.
    pub fn loop_settings(&self, phase: Phase) -> LoopSettings {
        LoopSettings {
            max_rounds: self.refinement.max_rounds,
            quality_threshold: self.thresholds.for_phase(phase),
            early_stopping_threshold: self.refinement.early_stopping_threshold,
            ema_alpha: self.refinement.ema_alpha,
        }
    }

    pub fn routing_table(&self) -> RoutingTable {
        RoutingTable {
            routes: self.routes.clone(),
        }
    }
}
