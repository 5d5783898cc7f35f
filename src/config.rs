use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration, loaded from a TOML file.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub ga: GaConfig,
    #[serde(default)]
    pub coordination: CoordinationConfig,
    #[serde(default)]
    pub curve: CurveConfig,
}

/// Input/output locations for the binary. The optimization engine itself
/// never touches the filesystem.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DataConfig {
    /// JSON file containing the flat list of relay-pair records.
    pub scenarios_file: String,
    /// Where the batch export is written.
    pub output_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            scenarios_file: "scenarios.json".to_string(),
            output_file: "optimized_settings.json".to_string(),
        }
    }
}

/// Hyperparameters of the genetic algorithm.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GaConfig {
    pub population_size: usize,
    pub max_generations: usize,
    /// Stop after this many consecutive generations without an improvement
    /// larger than `stagnation_epsilon`.
    pub stagnation_window: usize,
    pub stagnation_epsilon: f64,
    /// Stop as soon as the best fitness reaches this value.
    pub target_fitness: f64,
    pub tournament_size: usize,
    pub crossover_rate: f64,
    /// Per-gene mutation probability.
    pub mutation_rate: f64,
    /// Mutation step as a fraction of the gene's bound range.
    pub mutation_scale: f64,
    /// Blend factor for BLX-alpha crossover.
    pub blend_alpha: f64,
    pub seed: u64,
    /// Hard wall-clock budget in seconds. Enforced regardless of convergence.
    pub time_budget_secs: Option<u64>,
    /// Seed one individual from the scenario's original settings when present.
    pub seed_from_initial: bool,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            population_size: 80,
            max_generations: 10_000,
            stagnation_window: 1_000,
            stagnation_epsilon: 1e-9,
            target_fitness: 0.0,
            tournament_size: 3,
            crossover_rate: 0.9,
            mutation_rate: 0.1,
            mutation_scale: 0.1,
            blend_alpha: 0.5,
            seed: 42,
            time_budget_secs: None,
            seed_from_initial: true,
        }
    }
}

/// Coordination requirements and setting bounds.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Coordination time interval in seconds: the minimum delay the backup
    /// must wait past the main relay.
    pub cti: f64,
    pub tds_min: f64,
    pub tds_max: f64,
    /// Lower bound for every pickup setting, in amperes.
    pub pickup_min: f64,
    /// Each relay's pickup upper bound is this factor times the smallest
    /// fault current the relay sees across its pairs.
    pub max_pickup_factor: f64,
    /// Soft cap on the main relay operating time; excess is added to the
    /// objective.
    pub max_operating_time: f64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            cti: 0.2,
            tds_min: 0.05,
            tds_max: 1.1,
            pickup_min: 0.1,
            max_pickup_factor: 0.6,
            max_operating_time: 10.0,
        }
    }
}

/// Constants of the inverse-time curve, IEC standard inverse by default.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CurveConfig {
    pub a: f64,
    pub b: f64,
    pub p: f64,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            a: 0.14,
            b: 0.0,
            p: 0.02,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validates every hyperparameter. Called eagerly before any generation
    /// runs; a bad value here aborts the whole optimization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ga.population_size < 2 {
            return Err(ConfigError::Invalid(format!(
                "population_size must be at least 2, got {}",
                self.ga.population_size
            )));
        }
        if self.ga.max_generations == 0 {
            return Err(ConfigError::Invalid(
                "max_generations must be greater than zero".to_string(),
            ));
        }
        if self.ga.tournament_size == 0 {
            return Err(ConfigError::Invalid(
                "tournament_size must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ga.crossover_rate) {
            return Err(ConfigError::Invalid(format!(
                "crossover_rate must be in [0, 1], got {}",
                self.ga.crossover_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.ga.mutation_rate) {
            return Err(ConfigError::Invalid(format!(
                "mutation_rate must be in [0, 1], got {}",
                self.ga.mutation_rate
            )));
        }
        if self.ga.mutation_scale <= 0.0 || !self.ga.mutation_scale.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "mutation_scale must be a positive finite number, got {}",
                self.ga.mutation_scale
            )));
        }
        if self.ga.blend_alpha < 0.0 || !self.ga.blend_alpha.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "blend_alpha must be non-negative and finite, got {}",
                self.ga.blend_alpha
            )));
        }
        if self.ga.stagnation_epsilon < 0.0 {
            return Err(ConfigError::Invalid(
                "stagnation_epsilon must be non-negative".to_string(),
            ));
        }

        if self.coordination.cti < 0.0 || !self.coordination.cti.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "cti must be a non-negative finite number, got {}",
                self.coordination.cti
            )));
        }
        if self.coordination.tds_min <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "tds_min must be positive, got {}",
                self.coordination.tds_min
            )));
        }
        if self.coordination.tds_min >= self.coordination.tds_max {
            return Err(ConfigError::Invalid(format!(
                "tds bounds are inverted: [{}, {}]",
                self.coordination.tds_min, self.coordination.tds_max
            )));
        }
        if self.coordination.pickup_min <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "pickup_min must be positive, got {}",
                self.coordination.pickup_min
            )));
        }
        if self.coordination.max_pickup_factor <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_pickup_factor must be positive, got {}",
                self.coordination.max_pickup_factor
            )));
        }
        if self.coordination.max_operating_time <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_operating_time must be positive, got {}",
                self.coordination.max_operating_time
            )));
        }

        if self.curve.a <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "curve constant a must be positive, got {}",
                self.curve.a
            )));
        }
        if self.curve.b < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "curve constant b must be non-negative, got {}",
                self.curve.b
            )));
        }
        if self.curve.p <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "curve exponent p must be positive, got {}",
                self.curve.p
            )));
        }

        Ok(())
    }
}
