//! Per-scenario orchestration: run the engine, decode the winner, report
//! before/after coordination metrics.

use crate::config::{Config, ConfigError};
use crate::evaluation::{evaluate, FitnessResult};
use crate::evolution::{EngineError, EvolutionEngine};
use crate::scenario::Scenario;
use log::{info, warn};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Optimized settings for one relay, paired with what the scenario started
/// from.
#[derive(Debug, Clone)]
pub struct OptimizedRelay {
    pub id: String,
    pub tds: f64,
    pub pickup: f64,
    pub initial_tds: Option<f64>,
    pub initial_pickup: Option<f64>,
}

/// Outcome of optimizing one scenario: settings per relay, before/after
/// metrics, and convergence metadata. Persistence is the caller's business.
#[derive(Debug, Clone)]
pub struct OptimizedScenario {
    pub scenario_id: String,
    pub relays: Vec<OptimizedRelay>,
    /// Metrics of the original settings, when the scenario carried them.
    pub before: Option<Metrics>,
    pub after: Metrics,
    pub best_generation: usize,
    pub generations_run: usize,
}

/// The two scenario-level coordination metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub tmt: f64,
    pub coordination_pct: f64,
}

impl From<&FitnessResult> for Metrics {
    fn from(result: &FitnessResult) -> Self {
        Self {
            tmt: result.tmt,
            coordination_pct: result.coordination_pct,
        }
    }
}

/// Optimizes a single scenario.
///
/// Configuration and scenario are validated eagerly; nothing is retried, a
/// malformed input aborts this scenario before any generation runs.
///
/// # Errors
/// * `OptimizeError::Config` - Out-of-range hyperparameters.
/// * `OptimizeError::Engine` - Empty/malformed scenario or degenerate bounds.
pub fn optimize_scenario(
    scenario: &Scenario,
    config: &Config,
) -> Result<OptimizedScenario, OptimizeError> {
    optimize_scenario_seeded(scenario, config, config.ga.seed)
}

/// [`optimize_scenario`] with an explicit seed, used by the batch runner to
/// give every scenario its own reproducible random stream.
pub fn optimize_scenario_seeded(
    scenario: &Scenario,
    config: &Config,
    seed: u64,
) -> Result<OptimizedScenario, OptimizeError> {
    config.validate()?;

    let mut engine = EvolutionEngine::with_seed(
        &config.ga,
        &config.coordination,
        &config.curve,
        scenario,
        seed,
    )?;

    // Score the original settings first so the report can show the
    // improvement. Missing settings are not an error; there is just no
    // "before" to compare against.
    let before = scenario.initial_genes().map(|genes| {
        let result = evaluate(
            scenario,
            &genes,
            engine.bounds(),
            &config.coordination,
            &config.curve,
        );
        Metrics::from(&result)
    });
    if before.is_none() {
        warn!(
            "Scenario '{}' carries no original settings; skipping before-metrics",
            scenario.id
        );
    }

    let outcome = engine.evolve();

    let n = scenario.relays.len();
    let relays = scenario
        .relays
        .iter()
        .enumerate()
        .map(|(i, relay)| OptimizedRelay {
            id: relay.id.clone(),
            tds: outcome.best.genes[i],
            pickup: outcome.best.genes[n + i],
            initial_tds: relay.initial.map(|s| s.tds),
            initial_pickup: relay.initial.map(|s| s.pickup),
        })
        .collect();

    Ok(OptimizedScenario {
        scenario_id: scenario.id.clone(),
        relays,
        before,
        after: Metrics::from(&outcome.result),
        best_generation: outcome.best_generation,
        generations_run: outcome.generations_run,
    })
}

/// Optimizes a batch of scenarios in parallel. Each run is independent; the
/// per-scenario seed is derived from the base seed and the scenario index so
/// the batch is reproducible regardless of scheduling.
pub fn optimize_all(
    scenarios: &[Scenario],
    config: &Config,
) -> Vec<Result<OptimizedScenario, OptimizeError>> {
    // Validate once for the whole batch; an invalid configuration aborts
    // before any engine is built instead of failing N times.
    if let Err(e) = config.validate() {
        warn!("Configuration invalid, aborting batch: {}", e);
        let reason = match e {
            ConfigError::Invalid(msg) => msg,
            other => other.to_string(),
        };
        return scenarios
            .iter()
            .map(|_| Err(OptimizeError::Config(ConfigError::Invalid(reason.clone()))))
            .collect();
    }

    info!("Optimizing {} scenarios", scenarios.len());
    scenarios
        .par_iter()
        .enumerate()
        .map(|(i, scenario)| {
            let seed = config.ga.seed.wrapping_add(i as u64);
            optimize_scenario_seeded(scenario, config, seed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{PairInput, RelaySettings, Scenario};

    fn test_scenario() -> Scenario {
        Scenario::from_pairs(
            "scenario_1",
            &[PairInput {
                main_id: "R1".to_string(),
                backup_id: "R2".to_string(),
                fault_current_main: 1000.0,
                fault_current_backup: 1000.0,
                main_settings: Some(RelaySettings {
                    tds: 0.3,
                    pickup: 5.0,
                }),
                backup_settings: Some(RelaySettings {
                    tds: 0.3,
                    pickup: 5.0,
                }),
            }],
        )
        .unwrap()
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.ga.population_size = 30;
        config.ga.max_generations = 500;
        config.ga.stagnation_window = 200;
        config
    }

    #[test]
    fn test_optimize_reports_before_and_after() {
        let scenario = test_scenario();
        let optimized = optimize_scenario(&scenario, &fast_config()).unwrap();

        // Identical settings on both relays miscoordinate by exactly CTI.
        let before = optimized.before.unwrap();
        assert!((before.tmt + 0.2).abs() < 1e-12);
        assert_eq!(before.coordination_pct, 0.0);

        // The engine must coordinate this trivially satisfiable pair.
        assert_eq!(optimized.after.tmt, 0.0);
        assert_eq!(optimized.after.coordination_pct, 100.0);
        assert_eq!(optimized.relays.len(), 2);
        assert!(optimized.generations_run >= optimized.best_generation);
    }

    #[test]
    fn test_optimized_settings_within_bounds() {
        let scenario = test_scenario();
        let config = fast_config();
        let optimized = optimize_scenario(&scenario, &config).unwrap();

        for relay in &optimized.relays {
            assert!(relay.tds >= config.coordination.tds_min);
            assert!(relay.tds <= config.coordination.tds_max);
            assert!(relay.pickup >= config.coordination.pickup_min);
            assert!(relay.pickup <= config.coordination.max_pickup_factor * 1000.0);
        }
    }

    #[test]
    fn test_invalid_config_aborts_before_search() {
        let scenario = test_scenario();
        let mut config = fast_config();
        config.ga.population_size = 0;
        assert!(matches!(
            optimize_scenario(&scenario, &config),
            Err(OptimizeError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_config_aborts_whole_batch() {
        let scenarios = vec![test_scenario(), test_scenario()];
        let mut config = fast_config();
        config.ga.population_size = 0;

        let results = optimize_all(&scenarios, &config);
        assert_eq!(results.len(), scenarios.len());
        for result in results {
            assert!(matches!(result, Err(OptimizeError::Config(_))));
        }
    }

    #[test]
    fn test_batch_is_reproducible() {
        let scenarios = vec![test_scenario(), test_scenario()];
        let config = fast_config();

        let a = optimize_all(&scenarios, &config);
        let b = optimize_all(&scenarios, &config);

        for (ra, rb) in a.iter().zip(&b) {
            let (ra, rb) = (ra.as_ref().unwrap(), rb.as_ref().unwrap());
            assert_eq!(ra.after, rb.after);
            for (x, y) in ra.relays.iter().zip(&rb.relays) {
                assert_eq!(x.tds, y.tds);
                assert_eq!(x.pickup, y.pickup);
            }
        }
    }
}
