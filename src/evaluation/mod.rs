//! Coordination evaluation and the scalar fitness the engine minimizes.
//!
//! A candidate is a flat gene vector, TDS block then pickup block, two genes
//! per relay. Evaluation computes per-pair discrimination margins
//! `DT = t_backup - t_main - CTI` and aggregates the total miscoordination
//! time as `TMT = sum(min(DT, 0))`, so TMT is never positive and zero means
//! every pair is coordinated. This sign convention is applied everywhere; no
//! other module reinterprets it.

use crate::config::{CoordinationConfig, CurveConfig};
use crate::curve::{operating_time, NO_OPERATION_TIME};
use crate::scenario::Scenario;

/// Fixed penalty per constraint violation. Chosen to dwarf the feasible
/// objective range (tens of seconds per pair) so that an infeasible candidate
/// always scores strictly worse than any feasible one.
pub const CONSTRAINT_PENALTY: f64 = 1e6;

/// Everything the fitness function and the reporting layer need about one
/// candidate evaluation. Computed fresh per candidate, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct FitnessResult {
    /// Total miscoordination time, `sum(min(DT, 0))`. Always <= 0; zero means
    /// fully coordinated.
    pub tmt: f64,
    /// Share of coordinated pairs, in percent.
    pub coordination_pct: f64,
    /// Per-pair discrimination margins, in pair order.
    pub margins: Vec<f64>,
    /// Sum of main-relay operating time in excess of the configured cap.
    pub main_overtime: f64,
    /// Genes outside their configured bounds.
    pub out_of_bound_genes: usize,
    /// Pairs whose main relay never operates (sentinel time), leaving the
    /// coordination margin undefined.
    pub undefined_pairs: usize,
    /// True when no constraint fired.
    pub valid: bool,
}

/// Evaluates a candidate gene vector against a scenario.
///
/// Deterministic: identical inputs produce bit-identical results. Out-of-bound
/// genes and non-operating main relays are not errors here; they are recorded
/// and priced into the fitness, and selection pressure does the rest.
///
/// # Arguments
/// * `scenario` - Validated scenario (pairs index into its relay list)
/// * `genes` - Candidate vector, `2 * relays` long, TDS block then pickup block
/// * `bounds` - Per-gene `(min, max)` bounds, same layout as `genes`
/// * `coordination` - CTI, bounds configuration, operating-time cap
/// * `curve` - Relay curve constants
pub fn evaluate(
    scenario: &Scenario,
    genes: &[f64],
    bounds: &[(f64, f64)],
    coordination: &CoordinationConfig,
    curve: &CurveConfig,
) -> FitnessResult {
    debug_assert_eq!(genes.len(), scenario.num_genes());
    debug_assert_eq!(bounds.len(), genes.len());

    let n = scenario.relays.len();

    let out_of_bound_genes = genes
        .iter()
        .zip(bounds)
        .filter(|(g, b)| !g.is_finite() || **g < b.0 || **g > b.1)
        .count();

    // A non-positive pickup cannot be fed to the curve model; the relay is
    // treated as never operating and the gene is already counted above
    // (pickup bounds are strictly positive).
    let time_for = |fault_current: f64, relay: usize| -> f64 {
        let tds = genes[relay];
        let pickup = genes[n + relay];
        if pickup <= 0.0 || !pickup.is_finite() || !tds.is_finite() {
            return NO_OPERATION_TIME;
        }
        operating_time(fault_current, pickup, tds, curve).unwrap_or(NO_OPERATION_TIME)
    };

    let mut tmt = 0.0;
    let mut coordinated = 0usize;
    let mut undefined_pairs = 0usize;
    let mut main_overtime = 0.0;
    let mut margins = Vec::with_capacity(scenario.pairs.len());

    for pair in &scenario.pairs {
        let t_main = time_for(pair.fault_current_main, pair.main);
        let t_backup = time_for(pair.fault_current_backup, pair.backup);

        let dt = t_backup - t_main - coordination.cti;
        margins.push(dt);

        if dt >= 0.0 {
            coordinated += 1;
        } else {
            tmt += dt;
        }

        if t_main >= NO_OPERATION_TIME {
            undefined_pairs += 1;
        }
        main_overtime += (t_main - coordination.max_operating_time).max(0.0);
    }

    let coordination_pct = if scenario.pairs.is_empty() {
        0.0
    } else {
        coordinated as f64 / scenario.pairs.len() as f64 * 100.0
    };

    FitnessResult {
        tmt,
        coordination_pct,
        margins,
        main_overtime,
        out_of_bound_genes,
        undefined_pairs,
        valid: out_of_bound_genes == 0 && undefined_pairs == 0,
    }
}

/// Collapses an evaluation into the scalar the engine minimizes.
///
/// The base term `-TMT` is zero for a fully coordinated candidate and grows
/// with miscoordination. Overtime on main relays is added as a soft term;
/// every hard constraint violation adds [`CONSTRAINT_PENALTY`], so any
/// penalized candidate is strictly worse than any feasible one.
pub fn fitness(result: &FitnessResult) -> f64 {
    let violations = (result.out_of_bound_genes + result.undefined_pairs) as f64;
    -result.tmt + result.main_overtime + violations * CONSTRAINT_PENALTY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{PairInput, RelaySettings, Scenario};

    fn single_pair_scenario() -> Scenario {
        Scenario::from_pairs(
            "test",
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

    fn wide_bounds(n_genes: usize) -> Vec<(f64, f64)> {
        vec![(0.05, 1.1), (0.05, 1.1), (0.1, 600.0), (0.1, 600.0)][..n_genes].to_vec()
    }

    #[test]
    fn test_identical_settings_miscoordinate() {
        let scenario = single_pair_scenario();
        // Same settings, same current: t_backup == t_main, DT = -CTI.
        let genes = vec![0.3, 0.3, 5.0, 5.0];
        let result = evaluate(
            &scenario,
            &genes,
            &wide_bounds(4),
            &CoordinationConfig::default(),
            &CurveConfig::default(),
        );

        assert!((result.margins[0] + 0.2).abs() < 1e-12);
        assert!((result.tmt + 0.2).abs() < 1e-12);
        assert_eq!(result.coordination_pct, 0.0);
        assert!(result.valid);
        assert!((fitness(&result) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_coordinated_pair_scores_zero() {
        let scenario = single_pair_scenario();
        // Slow backup, fast main: large positive margin.
        let genes = vec![0.05, 1.1, 5.0, 5.0];
        let result = evaluate(
            &scenario,
            &genes,
            &wide_bounds(4),
            &CoordinationConfig::default(),
            &CurveConfig::default(),
        );

        assert!(result.margins[0] > 0.0);
        assert_eq!(result.tmt, 0.0);
        assert_eq!(result.coordination_pct, 100.0);
        assert!(result.valid);
        assert_eq!(fitness(&result), 0.0);
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let scenario = single_pair_scenario();
        let genes = vec![0.37, 0.81, 4.2, 6.9];
        let bounds = wide_bounds(4);
        let coordination = CoordinationConfig::default();
        let curve = CurveConfig::default();

        let a = evaluate(&scenario, &genes, &bounds, &coordination, &curve);
        let b = evaluate(&scenario, &genes, &bounds, &coordination, &curve);
        assert_eq!(a, b);
        assert_eq!(fitness(&a).to_bits(), fitness(&b).to_bits());
    }

    #[test]
    fn test_zero_pickup_is_penalized_not_an_error() {
        let scenario = single_pair_scenario();
        // Adversarial candidate: main pickup forced to zero.
        let genes = vec![0.3, 0.3, 0.0, 5.0];
        let result = evaluate(
            &scenario,
            &genes,
            &wide_bounds(4),
            &CoordinationConfig::default(),
            &CurveConfig::default(),
        );

        assert!(!result.valid);
        assert!(result.out_of_bound_genes >= 1);
        // Main relay never operates: undefined coordination for the pair.
        assert_eq!(result.undefined_pairs, 1);
        assert!(fitness(&result) >= CONSTRAINT_PENALTY);
    }

    #[test]
    fn test_infeasible_always_worse_than_feasible() {
        let scenario = single_pair_scenario();
        let coordination = CoordinationConfig::default();
        let curve = CurveConfig::default();
        let bounds = wide_bounds(4);

        // Worst feasible-looking candidate: fully miscoordinated.
        let feasible = evaluate(&scenario, &[0.3, 0.3, 5.0, 5.0], &bounds, &coordination, &curve);
        // Infeasible: pickup above its bound and above the fault current, so
        // the main relay never trips at all.
        let infeasible = evaluate(
            &scenario,
            &[0.3, 0.3, 2000.0, 5.0],
            &bounds,
            &coordination,
            &curve,
        );

        assert!(feasible.valid);
        assert!(!infeasible.valid);
        assert!(fitness(&infeasible) > fitness(&feasible));
    }

    #[test]
    fn test_main_overtime_is_priced() {
        let scenario = Scenario::from_pairs(
            "slow",
            &[PairInput {
                main_id: "R1".to_string(),
                backup_id: "R2".to_string(),
                // Barely above pickup: very slow trip.
                fault_current_main: 6.0,
                fault_current_backup: 1000.0,
                main_settings: None,
                backup_settings: None,
            }],
        )
        .unwrap();

        let genes = vec![1.1, 0.05, 5.15, 5.0];
        let bounds = vec![(0.05, 1.1), (0.05, 1.1), (0.1, 600.0), (0.1, 600.0)];
        let result = evaluate(
            &scenario,
            &genes,
            &bounds,
            &CoordinationConfig::default(),
            &CurveConfig::default(),
        );

        // M ~ 1.17: the main relay trips in roughly 50 s, well past the 10 s
        // cap but short of the no-operation sentinel.
        assert!(result.valid);
        assert!(result.main_overtime > 0.0);
        assert!(fitness(&result) > result.tmt.abs());
    }

    #[test]
    fn test_fitness_monotonic_in_tmt() {
        let base = FitnessResult {
            tmt: -0.5,
            coordination_pct: 50.0,
            margins: vec![],
            main_overtime: 0.0,
            out_of_bound_genes: 0,
            undefined_pairs: 0,
            valid: true,
        };
        let worse = FitnessResult { tmt: -1.5, ..base.clone() };
        assert!(fitness(&worse) > fitness(&base));
    }
}
