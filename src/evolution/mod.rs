//! The genetic algorithm engine (Chu & Beasley lineage).
//!
//! Real-valued, bounded search over relay setting vectors: tournament
//! selection, BLX-alpha blend crossover, per-gene perturbation mutation with
//! clamp repair, and generational replacement with single-individual elitism.
//! All randomness flows through one seeded [`StdRng`], so a run is fully
//! reproducible from its configuration.

use crate::config::{CoordinationConfig, CurveConfig, GaConfig};
use crate::evaluation::{evaluate, fitness, FitnessResult};
use crate::scenario::{Scenario, ScenarioError};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Fitness marker for individuals that have not been scored yet. The engine
/// minimizes, so anything real beats it.
const UNEVALUATED: f64 = f64::INFINITY;

/// How often generation progress is logged.
const LOG_EVERY: usize = 100;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    InvalidScenario(#[from] ScenarioError),
    #[error(
        "Pickup bounds collapsed for relay '{relay}': \
         [{lo}, {hi}] (min fault current too close to pickup_min)"
    )]
    DegenerateBounds { relay: String, lo: f64, hi: f64 },
}

/// One candidate settings assignment: a flat gene vector (TDS block then
/// pickup block, two genes per distinct relay) plus its scored fitness.
#[derive(Debug, Clone)]
pub struct Individual {
    pub genes: Vec<f64>,
    pub fitness: f64,
}

/// Result of one engine run.
#[derive(Debug, Clone)]
pub struct EvolutionOutcome {
    /// Best individual found across the whole run.
    pub best: Individual,
    /// Full evaluation of the best individual.
    pub result: FitnessResult,
    /// Generation at which the best individual was first found.
    pub best_generation: usize,
    /// Generations actually executed (termination may fire early).
    pub generations_run: usize,
    /// Best-so-far fitness after each generation, entry 0 being the initial
    /// population. Non-increasing by construction (elitism).
    pub history: Vec<f64>,
}

/// Orchestrates the population search for one scenario.
///
/// The engine owns its population and RNG; the scenario and configuration are
/// read-only borrows. Population fitness evaluation fans out over rayon, which
/// is safe because evaluation is a pure function of (scenario, genes).
#[derive(Clone)]
pub struct EvolutionEngine<'a> {
    ga: &'a GaConfig,
    coordination: &'a CoordinationConfig,
    curve: &'a CurveConfig,
    scenario: &'a Scenario,
    /// Per-gene (min, max), same layout as the gene vector.
    bounds: Vec<(f64, f64)>,
    population: Vec<Individual>,
    rng: StdRng,
}

impl<'a> EvolutionEngine<'a> {
    /// Creates an engine for one scenario.
    ///
    /// # Errors
    /// * `EngineError::InvalidScenario` - Zero relays/pairs or dangling pair
    ///   references; detected eagerly, before any generation runs.
    /// * `EngineError::DegenerateBounds` - A relay whose derived pickup range
    ///   is empty, which makes the search space infeasible by construction.
    pub fn new(
        ga: &'a GaConfig,
        coordination: &'a CoordinationConfig,
        curve: &'a CurveConfig,
        scenario: &'a Scenario,
    ) -> Result<Self, EngineError> {
        Self::with_seed(ga, coordination, curve, scenario, ga.seed)
    }

    /// Same as [`EvolutionEngine::new`] but with an explicit seed, used by the
    /// batch runner to derive independent per-scenario streams.
    pub fn with_seed(
        ga: &'a GaConfig,
        coordination: &'a CoordinationConfig,
        curve: &'a CurveConfig,
        scenario: &'a Scenario,
        seed: u64,
    ) -> Result<Self, EngineError> {
        scenario.validate()?;
        let bounds = derive_bounds(scenario, coordination)?;

        Ok(Self {
            ga,
            coordination,
            curve,
            scenario,
            bounds,
            population: Vec::with_capacity(ga.population_size),
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    /// Samples the initial population uniformly within bounds. When the
    /// scenario carries original settings and `seed_from_initial` is set, one
    /// slot is taken by those settings (clamped into bounds) to bias the
    /// search toward a known-plausible region.
    pub fn initialize_population(&mut self) {
        self.population = (0..self.ga.population_size)
            .map(|_| {
                let genes: Vec<f64> = self
                    .bounds
                    .iter()
                    .map(|(lo, hi)| lo + self.rng.random::<f64>() * (hi - lo))
                    .collect();
                Individual {
                    genes,
                    fitness: UNEVALUATED,
                }
            })
            .collect();

        if self.ga.seed_from_initial {
            if let Some(mut genes) = self.scenario.initial_genes() {
                clamp_into_bounds(&mut genes, &self.bounds);
                self.population[0] = Individual {
                    genes,
                    fitness: UNEVALUATED,
                };
            }
        }
    }

    /// Scores every unevaluated individual, fanning the pure evaluations out
    /// across rayon workers. The reduction back into the population happens
    /// strictly after the parallel phase.
    pub fn evaluate_population(&mut self) {
        let scenario = self.scenario;
        let bounds = &self.bounds;
        let coordination = self.coordination;
        let curve = self.curve;

        let work_items: Vec<(usize, Vec<f64>)> = self
            .population
            .iter()
            .enumerate()
            .filter_map(|(i, ind)| {
                (ind.fitness == UNEVALUATED).then(|| (i, ind.genes.clone()))
            })
            .collect();

        let scored: Vec<(usize, f64)> = work_items
            .par_iter()
            .map(|(i, genes)| {
                let result = evaluate(scenario, genes, bounds, coordination, curve);
                (*i, fitness(&result))
            })
            .collect();

        for (i, f) in scored {
            self.population[i].fitness = f;
        }
    }

    /// Runs the search to termination and returns the best individual with
    /// its evaluation and convergence metadata.
    pub fn evolve(&mut self) -> EvolutionOutcome {
        let started = Instant::now();
        let time_budget = self.ga.time_budget_secs.map(Duration::from_secs);

        self.initialize_population();
        self.evaluate_population();

        let mut best = self.best_of_population().clone();
        let mut best_generation = 0;
        let mut history = vec![best.fitness];
        let mut stall = 0usize;
        let mut generations_run = 0usize;

        info!(
            "Scenario '{}': generation 0, best fitness {:.6}",
            self.scenario.id, best.fitness
        );

        for generation in 1..=self.ga.max_generations {
            if let Some(budget) = time_budget {
                if started.elapsed() >= budget {
                    info!(
                        "Scenario '{}': wall-clock budget exhausted at generation {}",
                        self.scenario.id, generation
                    );
                    break;
                }
            }

            generations_run = generation;
            self.step();

            let generation_best = self.best_of_population();
            if best.fitness - generation_best.fitness > self.ga.stagnation_epsilon {
                stall = 0;
            } else {
                stall += 1;
            }
            if generation_best.fitness < best.fitness {
                best = generation_best.clone();
                best_generation = generation;
            }
            history.push(best.fitness);

            if generation % LOG_EVERY == 0 {
                debug!(
                    "Scenario '{}': generation {}, best fitness {:.6}, stall {}",
                    self.scenario.id, generation, best.fitness, stall
                );
            }

            if best.fitness <= self.ga.target_fitness {
                info!(
                    "Scenario '{}': target fitness reached at generation {}",
                    self.scenario.id, generation
                );
                break;
            }
            if stall >= self.ga.stagnation_window {
                info!(
                    "Scenario '{}': stagnated for {} generations, stopping at {}",
                    self.scenario.id, stall, generation
                );
                break;
            }
        }

        let result = evaluate(
            self.scenario,
            &best.genes,
            &self.bounds,
            self.coordination,
            self.curve,
        );

        info!(
            "Scenario '{}': finished after {} generations, best fitness {:.6} \
             (found at generation {}), TMT {:.6}, coordination {:.1}%",
            self.scenario.id,
            generations_run,
            best.fitness,
            best_generation,
            result.tmt,
            result.coordination_pct
        );

        EvolutionOutcome {
            best,
            result,
            best_generation,
            generations_run,
            history,
        }
    }

    /// One generational step: breed a full set of children, score them, then
    /// replace the population with the elite plus children. Population size is
    /// invariant across generations.
    fn step(&mut self) {
        let n = self.ga.population_size;

        let mut children: Vec<Individual> = Vec::with_capacity(n);
        while children.len() < n {
            let p1 = self.tournament_select();
            let p2 = self.tournament_select();

            let (mut c1, mut c2) = if self.rng.random::<f64>() < self.ga.crossover_rate {
                self.blend_crossover(p1, p2)
            } else {
                (
                    self.population[p1].genes.clone(),
                    self.population[p2].genes.clone(),
                )
            };

            self.mutate(&mut c1);
            self.mutate(&mut c2);
            clamp_into_bounds(&mut c1, &self.bounds);
            clamp_into_bounds(&mut c2, &self.bounds);

            children.push(Individual {
                genes: c1,
                fitness: UNEVALUATED,
            });
            if children.len() < n {
                children.push(Individual {
                    genes: c2,
                    fitness: UNEVALUATED,
                });
            }
        }

        score(
            &mut children,
            self.scenario,
            &self.bounds,
            self.coordination,
            self.curve,
        );

        // Elitism: the best of parents and children survives unchanged; the
        // remaining slots go to children.
        let parent_elite = self.best_of_population().clone();
        let (child_elite_idx, child_elite_fitness) = children
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.fitness
                    .partial_cmp(&b.fitness)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, ind)| (i, ind.fitness))
            .expect("children are never empty");

        // One child slot makes room for the elite: the elite child itself if
        // it won (no duplication), otherwise the worst child.
        let elite_is_child = child_elite_fitness < parent_elite.fitness;
        let drop_idx = if elite_is_child {
            child_elite_idx
        } else {
            children
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| {
                    a.fitness
                        .partial_cmp(&b.fitness)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(i, _)| i)
                .expect("children are never empty")
        };
        let elite = if elite_is_child {
            children[child_elite_idx].clone()
        } else {
            parent_elite
        };

        let mut next_generation = Vec::with_capacity(n);
        next_generation.push(elite);
        next_generation.extend(
            children
                .into_iter()
                .enumerate()
                .filter(|(i, _)| *i != drop_idx)
                .map(|(_, child)| child),
        );

        self.population = next_generation;
    }

    /// k-tournament: sample `tournament_size` individuals uniformly, return
    /// the index of the lowest-fitness one.
    fn tournament_select(&mut self) -> usize {
        let len = self.population.len();
        let mut winner = self.rng.random_range(0..len);
        for _ in 1..self.ga.tournament_size {
            let contender = self.rng.random_range(0..len);
            if self.population[contender].fitness < self.population[winner].fitness {
                winner = contender;
            }
        }
        winner
    }

    /// BLX-alpha blend crossover: each child gene is sampled uniformly from
    /// the parents' interval expanded by `blend_alpha` on both sides.
    fn blend_crossover(&mut self, p1: usize, p2: usize) -> (Vec<f64>, Vec<f64>) {
        let alpha = self.ga.blend_alpha;
        let a = &self.population[p1].genes;
        let b = &self.population[p2].genes;
        let mut c1 = Vec::with_capacity(a.len());
        let mut c2 = Vec::with_capacity(a.len());

        for (&x, &y) in a.iter().zip(b.iter()) {
            let lo = x.min(y);
            let hi = x.max(y);
            let span = (hi - lo) * alpha;
            let range = (hi - lo) + 2.0 * span;
            c1.push(lo - span + self.rng.random::<f64>() * range);
            c2.push(lo - span + self.rng.random::<f64>() * range);
        }
        (c1, c2)
    }

    /// Per-gene perturbation: with probability `mutation_rate`, shift a gene
    /// by uniform noise scaled to `mutation_scale` of its bound range. The
    /// caller clamps afterwards; mutation never silently skips repair.
    fn mutate(&mut self, genes: &mut [f64]) {
        for (gene, (lo, hi)) in genes.iter_mut().zip(&self.bounds) {
            if self.rng.random::<f64>() < self.ga.mutation_rate {
                let step = (hi - lo) * self.ga.mutation_scale;
                *gene += (self.rng.random::<f64>() * 2.0 - 1.0) * step;
            }
        }
    }

    fn best_of_population(&self) -> &Individual {
        self.population
            .iter()
            .min_by(|a, b| {
                a.fitness
                    .partial_cmp(&b.fitness)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("population is never empty after initialization")
    }
}

/// Derives per-gene bounds for a scenario: TDS bounds are global, each
/// relay's pickup upper bound is `max_pickup_factor` times the smallest fault
/// current it sees (a pickup above that would blind the relay in at least one
/// pair).
fn derive_bounds(
    scenario: &Scenario,
    coordination: &CoordinationConfig,
) -> Result<Vec<(f64, f64)>, EngineError> {
    let n = scenario.relays.len();
    let mut bounds = Vec::with_capacity(2 * n);

    for _ in 0..n {
        bounds.push((coordination.tds_min, coordination.tds_max));
    }
    for relay in &scenario.relays {
        let hi = coordination.max_pickup_factor * relay.min_fault_current;
        if hi <= coordination.pickup_min {
            return Err(EngineError::DegenerateBounds {
                relay: relay.id.clone(),
                lo: coordination.pickup_min,
                hi,
            });
        }
        bounds.push((coordination.pickup_min, hi));
    }
    Ok(bounds)
}

fn clamp_into_bounds(genes: &mut [f64], bounds: &[(f64, f64)]) {
    for (gene, (lo, hi)) in genes.iter_mut().zip(bounds) {
        *gene = gene.clamp(*lo, *hi);
    }
}

/// Scores a set of individuals in parallel. Pure fan-out/fan-in: the scenario
/// is a shared read-only borrow, each evaluation is independent.
fn score(
    individuals: &mut [Individual],
    scenario: &Scenario,
    bounds: &[(f64, f64)],
    coordination: &CoordinationConfig,
    curve: &CurveConfig,
) {
    let fitnesses: Vec<f64> = individuals
        .par_iter()
        .map(|ind| fitness(&evaluate(scenario, &ind.genes, bounds, coordination, curve)))
        .collect();
    for (ind, f) in individuals.iter_mut().zip(fitnesses) {
        ind.fitness = f;
    }
}
