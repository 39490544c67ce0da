//! Evolutionary-calibration framework: bounded real-vector individuals,
//! a tournament-based steady-state DE breeder and SHADE/L-SHADE, plus
//! the run drivers that orchestrate breeding, evaluation and exchange
//! under an evaluation budget.

pub mod individual;
pub mod jfde;
pub mod shade;

use self::individual::{Individual, Population, Species};
use self::jfde::JfdeBreeder;
use self::shade::{ShadeMode, ShadeSubPopulation};
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvolutionError {
    /// Malformed setup (out-of-range rates, undersized populations).
    /// Fatal immediately, never retried.
    #[error("invalid optimizer configuration: {0}")]
    Config(String),
    #[error("invalid distribution parameter: {0}")]
    Distribution(String),
}

/// In-place fitness assignment.
///
/// Implementations set `fitness` and `evaluated`; an infeasible
/// parameter set scores `f64::INFINITY` rather than failing the run.
pub trait Evaluator {
    fn evaluate(&mut self, individual: &mut Individual) -> Result<()>;
}

/// Outcome of a calibration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub best_genome: Vec<f64>,
    pub best_fitness: f64,
    pub evaluations: usize,
    /// Best fitness after each generation (or steady-state sweep).
    pub trace: Vec<f64>,
}

fn evaluate_population<E: Evaluator>(
    population: &mut Population,
    evaluator: &mut E,
    n_evals: &mut usize,
) -> Result<()> {
    for individual in &mut population.individuals {
        if !individual.evaluated {
            evaluator
                .evaluate(individual)
                .context("failed to evaluate individual")?;
            *n_evals += 1;
        }
    }
    Ok(())
}

/// Steady-state evolution driver embedding the JFDE breeder.
///
/// Each sweep breeds two offspring, evaluates them and lets each compete
/// against a deselected victim.
pub struct SteadyStateRun {
    breeder: JfdeBreeder,
    population: Population,
    max_evals: usize,
    n_evals: usize,
    rng: ChaCha12Rng,
    stop: bool,
}

impl SteadyStateRun {
    pub fn new(
        species: Species,
        population_size: usize,
        f: f64,
        replace_prob: f64,
        max_evals: usize,
        seed: u64,
    ) -> Result<Self, EvolutionError> {
        let breeder = JfdeBreeder::new(f, replace_prob)?;
        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        let population = Population::random(species, population_size, &mut rng);
        breeder.check_population(&population)?;

        Ok(Self {
            breeder,
            population,
            max_evals,
            n_evals: 0,
            rng,
            stop: false,
        })
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    pub fn run<E: Evaluator>(&mut self, evaluator: &mut E) -> Result<RunReport> {
        evaluate_population(&mut self.population, evaluator, &mut self.n_evals)?;

        let mut trace = Vec::new();
        while self.n_evals + 2 <= self.max_evals && !self.stop {
            let mut children = self.breeder.breed(&self.population, &mut self.rng);
            for child in &mut children {
                evaluator
                    .evaluate(child)
                    .context("failed to evaluate offspring")?;
                self.n_evals += 1;
            }
            for child in children {
                let victim = self.breeder.deselect(&self.population, &mut self.rng);
                self.breeder
                    .replace(&mut self.population, victim, child, &mut self.rng);
            }

            let best = self.population.best_index();
            trace.push(self.population.individuals[best].fitness);
        }

        let best = self.population.best_index();
        let best = &self.population.individuals[best];
        log::info!(
            "steady-state run finished: {} evaluations, best fitness {:.6}",
            self.n_evals,
            best.fitness
        );

        Ok(RunReport {
            best_genome: best.genome.clone(),
            best_fitness: best.fitness,
            evaluations: self.n_evals,
            trace,
        })
    }
}

/// Generational SHADE/L-SHADE driver.
///
/// Each generation breeds one trial per target, evaluates the trials,
/// runs the post-breeding exchange (selection, archive, memory update)
/// and, in L-SHADE mode, shrinks the population toward the budget.
pub struct ShadeRun {
    subpop: ShadeSubPopulation,
    max_evals: usize,
    n_evals: usize,
    rng: ChaCha12Rng,
    stop: bool,
}

impl ShadeRun {
    pub fn new(
        species: Species,
        population_size: usize,
        mode: ShadeMode,
        pbest_rate: f64,
        arc_rate: f64,
        max_evals: usize,
        seed: u64,
    ) -> Result<Self, EvolutionError> {
        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        let population = Population::random(species, population_size, &mut rng);
        let subpop = ShadeSubPopulation::new(population, mode, pbest_rate, arc_rate)?;

        Ok(Self {
            subpop,
            max_evals,
            n_evals: 0,
            rng,
            stop: false,
        })
    }

    pub fn subpopulation(&self) -> &ShadeSubPopulation {
        &self.subpop
    }

    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    pub fn run<E: Evaluator>(&mut self, evaluator: &mut E) -> Result<RunReport> {
        evaluate_population(&mut self.subpop.population, evaluator, &mut self.n_evals)?;

        let mut trace = Vec::new();
        while self.n_evals + self.subpop.population.len() <= self.max_evals && !self.stop {
            let mut generation = self.subpop.breed(&mut self.rng)?;
            for child in &mut generation.children {
                evaluator
                    .evaluate(child)
                    .context("failed to evaluate trial")?;
                self.n_evals += 1;
            }

            self.subpop.exchange(generation, &mut self.rng);
            self.subpop.reduce(self.n_evals, self.max_evals, &mut self.rng);

            let best = self.subpop.population.best_index();
            trace.push(self.subpop.population.individuals[best].fitness);
        }

        let best = self.subpop.population.best_index();
        let best = &self.subpop.population.individuals[best];
        log::info!(
            "SHADE run finished: {} evaluations, population {}, best fitness {:.6}",
            self.n_evals,
            self.subpop.population.len(),
            best.fitness
        );

        Ok(RunReport {
            best_genome: best.genome.clone(),
            best_fitness: best.fitness,
            evaluations: self.n_evals,
            trace,
        })
    }
}
