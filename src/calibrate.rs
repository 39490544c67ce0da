//! Calibration of scenario parameters against historical sales.
//!
//! Each genome is decoded through the configured parameter targets into
//! a scenario, simulated end to end, and scored by the sum of squared
//! errors between simulated and target real-unit sales. Scheduling
//! infeasibility discards the parameter set (infinite fitness) without
//! aborting the calibration batch.

use crate::config::{CalibrationConfig, Config};
use crate::engine::Engine;
use crate::evolution::individual::{Individual, Species};
use crate::evolution::shade::ShadeMode;
use crate::evolution::{Evaluator, RunReport, ShadeRun, SteadyStateRun};
use crate::stats::sum_squared_error;
use anyhow::{Context, Result, bail};

/// Fitness function: one full simulation run per genome.
pub struct CalibrationEvaluator {
    base: Config,
    cal: CalibrationConfig,
    /// Seed of the inner simulation runs; fixed so every genome faces
    /// the same stochastic scenario.
    sim_seed: u64,
}

impl CalibrationEvaluator {
    pub fn new(base: Config, cal: CalibrationConfig) -> Self {
        let sim_seed = cal.seed.wrapping_add(1);
        Self {
            base,
            cal,
            sim_seed,
        }
    }

    /// Decode a genome into a runnable configuration.
    pub fn decode(&self, genome: &[f64]) -> Result<Config> {
        if genome.len() != self.cal.genes.len() {
            bail!(
                "genome length must be {}, but is {}",
                self.cal.genes.len(),
                genome.len()
            );
        }
        let mut config = self.base.clone();
        for (gene, &value) in self.cal.genes.iter().zip(genome.iter()) {
            gene.target.apply(&mut config, value);
        }
        config.validate().context("decoded config is invalid")?;
        Ok(config)
    }

    /// Simulated-vs-target error of one genome.
    ///
    /// `Ok(f64::INFINITY)` marks an infeasible parameter set.
    fn score(&self, genome: &[f64]) -> Result<f64> {
        let config = self.decode(genome)?;
        let ratio = config.market.ratio();
        let n_brands = config.market.n_brands;
        let n_steps = config.scenario.n_steps();

        let mut engine =
            Engine::with_seed(config, self.sim_seed).context("failed to build engine")?;
        if let Err(err) = engine.run_to_completion() {
            log::debug!("parameter set discarded: {err}");
            return Ok(f64::INFINITY);
        }

        let mut error = 0.0;
        for brand in 0..n_brands {
            let simulated: Vec<f64> = (0..n_steps)
                .map(|step| engine.sales().brand_step_total(brand, step) as f64 * ratio)
                .collect();
            error += sum_squared_error(&simulated, &self.cal.target_sales[brand]);
        }
        Ok(error)
    }
}

impl Evaluator for CalibrationEvaluator {
    fn evaluate(&mut self, individual: &mut Individual) -> Result<()> {
        individual.fitness = self.score(&individual.genome)?;
        individual.evaluated = true;
        Ok(())
    }
}

/// Build the genome species from the configured gene bounds.
pub fn species_from_genes(cal: &CalibrationConfig) -> Species {
    let min_gene = cal.genes.iter().map(|gene| gene.min).collect();
    let max_gene = cal.genes.iter().map(|gene| gene.max).collect();
    Species::new(min_gene, max_gene)
}

/// Run the configured calibration algorithm to its evaluation budget.
pub fn run_calibration(config: &Config) -> Result<RunReport> {
    let cal = config
        .calibration
        .clone()
        .context("config has no [calibration] section")?;
    let species = species_from_genes(&cal);
    let mut evaluator = CalibrationEvaluator::new(config.clone(), cal.clone());

    log::info!(
        "calibrating {} genes with {} (population {}, budget {})",
        cal.genes.len(),
        cal.algorithm,
        cal.population_size,
        cal.max_evaluations
    );

    let report = match cal.algorithm.as_str() {
        "JFDE" => {
            let mut run = SteadyStateRun::new(
                species,
                cal.population_size,
                cal.f,
                cal.replace_prob,
                cal.max_evaluations,
                cal.seed,
            )
            .context("failed to set up steady-state run")?;
            run.run(&mut evaluator)?
        }
        selector => {
            let mode = ShadeMode::from_selector(selector)
                .context("failed to select calibration algorithm")?;
            let mut run = ShadeRun::new(
                species,
                cal.population_size,
                mode,
                cal.pbest_rate,
                cal.arc_rate,
                cal.max_evaluations,
                cal.seed,
            )
            .context("failed to set up SHADE run")?;
            run.run(&mut evaluator)?
        }
    };

    Ok(report)
}
