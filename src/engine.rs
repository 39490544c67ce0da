use crate::config::Config;
use crate::decision::DecisionMaker;
use crate::model::{Agent, PERCEPTION_MAX};
use crate::scheduler::{SalesScheduler, SalesTensor, ScheduleError};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::{Normal, weighted::WeightedIndex};
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Record of the simulation at a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub step: usize,
    /// Simulated purchases per brand at this step.
    pub sales_by_brand: Vec<u32>,
    /// Residual carry-over after dispatch.
    pub carry_over: f64,
    /// Fraction of agents aware of each brand.
    pub awareness_share: Vec<f64>,
    /// Dispatch loop exhausted its attempts this step.
    pub skipped: bool,
}

/// Simulation engine.
///
/// Holds the configuration, agent population, sales scheduler and random
/// number generator, and provides methods to initialize, advance, save
/// and load simulation runs.
#[derive(Serialize, Deserialize)]
pub struct Engine {
    cfg: Config,
    step: usize,
    agents: Vec<Agent>,
    scheduler: SalesScheduler,
    sales: SalesTensor,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create a new `Engine` with a random initial agent population.
    pub fn generate_initial_condition(cfg: Config) -> Result<Self> {
        let rng = ChaCha12Rng::try_from_os_rng()?;
        Self::with_rng(cfg, rng)
    }

    /// Create a new `Engine` with a fixed seed (deterministic runs).
    pub fn with_seed(cfg: Config, seed: u64) -> Result<Self> {
        Self::with_rng(cfg, ChaCha12Rng::seed_from_u64(seed))
    }

    fn with_rng(cfg: Config, mut rng: ChaCha12Rng) -> Result<Self> {
        let market = &cfg.market;
        let scenario = &cfg.scenario;

        let segment_dist = WeightedIndex::new(&scenario.market_share)?;
        let perception_dist = Normal::new(0.0, scenario.perception_std_dev)?;

        let mut agents = Vec::with_capacity(market.n_agents);
        for client_id in 0..market.n_agents {
            let segment_id = segment_dist.sample(&mut rng);
            let mut agent = Agent::new(client_id, segment_id, market.n_brands, market.n_attributes);

            for brand in 0..market.n_brands {
                if rng.random_bool(scenario.base_awareness[brand]) {
                    agent.awareness.set(brand, true);
                }
                for attribute in 0..market.n_attributes {
                    let noise = perception_dist.sample(&mut rng);
                    let score = (scenario.perception_mean[brand][attribute] + noise)
                        .clamp(0.0, PERCEPTION_MAX);
                    agent.perceptions.set(brand, attribute, score);
                }
            }
            agents.push(agent);
        }

        let scheduler = SalesScheduler::new(market, scenario, &agents);
        let sales = SalesTensor::new(market.n_brands, market.n_segments, scenario.n_steps());

        Ok(Self {
            cfg,
            step: 0,
            agents,
            scheduler,
            sales,
            rng,
        })
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn sales(&self) -> &SalesTensor {
        &self.sales
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn scheduler(&self) -> &SalesScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut SalesScheduler {
        &mut self.scheduler
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn is_finished(&self) -> bool {
        self.step >= self.cfg.scenario.n_steps()
    }

    /// Advance up to `steps_per_file` steps and stream the resulting
    /// records to a binary trajectory file.
    pub fn perform_simulation<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let decision = DecisionMaker::new(&self.cfg.decision);
        let first = self.step;
        let last = (first + self.cfg.output.steps_per_file).min(self.cfg.scenario.n_steps());

        for step in first..last {
            let record = self
                .run_step(&decision)
                .with_context(|| format!("failed to perform step {step}"))?;

            encode::write(&mut writer, &record).context("failed to serialize record")?;

            if (step + 1) % self.cfg.scenario.checkpoint_steps == 0 || step + 1 == last {
                let progress = 100.0 * (step + 1) as f64 / self.cfg.scenario.n_steps() as f64;
                log::info!("completed {progress:06.2}%");
            }
        }

        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    /// Run the remaining steps without producing output.
    ///
    /// Used by the calibration evaluator, where a scheduling failure
    /// discards the parameter set rather than the batch.
    pub fn run_to_completion(&mut self) -> Result<(), ScheduleError> {
        let decision = DecisionMaker::new(&self.cfg.decision);
        while !self.is_finished() {
            self.run_step(&decision)?;
        }
        Ok(())
    }

    /// Perform one simulation step: awareness diffusion, pool refresh,
    /// then sales assignment.
    fn run_step(&mut self, decision: &DecisionMaker) -> Result<Record, ScheduleError> {
        let step = self.step;

        self.diffuse_awareness(decision)?;
        self.scheduler.refresh_pools(&self.agents);

        let report =
            self.scheduler
                .assign_sales(step, &self.agents, decision, &mut self.sales, &mut self.rng)?;

        let market = &self.cfg.market;
        let sales_by_brand = (0..market.n_brands)
            .map(|brand| self.sales.brand_step_total(brand, step))
            .collect();
        let awareness_share = (0..market.n_brands)
            .map(|brand| {
                let aware = self
                    .agents
                    .iter()
                    .filter(|agent| agent.awareness.get(brand))
                    .count();
                aware as f64 / self.agents.len() as f64
            })
            .collect();

        self.step += 1;

        Ok(Record {
            step,
            sales_by_brand,
            carry_over: report.carry_over,
            awareness_share,
            skipped: report.skipped,
        })
    }

    /// Mutate agent awareness: touchpoint reach, word-of-mouth between
    /// random peers, and forgetting decay.
    fn diffuse_awareness(&mut self, decision: &DecisionMaker) -> Result<(), ScheduleError> {
        let scenario = &self.cfg.scenario;
        let n_brands = self.cfg.market.n_brands;
        let n_agents = self.agents.len();

        for agent in &mut self.agents {
            for brand in 0..n_brands {
                if scenario.touchpoint_reach[brand] > 0.0
                    && self.rng.random_bool(scenario.touchpoint_reach[brand])
                {
                    agent.awareness.set(brand, true);
                }
            }
        }

        // Word of mouth: aware agents talk about one brand (picked by the
        // talk-mode heuristics) to a random peer.
        if scenario.wom_rate > 0.0 {
            let mut spread = Vec::new();
            for agent in &self.agents {
                if agent.awareness.count() == 0 || !self.rng.random_bool(scenario.wom_rate) {
                    continue;
                }
                let topic = decision.choose_topic(
                    &agent.awareness,
                    &agent.perceptions,
                    agent.segment_id(),
                    &mut self.rng,
                )?;
                let listener = self.rng.random_range(0..n_agents);
                spread.push((listener, topic));
            }
            for (listener, topic) in spread {
                self.agents[listener].awareness.set(topic, true);
            }
        }

        if scenario.awareness_decay > 0.0 {
            for agent in &mut self.agents {
                for brand in 0..n_brands {
                    if agent.awareness.get(brand)
                        && self.rng.random_bool(scenario.awareness_decay)
                    {
                        agent.awareness.set(brand, false);
                    }
                }
            }
        }

        Ok(())
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// Can be used to resume the simulation later.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self).context("failed to serialize engine")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let engine = decode::from_read(&mut reader).context("failed to deserialize engine")?;
        Ok(engine)
    }
}
