//! Sales scheduling.
//!
//! Converts the aggregate seasonality signal (expected real-unit sales
//! per step) into discrete, individually-attributable purchase events,
//! respecting per-segment market-share caps, per-brand availability,
//! agent awareness and the decision-cycle cool-down.

use crate::config::{MarketConfig, ScenarioConfig};
use crate::decision::{DecisionError, DecisionMaker};
use crate::model::{Agent, BitSet};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::weighted::WeightedIndex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sales counts indexed by `[brand][segment][step]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesTensor {
    n_brands: usize,
    n_segments: usize,
    n_steps: usize,
    counts: Vec<u32>,
}

impl SalesTensor {
    pub fn new(n_brands: usize, n_segments: usize, n_steps: usize) -> Self {
        Self {
            n_brands,
            n_segments,
            n_steps,
            counts: vec![0; n_brands * n_segments * n_steps],
        }
    }

    fn idx(&self, brand: usize, segment: usize, step: usize) -> usize {
        (brand * self.n_segments + segment) * self.n_steps + step
    }

    pub fn record(&mut self, brand: usize, segment: usize, step: usize) {
        let idx = self.idx(brand, segment, step);
        self.counts[idx] += 1;
    }

    pub fn get(&self, brand: usize, segment: usize, step: usize) -> u32 {
        self.counts[self.idx(brand, segment, step)]
    }

    /// Simulated sales of one brand at one step, summed over segments.
    pub fn brand_step_total(&self, brand: usize, step: usize) -> u32 {
        (0..self.n_segments)
            .map(|segment| self.get(brand, segment, step))
            .sum()
    }

    /// Total simulated sales at one step.
    pub fn step_total(&self, step: usize) -> u32 {
        (0..self.n_brands)
            .map(|brand| self.brand_step_total(brand, step))
            .sum()
    }

    /// Total simulated sales of one segment at one step.
    pub fn segment_step_total(&self, segment: usize, step: usize) -> u32 {
        (0..self.n_brands)
            .map(|brand| self.get(brand, segment, step))
            .sum()
    }
}

/// Cause attached to a failed carry-over audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnosis {
    /// Every segment pool is empty; the decision cycle is too long or
    /// awareness has decayed to zero.
    EmptyPools { segments: Vec<usize> },
    /// Candidates exist but too few agents know the brands.
    LowAwareness { mean_awareness: Vec<f64> },
    /// Candidates exist but the brands are rarely on the shelf.
    LowAvailability { mean_availability: Vec<f64> },
}

impl std::fmt::Display for Diagnosis {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyPools { segments } => {
                write!(fmt, "all candidate pools are empty (segments {segments:?})")
            }
            Self::LowAwareness { mean_awareness } => {
                write!(fmt, "low awareness (per-brand mean {mean_awareness:?})")
            }
            Self::LowAvailability { mean_availability } => {
                write!(fmt, "low availability (per-brand mean {mean_availability:?})")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    /// No segment has an eligible candidate left.
    #[error("no candidates remain in any segment pool at step {step}")]
    NoCandidates { step: usize },
    /// The periodic reconciliation found unspent carry-over.
    #[error("carry-over audit failed at step {step}: residual {residual:.3}: {diagnosis}")]
    Infeasible {
        step: usize,
        residual: f64,
        diagnosis: Diagnosis,
    },
    #[error("brand choice failed: {0}")]
    Decision(#[from] DecisionError),
}

/// Outcome of one `assign_sales` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub sales: usize,
    pub skipped: bool,
    pub carry_over: f64,
}

/// Stateful per-run sales scheduler.
///
/// Owns the candidate pools, the carry-over account and the
/// reactivation schedule; it is the exclusive mutator of all three.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesScheduler {
    seasonality: Vec<f64>,
    availability: Vec<Vec<f64>>,
    market_share: Vec<f64>,
    checkpoint_steps: usize,
    decision_cycle: usize,
    ratio: f64,

    carry_over: f64,
    pools: Vec<Vec<usize>>,
    in_pool: Vec<bool>,
    disabled: Vec<bool>,
    disabled_until: Vec<Vec<usize>>,
    stop: bool,

    history: Option<Vec<BitSet>>,
}

impl SalesScheduler {
    /// Build a scheduler over an agent population.
    ///
    /// Agents aware of at least one brand seed their segment's pool.
    pub fn new(market: &MarketConfig, scenario: &ScenarioConfig, agents: &[Agent]) -> Self {
        let n_steps = scenario.n_steps();
        let mut pools = vec![Vec::new(); market.n_segments];
        let mut in_pool = vec![false; agents.len()];
        for (idx, agent) in agents.iter().enumerate() {
            if agent.awareness.count() > 0 {
                pools[agent.segment_id()].push(idx);
                in_pool[idx] = true;
            }
        }

        Self {
            seasonality: scenario.seasonality.clone(),
            availability: scenario.availability.clone(),
            market_share: scenario.market_share.clone(),
            checkpoint_steps: scenario.checkpoint_steps,
            decision_cycle: scenario.decision_cycle,
            ratio: market.ratio(),
            carry_over: 0.0,
            pools,
            in_pool,
            disabled: vec![false; agents.len()],
            disabled_until: vec![Vec::new(); n_steps + scenario.decision_cycle + 1],
            stop: false,
            history: None,
        }
    }

    /// Record the exact buyer identities of every step, for replay in
    /// tests and audits.
    pub fn enable_history(&mut self) {
        let n_steps = self.seasonality.len();
        let n_clients = self.in_pool.len();
        self.history = Some(vec![BitSet::new(n_clients); n_steps]);
    }

    pub fn history(&self) -> Option<&[BitSet]> {
        self.history.as_deref()
    }

    pub fn carry_over(&self) -> f64 {
        self.carry_over
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn pool(&self, segment: usize) -> &[usize] {
        &self.pools[segment]
    }

    pub fn total_pool_size(&self) -> usize {
        self.pools.iter().map(Vec::len).sum()
    }

    pub fn is_disabled(&self, agent_idx: usize) -> bool {
        self.disabled[agent_idx]
    }

    /// Request cooperative cancellation; checked between dispatch-loop
    /// iterations.
    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    /// Assign the sales of one step.
    ///
    /// Runs the accrue / dispatch / audit / bookkeeping sequence of the
    /// scheduling state machine and writes purchase events into `sales`.
    pub fn assign_sales(
        &mut self,
        step: usize,
        agents: &[Agent],
        decision: &DecisionMaker,
        sales: &mut SalesTensor,
        rng: &mut ChaCha12Rng,
    ) -> Result<StepReport, ScheduleError> {
        // Accrue.
        self.carry_over += self.seasonality[step];

        // Dispatch loop. Attempts bound the iterations by the number of
        // eligible agents; only filtered-awareness failures consume one.
        let mut attempts = self.total_pool_size();
        let mut sold = 0;
        let mut skipped = false;

        while self.carry_over >= self.ratio * 0.5 && !self.stop {
            let segment = match self.roulette_segment(rng) {
                Some(segment) => segment,
                None => return Err(ScheduleError::NoCandidates { step }),
            };

            let pool_idx = rng.random_range(0..self.pools[segment].len());
            let agent_idx = self.pools[segment][pool_idx];
            let agent = &agents[agent_idx];

            let candidates = self.draw_available_aware(agent, step, rng);
            if candidates.is_empty() {
                attempts -= 1;
                if attempts == 0 {
                    skipped = true;
                    break;
                }
                continue;
            }

            let brand = decision.choose(&candidates, &agent.perceptions, segment, rng)?;
            sales.record(brand, segment, step);
            sold += 1;

            self.pools[segment].swap_remove(pool_idx);
            self.in_pool[agent_idx] = false;
            self.disabled[agent_idx] = true;
            self.disabled_until[step + self.decision_cycle].push(agent_idx);

            if let Some(history) = &mut self.history {
                history[step].set(agent.client_id(), true);
            }

            self.carry_over -= self.ratio;
        }

        // Checkpoint audit.
        if (step + 1) % self.checkpoint_steps == 0 && self.carry_over > self.ratio * 0.5 {
            return Err(ScheduleError::Infeasible {
                step,
                residual: self.carry_over,
                diagnosis: self.diagnose(step, agents),
            });
        }

        // End-of-step bookkeeping: reactivate agents whose cool-down
        // expires now, provided they still know at least one brand.
        let due = std::mem::take(&mut self.disabled_until[step]);
        for agent_idx in due {
            self.disabled[agent_idx] = false;
            if agents[agent_idx].awareness.count() > 0 {
                self.pools[agents[agent_idx].segment_id()].push(agent_idx);
                self.in_pool[agent_idx] = true;
            }
        }

        Ok(StepReport {
            sales: sold,
            skipped,
            carry_over: self.carry_over,
        })
    }

    /// Drop pool entries of agents that lost all awareness, and admit
    /// enabled agents that (re)gained it. Called by the engine after the
    /// diffusion phase mutates awareness.
    pub fn refresh_pools(&mut self, agents: &[Agent]) {
        for segment_pool in &mut self.pools {
            segment_pool.retain(|&agent_idx| {
                let keep = agents[agent_idx].awareness.count() > 0;
                if !keep {
                    self.in_pool[agent_idx] = false;
                }
                keep
            });
        }
        for (agent_idx, agent) in agents.iter().enumerate() {
            if !self.in_pool[agent_idx]
                && !self.disabled[agent_idx]
                && agent.awareness.count() > 0
            {
                self.pools[agent.segment_id()].push(agent_idx);
                self.in_pool[agent_idx] = true;
            }
        }
    }

    /// Roulette wheel over market-share weights, restricted to segments
    /// with non-empty pools. `None` when every pool is empty.
    fn roulette_segment(&self, rng: &mut ChaCha12Rng) -> Option<usize> {
        let weights: Vec<f64> = self
            .market_share
            .iter()
            .zip(self.pools.iter())
            .map(|(&share, pool)| if pool.is_empty() { 0.0 } else { share })
            .collect();
        if weights.iter().sum::<f64>() <= 0.0 {
            // A zero-share segment may still hold the only candidates.
            let fallback: Vec<usize> = (0..self.pools.len())
                .filter(|&segment| !self.pools[segment].is_empty())
                .collect();
            return fallback.choose(rng).copied();
        }
        let dist = WeightedIndex::new(&weights).ok()?;
        Some(dist.sample(rng))
    }

    /// Independent Bernoulli availability draws intersected with the
    /// agent's awareness.
    fn draw_available_aware(
        &self,
        agent: &Agent,
        step: usize,
        rng: &mut ChaCha12Rng,
    ) -> Vec<usize> {
        (0..agent.awareness.len())
            .filter(|&brand| {
                let available = rng.random_bool(self.availability[brand][step]);
                available && agent.awareness.get(brand)
            })
            .collect()
    }

    fn diagnose(&self, step: usize, agents: &[Agent]) -> Diagnosis {
        if self.pools.iter().all(Vec::is_empty) {
            return Diagnosis::EmptyPools {
                segments: (0..self.pools.len()).collect(),
            };
        }

        let n_brands = self.availability.len();
        let mut mean_awareness = vec![0.0; n_brands];
        for agent in agents {
            for brand in 0..n_brands {
                if agent.awareness.get(brand) {
                    mean_awareness[brand] += 1.0;
                }
            }
        }
        for mean in &mut mean_awareness {
            *mean /= agents.len() as f64;
        }
        let mean_availability: Vec<f64> = (0..n_brands)
            .map(|brand| self.availability[brand][step])
            .collect();

        let awareness_level = mean_awareness.iter().sum::<f64>() / n_brands as f64;
        let availability_level = mean_availability.iter().sum::<f64>() / n_brands as f64;
        if awareness_level <= availability_level {
            Diagnosis::LowAwareness { mean_awareness }
        } else {
            Diagnosis::LowAvailability { mean_availability }
        }
    }
}
