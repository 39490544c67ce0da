//! Success-history adaptive differential evolution (SHADE), with the
//! optional linear population-size reduction of L-SHADE.
//!
//! The subpopulation owns the parameter memories, the per-generation
//! success scratch and the bounded archive of displaced individuals.
//! Breeding produces one trial per target with current-to-pbest/1
//! mutation drawing donors from the population and the archive; the
//! post-breeding exchange performs selection, archives displaced parents
//! and updates one circular memory slot with Lehmer means weighted by
//! fitness improvement.

use super::EvolutionError;
use crate::evolution::individual::{Individual, Population};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::{Cauchy, Normal};
use serde::{Deserialize, Serialize};

/// Memory value meaning "crossover rate is always zero".
pub const CR_SENTINEL: f64 = -1.0;

/// Hard floor of the p-best pool.
const MIN_P_NUM: usize = 2;

/// L-SHADE never shrinks the population below this.
const MIN_POPULATION: usize = 4;

/// Initial value of both parameter memories.
const MEMORY_INIT: f64 = 0.5;

/// Scale of the F (Cauchy) and Cr (Gaussian) samplers.
const PARAM_SCALE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadeMode {
    Shade,
    Lshade,
}

impl ShadeMode {
    /// Parse the configuration selector string.
    pub fn from_selector(selector: &str) -> Result<Self, EvolutionError> {
        match selector {
            "SHADE" => Ok(Self::Shade),
            "LSHADE" => Ok(Self::Lshade),
            other => Err(EvolutionError::Config(format!(
                "unknown SHADE mode selector {other:?}"
            ))),
        }
    }
}

/// Trial vectors of one generation plus the parameters that bred them.
#[derive(Debug, Clone)]
pub struct BredGeneration {
    pub children: Vec<Individual>,
    /// `(F, Cr)` per child, consumed by the memory update.
    pub params: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadeSubPopulation {
    pub population: Population,
    mode: ShadeMode,
    pbest_rate: f64,
    arc_rate: f64,

    memory_sf: Vec<f64>,
    memory_cr: Vec<f64>,
    memory_pos: usize,

    // Per-generation scratch, reset by each exchange.
    success_sf: Vec<f64>,
    success_cr: Vec<f64>,
    dif_fitness: Vec<f64>,

    archive: Vec<Individual>,
    arc_size: usize,

    init_size: usize,
}

impl ShadeSubPopulation {
    pub fn new(
        population: Population,
        mode: ShadeMode,
        pbest_rate: f64,
        arc_rate: f64,
    ) -> Result<Self, EvolutionError> {
        if population.len() < MIN_POPULATION {
            return Err(EvolutionError::Config(format!(
                "population must hold at least {MIN_POPULATION} individuals, but holds {}",
                population.len()
            )));
        }
        if !(0.0..=1.0).contains(&pbest_rate) {
            return Err(EvolutionError::Config(format!(
                "p-best rate must be in [0, 1], but is {pbest_rate}"
            )));
        }
        if !(0.0..=10.0).contains(&arc_rate) {
            return Err(EvolutionError::Config(format!(
                "archive rate must be in [0, 10], but is {arc_rate}"
            )));
        }

        let memory_size = population.species.genome_size();
        let arc_size = (arc_rate * population.len() as f64).round() as usize;
        let init_size = population.len();

        Ok(Self {
            population,
            mode,
            pbest_rate,
            arc_rate,
            memory_sf: vec![MEMORY_INIT; memory_size],
            memory_cr: vec![MEMORY_INIT; memory_size],
            memory_pos: 0,
            success_sf: Vec::new(),
            success_cr: Vec::new(),
            dif_fitness: Vec::new(),
            archive: Vec::new(),
            arc_size,
            init_size,
        })
    }

    pub fn memory_sf(&self) -> &[f64] {
        &self.memory_sf
    }

    pub fn memory_cr(&self) -> &[f64] {
        &self.memory_cr
    }

    pub fn archive_len(&self) -> usize {
        self.archive.len()
    }

    pub fn arc_size(&self) -> usize {
        self.arc_size
    }

    /// Size of the p-best pool, floored at 2.
    pub fn p_num(&self) -> usize {
        let p_num = (self.pbest_rate * self.population.len() as f64).round() as usize;
        p_num.max(MIN_P_NUM)
    }

    /// Breed one trial per target individual.
    pub fn breed(&self, rng: &mut ChaCha12Rng) -> Result<BredGeneration, EvolutionError> {
        let pop_size = self.population.len();
        let genome_size = self.population.species.genome_size();
        let sorted = self.population.sorted_indices();
        let p_num = self.p_num();

        let mut children = Vec::with_capacity(pop_size);
        let mut params = Vec::with_capacity(pop_size);

        for target_idx in 0..pop_size {
            let slot = rng.random_range(0..self.memory_sf.len());
            let f = self.sample_f(self.memory_sf[slot], rng)?;
            let cr = self.sample_cr(self.memory_cr[slot], rng)?;

            let pbest_idx = sorted[rng.random_range(0..p_num)];

            let r1 = loop {
                let idx = rng.random_range(0..pop_size);
                if idx != target_idx {
                    break idx;
                }
            };
            // r2 is drawn from the union of the live population and the
            // archive; archive entries follow the population indices.
            let r2 = loop {
                let idx = rng.random_range(0..pop_size + self.archive.len());
                if idx != target_idx && idx != r1 {
                    break idx;
                }
            };

            let target = &self.population.individuals[target_idx].genome;
            let pbest = &self.population.individuals[pbest_idx].genome;
            let donor_r1 = &self.population.individuals[r1].genome;
            let donor_r2 = if r2 < pop_size {
                &self.population.individuals[r2].genome
            } else {
                &self.archive[r2 - pop_size].genome
            };

            let cross_point = rng.random_range(0..genome_size);
            let mut genome = Vec::with_capacity(genome_size);
            for gene_idx in 0..genome_size {
                let val = if gene_idx == cross_point || rng.random_bool(cr) {
                    let trial = target[gene_idx]
                        + f * (pbest[gene_idx] - target[gene_idx])
                        + f * (donor_r1[gene_idx] - donor_r2[gene_idx]);
                    self.population
                        .species
                        .repair(gene_idx, trial, target[gene_idx])
                } else {
                    target[gene_idx]
                };
                genome.push(val);
            }

            children.push(Individual::new(genome));
            params.push((f, cr));
        }

        Ok(BredGeneration { children, params })
    }

    /// Cauchy-distributed scale factor: resample until positive, clamp
    /// to at most 1.
    fn sample_f(&self, location: f64, rng: &mut ChaCha12Rng) -> Result<f64, EvolutionError> {
        let dist = Cauchy::new(location, PARAM_SCALE)
            .map_err(|err| EvolutionError::Distribution(err.to_string()))?;
        let f = loop {
            let sample = dist.sample(rng);
            if sample > 0.0 {
                break sample;
            }
        };
        Ok(f.min(1.0))
    }

    /// Gaussian crossover rate clamped to `[0, 1]`; the sentinel memory
    /// value forces 0.
    fn sample_cr(&self, location: f64, rng: &mut ChaCha12Rng) -> Result<f64, EvolutionError> {
        if location == CR_SENTINEL {
            return Ok(0.0);
        }
        let dist = Normal::new(location, PARAM_SCALE)
            .map_err(|err| EvolutionError::Distribution(err.to_string()))?;
        Ok(dist.sample(rng).clamp(0.0, 1.0))
    }

    /// Post-breeding selection, archiving and memory update.
    ///
    /// Children must be evaluated. Equal fitness replaces without
    /// archiving; strict improvement archives the displaced parent and
    /// records the successful `(F, Cr)` pair with its improvement
    /// magnitude; otherwise the parent is retained.
    pub fn exchange(&mut self, generation: BredGeneration, rng: &mut ChaCha12Rng) {
        self.success_sf.clear();
        self.success_cr.clear();
        self.dif_fitness.clear();

        for (target_idx, (child, (f, cr))) in generation
            .children
            .into_iter()
            .zip(generation.params)
            .enumerate()
        {
            let parent_fitness = self.population.individuals[target_idx].fitness;

            if child.fitness == parent_fitness {
                self.population.individuals[target_idx] = child;
            } else if child.fitness < parent_fitness {
                let improvement = parent_fitness - child.fitness;
                let displaced =
                    std::mem::replace(&mut self.population.individuals[target_idx], child);
                self.push_archive(displaced, rng);
                // An infeasible parent has infinite fitness, so its
                // improvement is infinite and would turn the Lehmer
                // weights into NaN.
                if improvement.is_finite() {
                    self.success_sf.push(f);
                    self.success_cr.push(cr);
                    self.dif_fitness.push(improvement);
                }
            }
        }

        if !self.success_sf.is_empty() {
            self.update_memory();
        }
    }

    /// Bounded archive insert with random eviction when full. Entries
    /// are clones, never aliases of live individuals.
    fn push_archive(&mut self, individual: Individual, rng: &mut ChaCha12Rng) {
        if self.arc_size == 0 {
            return;
        }
        if self.archive.len() < self.arc_size {
            self.archive.push(individual);
        } else {
            let evicted = rng.random_range(0..self.archive.len());
            self.archive[evicted] = individual;
        }
    }

    /// Update exactly one circular memory slot with the improvement-
    /// weighted Lehmer means of the successful parameters.
    fn update_memory(&mut self) {
        let total: f64 = self.dif_fitness.iter().sum();

        let mut sf_num = 0.0;
        let mut sf_den = 0.0;
        let mut cr_num = 0.0;
        let mut cr_den = 0.0;
        for ((&sf, &cr), &dif) in self
            .success_sf
            .iter()
            .zip(self.success_cr.iter())
            .zip(self.dif_fitness.iter())
        {
            let weight = dif / total;
            sf_num += weight * sf * sf;
            sf_den += weight * sf;
            cr_num += weight * cr * cr;
            cr_den += weight * cr;
        }

        self.memory_sf[self.memory_pos] = sf_num / sf_den;
        self.memory_cr[self.memory_pos] = if cr_den == 0.0 {
            CR_SENTINEL
        } else {
            cr_num / cr_den
        };

        self.memory_pos = (self.memory_pos + 1) % self.memory_sf.len();
    }

    /// L-SHADE linear population-size reduction.
    ///
    /// The planned size interpolates between the initial size and the
    /// floor of 4 over the evaluation budget; excess individuals are
    /// removed worst-first and the archive capacity shrinks
    /// proportionally. No-op in plain SHADE mode.
    pub fn reduce(&mut self, n_evals: usize, max_evals: usize, rng: &mut ChaCha12Rng) {
        if self.mode != ShadeMode::Lshade {
            return;
        }

        let span = MIN_POPULATION as f64 - self.init_size as f64;
        let planned =
            (span / max_evals as f64 * n_evals as f64 + self.init_size as f64).round() as usize;
        let planned = planned.max(MIN_POPULATION);

        if self.population.len() > planned {
            let n_redu = self.population.len() - planned;
            self.reduce_population_with_sort(n_redu);

            self.arc_size = (self.arc_rate * self.population.len() as f64).round() as usize;
            while self.archive.len() > self.arc_size {
                let evicted = rng.random_range(0..self.archive.len());
                self.archive.swap_remove(evicted);
            }
        }
    }

    /// Remove the `n_redu` worst-fitness individuals, one at a time.
    pub fn reduce_population_with_sort(&mut self, n_redu: usize) {
        for _ in 0..n_redu {
            if self.population.len() <= MIN_POPULATION {
                break;
            }
            let sorted = self.population.sorted_indices();
            let worst = sorted[sorted.len() - 1];
            self.population.individuals.remove(worst);
        }
    }
}
