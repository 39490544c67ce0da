//! Vector-of-doubles individuals and their bounded species.

use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};

/// A candidate parameter vector with its (minimized) fitness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub genome: Vec<f64>,
    pub fitness: f64,
    pub evaluated: bool,
}

impl Individual {
    pub fn new(genome: Vec<f64>) -> Self {
        Self {
            genome,
            fitness: f64::INFINITY,
            evaluated: false,
        }
    }

    /// Lower fitness is better throughout the calibration stack.
    pub fn better_than(&self, other: &Individual) -> bool {
        self.fitness < other.fitness
    }

    pub fn equivalent_to(&self, other: &Individual) -> bool {
        self.fitness == other.fitness
    }
}

/// Genome layout: per-gene bounds shared by every individual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub min_gene: Vec<f64>,
    pub max_gene: Vec<f64>,
}

impl Species {
    pub fn new(min_gene: Vec<f64>, max_gene: Vec<f64>) -> Self {
        debug_assert_eq!(min_gene.len(), max_gene.len());
        Self { min_gene, max_gene }
    }

    pub fn genome_size(&self) -> usize {
        self.min_gene.len()
    }

    /// Sample a fresh unevaluated individual uniformly within bounds.
    pub fn new_individual(&self, rng: &mut ChaCha12Rng) -> Individual {
        let genome = self
            .min_gene
            .iter()
            .zip(self.max_gene.iter())
            .map(|(&min, &max)| rng.random_range(min..max))
            .collect();
        Individual::new(genome)
    }

    /// Clamp every gene to its declared bounds.
    pub fn clamp(&self, genome: &mut [f64]) {
        for (gene, (&min, &max)) in genome
            .iter_mut()
            .zip(self.min_gene.iter().zip(self.max_gene.iter()))
        {
            *gene = gene.clamp(min, max);
        }
    }

    /// Repair an out-of-bounds gene by averaging with the parent value
    /// (SHADE convention, preserves diversity better than clamping).
    pub fn repair(&self, idx: usize, val: f64, parent: f64) -> f64 {
        if val < self.min_gene[idx] {
            (self.min_gene[idx] + parent) / 2.0
        } else if val > self.max_gene[idx] {
            (self.max_gene[idx] + parent) / 2.0
        } else {
            val
        }
    }
}

/// Indexed population arena.
///
/// Individuals are addressed by index everywhere (p-best pools, archives,
/// tournament winners) instead of holding references to each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    pub species: Species,
    pub individuals: Vec<Individual>,
}

impl Population {
    pub fn random(species: Species, size: usize, rng: &mut ChaCha12Rng) -> Self {
        let individuals = (0..size).map(|_| species.new_individual(rng)).collect();
        Self {
            species,
            individuals,
        }
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// Index of the best (lowest-fitness) individual.
    pub fn best_index(&self) -> usize {
        let mut best = 0;
        for (idx, individual) in self.individuals.iter().enumerate() {
            if individual.better_than(&self.individuals[best]) {
                best = idx;
            }
        }
        best
    }

    /// Indices sorted by ascending fitness (best first).
    pub fn sorted_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.individuals.len()).collect();
        indices.sort_by(|&a, &b| {
            self.individuals[a]
                .fitness
                .total_cmp(&self.individuals[b].fitness)
        });
        indices
    }
}
