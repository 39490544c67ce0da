//! Tournament-based differential evolution (steady-state).
//!
//! Each breeding step samples six distinct indices through repeated
//! pairwise tournaments and uses them as two disjoint DE/rand/1 triples,
//! producing exactly two bound-clamped offspring. The embedding
//! steady-state loop replaces a deselected victim if the child is
//! strictly better, or probabilistically otherwise.

use super::EvolutionError;
use crate::evolution::individual::{Individual, Population};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;

/// Minimum population for six tournament winners without replacement.
const MIN_POPULATION: usize = 6;

#[derive(Debug, Clone)]
pub struct JfdeBreeder {
    /// DE scale factor.
    f: f64,
    /// Probability a non-improving child still replaces the victim.
    replace_prob: f64,
}

impl JfdeBreeder {
    pub fn new(f: f64, replace_prob: f64) -> Result<Self, EvolutionError> {
        if !(0.0..=2.0).contains(&f) {
            return Err(EvolutionError::Config(format!(
                "scale factor must be in [0, 2], but is {f}"
            )));
        }
        if !(0.0..=1.0).contains(&replace_prob) {
            return Err(EvolutionError::Config(format!(
                "replacement probability must be in [0, 1], but is {replace_prob}"
            )));
        }
        Ok(Self { f, replace_prob })
    }

    /// Check the population is large enough for the tournament sampling.
    pub fn check_population(&self, population: &Population) -> Result<(), EvolutionError> {
        if population.len() < MIN_POPULATION {
            return Err(EvolutionError::Config(format!(
                "population must hold at least {MIN_POPULATION} individuals, but holds {}",
                population.len()
            )));
        }
        Ok(())
    }

    /// Produce the two offspring of one steady-state step.
    pub fn breed(&self, population: &Population, rng: &mut ChaCha12Rng) -> [Individual; 2] {
        let winners = self.tournament_indices(population, rng);

        [
            self.de_rand_1(population, winners[0], winners[1], winners[2]),
            self.de_rand_1(population, winners[3], winners[4], winners[5]),
        ]
    }

    /// Six distinct indices, each the winner of a pairwise tournament
    /// (better fitness wins, ties broken randomly); duplicate winners are
    /// redrawn.
    fn tournament_indices(&self, population: &Population, rng: &mut ChaCha12Rng) -> [usize; 6] {
        let mut winners = [0; 6];
        let mut n_winners = 0;

        while n_winners < 6 {
            let a = rng.random_range(0..population.len());
            let b = rng.random_range(0..population.len());
            let ind_a = &population.individuals[a];
            let ind_b = &population.individuals[b];

            let winner = if ind_a.better_than(ind_b) {
                a
            } else if ind_b.better_than(ind_a) {
                b
            } else if rng.random_bool(0.5) {
                a
            } else {
                b
            };

            if !winners[..n_winners].contains(&winner) {
                winners[n_winners] = winner;
                n_winners += 1;
            }
        }

        winners
    }

    /// `child = base + F * (a - b)`, elementwise, clamped to bounds.
    fn de_rand_1(&self, population: &Population, base: usize, a: usize, b: usize) -> Individual {
        let base = &population.individuals[base].genome;
        let donor_a = &population.individuals[a].genome;
        let donor_b = &population.individuals[b].genome;

        let mut genome: Vec<f64> = base
            .iter()
            .zip(donor_a.iter().zip(donor_b.iter()))
            .map(|(&base, (&a, &b))| base + self.f * (a - b))
            .collect();
        population.species.clamp(&mut genome);

        Individual::new(genome)
    }

    /// Steady-state replacement: the victim dies if the child is strictly
    /// better, or with the configured probability otherwise.
    pub fn replace(
        &self,
        population: &mut Population,
        victim: usize,
        child: Individual,
        rng: &mut ChaCha12Rng,
    ) {
        let replaces = child.better_than(&population.individuals[victim])
            || rng.random_bool(self.replace_prob);
        if replaces {
            population.individuals[victim] = child;
        }
    }

    /// Deselection policy: worse member of a random pair dies.
    pub fn deselect(&self, population: &Population, rng: &mut ChaCha12Rng) -> usize {
        let a = rng.random_range(0..population.len());
        let b = rng.random_range(0..population.len());
        if population.individuals[a].better_than(&population.individuals[b]) {
            b
        } else {
            a
        }
    }
}
