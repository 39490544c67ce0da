//! Brand-choice heuristics.
//!
//! A purchase (or a word-of-mouth topic pick) selects one brand from the
//! set an agent is aware of. Four interchangeable heuristics are drawn
//! probabilistically per decision from the segment's involvement and
//! emotional-response levels.

use crate::config::DecisionConfig;
use crate::model::{BitSet, PERCEPTION_MAX, PERCEPTION_MID, Perceptions};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::weighted::WeightedIndex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecisionError {
    /// The agent is not aware of any brand; no choice is possible.
    #[error("agent is not aware of any brand")]
    NoAwareness,
    #[error("invalid choice weights: {0}")]
    Weights(#[from] rand_distr::weighted::Error),
}

/// The four brand-choice strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristic {
    UtilityMaximization,
    MajorityRule,
    EliminationByAspects,
    Satisficing,
}

/// Per-segment brand-choice engine.
///
/// Holds the attribute importance weights (drivers) and the strategy-mix
/// levels of every segment; stateless across decisions.
#[derive(Debug, Clone)]
pub struct DecisionMaker {
    drivers: Vec<Vec<f64>>,
    involvement: Vec<f64>,
    emotional: Vec<f64>,
    cutoff_decrease: f64,
}

impl DecisionMaker {
    pub fn new(config: &DecisionConfig) -> Self {
        Self {
            drivers: config.drivers.clone(),
            involvement: config.involvement.clone(),
            emotional: config.emotional.clone(),
            cutoff_decrease: config.cutoff_decrease,
        }
    }

    /// Pick a brand to buy among `brands` (already filtered for awareness
    /// and availability by the caller).
    ///
    /// A single candidate is returned directly without consuming any
    /// randomness; an empty slice fails with
    /// [`DecisionError::NoAwareness`].
    pub fn choose(
        &self,
        brands: &[usize],
        perceptions: &Perceptions,
        segment: usize,
        rng: &mut ChaCha12Rng,
    ) -> Result<usize, DecisionError> {
        self.select(brands, perceptions, segment, false, rng)
    }

    /// Pick a brand to talk or post about among the aware brands.
    ///
    /// Perceptions are pre-transformed so that scores below the midpoint
    /// are reflected upwards, modelling agents preferentially discussing
    /// extreme (very good or very bad) attributes.
    pub fn choose_topic(
        &self,
        awareness: &BitSet,
        perceptions: &Perceptions,
        segment: usize,
        rng: &mut ChaCha12Rng,
    ) -> Result<usize, DecisionError> {
        let brands = awareness.ones();
        self.select(&brands, perceptions, segment, true, rng)
    }

    fn select(
        &self,
        brands: &[usize],
        perceptions: &Perceptions,
        segment: usize,
        talk: bool,
        rng: &mut ChaCha12Rng,
    ) -> Result<usize, DecisionError> {
        match brands {
            [] => return Err(DecisionError::NoAwareness),
            &[only] => return Ok(only),
            _ => {}
        }

        let view = PerceptionView {
            perceptions,
            talk,
        };
        let heuristic = self.draw_heuristic(segment, rng)?;
        let drivers = &self.drivers[segment];

        let brand = match heuristic {
            Heuristic::UtilityMaximization => {
                self.utility_maximization(brands, &view, drivers, rng)?
            }
            Heuristic::MajorityRule => self.majority_rule(brands, &view, drivers, rng),
            Heuristic::EliminationByAspects => {
                self.elimination_by_aspects(brands, &view, drivers, rng)?
            }
            Heuristic::Satisficing => self.satisficing(brands, &view, rng),
        };
        Ok(brand)
    }

    /// Draw a strategy from the segment's involvement (`i`) and emotional
    /// response (`e`): utility `i(1-e)`, majority rule `ie`, elimination
    /// `(1-i)(1-e)`, satisficing `(1-i)e`. The weights always sum to 1.
    fn draw_heuristic(
        &self,
        segment: usize,
        rng: &mut ChaCha12Rng,
    ) -> Result<Heuristic, DecisionError> {
        let inv = self.involvement[segment];
        let emo = self.emotional[segment];
        let weights = [
            inv * (1.0 - emo),
            inv * emo,
            (1.0 - inv) * (1.0 - emo),
            (1.0 - inv) * emo,
        ];
        let dist = WeightedIndex::new(weights)?;
        Ok(match dist.sample(rng) {
            0 => Heuristic::UtilityMaximization,
            1 => Heuristic::MajorityRule,
            2 => Heuristic::EliminationByAspects,
            _ => Heuristic::Satisficing,
        })
    }

    /// Softmax over driver-weighted attribute sums, then a weighted draw.
    fn utility_maximization(
        &self,
        brands: &[usize],
        view: &PerceptionView,
        drivers: &[f64],
        rng: &mut ChaCha12Rng,
    ) -> Result<usize, DecisionError> {
        let utilities: Vec<f64> = brands
            .iter()
            .map(|&brand| {
                drivers
                    .iter()
                    .enumerate()
                    .map(|(attr, &weight)| weight * view.get(brand, attr))
                    .sum()
            })
            .collect();

        let max_utility = utilities.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let probs: Vec<f64> = utilities
            .iter()
            .map(|&utility| (utility - max_utility).exp())
            .collect();

        let dist = WeightedIndex::new(&probs)?;
        Ok(brands[dist.sample(rng)])
    }

    /// Random pairwise tournament; each duel is decided by a coin flip
    /// weighted by the driver mass of the attributes each brand wins
    /// (ties split evenly).
    fn majority_rule(
        &self,
        brands: &[usize],
        view: &PerceptionView,
        drivers: &[f64],
        rng: &mut ChaCha12Rng,
    ) -> usize {
        let mut order = brands.to_vec();
        order.shuffle(rng);

        let mut survivor = order[0];
        for &challenger in &order[1..] {
            let mut score_s = 0.0;
            let mut score_c = 0.0;
            for (attr, &weight) in drivers.iter().enumerate() {
                let val_s = view.get(survivor, attr);
                let val_c = view.get(challenger, attr);
                if val_s > val_c {
                    score_s += weight;
                } else if val_c > val_s {
                    score_c += weight;
                } else {
                    score_s += weight / 2.0;
                    score_c += weight / 2.0;
                }
            }
            let total = score_s + score_c;
            let prob_survivor = if total > 0.0 { score_s / total } else { 0.5 };
            if !rng.random_bool(prob_survivor) {
                survivor = challenger;
            }
        }
        survivor
    }

    /// Visit attributes in weighted-random importance order; brands below
    /// a randomly drawn cutoff on the current attribute are eliminated.
    /// The cutoff is relaxed and the pass restarted whenever it would
    /// eliminate every remaining brand.
    fn elimination_by_aspects(
        &self,
        brands: &[usize],
        view: &PerceptionView,
        drivers: &[f64],
        rng: &mut ChaCha12Rng,
    ) -> Result<usize, DecisionError> {
        let mut remaining = brands.to_vec();

        for attr in weighted_order(drivers, rng)? {
            let mut cutoff = rng.random_range(0.0..PERCEPTION_MAX);
            loop {
                let filtered: Vec<usize> = remaining
                    .iter()
                    .copied()
                    .filter(|&brand| view.get(brand, attr) >= cutoff)
                    .collect();
                if !filtered.is_empty() {
                    remaining = filtered;
                    break;
                }
                cutoff -= self.cutoff_decrease;
                if cutoff <= 0.0 {
                    // Every perception is non-negative, so all brands pass.
                    break;
                }
            }
            if remaining.len() == 1 {
                return Ok(remaining[0]);
            }
        }

        // Attributes exhausted with several survivors.
        Ok(*remaining
            .choose(rng)
            .unwrap_or(&brands[0]))
    }

    /// Visit brands in random order; the first brand meeting all
    /// randomly-drawn per-attribute cutoffs wins. Cutoffs relax uniformly
    /// after each full unsuccessful pass.
    fn satisficing(
        &self,
        brands: &[usize],
        view: &PerceptionView,
        rng: &mut ChaCha12Rng,
    ) -> usize {
        let mut order = brands.to_vec();
        order.shuffle(rng);

        let n_attributes = view.perceptions.n_attributes();
        let mut cutoffs: Vec<f64> = (0..n_attributes)
            .map(|_| rng.random_range(0.0..PERCEPTION_MAX))
            .collect();

        loop {
            for &brand in &order {
                let qualifies = cutoffs
                    .iter()
                    .enumerate()
                    .all(|(attr, &cutoff)| view.get(brand, attr) >= cutoff);
                if qualifies {
                    return brand;
                }
            }
            // Cutoffs reach zero after finitely many passes, at which
            // point every brand qualifies.
            for cutoff in &mut cutoffs {
                *cutoff -= self.cutoff_decrease;
            }
            if cutoffs.iter().all(|&cutoff| cutoff <= 0.0) {
                return order[0];
            }
        }
    }
}

/// Perception accessor with the optional talk-mode reflection.
struct PerceptionView<'a> {
    perceptions: &'a Perceptions,
    talk: bool,
}

impl PerceptionView<'_> {
    fn get(&self, brand: usize, attribute: usize) -> f64 {
        let val = self.perceptions.get(brand, attribute);
        if self.talk && val < PERCEPTION_MID {
            2.0 * (PERCEPTION_MAX - val - PERCEPTION_MID)
        } else {
            val
        }
    }
}

/// Sample a visiting order over attributes, without replacement, with
/// probability proportional to the driver weights. Zero-weight rows fall
/// back to a uniform shuffle.
fn weighted_order(drivers: &[f64], rng: &mut ChaCha12Rng) -> Result<Vec<usize>, DecisionError> {
    let mut order = Vec::with_capacity(drivers.len());
    if drivers.iter().sum::<f64>() <= 0.0 {
        let mut idxs: Vec<usize> = (0..drivers.len()).collect();
        idxs.shuffle(rng);
        return Ok(idxs);
    }

    let mut weights = drivers.to_vec();
    for _ in 0..drivers.len() {
        if weights.iter().sum::<f64>() <= 0.0 {
            // Remaining attributes carry no weight; append them in place.
            for (attr, &weight) in weights.iter().enumerate() {
                if weight >= 0.0 && !order.contains(&attr) {
                    order.push(attr);
                }
            }
            break;
        }
        let dist = WeightedIndex::new(&weights)?;
        let attr = dist.sample(rng);
        order.push(attr);
        weights[attr] = 0.0;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecisionConfig;
    use rand::SeedableRng;

    fn maker() -> DecisionMaker {
        DecisionMaker::new(&DecisionConfig {
            drivers: vec![vec![0.5, 0.3, 0.2]],
            involvement: vec![0.5],
            emotional: vec![0.5],
            cutoff_decrease: 0.5,
        })
    }

    #[test]
    fn empty_candidate_set_fails() {
        let maker = maker();
        let perceptions = Perceptions::new(3, 3);
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        assert!(matches!(
            maker.choose(&[], &perceptions, 0, &mut rng),
            Err(DecisionError::NoAwareness)
        ));
    }

    #[test]
    fn talk_mode_reflects_low_scores() {
        let mut perceptions = Perceptions::new(1, 2);
        perceptions.set(0, 0, 1.0);
        perceptions.set(0, 1, 8.0);
        let view = PerceptionView {
            perceptions: &perceptions,
            talk: true,
        };
        assert_eq!(view.get(0, 0), 2.0 * (PERCEPTION_MAX - 1.0 - PERCEPTION_MID));
        assert_eq!(view.get(0, 1), 8.0);
    }

    #[test]
    fn weighted_order_visits_every_attribute_once() {
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let mut order = weighted_order(&[0.7, 0.0, 0.3], &mut rng).unwrap();
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
