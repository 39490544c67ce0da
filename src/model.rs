//! Agent and market data types.

use serde::{Deserialize, Serialize};

pub const PERCEPTION_MAX: f64 = 10.0;
pub const PERCEPTION_MID: f64 = 5.0;

/// Compact fixed-capacity bit vector.
///
/// Used for per-agent brand awareness and for the per-step buyer-history
/// records of the sales scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitSet {
    n_bits: usize,
    blocks: Vec<u64>,
}

impl BitSet {
    /// Create an empty bit set with capacity for `n_bits` bits.
    pub fn new(n_bits: usize) -> Self {
        Self {
            n_bits,
            blocks: vec![0; n_bits.div_ceil(64)],
        }
    }

    pub fn len(&self) -> usize {
        self.n_bits
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|&block| block == 0)
    }

    pub fn set(&mut self, idx: usize, val: bool) {
        debug_assert!(idx < self.n_bits);
        if val {
            self.blocks[idx / 64] |= 1 << (idx % 64);
        } else {
            self.blocks[idx / 64] &= !(1 << (idx % 64));
        }
    }

    pub fn get(&self, idx: usize) -> bool {
        debug_assert!(idx < self.n_bits);
        self.blocks[idx / 64] & (1 << (idx % 64)) != 0
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.blocks
            .iter()
            .map(|block| block.count_ones() as usize)
            .sum()
    }

    /// Indices of all set bits, in ascending order.
    pub fn ones(&self) -> Vec<usize> {
        (0..self.n_bits).filter(|&idx| self.get(idx)).collect()
    }
}

/// Per-brand, per-attribute perception scores of a single agent.
///
/// Stored brand-major; scores live on the `0.0..=10.0` scale with 5.0 as
/// the neutral midpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Perceptions {
    n_attributes: usize,
    scores: Vec<f64>,
}

impl Perceptions {
    pub fn new(n_brands: usize, n_attributes: usize) -> Self {
        Self {
            n_attributes,
            scores: vec![PERCEPTION_MID; n_brands * n_attributes],
        }
    }

    pub fn n_attributes(&self) -> usize {
        self.n_attributes
    }

    pub fn get(&self, brand: usize, attribute: usize) -> f64 {
        self.scores[brand * self.n_attributes + attribute]
    }

    pub fn set(&mut self, brand: usize, attribute: usize, val: f64) {
        self.scores[brand * self.n_attributes + attribute] = val;
    }
}

/// Agent of the simulation.
///
/// Awareness is mutated by touchpoints and word-of-mouth diffusion;
/// decision-cycle state lives in the sales scheduler, which is its
/// exclusive mutator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    client_id: usize,
    segment_id: usize,
    pub awareness: BitSet,
    pub perceptions: Perceptions,
}

impl Agent {
    pub fn new(client_id: usize, segment_id: usize, n_brands: usize, n_attributes: usize) -> Self {
        Self {
            client_id,
            segment_id,
            awareness: BitSet::new(n_brands),
            perceptions: Perceptions::new(n_brands, n_attributes),
        }
    }

    pub fn client_id(&self) -> usize {
        self.client_id
    }

    pub fn segment_id(&self) -> usize {
        self.segment_id
    }
}
