use crate::config::Config;
use crate::engine::Record;
use crate::stats::Accumulator;
use anyhow::{Context, Result};
use rmp_serde::decode;
use std::{
    fs::File,
    io::{BufReader, BufWriter, ErrorKind},
    path::Path,
};

pub trait Obs {
    fn update(&mut self, record: &Record) -> Result<()>;
    fn report(&self) -> serde_json::Value;
}

/// Total and relative simulated sales per brand.
pub struct BrandShare {
    totals: Vec<u64>,
}

impl BrandShare {
    pub fn new(cfg: &Config) -> Self {
        Self {
            totals: vec![0; cfg.market.n_brands],
        }
    }
}

impl Obs for BrandShare {
    fn update(&mut self, record: &Record) -> Result<()> {
        for (total, &sold) in self.totals.iter_mut().zip(record.sales_by_brand.iter()) {
            *total += sold as u64;
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        let total: u64 = self.totals.iter().sum();
        let shares: Vec<f64> = self
            .totals
            .iter()
            .map(|&sold| {
                if total > 0 {
                    sold as f64 / total as f64
                } else {
                    f64::NAN
                }
            })
            .collect();
        serde_json::json!({ "sales_totals": self.totals, "sales_shares": shares })
    }
}

/// Mean and spread of the per-brand awareness share over the run.
pub struct AwarenessLevel {
    acc_vec: Vec<Accumulator>,
}

impl AwarenessLevel {
    pub fn new(cfg: &Config) -> Self {
        let mut acc_vec = Vec::new();
        acc_vec.resize_with(cfg.market.n_brands, Accumulator::new);
        Self { acc_vec }
    }
}

impl Obs for AwarenessLevel {
    fn update(&mut self, record: &Record) -> Result<()> {
        for (acc, &share) in self.acc_vec.iter_mut().zip(record.awareness_share.iter()) {
            acc.add(share);
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        let reports: Vec<_> = self.acc_vec.iter().map(|acc| acc.report()).collect();
        serde_json::json!({ "awareness_share": reports })
    }
}

/// Residual carry-over after dispatch, and how often dispatch gave up.
pub struct CarryOverResidual {
    acc: Accumulator,
    n_skipped: usize,
}

impl CarryOverResidual {
    pub fn new() -> Self {
        Self {
            acc: Accumulator::new(),
            n_skipped: 0,
        }
    }
}

impl Obs for CarryOverResidual {
    fn update(&mut self, record: &Record) -> Result<()> {
        self.acc.add(record.carry_over);
        if record.skipped {
            self.n_skipped += 1;
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "carry_over": self.acc.report(),
            "skipped_steps": self.n_skipped,
        })
    }
}

pub struct Analyzer {
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new(cfg: &Config) -> Self {
        let mut obs_ptr_vec: Vec<Box<dyn Obs>> = Vec::new();
        obs_ptr_vec.push(Box::new(BrandShare::new(cfg)));
        obs_ptr_vec.push(Box::new(AwarenessLevel::new(cfg)));
        obs_ptr_vec.push(Box::new(CarryOverResidual::new()));
        Self { obs_ptr_vec }
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);

        loop {
            let record: Record = match decode::from_read(&mut reader) {
                Ok(record) => record,
                Err(decode::Error::InvalidMarkerRead(err))
                    if err.kind() == ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(err) => return Err(err).context("failed to read record"),
            };
            for obs in &mut self.obs_ptr_vec {
                obs.update(&record).context("failed to update observable")?;
            }
        }
        Ok(())
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let writer = BufWriter::new(file);

        let reports: Vec<_> = self.obs_ptr_vec.iter().map(|obs| obs.report()).collect();
        serde_json::to_writer_pretty(writer, &reports)?;
        Ok(())
    }
}
