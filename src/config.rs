use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub market: MarketConfig,
    pub scenario: ScenarioConfig,
    pub decision: DecisionConfig,
    pub output: OutputConfig,
    pub calibration: Option<CalibrationConfig>,
}

/// Market dimensions and population scale.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Number of brands.
    pub n_brands: usize,
    /// Number of perceptual attributes per brand.
    pub n_attributes: usize,
    /// Number of market segments.
    pub n_segments: usize,
    /// Number of simulated agents.
    pub n_agents: usize,
    /// Size of the real population the agents stand for.
    ///
    /// One simulated purchase represents `real_population / n_agents`
    /// real purchases.
    pub real_population: f64,
}

impl MarketConfig {
    /// Real-to-simulated population scale factor.
    pub fn ratio(&self) -> f64 {
        self.real_population / self.n_agents as f64
    }
}

/// Scenario signals driving a simulation run.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Expected real-unit sales per step (length = simulation horizon).
    pub seasonality: Vec<f64>,
    /// Probability each brand is on the shelf at each step
    /// (matrix `n_brands x n_steps`).
    pub availability: Vec<Vec<f64>>,
    /// Market-share cap per segment (sums to 1.0).
    pub market_share: Vec<f64>,
    /// Minimum steps before a purchasing agent may buy again.
    pub decision_cycle: usize,
    /// Steps between carry-over reconciliation audits.
    pub checkpoint_steps: usize,
    /// Initial probability each brand is known (per brand).
    pub base_awareness: Vec<f64>,
    /// Per-step probability a touchpoint reaches an agent (per brand).
    pub touchpoint_reach: Vec<f64>,
    /// Per-step probability an agent forgets a known brand.
    pub awareness_decay: f64,
    /// Per-step probability an aware agent talks about a brand.
    pub wom_rate: f64,
    /// Initial perception means (matrix `n_brands x n_attributes`).
    pub perception_mean: Vec<Vec<f64>>,
    /// Standard deviation of initial perception noise.
    pub perception_std_dev: f64,
}

impl ScenarioConfig {
    pub fn n_steps(&self) -> usize {
        self.seasonality.len()
    }
}

/// Brand-choice heuristic parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Attribute importance weights per segment
    /// (matrix `n_segments x n_attributes`, non-negative).
    pub drivers: Vec<Vec<f64>>,
    /// Purchase-involvement level per segment (in `[0, 1]`).
    pub involvement: Vec<f64>,
    /// Emotional-response level per segment (in `[0, 1]`).
    pub emotional: Vec<f64>,
    /// Cutoff relaxation step for the elimination heuristics.
    pub cutoff_decrease: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Maximum number of steps advanced per `create`/`resume` invocation.
    pub steps_per_file: usize,
}

/// Evolutionary-calibration parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Breeder selector: `"JFDE"`, `"SHADE"` or `"LSHADE"`.
    pub algorithm: String,
    pub population_size: usize,
    pub max_evaluations: usize,
    /// RNG seed for the calibration run.
    pub seed: u64,
    /// DE scale factor (JFDE only).
    pub f: f64,
    /// Steady-state replacement probability for non-improving offspring
    /// (JFDE only).
    pub replace_prob: f64,
    /// Fraction of the population eligible as p-best parents (SHADE).
    pub pbest_rate: f64,
    /// Archive capacity as a fraction of the population size (SHADE).
    pub arc_rate: f64,
    /// Historical real-unit sales to fit (matrix `n_brands x n_steps`).
    pub target_sales: Vec<Vec<f64>>,
    /// One gene per entry; order defines the genome layout.
    pub genes: Vec<GeneSpec>,
}

/// A single calibrated parameter: where it lands in the scenario and the
/// bounds the optimizer must respect.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct GeneSpec {
    pub target: ParameterTarget,
    pub min: f64,
    pub max: f64,
}

/// Scenario field a calibration gene writes to, resolved at parse time.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterTarget {
    BaseAwareness { brand: usize },
    TouchpointReach { brand: usize },
    Driver { segment: usize, attribute: usize },
    PerceptionMean { brand: usize, attribute: usize },
    WomRate {},
    AwarenessDecay {},
}

impl ParameterTarget {
    /// Write a gene value into the scenario/decision configuration.
    pub fn apply(&self, config: &mut Config, value: f64) {
        match *self {
            Self::BaseAwareness { brand } => config.scenario.base_awareness[brand] = value,
            Self::TouchpointReach { brand } => config.scenario.touchpoint_reach[brand] = value,
            Self::Driver { segment, attribute } => {
                config.decision.drivers[segment][attribute] = value
            }
            Self::PerceptionMean { brand, attribute } => {
                config.scenario.perception_mean[brand][attribute] = value
            }
            Self::WomRate {} => config.scenario.wom_rate = value,
            Self::AwarenessDecay {} => config.scenario.awareness_decay = value,
        }
    }

    /// Check the indices against the configured market dimensions.
    fn validate(&self, market: &MarketConfig) -> Result<()> {
        match *self {
            Self::BaseAwareness { brand } | Self::TouchpointReach { brand } => {
                check_num(brand, 0..market.n_brands).context("invalid brand index")?;
            }
            Self::Driver { segment, attribute } => {
                check_num(segment, 0..market.n_segments).context("invalid segment index")?;
                check_num(attribute, 0..market.n_attributes).context("invalid attribute index")?;
            }
            Self::PerceptionMean { brand, attribute } => {
                check_num(brand, 0..market.n_brands).context("invalid brand index")?;
                check_num(attribute, 0..market.n_attributes).context("invalid attribute index")?;
            }
            Self::WomRate {} | Self::AwarenessDecay {} => {}
        }
        Ok(())
    }
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let market = &self.market;
        check_num(market.n_brands, 1..100).context("invalid number of brands")?;
        check_num(market.n_attributes, 1..100).context("invalid number of attributes")?;
        check_num(market.n_segments, 1..100).context("invalid number of segments")?;
        check_num(market.n_agents, 1..1_000_000).context("invalid number of agents")?;
        check_num(market.real_population, market.n_agents as f64..f64::INFINITY)
            .context("invalid real population")?;

        let scenario = &self.scenario;
        let n_steps = scenario.n_steps();
        check_num(n_steps, 1..1_000_000).context("invalid simulation horizon")?;
        if scenario.seasonality.iter().any(|&val| val < 0.0) {
            bail!("seasonality must have only non-negative elements");
        }
        check_mat(&scenario.availability, (market.n_brands, n_steps), false)
            .context("invalid availability")?;
        check_prob_mat(&scenario.availability).context("invalid availability")?;
        check_vec(&scenario.market_share, market.n_segments, true)
            .context("invalid market shares")?;
        check_num(scenario.decision_cycle, 1..10_000).context("invalid decision cycle")?;
        check_num(scenario.checkpoint_steps, 1..=n_steps).context("invalid checkpoint interval")?;
        check_vec(&scenario.base_awareness, market.n_brands, false)
            .context("invalid base awareness")?;
        check_prob_vec(&scenario.base_awareness).context("invalid base awareness")?;
        check_vec(&scenario.touchpoint_reach, market.n_brands, false)
            .context("invalid touchpoint reach")?;
        check_prob_vec(&scenario.touchpoint_reach).context("invalid touchpoint reach")?;
        check_num(scenario.awareness_decay, 0.0..=1.0).context("invalid awareness decay")?;
        check_num(scenario.wom_rate, 0.0..=1.0).context("invalid word-of-mouth rate")?;
        check_mat(
            &scenario.perception_mean,
            (market.n_brands, market.n_attributes),
            false,
        )
        .context("invalid perception means")?;
        check_num(scenario.perception_std_dev, 0.0..100.0)
            .context("invalid perception standard deviation")?;

        let decision = &self.decision;
        check_mat(&decision.drivers, (market.n_segments, market.n_attributes), false)
            .context("invalid drivers")?;
        if decision.drivers.iter().flatten().any(|&val| val < 0.0) {
            bail!("drivers must have only non-negative elements");
        }
        check_vec(&decision.involvement, market.n_segments, false)
            .context("invalid involvement")?;
        check_prob_vec(&decision.involvement).context("invalid involvement")?;
        check_vec(&decision.emotional, market.n_segments, false)
            .context("invalid emotional response")?;
        check_prob_vec(&decision.emotional).context("invalid emotional response")?;
        if !(decision.cutoff_decrease > 0.0 && decision.cutoff_decrease < 10.0) {
            bail!("cutoff decrease must be in (0, 10)");
        }

        check_num(self.output.steps_per_file, 1..1_000_000)
            .context("invalid number of steps per file")?;

        if let Some(cal) = &self.calibration {
            cal.validate(market, n_steps)
                .context("failed to validate calibration config")?;
        }

        Ok(())
    }
}

impl CalibrationConfig {
    fn validate(&self, market: &MarketConfig, n_steps: usize) -> Result<()> {
        match self.algorithm.as_str() {
            "JFDE" | "SHADE" | "LSHADE" => {}
            other => bail!("unknown calibration algorithm {other:?}"),
        }
        // JFDE tournaments need 6 distinct indices; SHADE mutation needs 4.
        let min_pop = if self.algorithm == "JFDE" { 6 } else { 4 };
        check_num(self.population_size, min_pop..100_000).context("invalid population size")?;
        check_num(self.max_evaluations, self.population_size..10_000_000)
            .context("invalid evaluation budget")?;
        check_num(self.f, 0.0..=2.0).context("invalid scale factor")?;
        check_num(self.replace_prob, 0.0..=1.0).context("invalid replacement probability")?;
        check_num(self.pbest_rate, 0.0..=1.0).context("invalid p-best rate")?;
        check_num(self.arc_rate, 0.0..=10.0).context("invalid archive rate")?;
        check_mat(&self.target_sales, (market.n_brands, n_steps), false)
            .context("invalid target sales")?;
        if self.genes.is_empty() {
            bail!("calibration requires at least one gene");
        }
        for (i_gene, gene) in self.genes.iter().enumerate() {
            if gene.min >= gene.max {
                bail!("gene {i_gene} bounds must satisfy min < max");
            }
            gene.target
                .validate(market)
                .with_context(|| format!("invalid gene {i_gene}"))?;
        }
        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_vec(vec: &[f64], exp_len: usize, prob_vec: bool) -> Result<()> {
    let len = vec.len();
    if len != exp_len {
        bail!("vector length must be {exp_len}, but is {len}");
    }
    if !prob_vec {
        return Ok(());
    }
    if vec.iter().any(|&ele| ele < 0.0) {
        bail!("vector must have only non-negative elements");
    }
    let sum: f64 = vec.iter().sum();
    let tol = 1e-6;
    if (sum - 1.0).abs() > tol {
        bail!("vector must sum to 1.0 (tolerance: {tol}), but sums to {sum}");
    }
    Ok(())
}

fn check_prob_vec(vec: &[f64]) -> Result<()> {
    if vec.iter().any(|&ele| !(0.0..=1.0).contains(&ele)) {
        bail!("vector elements must be probabilities in [0, 1]");
    }
    Ok(())
}

fn check_prob_mat(mat: &[Vec<f64>]) -> Result<()> {
    for (i_row, row) in mat.iter().enumerate() {
        check_prob_vec(row).with_context(|| format!("invalid row {i_row}"))?;
    }
    Ok(())
}

fn check_mat(mat: &[Vec<f64>], exp_dim: (usize, usize), prob_rows: bool) -> Result<()> {
    let exp_n_rows = exp_dim.0;
    let exp_n_cols = exp_dim.1;
    let n_rows = mat.len();
    if n_rows != exp_n_rows {
        bail!("matrix must have {exp_n_rows} rows, but has {n_rows}");
    }
    if mat.iter().any(|row| row.len() != exp_n_cols) {
        bail!("matrix must have {exp_n_cols} columns");
    }
    if !prob_rows {
        return Ok(());
    }
    for (i_row, row) in mat.iter().enumerate() {
        check_vec(row, exp_n_cols, true).with_context(|| format!("invalid row {i_row}"))?;
    }
    Ok(())
}
