use brandsim::calibrate::{CalibrationEvaluator, run_calibration, species_from_genes};
use brandsim::config::{
    CalibrationConfig, Config, DecisionConfig, GeneSpec, MarketConfig, OutputConfig,
    ParameterTarget, ScenarioConfig,
};
use brandsim::evolution::Evaluator;
use brandsim::evolution::individual::Individual;

fn base_config() -> Config {
    Config {
        market: MarketConfig {
            n_brands: 2,
            n_attributes: 2,
            n_segments: 2,
            n_agents: 60,
            real_population: 600.0,
        },
        scenario: ScenarioConfig {
            seasonality: vec![40.0, 40.0],
            availability: vec![vec![1.0, 1.0], vec![1.0, 1.0]],
            market_share: vec![0.6, 0.4],
            decision_cycle: 1,
            checkpoint_steps: 2,
            base_awareness: vec![0.9, 0.9],
            touchpoint_reach: vec![0.05, 0.05],
            awareness_decay: 0.0,
            wom_rate: 0.05,
            perception_mean: vec![vec![6.0, 5.0], vec![5.0, 6.0]],
            perception_std_dev: 1.0,
        },
        decision: DecisionConfig {
            drivers: vec![vec![0.5, 0.5], vec![0.5, 0.5]],
            involvement: vec![0.5, 0.5],
            emotional: vec![0.5, 0.5],
            cutoff_decrease: 1.0,
        },
        output: OutputConfig { steps_per_file: 2 },
        calibration: None,
    }
}

fn calibration() -> CalibrationConfig {
    CalibrationConfig {
        algorithm: "LSHADE".to_string(),
        population_size: 6,
        max_evaluations: 18,
        seed: 1,
        f: 0.5,
        replace_prob: 0.1,
        pbest_rate: 0.5,
        arc_rate: 1.0,
        target_sales: vec![vec![200.0, 200.0], vec![200.0, 200.0]],
        genes: vec![
            GeneSpec {
                target: ParameterTarget::TouchpointReach { brand: 0 },
                min: 0.0,
                max: 0.2,
            },
            GeneSpec {
                target: ParameterTarget::WomRate {},
                min: 0.0,
                max: 0.2,
            },
        ],
    }
}

#[test]
fn base_config_is_valid() {
    let mut config = base_config();
    config.validate().unwrap();
    config.calibration = Some(calibration());
    config.validate().unwrap();
}

#[test]
fn decode_applies_genes_to_the_scenario() {
    let evaluator = CalibrationEvaluator::new(base_config(), calibration());
    let decoded = evaluator.decode(&[0.12, 0.07]).unwrap();
    assert_eq!(decoded.scenario.touchpoint_reach[0], 0.12);
    assert_eq!(decoded.scenario.wom_rate, 0.07);
    // Untargeted fields are untouched.
    assert_eq!(decoded.scenario.touchpoint_reach[1], 0.05);

    assert!(evaluator.decode(&[0.1]).is_err());
}

#[test]
fn species_mirrors_gene_bounds() {
    let species = species_from_genes(&calibration());
    assert_eq!(species.genome_size(), 2);
    assert_eq!(species.min_gene, vec![0.0, 0.0]);
    assert_eq!(species.max_gene, vec![0.2, 0.2]);
}

#[test]
fn feasible_parameter_sets_score_finite() {
    let mut evaluator = CalibrationEvaluator::new(base_config(), calibration());
    let mut individual = Individual::new(vec![0.05, 0.05]);
    evaluator.evaluate(&mut individual).unwrap();
    assert!(individual.evaluated);
    assert!(individual.fitness.is_finite());
    assert!(individual.fitness >= 0.0);
}

#[test]
fn infeasible_parameter_sets_score_infinite_without_failing() {
    // Calibrating base awareness down to zero with no other awareness
    // source starves every candidate pool.
    let mut base = base_config();
    base.scenario.touchpoint_reach = vec![0.0, 0.0];
    base.scenario.wom_rate = 0.0;

    let mut cal = calibration();
    cal.genes = vec![
        GeneSpec {
            target: ParameterTarget::BaseAwareness { brand: 0 },
            min: 0.0,
            max: 0.1,
        },
        GeneSpec {
            target: ParameterTarget::BaseAwareness { brand: 1 },
            min: 0.0,
            max: 0.1,
        },
    ];

    let mut evaluator = CalibrationEvaluator::new(base, cal);
    let mut individual = Individual::new(vec![0.0, 0.0]);
    evaluator.evaluate(&mut individual).unwrap();
    assert!(individual.evaluated);
    assert_eq!(individual.fitness, f64::INFINITY);
}

#[test]
fn calibration_run_stays_within_budget_and_bounds() {
    let mut config = base_config();
    config.calibration = Some(calibration());

    let report = run_calibration(&config).unwrap();

    assert!(report.evaluations <= 18);
    assert!(report.best_fitness.is_finite());
    assert_eq!(report.best_genome.len(), 2);
    for &gene in &report.best_genome {
        assert!((0.0..=0.2).contains(&gene));
    }
    assert!(!report.trace.is_empty());
}
