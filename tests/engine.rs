use brandsim::config::{
    Config, DecisionConfig, MarketConfig, OutputConfig, ScenarioConfig,
};
use brandsim::engine::Engine;

fn config() -> Config {
    Config {
        market: MarketConfig {
            n_brands: 2,
            n_attributes: 2,
            n_segments: 2,
            n_agents: 120,
            real_population: 1200.0,
        },
        scenario: ScenarioConfig {
            seasonality: vec![60.0; 5],
            availability: vec![vec![1.0; 5], vec![1.0; 5]],
            market_share: vec![0.7, 0.3],
            decision_cycle: 1,
            checkpoint_steps: 5,
            base_awareness: vec![1.0, 1.0],
            touchpoint_reach: vec![0.02, 0.02],
            awareness_decay: 0.001,
            wom_rate: 0.1,
            perception_mean: vec![vec![7.0, 4.0], vec![4.0, 7.0]],
            perception_std_dev: 1.5,
        },
        decision: DecisionConfig {
            drivers: vec![vec![0.5, 0.5], vec![0.8, 0.2]],
            involvement: vec![0.4, 0.6],
            emotional: vec![0.3, 0.7],
            cutoff_decrease: 1.0,
        },
        output: OutputConfig { steps_per_file: 5 },
        calibration: None,
    }
}

#[test]
fn seeded_engine_runs_are_reproducible() {
    let run = |seed: u64| {
        let mut engine = Engine::with_seed(config(), seed).unwrap();
        engine.scheduler_mut().enable_history();
        engine.run_to_completion().unwrap();
        engine
    };

    let engine_a = run(1234);
    let engine_b = run(1234);
    assert_eq!(engine_a.sales(), engine_b.sales());
    assert_eq!(
        engine_a.scheduler().history().unwrap(),
        engine_b.scheduler().history().unwrap()
    );

    let engine_c = run(5678);
    assert_eq!(engine_c.step(), 5);
}

#[test]
fn fully_aware_market_absorbs_the_whole_seasonality() {
    let mut engine = Engine::with_seed(config(), 7).unwrap();
    engine.run_to_completion().unwrap();

    // 60 expected real sales at ratio 10 on every step.
    for step in 0..5 {
        assert_eq!(engine.sales().step_total(step), 6);
    }
    assert!(engine.is_finished());
}

#[test]
fn history_marks_one_buyer_bit_per_sale() {
    let mut engine = Engine::with_seed(config(), 21).unwrap();
    engine.scheduler_mut().enable_history();
    engine.run_to_completion().unwrap();

    let history = engine.scheduler().history().unwrap();
    for step in 0..5 {
        assert_eq!(
            history[step].count() as u32,
            engine.sales().step_total(step)
        );
    }
}
