use brandsim::config::{DecisionConfig, MarketConfig, ScenarioConfig};
use brandsim::decision::DecisionMaker;
use brandsim::model::Agent;
use brandsim::scheduler::{Diagnosis, SalesScheduler, SalesTensor, ScheduleError};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

const N_BRANDS: usize = 2;
const N_ATTRIBUTES: usize = 2;
const N_SEGMENTS: usize = 3;

fn market(n_agents: usize, ratio: f64) -> MarketConfig {
    MarketConfig {
        n_brands: N_BRANDS,
        n_attributes: N_ATTRIBUTES,
        n_segments: N_SEGMENTS,
        n_agents,
        real_population: ratio * n_agents as f64,
    }
}

fn scenario(seasonality: Vec<f64>, availability_prob: f64, checkpoint_steps: usize) -> ScenarioConfig {
    let n_steps = seasonality.len();
    ScenarioConfig {
        seasonality,
        availability: vec![vec![availability_prob; n_steps]; N_BRANDS],
        market_share: vec![0.5, 0.3, 0.2],
        decision_cycle: 1,
        checkpoint_steps,
        base_awareness: vec![1.0; N_BRANDS],
        touchpoint_reach: vec![0.0; N_BRANDS],
        awareness_decay: 0.0,
        wom_rate: 0.0,
        perception_mean: vec![vec![5.0; N_ATTRIBUTES]; N_BRANDS],
        perception_std_dev: 1.0,
    }
}

fn decision_maker() -> DecisionMaker {
    DecisionMaker::new(&DecisionConfig {
        drivers: vec![vec![0.6, 0.4]; N_SEGMENTS],
        involvement: vec![0.5; N_SEGMENTS],
        emotional: vec![0.5; N_SEGMENTS],
        cutoff_decrease: 1.0,
    })
}

/// Fully-aware agents, spread over segments in proportion to the
/// market shares (150/90/60 for 300 agents).
fn aware_agents(n_agents: usize) -> Vec<Agent> {
    let boundaries = [n_agents / 2, n_agents / 2 + 3 * n_agents / 10];
    (0..n_agents)
        .map(|client_id| {
            let segment_id = match client_id {
                id if id < boundaries[0] => 0,
                id if id < boundaries[1] => 1,
                _ => 2,
            };
            let mut agent = Agent::new(client_id, segment_id, N_BRANDS, N_ATTRIBUTES);
            for brand in 0..N_BRANDS {
                agent.awareness.set(brand, true);
                for attribute in 0..N_ATTRIBUTES {
                    agent.perceptions.set(brand, attribute, 5.0 + brand as f64);
                }
            }
            agent
        })
        .collect()
}

fn assert_pool_invariants(scheduler: &SalesScheduler, n_agents: usize) {
    let mut seen = vec![false; n_agents];
    for segment in 0..N_SEGMENTS {
        for &agent_idx in scheduler.pool(segment) {
            assert!(
                !seen[agent_idx],
                "agent {agent_idx} appears in more than one pool"
            );
            seen[agent_idx] = true;
            assert!(
                !scheduler.is_disabled(agent_idx),
                "agent {agent_idx} is pooled while its cool-down is active"
            );
        }
    }
}

#[test]
fn seasonality_is_converted_into_exact_sales() {
    let market = market(300, 10.0);
    let scenario = scenario(vec![100.0, 100.0, 100.0], 1.0, 3);
    let agents = aware_agents(300);
    let decision = decision_maker();

    let mut segment_sums = [0.0; N_SEGMENTS];
    let n_seeds = 200;

    for seed in 0..n_seeds {
        let mut scheduler = SalesScheduler::new(&market, &scenario, &agents);
        let mut sales = SalesTensor::new(N_BRANDS, N_SEGMENTS, 3);
        let mut rng = ChaCha12Rng::seed_from_u64(seed);

        let report = scheduler
            .assign_sales(0, &agents, &decision, &mut sales, &mut rng)
            .expect("step 0 must be feasible");

        // 100 expected real sales at ratio 10 = exactly 10 purchases.
        assert_eq!(report.sales, 10);
        assert_eq!(sales.step_total(0), 10);
        assert!(!report.skipped);

        for segment in 0..N_SEGMENTS {
            segment_sums[segment] += sales.segment_step_total(segment, 0) as f64;
        }
    }

    // Segment split approximates the market shares in expectation.
    let expected = [5.0, 3.0, 2.0];
    for segment in 0..N_SEGMENTS {
        let mean = segment_sums[segment] / n_seeds as f64;
        assert!(
            (mean - expected[segment]).abs() < 0.5,
            "segment {segment} mean {mean} too far from {}",
            expected[segment]
        );
    }
}

#[test]
fn fixed_seed_runs_are_identical() {
    let market = market(300, 10.0);
    let scenario = scenario(vec![100.0, 90.0, 110.0], 0.9, 3);
    let agents = aware_agents(300);
    let decision = decision_maker();

    let run = |seed: u64| {
        let mut scheduler = SalesScheduler::new(&market, &scenario, &agents);
        scheduler.enable_history();
        let mut sales = SalesTensor::new(N_BRANDS, N_SEGMENTS, 3);
        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        for step in 0..3 {
            scheduler
                .assign_sales(step, &agents, &decision, &mut sales, &mut rng)
                .expect("step must be feasible");
        }
        (sales, scheduler.history().unwrap().to_vec())
    };

    let (sales_a, history_a) = run(99);
    let (sales_b, history_b) = run(99);
    assert_eq!(sales_a, sales_b);
    assert_eq!(history_a, history_b);
}

#[test]
fn pool_membership_invariants_hold_across_steps() {
    let n_agents = 300;
    let market = market(n_agents, 10.0);
    let scenario = scenario(vec![100.0; 6], 1.0, 6);
    let agents = aware_agents(n_agents);
    let decision = decision_maker();

    let mut scheduler = SalesScheduler::new(&market, &scenario, &agents);
    let mut sales = SalesTensor::new(N_BRANDS, N_SEGMENTS, 6);
    let mut rng = ChaCha12Rng::seed_from_u64(17);

    assert_pool_invariants(&scheduler, n_agents);
    for step in 0..6 {
        scheduler
            .assign_sales(step, &agents, &decision, &mut sales, &mut rng)
            .expect("step must be feasible");
        assert_pool_invariants(&scheduler, n_agents);
    }
}

#[test]
fn dispatch_loop_never_exits_with_spendable_carry_over() {
    let market = market(300, 10.0);
    // Fractional inflow leaves residuals between steps.
    let scenario = scenario(vec![95.0, 7.0, 33.0], 1.0, 3);
    let agents = aware_agents(300);
    let decision = decision_maker();

    let mut scheduler = SalesScheduler::new(&market, &scenario, &agents);
    let mut sales = SalesTensor::new(N_BRANDS, N_SEGMENTS, 3);
    let mut rng = ChaCha12Rng::seed_from_u64(5);

    for step in 0..3 {
        let report = scheduler
            .assign_sales(step, &agents, &decision, &mut sales, &mut rng)
            .expect("step must be feasible");
        assert!(
            report.carry_over < scheduler.ratio() || report.skipped,
            "step {step} exited with spendable carry-over {}",
            report.carry_over
        );
    }
}

#[test]
fn stop_request_halts_the_dispatch_loop() {
    let market = market(300, 10.0);
    let scenario = scenario(vec![100.0, 100.0, 100.0], 1.0, 3);
    let agents = aware_agents(300);
    let decision = decision_maker();

    let mut scheduler = SalesScheduler::new(&market, &scenario, &agents);
    let mut sales = SalesTensor::new(N_BRANDS, N_SEGMENTS, 3);
    let mut rng = ChaCha12Rng::seed_from_u64(29);

    scheduler.request_stop();
    let report = scheduler
        .assign_sales(0, &agents, &decision, &mut sales, &mut rng)
        .expect("a stopped step must not fail");

    // The inflow accrued but no purchase was dispatched.
    assert_eq!(report.sales, 0);
    assert_eq!(report.carry_over, 100.0);
    assert_eq!(sales.step_total(0), 0);
}

#[test]
fn empty_pools_fail_with_no_candidates() {
    let market = market(50, 1.0);
    let scenario = scenario(vec![10.0], 1.0, 1);
    // Nobody is aware of anything, so no pool is ever seeded.
    let agents: Vec<Agent> = (0..50)
        .map(|client_id| Agent::new(client_id, client_id % N_SEGMENTS, N_BRANDS, N_ATTRIBUTES))
        .collect();
    let decision = decision_maker();

    let mut scheduler = SalesScheduler::new(&market, &scenario, &agents);
    let mut sales = SalesTensor::new(N_BRANDS, N_SEGMENTS, 1);
    let mut rng = ChaCha12Rng::seed_from_u64(1);

    let err = scheduler
        .assign_sales(0, &agents, &decision, &mut sales, &mut rng)
        .unwrap_err();
    assert!(matches!(err, ScheduleError::NoCandidates { step: 0 }));
}

#[test]
fn unavailable_brands_fail_the_checkpoint_audit() {
    let market = market(100, 10.0);
    // Aware agents, but nothing is ever on the shelf.
    let scenario = scenario(vec![100.0], 0.0, 1);
    let agents = aware_agents(100);
    let decision = decision_maker();

    let mut scheduler = SalesScheduler::new(&market, &scenario, &agents);
    let mut sales = SalesTensor::new(N_BRANDS, N_SEGMENTS, 1);
    let mut rng = ChaCha12Rng::seed_from_u64(1);

    let err = scheduler
        .assign_sales(0, &agents, &decision, &mut sales, &mut rng)
        .unwrap_err();
    match err {
        ScheduleError::Infeasible {
            step, diagnosis, ..
        } => {
            assert_eq!(step, 0);
            assert!(matches!(diagnosis, Diagnosis::LowAvailability { .. }));
        }
        other => panic!("expected an audit failure, got {other:?}"),
    }
    assert_eq!(sales.step_total(0), 0);
}

#[test]
fn reactivated_agents_return_to_their_segment_pool() {
    let n_agents = 30;
    let market = market(n_agents, 1.0);
    let scenario = scenario(vec![5.0, 0.0, 0.0], 1.0, 3);
    let agents = aware_agents(n_agents);
    let decision = decision_maker();

    let mut scheduler = SalesScheduler::new(&market, &scenario, &agents);
    let mut sales = SalesTensor::new(N_BRANDS, N_SEGMENTS, 3);
    let mut rng = ChaCha12Rng::seed_from_u64(23);

    scheduler
        .assign_sales(0, &agents, &decision, &mut sales, &mut rng)
        .expect("step 0 must be feasible");
    assert_eq!(scheduler.total_pool_size(), n_agents - 5);

    // Cool-down of 1 step: buyers rejoin at the end of step 1.
    scheduler
        .assign_sales(1, &agents, &decision, &mut sales, &mut rng)
        .expect("step 1 must be feasible");
    assert_eq!(scheduler.total_pool_size(), n_agents);
    assert_pool_invariants(&scheduler, n_agents);
}
