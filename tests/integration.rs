use std::{fs, path::PathBuf, process::Command};

#[test]
fn basic_workflow() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("basic_workflow");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir_all(&test_dir).expect("failed to create test directory");

    let config_path = test_dir.join("config.toml");
    let config_contents = r#"
[market]
n_brands = 2
n_attributes = 2
n_segments = 2
n_agents = 100
real_population = 1000.0

[scenario]
seasonality = [50.0, 50.0, 50.0, 50.0]
availability = [[1.0, 1.0, 1.0, 1.0], [1.0, 1.0, 1.0, 1.0]]
market_share = [0.6, 0.4]
decision_cycle = 1
checkpoint_steps = 2
base_awareness = [0.9, 0.8]
touchpoint_reach = [0.05, 0.05]
awareness_decay = 0.0
wom_rate = 0.05
perception_mean = [[6.0, 5.0], [5.0, 6.0]]
perception_std_dev = 1.0

[decision]
drivers = [[0.5, 0.5], [0.7, 0.3]]
involvement = [0.5, 0.5]
emotional = [0.5, 0.5]
cutoff_decrease = 1.0

[output]
steps_per_file = 2

[calibration]
algorithm = "LSHADE"
population_size = 6
max_evaluations = 18
seed = 42
f = 0.5
replace_prob = 0.1
pbest_rate = 0.5
arc_rate = 1.0
target_sales = [[25.0, 25.0, 25.0, 25.0], [25.0, 25.0, 25.0, 25.0]]

[[calibration.genes]]
target = { kind = "touchpoint_reach", brand = 0 }
min = 0.0
max = 0.2

[[calibration.genes]]
target = { kind = "wom_rate" }
min = 0.0
max = 0.2
"#;

    fs::write(&config_path, config_contents).expect("failed to write config file");

    fn run_bin(args: &[&str]) {
        let bin = PathBuf::from(env!("CARGO_BIN_EXE_brandsim"));

        let output = Command::new(bin)
            .args(args)
            .output()
            .expect("failed to execute command");

        let stdout_str =
            std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
        let stderr_str =
            std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

        assert!(
            output.status.success(),
            "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
        );
    }

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    run_bin(&["--sim-dir", test_dir_str, "create"]);
    run_bin(&["--sim-dir", test_dir_str, "create"]);

    run_bin(&["--sim-dir", test_dir_str, "resume", "--run-idx", "0"]);
    run_bin(&["--sim-dir", test_dir_str, "resume", "--run-idx", "1"]);

    run_bin(&["--sim-dir", test_dir_str, "analyze"]);
    assert!(test_dir.join("run-0000").join("results.json").exists());
    assert!(test_dir.join("run-0001").join("results.json").exists());

    run_bin(&["--sim-dir", test_dir_str, "calibrate"]);
    assert!(test_dir.join("calibration.json").exists());

    run_bin(&["--sim-dir", test_dir_str, "clean"]);
    assert!(!test_dir.join("run-0000").exists());
    assert!(!test_dir.join("calibration.json").exists());

    fs::remove_dir_all(&test_dir).ok();
}
