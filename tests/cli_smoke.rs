use predicates::str::{contains, starts_with};

#[test]
fn default_run_prints_summary() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("oam-sim");
    cmd.args(["--ticks", "4", "--traffic", "silent"]);
    cmd.assert()
        .success()
        .stdout(starts_with(concat!(
            "Metadata:\n",
            "seed: 42\n",
            "ticks: 4\n",
            "intervals: kpi=1 decision=2\n",
            "traffic: silent\n",
            "Events:\n",
        )))
        .stdout(contains("Automation:\n"))
        .stdout(contains("Network health: "));
}

#[test]
fn human_format_lists_topology_and_actions() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("oam-sim");
    cmd.args(["run", "--ticks", "6", "--format", "human", "--seed", "3"]);
    cmd.assert()
        .success()
        .stdout(contains("seed: 3\n"))
        .stdout(contains("Elements:\n"))
        .stdout(contains("[radio-node]"))
        .stdout(contains("Links:\n"))
        .stdout(contains("Actions:\n"));
}

#[test]
fn json_format_is_a_full_report() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("oam-sim");
    cmd.args(["run", "--ticks", "10", "--format", "json"]);
    let output = cmd.output().expect("binary runs");
    assert!(output.status.success());

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is json");
    assert_eq!(report["metadata"]["ticks"], 10);
    assert_eq!(report["metadata"]["traffic"], "synthetic");
    assert_eq!(report["final_state"]["tick"], 10);
    assert!(report["final_state"]["network"]["elements"].is_array());
    assert!(report["events"].is_array());
}

#[test]
fn same_seed_gives_identical_json() {
    let run = || {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("oam-sim");
        cmd.args(["run", "--ticks", "120", "--seed", "11", "--format", "json"]);
        let output = cmd.output().expect("binary runs");
        assert!(output.status.success());
        output.stdout
    };
    assert_eq!(run(), run());
}

#[test]
fn export_writes_final_state() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("state.json");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("oam-sim");
    cmd.args(["run", "--ticks", "4", "--export"]);
    cmd.arg(&path);
    cmd.assert().success().stdout(contains("Metadata:\n"));

    let text = std::fs::read_to_string(&path).expect("export written");
    let state: serde_json::Value = serde_json::from_str(&text).expect("export is json");
    assert_eq!(state["tick"], 4);
    assert!(state["active_actions"].is_array());
}
