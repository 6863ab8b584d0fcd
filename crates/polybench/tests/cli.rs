use std::process::Command;

fn polybench() -> Command {
    Command::new(env!("CARGO_BIN_EXE_polybench"))
}

#[test]
fn help_lists_long_options() {
    let output = polybench().arg("--help").output().expect("run polybench --help");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for option in ["--experiment", "--v-sync", "--no-gui", "--run-exp", "--plan", "--samples"] {
        assert!(stdout.contains(option), "help text lacks {option}:\n{stdout}");
    }
}

#[test]
fn legacy_spellings_are_accepted_by_the_parser() {
    // `--version` exits before any window is opened, after the legacy
    // flags have been parsed.
    let output = polybench()
        .args(["-no_v_sync", "-gui", "-e2", "--version"])
        .output()
        .expect("run polybench --version");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("polybench"));
}

#[test]
fn malformed_plan_fails_before_opening_a_window() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan = dir.path().join("plan.toml");
    std::fs::write(&plan, "version = 2\n").expect("write plan");
    let output = polybench()
        .arg("--plan")
        .arg(&plan)
        .env_remove("NUM_SAMPLES")
        .env_remove("SCENE")
        .output()
        .expect("run polybench");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load experiment plan"), "{stderr}");
}
