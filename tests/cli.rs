use assert_cmd::Command;
use kraepelin::metrics::TestResult;
use kraepelin::store::{ResultMeta, ResultStore};
use kraepelin::ScoringMode;
use tempfile::tempdir;

fn bin() -> Command {
    Command::cargo_bin("kraepelin").unwrap()
}

#[test]
fn help_lists_the_main_flags() {
    let output = bin().arg("--help").output().unwrap();
    assert!(output.status.success());

    let text = String::from_utf8_lossy(&output.stdout);
    for flag in ["--duration-minutes", "--columns", "--simplified", "--scoring", "--history", "--export-csv"] {
        assert!(text.contains(flag), "missing {flag} in help");
    }
}

#[test]
fn non_tty_stdin_is_rejected() {
    let dir = tempdir().unwrap();
    bin()
        .env("HOME", dir.path())
        .write_stdin("")
        .assert()
        .failure();
}

#[test]
fn history_and_export_read_the_state_dir() {
    let dir = tempdir().unwrap();
    let db = dir.path().join(".local").join("state").join("kraepelin").join("results.db");
    {
        let mut store = ResultStore::open(&db).unwrap();
        let result = TestResult {
            total_answers: 40,
            correct_answers: 36,
            accuracy: 0.9,
            speed: 1.6,
            consistency: 4.2,
            endurance: 3.1,
            columns: Vec::new(),
            sections: Vec::new(),
        };
        let meta = ResultMeta {
            taken_at: chrono::Local::now(),
            scoring: ScoringMode::AdjacentPairSum,
            duration_minutes: 1.0,
        };
        store.save(&result, &meta).unwrap();
    }

    let output = bin()
        .env("HOME", dir.path())
        .args(["--history", "5"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("36/40"));

    let csv_path = dir.path().join("out.csv");
    bin()
        .env("HOME", dir.path())
        .arg("--export-csv")
        .arg(&csv_path)
        .assert()
        .success();
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(csv.lines().count(), 2);
}
