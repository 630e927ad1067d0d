// Integration tests for `votegrid run | validate | sources`.
// Run with: cargo test -p votegrid-cli --test run_tests

use std::path::Path;
use std::process::{Command, Output};

fn votegrid() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_votegrid"));
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("VOTEGRID_TIMEOUT");
    cmd
}

const CONFIG: &str = r#"
name = "GA precincts"
state = "GA"
courtesy_multiplier = 0.0

[sources]
list = "sources.txt"
"#;

fn snapshot(hour: u32, votes: i64, biden: i64, trump: i64) -> String {
    serde_json::json!({
        "meta": {"timestamp": format!("2020-11-04T{hour:02}:00:00Z")},
        "precincts": [{
            "locality_name": "Fulton County",
            "precinct_id": "Sandy Springs 04",
            "locality_fips": 13121,
            "votes": votes,
            "results": {"bidenj": biden, "trumpd": trump},
        }],
    })
    .to_string()
}

/// Config, source list and two local snapshots in a fresh directory.
fn workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "ga.toml", CONFIG);
    write(dir.path(), "snap-a.json", &snapshot(0, 100, 55, 45));
    write(dir.path(), "snap-b.json", &snapshot(6, 120, 60, 58));
    write(dir.path(), "sources.txt", "# local captures\nsnap-a.json\nsnap-b.json\nsnap-a.json\n");
    dir
}

fn write(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

fn assert_code(output: &Output, code: i32) {
    assert_eq!(
        output.status.code(),
        Some(code),
        "expected exit {code}, got {:?}\nstderr: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr),
    );
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[test]
fn run_writes_csv_to_stdout() {
    let dir = workspace();
    let output = votegrid()
        .arg("run")
        .arg(dir.path().join("ga.toml"))
        .output()
        .expect("failed to run votegrid");
    assert_code(&output, 0);

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    assert_eq!(
        lines.next().unwrap(),
        "state,county,precinct,fips,timestamp,vote_type,votes,votes_biden,votes_trump,votes_jorgensen,votes_other,margin"
    );
    // precinct and county, untyped + total, two snapshots each
    assert_eq!(lines.count(), 8);
    assert!(stdout.contains("GA,fulton,sandy-springs-04,-9999,2020-11-04T06:00:00,total,120,60,58,"));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("2 of 2 source(s) fetched"), "stderr: {stderr}");
}

#[test]
fn run_with_out_and_json_summary() {
    let dir = workspace();
    let csv_path = dir.path().join("GA.csv");
    let output = votegrid()
        .arg("run")
        .arg(dir.path().join("ga.toml"))
        .arg("--out")
        .arg(&csv_path)
        .arg("--json")
        .arg("-q")
        .output()
        .expect("failed to run votegrid");
    assert_code(&output, 0);

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(csv.lines().count(), 9);

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["summary"]["dataset"], "GA precincts");
    assert_eq!(doc["summary"]["sources_listed"], 3);
    assert_eq!(doc["summary"]["sources_selected"], 2);
    assert_eq!(doc["summary"]["rows"], 8);
    assert_eq!(doc["unresolved"].as_array().unwrap().len(), 0);
}

#[test]
fn json_without_file_output_exits_2() {
    let dir = workspace();
    let output = votegrid()
        .arg("run")
        .arg(dir.path().join("ga.toml"))
        .arg("--json")
        .output()
        .expect("failed to run votegrid");
    assert_code(&output, 2);
    assert!(String::from_utf8_lossy(&output.stderr).contains("hint:"));
}

#[test]
fn unresolved_source_is_not_fatal() {
    let dir = workspace();
    write(dir.path(), "sources.txt", "snap-a.json\nmissing.json\n");
    let output = votegrid()
        .arg("run")
        .arg(dir.path().join("ga.toml"))
        .output()
        .expect("failed to run votegrid");
    assert_code(&output, 0);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unresolved: missing.json"), "stderr: {stderr}");
}

#[test]
fn all_sources_missing_exits_62() {
    let dir = workspace();
    write(dir.path(), "sources.txt", "gone-1.json\ngone-2.json\n");
    let output = votegrid()
        .arg("run")
        .arg(dir.path().join("ga.toml"))
        .arg("--quiet")
        .output()
        .expect("failed to run votegrid");
    assert_code(&output, 62);
    assert!(output.stdout.is_empty());
}

#[test]
fn invalid_config_exits_60() {
    let dir = workspace();
    write(dir.path(), "bad.toml", "name = \"x\"\nfeed = \"precincts\"\n");
    let output = votegrid()
        .arg("run")
        .arg(dir.path().join("bad.toml"))
        .output()
        .expect("failed to run votegrid");
    assert_code(&output, 60);
    assert!(String::from_utf8_lossy(&output.stderr).contains("requires a state"));
}

#[test]
fn missing_source_list_exits_2() {
    let dir = workspace();
    write(dir.path(), "nolist.toml", "name = \"x\"\nstate = \"GA\"\n");
    let output = votegrid()
        .arg("run")
        .arg(dir.path().join("nolist.toml"))
        .output()
        .expect("failed to run votegrid");
    assert_code(&output, 2);
    assert!(String::from_utf8_lossy(&output.stderr).contains("--sources"));
}

// ---------------------------------------------------------------------------
// validate + sources
// ---------------------------------------------------------------------------

#[test]
fn validate_accepts_config() {
    let dir = workspace();
    let output = votegrid()
        .arg("validate")
        .arg(dir.path().join("ga.toml"))
        .output()
        .expect("failed to run votegrid");
    assert_code(&output, 0);
    assert!(String::from_utf8_lossy(&output.stderr).contains("valid: precincts feed 'GA precincts'"));
}

#[test]
fn sources_json_lists_eligible_identifiers() {
    let dir = workspace();
    write(
        dir.path(),
        "wayback.txt",
        "https://web.archive.org/web/20201104070000/https://x/GAGeneral-2020-11-04T06:00:00Z.json\n\
         https://web.archive.org/web/20201104080000if_/https://x/GAGeneral-2020-11-04T06:00:00Z.json\n",
    );
    let output = votegrid()
        .arg("sources")
        .arg(dir.path().join("ga.toml"))
        .arg("--sources")
        .arg(dir.path().join("wayback.txt"))
        .arg("--json")
        .output()
        .expect("failed to run votegrid");
    assert_code(&output, 0);

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    // distinct identifiers, shared canonical key
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["canonical_key"], "https://x/GAGeneral-2020-11-04T06:00:00Z.json");
    assert_eq!(rows[0]["canonical_key"], rows[1]["canonical_key"]);
    assert_eq!(rows[0]["capture_time"], "2020-11-04T07:00:00");
    assert_eq!(rows[1]["snapshot_time"], "2020-11-04T06:00:00");
}
