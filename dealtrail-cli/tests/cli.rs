use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const MONDAY: &str = "2024-06-03T09:00:00-08:00";

fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "dealtrail-cli-{label}-{}.json",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

fn vendors() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../dealtrail-engine/assets/vendors.json")
}

fn dealtrail(store: &Path, now: &str, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dealtrail"))
        .arg("--vendors")
        .arg(vendors())
        .arg("--store")
        .arg(store)
        .args(["--now", now, "--report", "json"])
        .args(args)
        .output()
        .expect("run cli")
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not JSON ({err}): {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

const DAILY_DOWNTOWN: [&str; 7] = [
    "--deal-type",
    "daily",
    "--lat",
    "61.2176",
    "--lon",
    "-149.8997",
    "--max-stops=2",
];

#[test]
fn cli_plan_returns_vendors_in_distance_order() {
    let store = temp_path("plan");
    let mut args = vec!["plan"];
    args.extend(DAILY_DOWNTOWN);
    let output = dealtrail(&store, MONDAY, &args);
    assert!(output.status.success());
    let response = json(&output);
    assert_eq!(response["success"], true);
    let ids: Vec<_> = response["vendors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|stop| stop["vendor"]["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["1", "4"]);
    assert!(response["route"]["estimatedTimeMinutes"].as_u64().unwrap() >= 20);
}

#[test]
fn cli_journey_persists_between_invocations() {
    let store = temp_path("journey");
    let mut start = vec!["start"];
    start.extend(DAILY_DOWNTOWN);
    assert!(dealtrail(&store, MONDAY, &start).status.success());

    let status = json(&dealtrail(&store, MONDAY, &["status"]));
    assert_eq!(status["phase"], "active");
    assert_eq!(status["journey"]["totalStops"], 2);

    assert!(dealtrail(&store, MONDAY, &["checkin"]).status.success());
    let moved = json(&dealtrail(&store, MONDAY, &["advance"]));
    assert_eq!(moved["status"], "moved");
    assert!(
        dealtrail(&store, MONDAY, &["checkin", "--kind", "qrSkipped"])
            .status
            .success()
    );

    let result = json(&dealtrail(&store, MONDAY, &["complete"]));
    assert_eq!(result["outcome"], "completed");
    // 10 + 5 check-in points, compliance 1/2 keeps the full bonus.
    assert_eq!(result["reward"]["totalPoints"], 115);

    let points = json(&dealtrail(&store, MONDAY, &["points"]));
    assert_eq!(points["balance"], 115);
    let history = json(&dealtrail(&store, MONDAY, &["history"]));
    assert_eq!(history.as_array().map(Vec::len), Some(1));

    let mut again = vec!["plan"];
    again.extend(DAILY_DOWNTOWN);
    let replan = json(&dealtrail(&store, MONDAY, &again));
    let ids: Vec<_> = replan["vendors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|stop| stop["vendor"]["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["2", "3"]);
    let _ = std::fs::remove_file(store);
}

#[test]
fn cli_reports_expired_journey_after_lease() {
    let store = temp_path("expired");
    let mut start = vec!["start"];
    start.extend(DAILY_DOWNTOWN);
    assert!(dealtrail(&store, MONDAY, &start).status.success());

    let status = json(&dealtrail(&store, "2024-06-04T10:00:00-08:00", &["status"]));
    assert_eq!(status["recovery"]["status"], "expired");
    assert_eq!(status["phase"], "inactive");
    assert!(status["journey"].is_null());
    let _ = std::fs::remove_file(store);
}

#[test]
fn cli_plan_failure_exits_nonzero_with_error_code() {
    let store = temp_path("fail");
    let output = dealtrail(
        &store,
        MONDAY,
        &[
            "plan",
            "--deal-type",
            "special",
            "--lat",
            "61.2176",
            "--lon",
            "-149.8997",
            "--max-distance",
            "0.5",
        ],
    );
    assert!(!output.status.success());
    let response = json(&output);
    assert_eq!(response["success"], false);
    assert_eq!(response["error"], "DistanceExceeded");
    assert!(response["message"].as_str().is_some_and(|m| !m.is_empty()));
}

#[test]
fn cli_rejects_transitions_without_a_journey() {
    let store = temp_path("idle");
    let output = dealtrail(&store, MONDAY, &["advance"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cannot advance"), "stderr: {stderr}");
}
