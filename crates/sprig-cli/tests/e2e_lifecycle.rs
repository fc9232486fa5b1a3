//! E2E CLI workflow tests: plants drive reminder days through the whole lifecycle.
//!
//! Each test runs the `sprig` binary as a subprocess in an isolated temp
//! directory with a pinned clock and a UTC calendar.

use assert_cmd::Command;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

const JUNE_1: &str = "2025-06-01T12:00:00Z";
const JUNE_2: &str = "2025-06-02T12:00:00Z";

/// Build a Command targeting the sprig binary, rooted in `dir`, at instant `now`.
fn sprig_at(dir: &Path, now: &str) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("sprig"));
    cmd.current_dir(dir);
    cmd.env("SPRIG_NOW", now);
    // Keep the developer's user config out of the way.
    cmd.env("XDG_CONFIG_HOME", dir.join("xdg"));
    cmd.env_remove("FORMAT");
    // Suppress tracing output that goes to stderr
    cmd.env("SPRIG_LOG", "error");
    cmd
}

fn sprig(dir: &Path) -> Command {
    sprig_at(dir, JUNE_1)
}

/// Initialize a project in `dir` with a UTC calendar.
fn init_project(dir: &Path) {
    sprig(dir).args(["init"]).assert().success();
    sprig(dir)
        .args(["config", "set", "calendar.timezone", "utc"])
        .assert()
        .success();
}

/// Run a command with `--json` and parse stdout.
fn json_at(dir: &Path, now: &str, args: &[&str]) -> Value {
    let output = sprig_at(dir, now)
        .args(args)
        .arg("--json")
        .output()
        .expect("command should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("--json should produce valid JSON")
}

fn json(dir: &Path, args: &[&str]) -> Value {
    json_at(dir, JUNE_1, args)
}

fn add_plant(dir: &Path, id: &str, every: &str) -> Value {
    json(dir, &["plant", "add", "--name", id, "--id", id, "--every", every])
}

fn reminder_days(status: &Value) -> Vec<String> {
    status["reminders"]
        .as_array()
        .expect("reminders array")
        .iter()
        .map(|r| r["day"].as_str().expect("day").to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn plants_due_the_same_day_share_one_alert() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());

    let fern = add_plant(dir.path(), "fern", "3");
    assert_eq!(fern["action"], "added");
    assert_eq!(fern["plant"]["next_water_at"], "2025-06-04T12:00:00Z");
    assert_eq!(fern["notifications"]["status"], "reconciled");
    assert_eq!(fern["notifications"]["report"]["scheduled"][0], "2025-06-04");

    let monstera = add_plant(dir.path(), "monstera", "3");
    assert!(
        monstera["notifications"]["report"]["scheduled"]
            .as_array()
            .expect("scheduled")
            .is_empty()
    );

    let status = json(dir.path(), &["notify", "status"]);
    assert_eq!(reminder_days(&status), vec!["2025-06-04"]);
    let reminder = &status["reminders"][0];
    assert_eq!(reminder["trigger_at"], "2025-06-04T07:00:00Z");
    assert_eq!(reminder["scheduled"], true);
    assert_eq!(reminder["plants"], serde_json::json!(["fern", "monstera"]));

    let alerts = json(dir.path(), &["alerts"]);
    assert_eq!(alerts["alerts"].as_array().expect("alerts").len(), 1);
    assert_eq!(alerts["alerts"][0]["fire_at"], "2025-06-04T07:00:00Z");
}

#[test]
fn watering_moves_the_plant_to_a_new_day() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());
    add_plant(dir.path(), "fern", "3");
    add_plant(dir.path(), "monstera", "3");

    let watered = json_at(dir.path(), JUNE_2, &["plant", "water", "fern"]);
    assert_eq!(watered["plant"]["last_watered_at"], JUNE_2);
    assert_eq!(watered["plant"]["next_water_at"], "2025-06-05T12:00:00Z");
    assert_eq!(watered["notifications"]["report"]["operation"], "edit_due");
    assert_eq!(watered["notifications"]["report"]["scheduled"][0], "2025-06-05");

    let status = json_at(dir.path(), JUNE_2, &["notify", "status"]);
    assert_eq!(reminder_days(&status), vec!["2025-06-04", "2025-06-05"]);
    assert_eq!(status["reminders"][0]["plants"], serde_json::json!(["monstera"]));
    assert_eq!(status["reminders"][1]["plants"], serde_json::json!(["fern"]));

    // Reverting the watering keeps the due date.
    let reverted = json_at(dir.path(), JUNE_2, &["plant", "revert", "fern"]);
    assert!(reverted["plant"].get("last_watered_at").is_none());
    assert_eq!(reverted["plant"]["next_water_at"], "2025-06-05T12:00:00Z");
    assert_eq!(reverted["notifications"]["status"], "untouched");
}

#[test]
fn fire_time_toggle_and_removal_keep_queue_in_step() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());
    add_plant(dir.path(), "fern", "3");
    add_plant(dir.path(), "cactus", "10");

    let changed = json(dir.path(), &["notify", "time", "08:30"]);
    assert_eq!(changed["fire_time"], "08:30");
    assert_eq!(changed["changed"], true);
    let alerts = json(dir.path(), &["alerts"]);
    let fire_at: Vec<_> = alerts["alerts"]
        .as_array()
        .expect("alerts")
        .iter()
        .map(|a| a["fire_at"].as_str().expect("fire_at").to_string())
        .collect();
    assert_eq!(fire_at, vec!["2025-06-04T08:30:00Z", "2025-06-11T08:30:00Z"]);

    let off = json(dir.path(), &["notify", "off"]);
    assert_eq!(off["enabled"], false);
    assert!(json(dir.path(), &["alerts"])["alerts"].as_array().expect("alerts").is_empty());
    let status = json(dir.path(), &["notify", "status"]);
    assert_eq!(reminder_days(&status).len(), 2);
    assert_eq!(status["reminders"][0]["scheduled"], false);

    let on = json(dir.path(), &["notify", "on"]);
    assert_eq!(on["enabled"], true);
    assert_eq!(on["scheduled"].as_array().expect("scheduled").len(), 2);

    let removed = json(dir.path(), &["plant", "remove", "cactus"]);
    assert_eq!(removed["notifications"]["report"]["removed"][0], "2025-06-11");
    assert_eq!(json(dir.path(), &["alerts"])["alerts"].as_array().expect("alerts").len(), 1);
}

#[test]
fn fired_alerts_are_delivered_once() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());
    add_plant(dir.path(), "fern", "3");

    let later = "2025-06-04T09:00:00Z";
    let fired = json_at(dir.path(), later, &["alerts", "--fired"]);
    assert_eq!(fired["fired"], true);
    assert_eq!(fired["alerts"].as_array().expect("alerts").len(), 1);
    assert_eq!(fired["alerts"][0]["title"], "It's time to water your plants!");

    let again = json_at(dir.path(), later, &["alerts", "--fired"]);
    assert!(again["alerts"].as_array().expect("alerts").is_empty());
}

#[test]
fn stale_days_are_pruned_by_the_next_change() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());
    add_plant(dir.path(), "fern", "3");

    // Three days later the June 4 reminder has passed.
    let later = "2025-06-05T12:00:00Z";
    let added = json_at(
        dir.path(),
        later,
        &["plant", "add", "--name", "Ivy", "--id", "ivy", "--every", "2"],
    );
    assert_eq!(added["notifications"]["report"]["pruned"][0], "2025-06-04");

    let status = json_at(dir.path(), later, &["notify", "status"]);
    assert_eq!(reminder_days(&status), vec!["2025-06-07"]);
}

#[test]
fn list_reports_overdue_plants() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());
    json(
        dir.path(),
        &["plant", "add", "--name", "Fern", "--id", "fern", "--every", "3", "--next", "2025-05-30"],
    );
    add_plant(dir.path(), "cactus", "10");

    let list = json(dir.path(), &["plant", "list"]);
    assert_eq!(list["overdue"], 1);
    let plants = list["plants"].as_array().expect("plants");
    assert_eq!(plants.len(), 2);
    // Soonest due first.
    assert_eq!(plants[0]["id"], "fern");
    assert_eq!(plants[0]["watering"]["status"], "overdue");
    assert_eq!(plants[0]["watering"]["days"], 2);
    assert_eq!(plants[0]["summary"], "Overdue for 2 days");
    assert_eq!(plants[1]["id"], "cactus");

    // A past due date gets no reminder.
    let status = json(dir.path(), &["notify", "status"]);
    assert_eq!(reminder_days(&status), vec!["2025-06-11"]);
}

#[test]
fn list_search_matches_name_prefix() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());
    json(dir.path(), &["plant", "add", "--name", "Fern", "--id", "fern", "--every", "9"]);
    json(dir.path(), &["plant", "add", "--name", "Ficus", "--id", "ficus", "--every", "4"]);
    json(dir.path(), &["plant", "add", "--name", "Monstera", "--id", "monstera", "--every", "2"]);

    let list = json(dir.path(), &["plant", "list", "--search", "f"]);
    assert_eq!(list["search"], "f");
    let ids: Vec<&str> = list["plants"]
        .as_array()
        .expect("plants")
        .iter()
        .map(|p| p["id"].as_str().expect("id"))
        .collect();
    assert_eq!(ids, vec!["ficus", "fern"]);

    let output = sprig(dir.path())
        .args(["--format", "pretty", "plant", "list", "--search", "cac"])
        .output()
        .expect("list should not crash");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "No plants found");
}

#[test]
fn plant_due_after_todays_reminder_is_called_out() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());

    let added = json(
        dir.path(),
        &["plant", "add", "--name", "Fern", "--id", "fern", "--every", "3", "--next", "2025-06-01"],
    );
    assert_eq!(added["notifications"]["report"]["skipped"][0], "2025-06-01");

    let output = sprig(dir.path())
        .args(["--format", "pretty", "plant", "add", "--name", "Ivy", "--every", "2"])
        .args(["--next", "2025-06-01"])
        .output()
        .expect("add should not crash");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Added Ivy"), "{stdout}");
    assert!(stdout.contains("! no reminder for 2025-06-01"), "{stdout}");
}

#[test]
fn text_output_is_line_oriented() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());
    add_plant(dir.path(), "fern", "3");

    let output = sprig(dir.path())
        .args(["--format", "text", "plant", "list"])
        .output()
        .expect("list should not crash");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "fern\tfern\tWater on Wed Jun 4");
}
