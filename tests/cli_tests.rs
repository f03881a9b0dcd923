mod common;

use common::{open_db, psync, setup_test_db, temp_out};
use predicates::prelude::*;
use punchsync::db::queries::{insert_employee, insert_session};
use punchsync::utils::time::from_db;
use std::fs;

/// Config path inside a fresh temp dir; never the user's real one.
fn temp_config(contents: Option<&str>) -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("punchsync.conf");
    if let Some(c) = contents {
        fs::write(&path, c).expect("write config");
    }
    let p = path.to_string_lossy().to_string();
    (dir, p)
}

#[test]
fn init_creates_the_database() {
    let db = setup_test_db("cli_init");
    let (_dir, conf) = temp_config(None);

    psync()
        .args(["--db", &db, "--config", &conf, "--test", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Database initialized"));

    assert!(std::path::Path::new(&db).exists());
    // --test leaves the config file alone
    assert!(!std::path::Path::new(&conf).exists());
}

#[test]
fn employee_add_then_list() {
    let db = setup_test_db("cli_employee");
    let (_dir, conf) = temp_config(None);

    psync()
        .args(["--db", &db, "--config", &conf])
        .args(["employee", "add", "--name", "Ada Lovelace", "--code", "1001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("added with id"));

    psync()
        .args(["--db", &db, "--config", &conf, "employee", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ada Lovelace").and(predicate::str::contains("1001")));

    psync()
        .args(["--db", &db, "--config", &conf])
        .args(["employee", "add", "--name", "Someone Else", "--code", "1001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already used"));
}

#[test]
fn employee_add_needs_an_identifier() {
    let db = setup_test_db("cli_employee_noid");
    let (_dir, conf) = temp_config(None);

    psync()
        .args(["--db", &db, "--config", &conf])
        .args(["employee", "add", "--name", "Nobody"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--code or --barcode"));
}

#[test]
fn reversed_sync_range_fails_before_contacting_anything() {
    let db = setup_test_db("cli_reversed");
    let (_dir, conf) = temp_config(None);

    psync()
        .args(["--db", &db, "--config", &conf])
        .args(["sync", "--device", "nowhere", "--from", "2024-05-02", "--to", "2024-05-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid range"));

    psync()
        .args(["--db", &db, "--config", &conf, "runs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No sync runs recorded."));
}

#[test]
fn sync_of_unconfigured_device_is_rejected() {
    let db = setup_test_db("cli_unknown_device");
    let (_dir, conf) = temp_config(None);

    psync()
        .args(["--db", &db, "--config", &conf, "sync", "--device", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown device: ghost"));
}

#[test]
fn to_without_from_is_a_usage_error() {
    psync()
        .args(["sync", "--device", "gate", "--to", "2024-05-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--from"));
}

#[test]
fn config_check_reports_device_problems() {
    let db = setup_test_db("cli_config_check");

    let (_ok_dir, good) = temp_config(Some(
        "devices:\n  - id: gate\n    kind: isapi\n    base_url: http://10.0.0.5\n    username: admin\n    password: secret\n  - id: clock\n    kind: zkteco\n    host: 10.0.0.6\n",
    ));
    psync()
        .args(["--db", &db, "--config", &good, "config", "--check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gate").and(predicate::str::contains("clock")));

    let (_bad_dir, bad) = temp_config(Some(
        "devices:\n  - id: gate\n    kind: isapi\n    username: admin\n    password: secret\n",
    ));
    psync()
        .args(["--db", &db, "--config", &bad, "config", "--check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("base_url"));
}

#[test]
fn cursor_show_and_reset_without_history() {
    let db = setup_test_db("cli_cursor");
    let (_dir, conf) = temp_config(None);

    psync()
        .args(["--db", &db, "--config", &conf, "cursor", "--device", "gate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("never completed a sync"));

    psync()
        .args(["--db", &db, "--config", &conf, "cursor", "--device", "gate", "--reset"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No cursor stored"));
}

#[test]
fn export_json_writes_sessions() {
    let db = setup_test_db("cli_export");
    let (_dir, conf) = temp_config(None);
    let out = temp_out("cli_export", "json");

    {
        let pool = open_db(&db);
        let id = insert_employee(&pool.conn, "default", Some("7"), None, "Grace").unwrap();
        insert_session(&pool.conn, id, &from_db("2024-05-01T08:00:00Z").unwrap(), "gate").unwrap();
    }

    psync()
        .args(["--db", &db, "--config", &conf])
        .args(["export", "--format", "json", "--file", &out, "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Export completed"));

    let content = fs::read_to_string(&out).expect("export file");
    let rows: serde_json::Value = serde_json::from_str(&content).expect("json");
    assert_eq!(rows[0]["employee_name"], "Grace");
    assert_eq!(rows[0]["check_in"], "2024-05-01T08:00:00Z");
    assert_eq!(rows[0]["check_out"], "");
}

#[test]
fn export_requires_an_absolute_path() {
    let db = setup_test_db("cli_export_rel");
    let (_dir, conf) = temp_config(None);

    psync()
        .args(["--db", &db, "--config", &conf])
        .args(["export", "--file", "relative.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be absolute"));
}

#[test]
fn sessions_and_integrity_check_on_a_fresh_database() {
    let db = setup_test_db("cli_fresh");
    let (_dir, conf) = temp_config(None);

    psync()
        .args(["--db", &db, "--config", &conf, "sessions", "--open"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No sessions."));

    psync()
        .args(["--db", &db, "--config", &conf, "db", "--check"])
        .assert()
        .success();
}

#[test]
fn events_lists_the_punch_ledger() {
    let db = setup_test_db("cli_events");
    let (_dir, conf) = temp_config(None);

    psync()
        .args(["--db", &db, "--config", &conf, "events", "--employee", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("employee 99 not found"));

    let id = {
        let pool = open_db(&db);
        insert_employee(&pool.conn, "default", Some("7"), None, "Grace").unwrap()
    };
    psync()
        .args(["--db", &db, "--config", &conf, "events", "--employee", &id.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains("No punches recorded for Grace."));
}
