//! CLI-level tests for cross-connect, run against a temporary config and
//! database.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_config(dir: &TempDir) -> String {
    let db_path = dir.path().join("cli.db");
    let config_path = dir.path().join("config.toml");
    let config = format!(
        r#"
[database]
path = "{}"

[security]
state_secret = "cli-test-secret"
"#,
        db_path.display()
    );
    std::fs::write(&config_path, config).unwrap();
    config_path.to_str().unwrap().to_string()
}

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("cross-connect")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("callback"))
        .stdout(predicate::str::contains("direct"))
        .stdout(predicate::str::contains("disconnect"));
}

#[test]
fn test_list_empty_workspace() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    Command::cargo_bin("cross-connect")
        .unwrap()
        .env("CROSSCAST_CONFIG", &config)
        .args(["list", "3fa85f64-5717-4562-b3fc-2c963f66afa6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No connected accounts"));
}

#[test]
fn test_init_unconfigured_provider_needs_setup() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    Command::cargo_bin("cross-connect")
        .unwrap()
        .env("CROSSCAST_CONFIG", &config)
        .env_remove("CROSSCAST_LINKEDIN_CLIENT_ID")
        .args([
            "init",
            "linkedin",
            "--user",
            "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "--workspace",
            "3fa85f64-5717-4562-b3fc-2c963f66afa7",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not configured"));
}

#[test]
fn test_init_direct_credential_provider_rejected() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    Command::cargo_bin("cross-connect")
        .unwrap()
        .env("CROSSCAST_CONFIG", &config)
        .args([
            "init",
            "bluesky",
            "--user",
            "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "--workspace",
            "3fa85f64-5717-4562-b3fc-2c963f66afa7",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("direct-credential"));
}

#[test]
fn test_callback_with_garbage_state_is_invalid_state() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    Command::cargo_bin("cross-connect")
        .unwrap()
        .env("CROSSCAST_CONFIG", &config)
        .env("CROSSCAST_X_CLIENT_ID", "app")
        .env("CROSSCAST_X_CLIENT_SECRET", "secret")
        .env("CROSSCAST_X_REDIRECT_URI", "https://example.com/cb")
        .args(["callback", "x", "--code", "abc", "--state", "tampered.state"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid_state"));
}

#[test]
fn test_unknown_provider_rejected() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    Command::cargo_bin("cross-connect")
        .unwrap()
        .env("CROSSCAST_CONFIG", &config)
        .args([
            "init",
            "myspace",
            "--user",
            "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "--workspace",
            "3fa85f64-5717-4562-b3fc-2c963f66afa7",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown provider"));
}
