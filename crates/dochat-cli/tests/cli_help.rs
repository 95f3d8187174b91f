use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("dochat")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("docs"));
}

#[test]
fn test_docs_help_shows_subcommands() {
    cargo_bin_cmd!("dochat")
        .args(["docs", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("upload"));
}

#[test]
fn test_docs_watch_help_shows_interval() {
    cargo_bin_cmd!("dochat")
        .args(["docs", "watch", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("interval-ms"));
}

#[test]
fn test_docs_commands_require_api_url() {
    cargo_bin_cmd!("dochat")
        .env_remove("DOCHAT_API_URL")
        .args(["docs", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--api-url"));
}

#[test]
fn test_search_method_rejects_unknown_value() {
    cargo_bin_cmd!("dochat")
        .args(["--search-method", "grep", "chat"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("search"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("dochat")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1"));
}
