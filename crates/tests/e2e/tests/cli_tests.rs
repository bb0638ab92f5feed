//! Drives the `changeset-cli` binary as a subprocess, the way an operator
//! would from a shell: open a change, list it, archive it, confirm the
//! receipt JSON on stdout.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn open_list_archive_via_cli() {
    let dir = tempfile::tempdir().expect("tempdir");

    Command::cargo_bin("changeset-cli")
        .expect("binary built")
        .args(["--root", dir.path().to_str().expect("utf8 path"), "open", "--title", "Add metrics", "--slug", "add-metrics", "--owner", "dana"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"created\": true"));

    Command::cargo_bin("changeset-cli")
        .expect("binary built")
        .args(["--root", dir.path().to_str().expect("utf8 path"), "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add-metrics"));

    Command::cargo_bin("changeset-cli")
        .expect("binary built")
        .args(["--root", dir.path().to_str().expect("utf8 path"), "archive", "add-metrics"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"archived\": true"));
}

#[test]
fn tools_list_enumerates_the_registry() {
    Command::cargo_bin("changeset-cli")
        .expect("binary built")
        .arg("tools-list")
        .assert()
        .success()
        .stdout(predicate::str::contains("change.open"))
        .stdout(predicate::str::contains("changes.active"));
}
