use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn prints_version() {
    Command::cargo_bin("reelgram")
        .expect("binary built")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    Command::cargo_bin("reelgram")
        .expect("binary built")
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("reelgram"))
        .stdout(predicate::str::contains("--offline"));
}

#[test]
fn rejects_unknown_arguments() {
    Command::cargo_bin("reelgram")
        .expect("binary built")
        .arg("--bogus")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--bogus"));
}
