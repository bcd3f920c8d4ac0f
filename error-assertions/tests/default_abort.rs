//! The default handlers abort the process, so each scenario is run by
//! invoking this same test binary as a child process that only runs the one
//! test, with an environment variable telling it to actually do the
//! failing call.
#![cfg(unix)]

use error_assertions as ea;
use std::{os::unix::process::ExitStatusExt, process::Output};

const CHILD_ENV: &str = "ERROR_ASSERTIONS_CHILD";

#[inline]
fn is_child() -> bool {
    std::env::var_os(CHILD_ENV).is_some()
}

fn run_child(test_name: &str) -> Output {
    let exe = std::env::current_exe().expect("failed to get exe path");

    std::process::Command::new(exe)
        .args([test_name, "--exact", "--nocapture", "--test-threads", "1"])
        .env(CHILD_ENV, "1")
        .output()
        .expect("failed to run child test")
}

#[track_caller]
fn assert_aborted(output: &Output, expected: &str) {
    let stderr = String::from_utf8_lossy(&output.stderr);

    // Ensure it was interrupted and did not exit properly
    assert!(
        output.status.code().is_none(),
        "child exited with {:?}\n{stderr}",
        output.status
    );
    assert!(output.status.signal().is_some());
    assert!(stderr.contains(expected), "'{expected}' not in:\n{stderr}");
}

#[test]
fn fatal_error_aborts() {
    if is_child() {
        ea::fatal_error_message("boom");
    }

    assert_aborted(&run_child("fatal_error_aborts"), "Fatal error: boom, file");
}

#[test]
fn precondition_failure_aborts() {
    if is_child() {
        ea::precondition_failure_message("");
    }

    assert_aborted(
        &run_child("precondition_failure_aborts"),
        "Precondition failure: anonymous error",
    );
}

#[test]
fn violated_precondition_aborts() {
    if is_child() {
        ea::precondition_message(false, "must hold");
        return;
    }

    assert_aborted(
        &run_child("violated_precondition_aborts"),
        "Precondition failed: must hold",
    );
}

#[test]
fn satisfied_precondition_returns() {
    if is_child() {
        ea::precondition_message(true, "must hold");
        return;
    }

    let output = run_child("satisfied_precondition_returns");
    assert!(output.status.success(), "{output:?}");
}

#[test]
fn restored_handler_aborts() {
    if is_child() {
        let restoration = ea::replace_precondition_failure(|_, _| {});
        restoration.restore();
        assert!(!ea::is_replaced(ea::Category::PreconditionFailure));

        ea::precondition_failure_message("restored");
    }

    assert_aborted(
        &run_child("restored_handler_aborts"),
        "Precondition failure: restored",
    );
}
