// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use assert_cmd::Command;

#[test]
fn help_lists_operator_surface() {
    let assert = Command::cargo_bin("polka").unwrap().arg("--help").assert().success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();

    for flag in
        ["--goal", "--continuous", "--approval", "--auto-approve-safe", "--working-dir", "--workflow-cmd"]
    {
        assert!(output.contains(flag), "help should mention {}", flag);
    }
}

#[test]
fn version_prints_and_exits_clean() {
    Command::cargo_bin("polka").unwrap().arg("--version").assert().success();
}
