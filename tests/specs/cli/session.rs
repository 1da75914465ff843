// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use assert_cmd::Command;

fn polka(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("polka").unwrap();
    cmd.env("POLKA_STATE_DIR", dir.path().join("state"))
        .env("POLKA_LOCK_DIR", dir.path().join("locks"))
        .env("RUST_LOG", "warn");
    cmd
}

fn lockfile_for(dir: &tempfile::TempDir, session_id: &str) -> std::path::PathBuf {
    dir.path().join("locks").join(format!("{}.lock", session_id))
}

/// A lockfile as another live process would have written it.
fn write_foreign_lock(dir: &tempfile::TempDir, session_id: &str) {
    std::fs::create_dir_all(dir.path().join("locks")).unwrap();
    let info = serde_json::json!({
        "session_id": session_id,
        "pid": 999_999,
        "ppid": 1,
        "start_time": 0,
        "hostname": "elsewhere",
        "username": "other",
    });
    std::fs::write(lockfile_for(dir, session_id), info.to_string()).unwrap();
}

#[test]
fn fresh_foreign_lock_refuses_the_session() {
    let dir = tempfile::tempdir().unwrap();
    write_foreign_lock(&dir, "sess-contested");

    let assert = polka(&dir)
        .args(["--continuous", "--workflow-cmd", "true", "--session-id", "sess-contested"])
        .assert()
        .failure()
        .code(1);

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("session lock refused"), "stderr: {}", stderr);
    assert!(stderr.contains("999999"), "holder info should be reported: {}", stderr);
}

#[test]
fn stale_foreign_lock_is_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    write_foreign_lock(&dir, "sess-stale");

    // Two hours old: reclaimable.
    let path = lockfile_for(&dir, "sess-stale");
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    let past = std::time::SystemTime::now() - std::time::Duration::from_secs(2 * 3600);
    file.set_times(std::fs::FileTimes::new().set_modified(past)).unwrap();
    drop(file);

    // A goal run that only fails at decomposition still proves the lock was
    // taken over: the exit code is 1 but the foreign lock is gone.
    polka(&dir)
        .args(["--goal", "x", "--approval", "none", "--workflow-cmd", "false"])
        .args(["--session-id", "sess-stale"])
        .assert()
        .failure()
        .code(1);

    assert!(!path.exists(), "orderly exit removes the reclaimed lock");
}
