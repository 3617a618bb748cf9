#[path = "common/mod.rs"]
mod common;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::tempdir;

fn winsvc(dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("winsvc"));
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

#[test]
fn no_command_prints_usage() {
    let temp = tempdir().expect("failed to create tempdir");
    winsvc(temp.path())
        .assert()
        .success()
        .stdout(contains("usage: winsvc install|remove|run"));
}

#[test]
fn unknown_command_prints_usage() {
    let temp = tempdir().expect("failed to create tempdir");
    winsvc(temp.path())
        .arg("pause")
        .assert()
        .code(1)
        .stdout(contains("usage: winsvc install|remove|run"));
}

#[test]
fn missing_config_file_is_reported() {
    let temp = tempdir().expect("failed to create tempdir");
    winsvc(temp.path())
        .args(["install", "--config", "absent.yaml"])
        .assert()
        .failure()
        .stderr(contains("absent.yaml"));
}

#[cfg(not(windows))]
#[test]
fn install_without_service_manager_fails() {
    let temp = tempdir().expect("failed to create tempdir");
    winsvc(temp.path())
        .arg("install")
        .assert()
        .failure()
        .stdout(contains(
            "OpenSCManager failed (120) This function is not supported on this system.",
        ));
}

#[cfg(not(windows))]
#[test]
fn remove_without_service_manager_fails() {
    let temp = tempdir().expect("failed to create tempdir");
    winsvc(temp.path())
        .arg("remove")
        .assert()
        .failure()
        .stdout(contains("OpenSCManager failed (120)"));
}

#[cfg(not(windows))]
#[test]
fn run_without_service_manager_fails() {
    let temp = tempdir().expect("failed to create tempdir");
    winsvc(temp.path())
        .arg("run")
        .assert()
        .failure()
        .stdout(contains("Starting service dispatcher"))
        .stdout(contains(
            "Service run failed: StartServiceCtrlDispatcher failed with (120)",
        ));
}

#[cfg(unix)]
#[test]
fn foreground_run_stops_on_interrupt() {
    use std::{
        fs,
        process::{Command as StdCommand, Stdio},
        thread,
        time::{Duration, Instant},
    };

    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let output = dir.join("ticks.txt");
    let config_path = dir.join("winsvc.yaml");
    fs::write(
        &config_path,
        format!(
            "service:\n  name: Ticker\nworkload:\n  interval: 50ms\n  output: \"{}\"\n",
            output.display()
        ),
    )
    .expect("failed to write config");

    let mut child = StdCommand::new(assert_cmd::cargo::cargo_bin!("winsvc"))
        .current_dir(dir)
        .args(["run", "--foreground"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn winsvc");

    let lines = common::wait_for_lines(&output, 2);
    assert_eq!(lines[0], "another line 0");

    let status = StdCommand::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("failed to send SIGINT");
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(5);
    let exit = loop {
        if let Some(exit) = child.try_wait().expect("failed to poll winsvc") {
            break exit;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("winsvc did not stop after SIGINT");
        }
        thread::sleep(Duration::from_millis(20));
    };
    assert!(exit.success(), "unexpected exit: {exit:?}");
}
