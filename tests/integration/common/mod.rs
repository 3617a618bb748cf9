#![allow(dead_code)]

use std::{
    fs,
    path::Path,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use winsvc::{
    error::RuntimeError,
    lifecycle::LifecycleState,
    service::ServiceRuntime,
    simulated::SimulatedDispatcher,
};

pub const SERVICE_NAME: &str = "Foo";
pub const COMMAND_LINE: &str = "C:\\foo.exe run";

/// Runs `runtime` on a background thread, like the SCM dispatch call would
/// block the main thread of a service process.
pub fn spawn_run(runtime: &Arc<ServiceRuntime>) -> JoinHandle<Result<(), RuntimeError>> {
    let runtime = Arc::clone(runtime);
    thread::spawn(move || runtime.run())
}

pub fn wait_for_state(dispatcher: &SimulatedDispatcher, state: LifecycleState) {
    if !dispatcher.wait_for_state(state, Duration::from_secs(5)) {
        panic!(
            "Timed out waiting for state {state}, reported so far: {:?}",
            dispatcher.states()
        );
    }
}

pub fn wait_for_lines(path: &Path, expected: usize) -> Vec<String> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(content) = fs::read_to_string(path) {
            let lines: Vec<_> = content.lines().map(|line| line.to_string()).collect();
            if lines.len() >= expected {
                return lines;
            }
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for {expected} lines in {:?}", path);
        }

        thread::sleep(Duration::from_millis(20));
    }
}
