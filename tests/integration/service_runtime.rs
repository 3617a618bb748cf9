#[path = "common/mod.rs"]
mod common;

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use common::{SERVICE_NAME, spawn_run, wait_for_lines, wait_for_state};
use tempfile::tempdir;
use winsvc::{
    error::RuntimeError,
    lifecycle::{ControlEvent, ControlResult, LifecycleState},
    service::ServiceRuntime,
    simulated::SimulatedDispatcher,
    workload::{self, TickerSettings},
};

fn ticker(interval: Duration, output: Option<std::path::PathBuf>) -> TickerSettings {
    TickerSettings { interval, output }
}

#[test]
fn stop_control_ends_ticker_service() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("ticks.txt");
    let settings = ticker(Duration::from_millis(3000), Some(output.clone()));

    let dispatcher = SimulatedDispatcher::new();
    let runtime = ServiceRuntime::builder(dispatcher.clone())
        .name(SERVICE_NAME)
        .control_handler(workload::stop_control_handler(Duration::from_millis(1000)))
        .entry(move |runtime, args| workload::service_main(runtime, args, &settings))
        .build();

    let handle = spawn_run(&runtime);
    wait_for_state(&dispatcher, LifecycleState::Running);
    assert_eq!(wait_for_lines(&output, 1), vec!["another line 0".to_string()]);

    let stop_sent = Instant::now();
    assert_eq!(
        dispatcher.send_control(ControlEvent::Stop),
        Some(ControlResult::NoError)
    );
    handle.join().unwrap().unwrap();
    assert!(stop_sent.elapsed() < Duration::from_millis(3000));

    assert_eq!(
        dispatcher.states(),
        vec![
            LifecycleState::StartPending,
            LifecycleState::Running,
            LifecycleState::StopPending,
            LifecycleState::Stopped,
        ]
    );
    let checkpoints: Vec<u32> = dispatcher.reports().iter().map(|s| s.checkpoint).collect();
    assert_eq!(checkpoints, vec![1, 0, 1, 0]);
    assert!(!dispatcher.reports()[0].accepts_stop);
    assert!(dispatcher.reports()[1].accepts_stop);
    assert_eq!(dispatcher.reports()[2].wait_hint, Duration::from_millis(1000));

    assert_eq!(dispatcher.registered_name().as_deref(), Some(SERVICE_NAME));
    assert_eq!(runtime.state(), LifecycleState::Stopped);
    assert!(runtime.stop_event().is_none());
    assert!(!runtime.is_registered());
}

#[test]
fn interrogate_is_acknowledged_while_running() {
    let settings = ticker(Duration::from_millis(50), None);
    let dispatcher = SimulatedDispatcher::new();
    let runtime = ServiceRuntime::builder(dispatcher.clone())
        .name(SERVICE_NAME)
        .entry(move |runtime, args| workload::service_main(runtime, args, &settings))
        .build();

    let handle = spawn_run(&runtime);
    wait_for_state(&dispatcher, LifecycleState::Running);

    assert_eq!(
        dispatcher.send_control(ControlEvent::Interrogate),
        Some(ControlResult::NoError)
    );
    assert_eq!(
        dispatcher.send_control(ControlEvent::Pause),
        Some(ControlResult::NotImplemented)
    );
    assert_eq!(runtime.state(), LifecycleState::Running);

    assert_eq!(
        dispatcher.send_control(ControlEvent::Stop),
        Some(ControlResult::NoError)
    );
    handle.join().unwrap().unwrap();

    let reports = dispatcher.reports();
    let stop_pending = reports
        .iter()
        .find(|status| status.state == LifecycleState::StopPending)
        .expect("stop-pending reported");
    assert_eq!(stop_pending.wait_hint, Duration::ZERO);
    assert_eq!(dispatcher.states().last(), Some(&LifecycleState::Stopped));
}

#[test]
fn entry_receives_name_and_start_arguments() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = SimulatedDispatcher::new().with_start_args(vec!["--verbose".to_string()]);
    let runtime = ServiceRuntime::builder(dispatcher.clone())
        .name(SERVICE_NAME)
        .entry({
            let seen = Arc::clone(&seen);
            move |runtime, args| {
                *seen.lock().unwrap() = args.clone();
                runtime.start(&args).unwrap();
                runtime.report_status(LifecycleState::Stopped, Duration::ZERO);
                runtime.end();
            }
        })
        .build();

    runtime.run().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![SERVICE_NAME.to_string(), "--verbose".to_string()]
    );
    assert_eq!(runtime.name(), SERVICE_NAME);
    assert_eq!(dispatcher.dispatch_count(), 1);
}

#[test]
fn run_without_entry_never_dispatches() {
    let dispatcher = SimulatedDispatcher::new();
    let runtime = ServiceRuntime::builder(dispatcher.clone()).build();

    let err = runtime.run().unwrap_err();
    assert!(matches!(err, RuntimeError::MissingEntry));
    assert_eq!(err.to_string(), "SvcMain must be set");
    assert_eq!(runtime.last_error().as_deref(), Some("SvcMain must be set"));
    assert_eq!(dispatcher.dispatch_count(), 0);
}

#[test]
fn dispatcher_failure_is_reported() {
    let dispatcher = SimulatedDispatcher::new();
    dispatcher.fail_dispatch(1063);
    let runtime = ServiceRuntime::builder(dispatcher.clone())
        .entry(|_, _| panic!("entry must not run"))
        .build();

    let err = runtime.run().unwrap_err();
    assert_eq!(
        err.to_string(),
        "StartServiceCtrlDispatcher failed with (1063) The service process could not connect to the service controller."
    );
    assert_eq!(runtime.last_error(), Some(err.to_string()));
}

#[test]
fn handler_registration_failure_aborts_workload() {
    let settings = ticker(Duration::from_millis(3000), None);
    let dispatcher = SimulatedDispatcher::new();
    dispatcher.fail_registration(6);
    let runtime = ServiceRuntime::builder(dispatcher.clone())
        .name(SERVICE_NAME)
        .entry(move |runtime, args| workload::service_main(runtime, args, &settings))
        .build();

    let started = Instant::now();
    runtime.run().unwrap();
    assert!(started.elapsed() < Duration::from_millis(3000));

    assert!(dispatcher.reports().is_empty());
    assert_eq!(
        runtime.last_error().as_deref(),
        Some("Unable to do RegisterServiceCtrlHandlerEx: (6) The handle is invalid.")
    );
    assert!(runtime.stop_event().unwrap().is_signaled());
    assert_eq!(runtime.state(), LifecycleState::Stopped);
}

#[test]
fn foreground_run_stops_on_request() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("ticks.txt");
    let settings = ticker(Duration::from_millis(20), Some(output.clone()));

    let dispatcher = SimulatedDispatcher::new();
    let runtime = ServiceRuntime::builder(dispatcher.clone())
        .name(SERVICE_NAME)
        .foreground(true)
        .entry(move |runtime, args| workload::service_main(runtime, args, &settings))
        .build();

    let handle = spawn_run(&runtime);
    let lines = wait_for_lines(&output, 2);
    assert_eq!(lines[..2], ["another line 0", "another line 1"]);

    assert_eq!(runtime.request_stop(), ControlResult::NoError);
    handle.join().unwrap().unwrap();

    assert_eq!(dispatcher.dispatch_count(), 0);
    assert!(dispatcher.reports().is_empty());
    assert_eq!(runtime.state(), LifecycleState::Stopped);
}

#[test]
fn reset_allows_a_second_run() {
    let dispatcher = SimulatedDispatcher::new();
    let runtime = ServiceRuntime::builder(dispatcher.clone())
        .name(SERVICE_NAME)
        .entry(|runtime, args| {
            runtime.start(&args).unwrap();
            runtime.report_status(LifecycleState::Stopped, Duration::ZERO);
            runtime.end();
        })
        .build();

    runtime.run().unwrap();
    runtime.set_exit_code(1066);
    runtime.reset();
    assert_eq!(runtime.exit_code(), 0);
    assert_eq!(runtime.state(), LifecycleState::Stopped);
    assert_eq!(runtime.checkpoint(), 0);

    runtime.run().unwrap();
    assert_eq!(dispatcher.dispatch_count(), 2);
    assert_eq!(
        dispatcher.states(),
        vec![
            LifecycleState::StartPending,
            LifecycleState::Stopped,
            LifecycleState::StartPending,
            LifecycleState::Stopped,
        ]
    );
}
