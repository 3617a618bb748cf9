//! Example service workload: a ticker that appends a line to a file on every
//! poll interval until a stop is requested.
use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use tracing::{debug, error, info, warn};

use crate::{
    lifecycle::{ControlEvent, ControlResult, LifecycleState},
    service::ServiceRuntime,
};

/// Timing and output of the ticker.
#[derive(Debug, Clone)]
pub struct TickerSettings {
    /// Time between ticks; also the stop-event wait timeout.
    pub interval: Duration,
    /// File appended to on every tick.
    pub output: Option<PathBuf>,
}

/// Appends `another line N` to its output file.
#[derive(Debug)]
pub struct Ticker {
    output: Option<PathBuf>,
    count: u64,
}

impl Ticker {
    pub fn new(output: Option<PathBuf>) -> Self {
        Self { output, count: 0 }
    }

    /// Number of ticks so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn tick(&mut self) -> io::Result<()> {
        let line = self.count;
        self.count += 1;

        if let Some(path) = &self.output {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "another line {line}")?;
        }
        debug!("Tick {line}");
        Ok(())
    }
}

/// Entry callback body: start, report running, tick until stopped, end.
pub fn service_main(runtime: &Arc<ServiceRuntime>, args: Vec<String>, settings: &TickerSettings) {
    info!("Inside service main");

    if let Err(err) = runtime.start(&args) {
        error!("Abort: {err}");
        return;
    }

    info!("Service is running");
    runtime.report_status(LifecycleState::Running, Duration::ZERO);

    let mut ticker = Ticker::new(settings.output.clone());
    loop {
        if let Err(err) = ticker.tick() {
            warn!("Ticker failed to write output: {err}");
        }

        if runtime.wait_for_stop(settings.interval) {
            runtime.report_status(LifecycleState::Stopped, Duration::ZERO);
            break;
        }
    }

    info!("Service is quitting after {} ticks", ticker.count());
    runtime.end();
}

/// Control handler that tells the control manager how long shutdown takes.
pub fn stop_control_handler(
    stop_wait_hint: Duration,
) -> impl Fn(&ServiceRuntime, ControlEvent) -> ControlResult + Send + Sync + 'static {
    move |runtime, event| match event {
        ControlEvent::Stop => {
            runtime.report_status(LifecycleState::StopPending, stop_wait_hint);
            runtime.signal_stop();
            ControlResult::NoError
        }
        ControlEvent::Interrogate => ControlResult::NoError,
        _ => ControlResult::NotImplemented,
    }
}
