//! Live lifecycle of a service instance.
//!
//! A [`ServiceRuntime`] is built once per process, handed an entry callback
//! and optionally a control handler, then [`ServiceRuntime::run`] connects it
//! to the service control manager. The entry callback brackets its work with
//! [`ServiceRuntime::start`] and [`ServiceRuntime::end`] and reports progress
//! through [`ServiceRuntime::report_status`].
use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use tracing::{debug, error, info, warn};

use crate::{
    dispatch::{ControlHandler, ServiceDispatcher, ServiceMain, StatusHandle},
    error::RuntimeError,
    lifecycle::{ControlEvent, ControlResult, LifecycleState, StatusTracker},
    stop_event::StopEvent,
};

/// Wait hint reported together with start-pending.
pub const START_PENDING_WAIT_HINT: Duration = Duration::from_millis(1000);

/// Entry callback run on the dispatcher thread (or inline in foreground mode).
pub type EntryFn = Arc<dyn Fn(&Arc<ServiceRuntime>, Vec<String>) + Send + Sync>;

/// Control callback. Runs on the dispatcher's control thread and must not block.
pub type ControlFn = Arc<dyn Fn(&ServiceRuntime, ControlEvent) -> ControlResult + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builder for [`ServiceRuntime`].
pub struct ServiceRuntimeBuilder {
    dispatcher: Box<dyn ServiceDispatcher>,
    entry: Option<EntryFn>,
    control: Option<ControlFn>,
    name: String,
    foreground: bool,
    stop_event: Option<StopEvent>,
    exit_code: u32,
}

impl ServiceRuntimeBuilder {
    /// Entry callback. Mandatory before [`ServiceRuntime::run`].
    pub fn entry<F>(mut self, entry: F) -> Self
    where
        F: Fn(&Arc<ServiceRuntime>, Vec<String>) + Send + Sync + 'static,
    {
        self.entry = Some(Arc::new(entry));
        self
    }

    /// Replaces [`ServiceRuntime::default_control_handler`].
    pub fn control_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ServiceRuntime, ControlEvent) -> ControlResult + Send + Sync + 'static,
    {
        self.control = Some(Arc::new(handler));
        self
    }

    /// Service name. Own-process services may leave it empty.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Runs the entry callback in-process without the service control manager.
    pub fn foreground(mut self, foreground: bool) -> Self {
        self.foreground = foreground;
        self
    }

    /// Uses an event owned by the caller instead of creating one in `start`.
    pub fn stop_event(mut self, event: StopEvent) -> Self {
        self.stop_event = Some(event);
        self
    }

    /// Win32 exit code sent with every status report.
    pub fn exit_code(mut self, code: u32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn build(self) -> Arc<ServiceRuntime> {
        Arc::new(ServiceRuntime {
            dispatcher: self.dispatcher,
            entry: self.entry,
            control: self.control,
            foreground: self.foreground,
            name: Mutex::new(self.name),
            exit_code: AtomicU32::new(self.exit_code),
            status: Mutex::new(StatusTracker::default()),
            stop_event: Mutex::new(self.stop_event),
            status_handle: Mutex::new(None),
            last_error: Mutex::new(None),
        })
    }
}

/// State of one running service instance.
pub struct ServiceRuntime {
    dispatcher: Box<dyn ServiceDispatcher>,
    entry: Option<EntryFn>,
    control: Option<ControlFn>,
    foreground: bool,
    name: Mutex<String>,
    exit_code: AtomicU32,
    status: Mutex<StatusTracker>,
    stop_event: Mutex<Option<StopEvent>>,
    status_handle: Mutex<Option<Box<dyn StatusHandle>>>,
    last_error: Mutex<Option<String>>,
}

impl ServiceRuntime {
    /// Starts building a runtime bound to `dispatcher`.
    pub fn builder(dispatcher: impl ServiceDispatcher + 'static) -> ServiceRuntimeBuilder {
        ServiceRuntimeBuilder {
            dispatcher: Box::new(dispatcher),
            entry: None,
            control: None,
            name: String::new(),
            foreground: false,
            stop_event: None,
            exit_code: 0,
        }
    }

    /// Hands the process to the service dispatcher and blocks until it returns.
    ///
    /// Fails without touching the OS when no entry callback was supplied. In
    /// foreground mode the entry callback runs inline on the calling thread.
    pub fn run(self: &Arc<Self>) -> Result<(), RuntimeError> {
        let Some(entry) = self.entry.clone() else {
            return Err(self.fail(RuntimeError::MissingEntry));
        };

        if self.foreground {
            info!("Running service '{}' in the foreground", self.name());
            entry(self, Vec::new());
            return Ok(());
        }

        let runtime = Arc::clone(self);
        let service_main: ServiceMain = Box::new(move |args| entry(&runtime, args));

        info!("Starting service dispatcher");
        self.dispatcher
            .run(&self.name(), service_main)
            .map_err(|err| self.fail(RuntimeError::Dispatch(err)))
    }

    /// Call first thing inside the entry callback. On failure return from the
    /// entry callback immediately.
    ///
    /// Creates the stop event unless one was supplied, registers the control
    /// handler and reports start-pending. If registration fails the stop
    /// event is signaled so polling loops unblock.
    pub fn start(self: &Arc<Self>, args: &[String]) -> Result<(), RuntimeError> {
        if let [name] = args {
            *lock(&self.name) = name.clone();
        }

        {
            let mut event = lock(&self.stop_event);
            if event.is_none() {
                debug!("Creating stop event");
                *event = Some(StopEvent::new());
            }
        }

        if self.foreground {
            debug!("Foreground mode, skipping control handler registration");
            return Ok(());
        }

        let context = Arc::downgrade(self);
        let handler: ControlHandler = Box::new(move |event| match context.upgrade() {
            Some(runtime) => runtime.handle_control(event),
            None => ControlResult::NotImplemented,
        });

        let name = self.name();
        match self.dispatcher.register_control_handler(&name, handler) {
            Ok(handle) => *lock(&self.status_handle) = Some(handle),
            Err(err) => {
                let err = self.fail(RuntimeError::RegisterHandler(err));
                self.signal_stop();
                return Err(err);
            }
        }

        self.report_status(LifecycleState::StartPending, START_PENDING_WAIT_HINT);
        Ok(())
    }

    /// Call last thing inside the entry callback, after every successful
    /// [`ServiceRuntime::start`]. Releases the stop event and status handle.
    pub fn end(&self) {
        lock(&self.stop_event).take();
        lock(&self.status_handle).take();
        debug!("Released service resources");
    }

    /// Reports `state` to the service control manager, ignoring delivery errors
    /// beyond a warning. See [`ServiceRuntime::try_report_status`].
    pub fn report_status(&self, state: LifecycleState, wait_hint: Duration) {
        if let Err(err) = self.try_report_status(state, wait_hint) {
            warn!("Failed to report {state} status: {err}");
        }
    }

    /// Reports `state` and returns any delivery error.
    ///
    /// Entering running or stopped resets the checkpoint to zero; every other
    /// report increments it. A rejected report leaves state and checkpoint
    /// unchanged.
    pub fn try_report_status(
        &self,
        state: LifecycleState,
        wait_hint: Duration,
    ) -> Result<(), RuntimeError> {
        let mut tracker = lock(&self.status);
        let status = tracker.next(state, self.exit_code(), wait_hint);

        if !self.foreground {
            let handle = lock(&self.status_handle);
            let Some(handle) = handle.as_ref() else {
                return Err(self.fail(RuntimeError::NotStarted));
            };
            handle
                .set_status(&status)
                .map_err(|err| self.fail(RuntimeError::ReportStatus(err)))?;
        }

        debug!("Service state {state} (checkpoint {})", status.checkpoint);
        tracker.commit(&status);
        Ok(())
    }

    /// Control handler installed when the caller does not supply one.
    ///
    /// Stop reports stop-pending and signals the stop event; interrogate is
    /// acknowledged; everything else is not implemented.
    pub fn default_control_handler(runtime: &ServiceRuntime, event: ControlEvent) -> ControlResult {
        match event {
            ControlEvent::Stop => {
                runtime.report_status(LifecycleState::StopPending, Duration::ZERO);
                runtime.signal_stop();
                ControlResult::NoError
            }
            ControlEvent::Interrogate => ControlResult::NoError,
            _ => ControlResult::NotImplemented,
        }
    }

    /// Delivers a stop request through the installed control handler, as if it
    /// came from the service control manager.
    pub fn request_stop(&self) -> ControlResult {
        self.handle_control(ControlEvent::Stop)
    }

    /// Signals the stop event, if one exists. Returns `true` if this call
    /// signaled it.
    pub fn signal_stop(&self) -> bool {
        match lock(&self.stop_event).as_ref() {
            Some(event) => event.signal(),
            None => false,
        }
    }

    /// Waits up to `timeout` for a stop request. Returns `true` when the
    /// workload should exit, including when there is no stop event to wait on.
    pub fn wait_for_stop(&self, timeout: Duration) -> bool {
        let event = lock(&self.stop_event).clone();
        match event {
            Some(event) => event.wait_timeout(timeout),
            None => true,
        }
    }

    /// Clears all per-run state so the instance can be run again.
    pub fn reset(&self) {
        *lock(&self.status) = StatusTracker::default();
        self.exit_code.store(0, Ordering::SeqCst);
        lock(&self.stop_event).take();
        lock(&self.status_handle).take();
        lock(&self.last_error).take();
    }

    pub fn stop_event(&self) -> Option<StopEvent> {
        lock(&self.stop_event).clone()
    }

    pub fn state(&self) -> LifecycleState {
        lock(&self.status).state()
    }

    pub fn checkpoint(&self) -> u32 {
        lock(&self.status).checkpoint()
    }

    pub fn exit_code(&self) -> u32 {
        self.exit_code.load(Ordering::SeqCst)
    }

    pub fn set_exit_code(&self, code: u32) {
        self.exit_code.store(code, Ordering::SeqCst);
    }

    /// Message of the most recent error raised by this runtime.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    pub fn name(&self) -> String {
        lock(&self.name).clone()
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground
    }

    pub fn is_registered(&self) -> bool {
        lock(&self.status_handle).is_some()
    }

    fn handle_control(&self, event: ControlEvent) -> ControlResult {
        debug!("Received control {event:?}");
        match &self.control {
            Some(handler) => handler(self, event),
            None => Self::default_control_handler(self, event),
        }
    }

    fn fail(&self, err: RuntimeError) -> RuntimeError {
        error!("{err}");
        *lock(&self.last_error) = Some(err.to_string());
        err
    }
}

impl fmt::Debug for ServiceRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRuntime")
            .field("name", &self.name())
            .field("foreground", &self.foreground)
            .field("state", &self.state())
            .field("checkpoint", &self.checkpoint())
            .field("exit_code", &self.exit_code())
            .finish()
    }
}
