//! In-memory service control manager and dispatcher.
//!
//! Both types implement the same traits as the Windows bindings, keep their
//! state behind an `Arc` so clones observe each other, and reproduce the
//! SCM's threading model: the service entry point runs on a thread created by
//! the dispatcher and control requests arrive on a separate delivery thread.
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use tracing::debug;

use crate::{
    dispatch::{ControlHandler, ServiceDispatcher, ServiceMain, StatusHandle},
    lifecycle::{ControlEvent, ControlResult, LifecycleState, ServiceStatus},
    registrar::{
        ServiceAccess, ServiceControlManager, ServiceDatabase, ServiceHandle,
        ServiceRegistration, StartupPolicy,
    },
    syserr::SystemError,
};

const ERROR_SERVICE_DOES_NOT_EXIST: u32 = 1060;
const ERROR_SERVICE_EXISTS: u32 = 1073;
const ERROR_SERVICE_MARKED_FOR_DELETE: u32 = 1072;
const ERROR_SERVICE_SPECIFIC_ERROR: u32 = 1066;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn known_error(code: u32) -> SystemError {
    let text = match code {
        5 => "Access is denied.",
        6 => "The handle is invalid.",
        ERROR_SERVICE_DOES_NOT_EXIST => {
            "The specified service does not exist as an installed service."
        }
        1063 => "The service process could not connect to the service controller.",
        ERROR_SERVICE_SPECIFIC_ERROR => "The service has returned a service-specific error code.",
        ERROR_SERVICE_MARKED_FOR_DELETE => "The specified service has been marked for deletion.",
        ERROR_SERVICE_EXISTS => "The specified service already exists.",
        _ => return SystemError::from_code(code),
    };
    SystemError::new(code, text)
}

// ----------------------------------------------------------------------------
// Service control manager database
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ScmState {
    registrations: BTreeMap<String, ServiceRegistration>,
    open_handles: usize,
    creates: usize,
    deny_connect: Option<u32>,
    fail_create: Option<u32>,
    fail_change: Option<u32>,
    fail_delete: Option<u32>,
}

/// In-memory service control manager database.
#[derive(Debug, Clone, Default)]
pub struct SimulatedScm {
    state: Arc<Mutex<ScmState>>,
}

impl SimulatedScm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `connect` fail with `code`.
    pub fn deny_access(&self, code: u32) {
        lock(&self.state).deny_connect = Some(code);
    }

    /// Makes every subsequent create fail with `code`.
    pub fn fail_creates(&self, code: u32) {
        lock(&self.state).fail_create = Some(code);
    }

    /// Makes every subsequent configuration change fail with `code`.
    pub fn fail_changes(&self, code: u32) {
        lock(&self.state).fail_change = Some(code);
    }

    /// Makes every subsequent delete fail with `code`.
    pub fn fail_deletes(&self, code: u32) {
        lock(&self.state).fail_delete = Some(code);
    }

    /// Registration stored under `name`.
    pub fn registration(&self, name: &str) -> Option<ServiceRegistration> {
        lock(&self.state).registrations.get(name).cloned()
    }

    pub fn service_names(&self) -> Vec<String> {
        lock(&self.state).registrations.keys().cloned().collect()
    }

    /// Number of registrations created so far.
    pub fn create_count(&self) -> usize {
        lock(&self.state).creates
    }

    /// Manager and service handles not yet closed.
    pub fn open_handles(&self) -> usize {
        lock(&self.state).open_handles
    }

    fn acquire(&self) {
        lock(&self.state).open_handles += 1;
    }
}

impl ServiceDatabase for SimulatedScm {
    type Manager = SimulatedManager;

    fn connect(&self) -> Result<Self::Manager, SystemError> {
        if let Some(code) = lock(&self.state).deny_connect {
            return Err(known_error(code));
        }
        self.acquire();
        Ok(SimulatedManager { scm: self.clone() })
    }
}

/// Open connection to a [`SimulatedScm`].
#[derive(Debug)]
pub struct SimulatedManager {
    scm: SimulatedScm,
}

impl Drop for SimulatedManager {
    fn drop(&mut self) {
        lock(&self.scm.state).open_handles -= 1;
    }
}

impl ServiceControlManager for SimulatedManager {
    type Service = SimulatedService;

    fn open_service(&self, name: &str, access: ServiceAccess) -> Result<Self::Service, SystemError> {
        if !lock(&self.scm.state).registrations.contains_key(name) {
            return Err(known_error(ERROR_SERVICE_DOES_NOT_EXIST));
        }
        self.scm.acquire();
        Ok(SimulatedService {
            scm: self.scm.clone(),
            name: name.to_string(),
            access,
        })
    }

    fn create_service(
        &self,
        registration: &ServiceRegistration,
    ) -> Result<Self::Service, SystemError> {
        {
            let mut state = lock(&self.scm.state);
            if let Some(code) = state.fail_create {
                return Err(known_error(code));
            }
            if state.registrations.contains_key(&registration.name) {
                return Err(known_error(ERROR_SERVICE_EXISTS));
            }
            state
                .registrations
                .insert(registration.name.clone(), registration.clone());
            state.creates += 1;
        }
        self.scm.acquire();
        Ok(SimulatedService {
            scm: self.scm.clone(),
            name: registration.name.clone(),
            access: ServiceAccess::All,
        })
    }
}

/// Open registration inside a [`SimulatedScm`].
#[derive(Debug)]
pub struct SimulatedService {
    scm: SimulatedScm,
    name: String,
    access: ServiceAccess,
}

impl Drop for SimulatedService {
    fn drop(&mut self) {
        lock(&self.scm.state).open_handles -= 1;
    }
}

impl ServiceHandle for SimulatedService {
    fn change_config(&self, command_line: &str, startup: StartupPolicy) -> Result<(), SystemError> {
        if self.access != ServiceAccess::All {
            return Err(known_error(5));
        }
        let mut state = lock(&self.scm.state);
        if let Some(code) = state.fail_change {
            return Err(known_error(code));
        }
        let registration = state
            .registrations
            .get_mut(&self.name)
            .ok_or_else(|| known_error(ERROR_SERVICE_DOES_NOT_EXIST))?;
        registration.command_line = command_line.to_string();
        if startup != StartupPolicy::NoChange {
            registration.startup = startup;
        }
        Ok(())
    }

    fn delete(&self) -> Result<(), SystemError> {
        let mut state = lock(&self.scm.state);
        if let Some(code) = state.fail_delete {
            return Err(known_error(code));
        }
        state
            .registrations
            .remove(&self.name)
            .map(|_| ())
            .ok_or_else(|| known_error(ERROR_SERVICE_MARKED_FOR_DELETE))
    }
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

#[derive(Default)]
struct DispatcherState {
    handler: Mutex<Option<Arc<ControlHandler>>>,
    registered_name: Mutex<Option<String>>,
    reports: Mutex<Vec<ServiceStatus>>,
    start_args: Mutex<Vec<String>>,
    dispatches: Mutex<usize>,
    fail_dispatch: Mutex<Option<u32>>,
    fail_registration: Mutex<Option<u32>>,
    fail_status: Mutex<Option<u32>>,
}

/// In-memory service dispatcher that records every status report.
#[derive(Clone, Default)]
pub struct SimulatedDispatcher {
    state: Arc<DispatcherState>,
}

impl SimulatedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra start arguments passed after the service name.
    pub fn with_start_args(self, args: Vec<String>) -> Self {
        *lock(&self.state.start_args) = args;
        self
    }

    /// Makes `run` fail with `code`.
    pub fn fail_dispatch(&self, code: u32) {
        *lock(&self.state.fail_dispatch) = Some(code);
    }

    /// Makes control handler registration fail with `code`.
    pub fn fail_registration(&self, code: u32) {
        *lock(&self.state.fail_registration) = Some(code);
    }

    /// Makes every status report fail with `code`.
    pub fn fail_status_reports(&self, code: u32) {
        *lock(&self.state.fail_status) = Some(code);
    }

    /// Number of successful `run` calls.
    pub fn dispatch_count(&self) -> usize {
        *lock(&self.state.dispatches)
    }

    /// Name the control handler was registered under.
    pub fn registered_name(&self) -> Option<String> {
        lock(&self.state.registered_name).clone()
    }

    /// Every status report delivered so far, oldest first.
    pub fn reports(&self) -> Vec<ServiceStatus> {
        lock(&self.state.reports).clone()
    }

    /// Reported states, oldest first.
    pub fn states(&self) -> Vec<LifecycleState> {
        self.reports().iter().map(|status| status.state).collect()
    }

    /// Delivers `event` to the registered handler on a separate thread and
    /// returns its answer, or `None` when no handler is registered.
    pub fn send_control(&self, event: ControlEvent) -> Option<ControlResult> {
        let handler = lock(&self.state.handler).clone()?;
        let delivery = thread::Builder::new()
            .name("control-delivery".into())
            .spawn(move || handler(event))
            .ok()?;
        delivery.join().ok()
    }

    /// Polls until `state` has been reported or `timeout` elapses.
    pub fn wait_for_state(&self, state: LifecycleState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.states().contains(&state) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl ServiceDispatcher for SimulatedDispatcher {
    fn run(&self, service_name: &str, service_main: ServiceMain) -> Result<(), SystemError> {
        if let Some(code) = *lock(&self.state.fail_dispatch) {
            return Err(known_error(code));
        }
        *lock(&self.state.dispatches) += 1;

        let mut args = vec![service_name.to_string()];
        args.extend(lock(&self.state.start_args).iter().cloned());

        debug!("Dispatching service '{service_name}'");
        let main = thread::Builder::new()
            .name("service-main".into())
            .spawn(move || service_main(args))
            .map_err(|err| SystemError::from_io(&err))?;
        main.join()
            .map_err(|_| known_error(ERROR_SERVICE_SPECIFIC_ERROR))
    }

    fn register_control_handler(
        &self,
        service_name: &str,
        handler: ControlHandler,
    ) -> Result<Box<dyn StatusHandle>, SystemError> {
        if let Some(code) = *lock(&self.state.fail_registration) {
            return Err(known_error(code));
        }
        *lock(&self.state.handler) = Some(Arc::new(handler));
        *lock(&self.state.registered_name) = Some(service_name.to_string());
        Ok(Box::new(SimulatedStatusHandle {
            state: Arc::clone(&self.state),
        }))
    }
}

struct SimulatedStatusHandle {
    state: Arc<DispatcherState>,
}

impl StatusHandle for SimulatedStatusHandle {
    fn set_status(&self, status: &ServiceStatus) -> Result<(), SystemError> {
        if let Some(code) = *lock(&self.state.fail_status) {
            return Err(known_error(code));
        }
        lock(&self.state.reports).push(status.clone());
        Ok(())
    }
}
