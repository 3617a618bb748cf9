//! Windows service control manager bindings.
//!
//! Registrations go through the raw SCM API (`winapi`) so updates can pass
//! `SERVICE_NO_CHANGE` for every attribute except the binary path and start
//! type. Dispatching, control handlers and status reports use
//! `windows-service`.
use std::{
    ffi::{OsStr, OsString},
    iter,
    os::windows::ffi::OsStrExt,
    ptr,
    sync::{Mutex, PoisonError},
};

use tracing::{debug, error};
use winapi::um::{
    winnt::{DELETE, SERVICE_WIN32_OWN_PROCESS},
    winsvc::{
        ChangeServiceConfigW, CloseServiceHandle, CreateServiceW, DeleteService,
        OpenSCManagerW, OpenServiceW, SC_HANDLE, SC_MANAGER_ALL_ACCESS, SERVICE_ALL_ACCESS,
        SERVICE_NO_CHANGE,
    },
};
use windows_service::{
    define_windows_service,
    service::{
        ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState,
        ServiceStatus as ScmStatus, ServiceType,
    },
    service_control_handler::{self, ServiceControlHandlerResult, ServiceStatusHandle},
    service_dispatcher,
};

use crate::{
    dispatch::{ControlHandler, ServiceDispatcher, ServiceMain, StatusHandle},
    lifecycle::{ControlEvent, ControlResult, LifecycleState, ServiceStatus},
    registrar::{
        ServiceAccess, ServiceControlManager, ServiceDatabase, ServiceHandle,
        ServiceRegistration, StartupPolicy,
    },
    syserr::SystemError,
};

const ERROR_INVALID_PARAMETER: u32 = 87;

fn wide(value: &str) -> Vec<u16> {
    OsStr::new(value).encode_wide().chain(iter::once(0)).collect()
}

/// `REG_MULTI_SZ` style list: each entry NUL terminated, plus a final NUL.
fn wide_list(values: &[String]) -> Option<Vec<u16>> {
    if values.is_empty() {
        return None;
    }
    let mut list: Vec<u16> = values.iter().flat_map(|value| wide(value)).collect();
    list.push(0);
    Some(list)
}

fn optional_ptr(buffer: &Option<Vec<u16>>) -> *const u16 {
    buffer.as_ref().map_or(ptr::null(), |buffer| buffer.as_ptr())
}

/// Owned `SC_HANDLE`, closed on drop.
struct ScHandle(SC_HANDLE);

impl ScHandle {
    fn new(raw: SC_HANDLE) -> Result<Self, SystemError> {
        if raw.is_null() {
            Err(SystemError::last())
        } else {
            Ok(Self(raw))
        }
    }
}

impl Drop for ScHandle {
    fn drop(&mut self) {
        unsafe {
            CloseServiceHandle(self.0);
        }
    }
}

/// The local service control manager database.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScmDatabase;

impl ServiceDatabase for ScmDatabase {
    type Manager = ScmManager;

    fn connect(&self) -> Result<Self::Manager, SystemError> {
        let raw = unsafe { OpenSCManagerW(ptr::null(), ptr::null(), SC_MANAGER_ALL_ACCESS) };
        ScHandle::new(raw).map(ScmManager)
    }
}

/// Open service control manager connection.
pub struct ScmManager(ScHandle);

impl ServiceControlManager for ScmManager {
    type Service = ScmService;

    fn open_service(&self, name: &str, access: ServiceAccess) -> Result<Self::Service, SystemError> {
        let desired = match access {
            ServiceAccess::All => SERVICE_ALL_ACCESS,
            ServiceAccess::Delete => DELETE,
        };
        let name = wide(name);
        let raw = unsafe { OpenServiceW((self.0).0, name.as_ptr(), desired) };
        ScHandle::new(raw).map(ScmService)
    }

    fn create_service(
        &self,
        registration: &ServiceRegistration,
    ) -> Result<Self::Service, SystemError> {
        let name = wide(&registration.name);
        let display_name = wide(&registration.display_name);
        let command_line = wide(&registration.command_line);
        let dependencies = wide_list(&registration.dependencies);
        let account = registration.account.as_deref().map(wide);

        let raw = unsafe {
            CreateServiceW(
                (self.0).0,
                name.as_ptr(),
                display_name.as_ptr(),
                SERVICE_ALL_ACCESS,
                SERVICE_WIN32_OWN_PROCESS,
                registration.startup.raw(),
                registration.error_control.raw(),
                command_line.as_ptr(),
                ptr::null(),
                ptr::null_mut(),
                optional_ptr(&dependencies),
                optional_ptr(&account),
                ptr::null(),
            )
        };
        ScHandle::new(raw).map(ScmService)
    }
}

/// Open service registration.
pub struct ScmService(ScHandle);

impl ServiceHandle for ScmService {
    fn change_config(&self, command_line: &str, startup: StartupPolicy) -> Result<(), SystemError> {
        let command_line = wide(command_line);
        let changed = unsafe {
            ChangeServiceConfigW(
                (self.0).0,
                SERVICE_NO_CHANGE,
                startup.raw(),
                SERVICE_NO_CHANGE,
                command_line.as_ptr(),
                ptr::null(),
                ptr::null_mut(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
            )
        };
        if changed == 0 {
            return Err(SystemError::last());
        }
        Ok(())
    }

    fn delete(&self) -> Result<(), SystemError> {
        if unsafe { DeleteService((self.0).0) } == 0 {
            return Err(SystemError::last());
        }
        Ok(())
    }
}

fn service_error(err: &windows_service::Error) -> SystemError {
    match err {
        windows_service::Error::Winapi(io_err) => SystemError::from_io(io_err),
        other => SystemError::new(ERROR_INVALID_PARAMETER, other.to_string()),
    }
}

// The SCM calls the service entry point through a bare function pointer, so
// the closure for the current `run` waits here until the dispatcher picks it up.
static PENDING_MAIN: Mutex<Option<ServiceMain>> = Mutex::new(None);

define_windows_service!(ffi_service_main, dispatched_service_main);

fn dispatched_service_main(arguments: Vec<OsString>) {
    let args = arguments
        .into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let service_main = PENDING_MAIN
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match service_main {
        Some(service_main) => service_main(args),
        None => error!("Service entry point invoked without a pending service main"),
    }
}

/// Dispatcher backed by `StartServiceCtrlDispatcher`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScmDispatcher;

impl ServiceDispatcher for ScmDispatcher {
    fn run(&self, service_name: &str, service_main: ServiceMain) -> Result<(), SystemError> {
        *PENDING_MAIN.lock().unwrap_or_else(PoisonError::into_inner) = Some(service_main);
        let result = service_dispatcher::start(service_name, ffi_service_main);
        PENDING_MAIN
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        result.map_err(|err| service_error(&err))
    }

    fn register_control_handler(
        &self,
        service_name: &str,
        handler: ControlHandler,
    ) -> Result<Box<dyn StatusHandle>, SystemError> {
        let status_handle = service_control_handler::register(service_name, move |control| {
            handler_result(handler(control_event(&control)))
        })
        .map_err(|err| service_error(&err))?;
        debug!("Registered control handler for '{service_name}'");
        Ok(Box::new(ScmStatusHandle(Mutex::new(status_handle))))
    }
}

fn control_event(control: &ServiceControl) -> ControlEvent {
    match control {
        ServiceControl::Stop => ControlEvent::Stop,
        ServiceControl::Interrogate => ControlEvent::Interrogate,
        ServiceControl::Pause => ControlEvent::Pause,
        ServiceControl::Continue => ControlEvent::Continue,
        ServiceControl::Shutdown => ControlEvent::Shutdown,
        other => ControlEvent::Other(other.raw_service_control_type()),
    }
}

fn handler_result(result: ControlResult) -> ServiceControlHandlerResult {
    match result {
        ControlResult::NoError => ServiceControlHandlerResult::NoError,
        ControlResult::NotImplemented => ServiceControlHandlerResult::NotImplemented,
        ControlResult::Other(code) => ServiceControlHandlerResult::Other(code),
    }
}

fn scm_state(state: LifecycleState) -> ServiceState {
    match state {
        LifecycleState::Stopped => ServiceState::Stopped,
        LifecycleState::StartPending => ServiceState::StartPending,
        LifecycleState::StopPending => ServiceState::StopPending,
        LifecycleState::Running => ServiceState::Running,
        LifecycleState::ContinuePending => ServiceState::ContinuePending,
        LifecycleState::PausePending => ServiceState::PausePending,
        LifecycleState::Paused => ServiceState::Paused,
    }
}

struct ScmStatusHandle(Mutex<ServiceStatusHandle>);

impl StatusHandle for ScmStatusHandle {
    fn set_status(&self, status: &ServiceStatus) -> Result<(), SystemError> {
        let controls_accepted = if status.accepts_stop {
            ServiceControlAccept::STOP
        } else {
            ServiceControlAccept::empty()
        };
        let handle = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        handle
            .set_service_status(ScmStatus {
                service_type: ServiceType::OWN_PROCESS,
                current_state: scm_state(status.state),
                controls_accepted,
                exit_code: ServiceExitCode::Win32(status.exit_code),
                checkpoint: status.checkpoint,
                wait_hint: status.wait_hint,
                process_id: None,
            })
            .map_err(|err| service_error(&err))
    }
}
