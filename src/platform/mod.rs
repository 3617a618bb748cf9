//! OS bindings for the registrar and the service runtime.
//!
//! [`SystemDatabase`] and [`SystemDispatcher`] name the implementation for the
//! current target: the Windows service control manager, or [`Unsupported`]
//! everywhere else.
#[cfg(windows)]
pub mod windows;

use crate::{
    dispatch::{ControlHandler, ServiceDispatcher, ServiceMain, StatusHandle},
    registrar::{
        ServiceAccess, ServiceControlManager, ServiceDatabase, ServiceHandle,
        ServiceRegistration, StartupPolicy,
    },
    syserr::SystemError,
};

#[cfg(windows)]
pub type SystemDatabase = windows::ScmDatabase;
#[cfg(windows)]
pub type SystemDispatcher = windows::ScmDispatcher;

#[cfg(not(windows))]
pub type SystemDatabase = Unsupported;
#[cfg(not(windows))]
pub type SystemDispatcher = Unsupported;

/// Backend for targets without a service control manager. Every call fails
/// with [`SystemError::unsupported`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

impl ServiceDatabase for Unsupported {
    type Manager = Unsupported;

    fn connect(&self) -> Result<Self::Manager, SystemError> {
        Err(SystemError::unsupported())
    }
}

impl ServiceControlManager for Unsupported {
    type Service = Unsupported;

    fn open_service(&self, _name: &str, _access: ServiceAccess) -> Result<Self::Service, SystemError> {
        Err(SystemError::unsupported())
    }

    fn create_service(
        &self,
        _registration: &ServiceRegistration,
    ) -> Result<Self::Service, SystemError> {
        Err(SystemError::unsupported())
    }
}

impl ServiceHandle for Unsupported {
    fn change_config(&self, _command_line: &str, _startup: StartupPolicy) -> Result<(), SystemError> {
        Err(SystemError::unsupported())
    }

    fn delete(&self) -> Result<(), SystemError> {
        Err(SystemError::unsupported())
    }
}

impl ServiceDispatcher for Unsupported {
    fn run(&self, _service_name: &str, _service_main: ServiceMain) -> Result<(), SystemError> {
        Err(SystemError::unsupported())
    }

    fn register_control_handler(
        &self,
        _service_name: &str,
        _handler: ControlHandler,
    ) -> Result<Box<dyn StatusHandle>, SystemError> {
        Err(SystemError::unsupported())
    }
}
