//! Seam between [`crate::service::ServiceRuntime`] and the OS service dispatcher.
use crate::{
    lifecycle::{ControlEvent, ControlResult, ServiceStatus},
    syserr::SystemError,
};

/// Service entry point handed to the dispatcher. Receives the start arguments
/// (the first one is the service name when started by the SCM).
pub type ServiceMain = Box<dyn FnOnce(Vec<String>) + Send + 'static>;

/// Control handler registered for a running service. Called on a thread owned
/// by the dispatcher, never on the entry-point thread.
pub type ControlHandler = Box<dyn Fn(ControlEvent) -> ControlResult + Send + Sync + 'static>;

/// The OS facility that runs service entry points and delivers control requests.
pub trait ServiceDispatcher: Send + Sync {
    /// Connects the process to the service control manager and runs
    /// `service_main` on a dispatcher thread. Blocks until the service stops.
    fn run(&self, service_name: &str, service_main: ServiceMain) -> Result<(), SystemError>;

    /// Registers `handler` for `service_name` and returns the handle used to
    /// report status.
    fn register_control_handler(
        &self,
        service_name: &str,
        handler: ControlHandler,
    ) -> Result<Box<dyn StatusHandle>, SystemError>;
}

/// Handle through which a service reports status to the control manager.
pub trait StatusHandle: Send + Sync {
    fn set_status(&self, status: &ServiceStatus) -> Result<(), SystemError>;
}
