//! Installing, updating and removing service registrations.
//!
//! The service control manager is reached through [`ServiceDatabase`], so the
//! same [`Registrar`] drives the Windows SCM (`platform::windows`) and the
//! in-memory database in [`crate::simulated`].
use std::fmt;

use serde::Deserialize;
use strum_macros::{AsRefStr, EnumString};
use tracing::{debug, error, info};

use crate::{error::RegistrarError, syserr::SystemError};

/// When the service control manager starts the service.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StartupPolicy {
    /// Leave the current setting alone (only meaningful for updates).
    NoChange,
    /// Started by the boot loader.
    Boot,
    /// Started during kernel initialisation.
    System,
    /// Started automatically at boot.
    Automatic,
    /// Started on request.
    #[default]
    OnDemand,
    /// Cannot be started.
    Disabled,
}

impl StartupPolicy {
    /// The `SERVICE_*_START` code (`SERVICE_NO_CHANGE` for [`StartupPolicy::NoChange`]).
    pub fn raw(self) -> u32 {
        match self {
            StartupPolicy::NoChange => 0xFFFF_FFFF,
            StartupPolicy::Boot => 0,
            StartupPolicy::System => 1,
            StartupPolicy::Automatic => 2,
            StartupPolicy::OnDemand => 3,
            StartupPolicy::Disabled => 4,
        }
    }
}

impl fmt::Display for StartupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Name and command line of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    name: String,
    command_line: String,
}

impl ServiceIdentity {
    /// `command_line` is the full invocation, executable plus fixed arguments.
    pub fn new(name: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command_line: command_line.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }
}

/// Rights requested when opening an existing registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAccess {
    /// `SERVICE_ALL_ACCESS`.
    All,
    /// `DELETE` only.
    Delete,
}

/// Severity applied when the service fails to start at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorControl {
    Ignore,
    Normal,
    Severe,
    Critical,
}

impl ErrorControl {
    pub fn raw(self) -> u32 {
        match self {
            ErrorControl::Ignore => 0,
            ErrorControl::Normal => 1,
            ErrorControl::Severe => 2,
            ErrorControl::Critical => 3,
        }
    }
}

/// Everything needed to create a registration for an own-process service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistration {
    pub name: String,
    pub display_name: String,
    pub command_line: String,
    pub startup: StartupPolicy,
    pub error_control: ErrorControl,
    /// `None` runs the service as LocalSystem.
    pub account: Option<String>,
    pub dependencies: Vec<String>,
}

impl ServiceRegistration {
    /// Registration with normal error control, no dependencies and the
    /// default system account.
    pub fn own_process(identity: &ServiceIdentity, startup: StartupPolicy) -> Self {
        Self {
            name: identity.name().to_string(),
            display_name: identity.name().to_string(),
            command_line: identity.command_line().to_string(),
            startup,
            error_control: ErrorControl::Normal,
            account: None,
            dependencies: Vec::new(),
        }
    }
}

/// Entry point into a service control manager database.
pub trait ServiceDatabase {
    type Manager: ServiceControlManager;

    /// Opens the database with full access.
    fn connect(&self) -> Result<Self::Manager, SystemError>;
}

/// An open connection to the service control manager. Closed on drop.
pub trait ServiceControlManager {
    type Service: ServiceHandle;

    fn open_service(&self, name: &str, access: ServiceAccess) -> Result<Self::Service, SystemError>;

    fn create_service(
        &self,
        registration: &ServiceRegistration,
    ) -> Result<Self::Service, SystemError>;
}

/// An open service registration. Closed on drop.
pub trait ServiceHandle {
    /// Updates the command line and startup policy, leaving every other
    /// attribute unchanged.
    fn change_config(&self, command_line: &str, startup: StartupPolicy) -> Result<(), SystemError>;

    /// Marks the registration for deletion.
    fn delete(&self) -> Result<(), SystemError>;
}

/// Successful outcome of [`Registrar::configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Configured {
    /// An existing registration was updated.
    Updated,
    /// A new registration was created.
    Created,
    /// The registration was deleted.
    Deleted,
}

impl fmt::Display for Configured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Configured::Updated => "ChangeServiceConfig succeeded",
            Configured::Created => "CreateService succeeded",
            Configured::Deleted => "Service deleted",
        };
        f.write_str(message)
    }
}

/// Installs or removes a service registration.
pub struct Registrar<D> {
    database: D,
}

impl<D: ServiceDatabase> Registrar<D> {
    pub fn new(database: D) -> Self {
        Self { database }
    }

    /// Installs (`install == true`) or removes the registration for `identity`.
    ///
    /// Installing an already registered name updates its command line and
    /// startup policy instead of creating a duplicate. Every handle opened
    /// here is released before returning.
    pub fn configure(
        &self,
        install: bool,
        identity: &ServiceIdentity,
        startup: StartupPolicy,
    ) -> Result<Configured, RegistrarError> {
        let manager = self.database.connect().map_err(RegistrarError::OpenManager)?;

        if install {
            Self::install(&manager, identity, startup)
        } else {
            Self::remove(&manager, identity)
        }
    }

    /// Same as [`Registrar::configure`], flattened into a success flag and the
    /// message to show the user. The message is never empty.
    pub fn configure_message(
        &self,
        install: bool,
        identity: &ServiceIdentity,
        startup: StartupPolicy,
    ) -> (bool, String) {
        match self.configure(install, identity, startup) {
            Ok(outcome) => (true, outcome.to_string()),
            Err(err) => (false, err.to_string()),
        }
    }

    fn install(
        manager: &D::Manager,
        identity: &ServiceIdentity,
        startup: StartupPolicy,
    ) -> Result<Configured, RegistrarError> {
        match manager.open_service(identity.name(), ServiceAccess::All) {
            Ok(service) => {
                debug!("Service '{}' exists, updating its configuration", identity.name());
                service
                    .change_config(identity.command_line(), startup)
                    .map_err(RegistrarError::ChangeConfig)?;
                info!("Updated service '{}' ({startup})", identity.name());
                Ok(Configured::Updated)
            }
            Err(open_err) => {
                debug!("Opening service '{}' failed ({open_err}), creating it", identity.name());
                let registration = ServiceRegistration::own_process(identity, startup);
                match manager.create_service(&registration) {
                    Ok(_service) => {
                        info!("Created service '{}' ({startup})", identity.name());
                        Ok(Configured::Created)
                    }
                    Err(err) => {
                        error!("Error: {}", identity.command_line());
                        Err(RegistrarError::Create(err))
                    }
                }
            }
        }
    }

    fn remove(
        manager: &D::Manager,
        identity: &ServiceIdentity,
    ) -> Result<Configured, RegistrarError> {
        let service = manager
            .open_service(identity.name(), ServiceAccess::Delete)
            .map_err(RegistrarError::OpenForDeletion)?;
        service.delete().map_err(RegistrarError::Delete)?;
        info!("Deleted service '{}'", identity.name());
        Ok(Configured::Deleted)
    }
}
