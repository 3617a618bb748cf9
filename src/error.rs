//! Error handling for winsvc.
use thiserror::Error;

use crate::syserr::SystemError;

/// Errors raised while installing, updating or removing a service registration.
///
/// The `Display` output of every variant is the message shown to the user.
#[derive(Debug, Error)]
pub enum RegistrarError {
    /// The service control manager database could not be opened.
    #[error("OpenSCManager failed {0}")]
    OpenManager(#[source] SystemError),

    /// An existing registration could not be updated.
    #[error("ChangeServiceConfig failed {0}")]
    ChangeConfig(#[source] SystemError),

    /// A new registration could not be created.
    #[error("CreateService failed {0}")]
    Create(#[source] SystemError),

    /// The registration could not be opened with delete rights.
    #[error("Unable to open service for deletion {0}")]
    OpenForDeletion(#[source] SystemError),

    /// The delete request was rejected. The OS error stays reachable through
    /// `source()` but is not part of the message.
    #[error("Unable to delete service")]
    Delete(#[source] SystemError),
}

impl RegistrarError {
    /// The OS error behind this failure.
    pub fn system_error(&self) -> &SystemError {
        match self {
            RegistrarError::OpenManager(err)
            | RegistrarError::ChangeConfig(err)
            | RegistrarError::Create(err)
            | RegistrarError::OpenForDeletion(err)
            | RegistrarError::Delete(err) => err,
        }
    }
}

/// Errors raised by the service runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// `run` was called before an entry callback was supplied.
    #[error("SvcMain must be set")]
    MissingEntry,

    /// The OS dispatcher could not be started.
    #[error("StartServiceCtrlDispatcher failed with {0}")]
    Dispatch(#[source] SystemError),

    /// The control handler could not be registered.
    #[error("Unable to do RegisterServiceCtrlHandlerEx: {0}")]
    RegisterHandler(#[source] SystemError),

    /// A status report was rejected.
    #[error("SetServiceStatus failed {0}")]
    ReportStatus(#[source] SystemError),

    /// A status report was attempted before `start` registered a handler.
    #[error("Service status handle is not registered")]
    NotStarted,
}

/// Errors raised while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading or accessing a configuration file.
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A `${VAR}` reference names an unset variable.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// A duration value could not be parsed.
    #[error("Invalid duration value: '{0}'")]
    InvalidDuration(String),
}
