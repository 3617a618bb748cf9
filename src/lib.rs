//! winsvc lets a process run as a Windows service. It installs and removes the
//! service registration, dispatches control requests from the service control
//! manager and reports lifecycle status, and can run the same service code in
//! the foreground for development.

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Service dispatcher and status-reporting seam.
pub mod dispatch;

/// Error handling.
pub mod error;

/// Lifecycle states, status records and control codes.
pub mod lifecycle;

/// Logging setup.
pub mod logs;

/// OS bindings.
pub mod platform;

/// Service registration management.
pub mod registrar;

/// Service runtime.
pub mod service;

/// In-memory service control manager for tests.
pub mod simulated;

/// Stop signal shared between the control handler and the workload.
pub mod stop_event;

/// OS error formatting.
pub mod syserr;

/// Example ticker workload.
pub mod workload;

#[cfg(test)]
mod test_utils;
