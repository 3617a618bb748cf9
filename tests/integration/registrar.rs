#[path = "common/mod.rs"]
mod common;

use common::{COMMAND_LINE, SERVICE_NAME};
use winsvc::{
    error::RegistrarError,
    registrar::{Configured, Registrar, ServiceIdentity, StartupPolicy},
    simulated::SimulatedScm,
};

fn identity() -> ServiceIdentity {
    ServiceIdentity::new(SERVICE_NAME, COMMAND_LINE)
}

#[test]
fn install_update_remove_cycle() {
    let scm = SimulatedScm::new();
    let registrar = Registrar::new(scm.clone());

    let (ok, message) = registrar.configure_message(true, &identity(), StartupPolicy::OnDemand);
    assert!(ok);
    assert_eq!(message, "CreateService succeeded");
    assert_eq!(scm.open_handles(), 0);

    let stored = scm.registration(SERVICE_NAME).expect("service registered");
    assert_eq!(stored.command_line, COMMAND_LINE);
    assert_eq!(stored.startup, StartupPolicy::OnDemand);

    let (ok, message) = registrar.configure_message(true, &identity(), StartupPolicy::OnDemand);
    assert!(ok);
    assert_eq!(message, "ChangeServiceConfig succeeded");
    assert_eq!(scm.open_handles(), 0);

    let (ok, message) = registrar.configure_message(false, &identity(), StartupPolicy::OnDemand);
    assert!(ok);
    assert_eq!(message, "Service deleted");
    assert_eq!(scm.open_handles(), 0);
    assert!(scm.service_names().is_empty());
}

#[test]
fn installing_twice_creates_once() {
    let scm = SimulatedScm::new();
    let registrar = Registrar::new(scm.clone());

    assert_eq!(
        registrar
            .configure(true, &identity(), StartupPolicy::OnDemand)
            .unwrap(),
        Configured::Created
    );
    assert_eq!(
        registrar
            .configure(true, &identity(), StartupPolicy::OnDemand)
            .unwrap(),
        Configured::Updated
    );

    assert_eq!(scm.create_count(), 1);
    assert_eq!(scm.service_names(), vec![SERVICE_NAME.to_string()]);
}

#[test]
fn update_replaces_command_line_and_startup() {
    let scm = SimulatedScm::new();
    let registrar = Registrar::new(scm.clone());
    registrar
        .configure(true, &identity(), StartupPolicy::OnDemand)
        .unwrap();

    let moved = ServiceIdentity::new(SERVICE_NAME, "\"D:\\new place\\foo.exe\" run");
    registrar
        .configure(true, &moved, StartupPolicy::Automatic)
        .unwrap();

    let stored = scm.registration(SERVICE_NAME).unwrap();
    assert_eq!(stored.command_line, "\"D:\\new place\\foo.exe\" run");
    assert_eq!(stored.startup, StartupPolicy::Automatic);
}

#[test]
fn removing_unknown_service_fails_to_open() {
    let scm = SimulatedScm::new();
    let registrar = Registrar::new(scm.clone());

    let (ok, message) = registrar.configure_message(false, &identity(), StartupPolicy::OnDemand);
    assert!(!ok);
    assert_eq!(
        message,
        "Unable to open service for deletion (1060) The specified service does not exist as an installed service."
    );
    assert_eq!(scm.open_handles(), 0);
}

#[test]
fn failed_delete_has_no_code_in_message() {
    let scm = SimulatedScm::new();
    let registrar = Registrar::new(scm.clone());
    registrar
        .configure(true, &identity(), StartupPolicy::OnDemand)
        .unwrap();

    scm.fail_deletes(1072);
    let err = registrar
        .configure(false, &identity(), StartupPolicy::OnDemand)
        .unwrap_err();

    assert_eq!(err.to_string(), "Unable to delete service");
    assert_eq!(err.system_error().code(), 1072);
    assert!(matches!(err, RegistrarError::Delete(_)));
    assert_eq!(scm.open_handles(), 0);
    assert!(scm.registration(SERVICE_NAME).is_some());
}

#[test]
fn unreachable_manager_fails_before_anything_else() {
    let scm = SimulatedScm::new();
    scm.deny_access(5);
    let registrar = Registrar::new(scm.clone());

    let (ok, message) = registrar.configure_message(true, &identity(), StartupPolicy::OnDemand);
    assert!(!ok);
    assert_eq!(message, "OpenSCManager failed (5) Access is denied.");
    assert_eq!(scm.create_count(), 0);
    assert_eq!(scm.open_handles(), 0);
}

#[test]
fn failed_create_reports_os_error() {
    let scm = SimulatedScm::new();
    scm.fail_creates(5);
    let registrar = Registrar::new(scm.clone());

    let (ok, message) = registrar.configure_message(true, &identity(), StartupPolicy::OnDemand);
    assert!(!ok);
    assert_eq!(message, "CreateService failed (5) Access is denied.");
    assert!(scm.service_names().is_empty());
    assert_eq!(scm.open_handles(), 0);
}

#[test]
fn failed_update_reports_os_error() {
    let scm = SimulatedScm::new();
    let registrar = Registrar::new(scm.clone());
    registrar
        .configure(true, &identity(), StartupPolicy::OnDemand)
        .unwrap();

    scm.fail_changes(1072);
    let moved = ServiceIdentity::new(SERVICE_NAME, "C:\\bar.exe run");
    let (ok, message) = registrar.configure_message(true, &moved, StartupPolicy::Automatic);
    assert!(!ok);
    assert_eq!(
        message,
        "ChangeServiceConfig failed (1072) The specified service has been marked for deletion."
    );
    assert_eq!(scm.create_count(), 1);
    assert_eq!(scm.registration(SERVICE_NAME).unwrap().command_line, COMMAND_LINE);
    assert_eq!(scm.open_handles(), 0);
}
