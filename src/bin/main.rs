use std::{
    env,
    error::Error,
    io,
    path::Path,
    process::ExitCode,
    sync::Arc,
};
use tracing::{error, info, warn};

use winsvc::{
    cli::{Commands, USAGE, parse_args},
    config::{Config, load_config, resolve_config_path},
    logs::init_logging,
    platform::{SystemDatabase, SystemDispatcher},
    registrar::{Registrar, ServiceIdentity, StartupPolicy},
    service::ServiceRuntime,
    workload::{self, TickerSettings},
};

fn main() -> ExitCode {
    let args = parse_args();

    let config = match load_config(args.config.as_deref().map(Path::new)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let level = args
        .log_level
        .map(|level| level.as_str().to_string())
        .or_else(|| config.logging.level.clone());
    if let Err(err) = init_logging(level.as_deref(), config.logging.file.as_deref()) {
        eprintln!("Failed to open log file: {err}");
    }

    let Some(command) = args.command else {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    };

    let result = match command {
        Commands::Install { startup } => {
            let startup = startup.unwrap_or(config.service.startup);
            configure(true, args.config.as_deref(), &config, startup)
        }
        Commands::Remove => {
            configure(false, args.config.as_deref(), &config, config.service.startup)
        }
        Commands::Run { foreground } => run_service(&config, foreground),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err}");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn configure(
    install: bool,
    config_arg: Option<&str>,
    config: &Config,
    startup: StartupPolicy,
) -> Result<bool, Box<dyn Error>> {
    let identity = ServiceIdentity::new(&config.service.name, service_command_line(config_arg)?);
    let registrar = Registrar::new(SystemDatabase::default());

    let (ok, message) = registrar.configure_message(install, &identity, startup);
    println!("{message}");
    Ok(ok)
}

/// The invocation the service control manager uses: this executable plus
/// `run`, and the absolute config path when one was given (services start in
/// the system directory, so relative paths would not resolve).
fn service_command_line(config_arg: Option<&str>) -> io::Result<String> {
    let exe = env::current_exe()?;
    let mut command_line = quote(&exe.display().to_string());
    command_line.push_str(" run");

    if let Some(path) = config_arg {
        let resolved = resolve_config_path(Path::new(path))?;
        command_line.push_str(" --config ");
        command_line.push_str(&quote(&resolved.display().to_string()));
    }

    Ok(command_line)
}

fn quote(arg: &str) -> String {
    if arg.contains(char::is_whitespace) {
        format!("\"{arg}\"")
    } else {
        arg.to_string()
    }
}

fn run_service(config: &Config, foreground: bool) -> Result<bool, Box<dyn Error>> {
    let settings = TickerSettings {
        interval: config.workload.interval()?,
        output: config.workload.output.clone(),
    };
    let stop_wait_hint = config.workload.stop_wait_hint()?;

    let runtime = ServiceRuntime::builder(SystemDispatcher::default())
        .name(config.service.name.clone())
        .foreground(foreground)
        .control_handler(workload::stop_control_handler(stop_wait_hint))
        .entry(move |runtime, args| workload::service_main(runtime, args, &settings))
        .build();

    if foreground {
        register_signal_handler(&runtime)?;
    }

    println!("Starting service dispatcher");
    match runtime.run() {
        Ok(()) => Ok(true),
        Err(err) => {
            println!("Service run failed: {err}");
            Ok(false)
        }
    }
}

fn register_signal_handler(runtime: &Arc<ServiceRuntime>) -> Result<(), Box<dyn Error>> {
    let runtime = Arc::downgrade(runtime);
    ctrlc::set_handler(move || match runtime.upgrade() {
        Some(runtime) => {
            info!("Stop requested from the console");
            runtime.request_stop();
        }
        None => warn!("Stop requested after the service finished"),
    })?;

    Ok(())
}
