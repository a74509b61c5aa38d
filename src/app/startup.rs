//! Application startup: logging, configuration and the selected command

use crate::app::cli::display::{print_roles, role_rows};
use crate::app::cli::{Args, Command};
use relaybus::bus::{BusResult, BusSettings, HandlerRegistry, ServiceBus};
use relaybus::core::error_handling::log_error_with_context;
use relaybus::core::logging::{init_logging, LogSettings};
use relaybus::core::shutdown::ShutdownCoordinator;
use std::sync::Arc;

/// Run the application and return the process exit code
pub fn startup() -> i32 {
    let args = Args::parse_from_env();
    let use_color = args.use_color();

    let log_settings = LogSettings::from_args(
        args.log_level.as_deref(),
        args.log_format.as_deref(),
        args.log_file().as_deref(),
        use_color,
    );
    if let Err(e) = init_logging(&log_settings) {
        eprintln!("Could not initialise logging: {}", e);
        return 1;
    }
    log::debug!("relaybus {} starting", env!("CARGO_PKG_VERSION"));

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            log_error_with_context(&e, "Loading configuration");
            return 2;
        }
    };

    match args.command {
        Command::Check => check(settings, use_color),
        Command::Run => run(settings),
    }
}

/// Read the configuration file; a missing default file means default settings
pub fn load_settings(args: &Args) -> BusResult<BusSettings> {
    match args.config_path() {
        Some(path) if args.config.is_some() || path.exists() => {
            log::debug!("Loading configuration from '{}'", path.display());
            BusSettings::load(&path)
        }
        Some(path) => {
            log::warn!("No configuration file at '{}'; using defaults", path.display());
            Ok(BusSettings::default())
        }
        None => Ok(BusSettings::default()),
    }
}

/// Build a bus host from settings; handlers are registered by embedding applications
pub fn build_bus(settings: BusSettings) -> BusResult<ServiceBus> {
    let configuration = ServiceBus::builder()
        .with_settings(settings)
        .with_message_handler_factory(Arc::new(HandlerRegistry::new()))
        .build()?;
    ServiceBus::new(configuration)
}

fn check(settings: BusSettings, use_color: bool) -> i32 {
    let bus = match build_bus(settings) {
        Ok(bus) => bus,
        Err(e) => {
            log_error_with_context(&e, "Building service bus configuration");
            return 2;
        }
    };
    if let Err(e) = bus.validate_configuration() {
        log_error_with_context(&e, "Validating service bus configuration");
        return 2;
    }
    print_roles(&role_rows(bus.configuration()), use_color);
    0
}

fn run(settings: BusSettings) -> i32 {
    let bus = match build_bus(settings) {
        Ok(bus) => bus,
        Err(e) => {
            log_error_with_context(&e, "Building service bus configuration");
            return 2;
        }
    };
    if bus.configuration().has_inbox() && !bus.configuration().is_distributor() {
        log::warn!("No message handlers are registered; inbox messages will be released for redelivery");
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("FATAL: Could not create the signal runtime: {}", e);
            return 1;
        }
    };

    if let Err(e) = bus.start() {
        log_error_with_context(&e, "Starting service bus");
        return if e.is_configuration_error() { 2 } else { 1 };
    }
    log::info!("Service bus started; waiting for a termination signal");

    runtime.block_on(async {
        let (coordinator, _rx) = ShutdownCoordinator::new();
        coordinator.install_signal_handlers();
        coordinator.wait().await;
    });

    bus.stop();
    0
}
