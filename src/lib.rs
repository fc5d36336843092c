pub mod cli;
pub mod config;
pub mod dispatch;
pub mod hotkey;
pub mod monitor;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Command};
use config::ConfigError;
use dispatch::DispatchEngine;
use hotkey::{EvdevKeyboards, HotkeyError, HotkeyHook, KeyEventSource};
use monitor::{I2cMonitors, MonitorControl, VcpError};

/// Anything that ends the process
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Hotkey(HotkeyError),
    Vcp(VcpError),
}

impl AppError {
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(ConfigError::Invalid { .. }) => 2,
            _ => 1,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Hotkey(e) => write!(f, "{}", e),
            AppError::Vcp(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AppError {}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<HotkeyError> for AppError {
    fn from(e: HotkeyError) -> Self {
        AppError::Hotkey(e)
    }
}

impl From<VcpError> for AppError {
    fn from(e: VcpError) -> Self {
        AppError::Vcp(e)
    }
}

fn init_logging(filter: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filter) = filter {
        builder.parse_filters(filter);
    }
    builder.format_timestamp_millis().init();
}

/// Log the attached monitors and their current inputs. Failures are not fatal.
async fn log_monitor_survey(monitors: &MonitorControl) {
    match monitors.list_monitors().await {
        Ok(ids) => log::info!("Monitors: {:?}", ids),
        Err(e) => {
            log::warn!("{}", e);
            return;
        }
    }
    match monitors.survey_inputs().await {
        Ok(inputs) => {
            for (id, input) in inputs {
                log::info!("Current input of {}: {}", id, input);
            }
        }
        Err(e) => log::warn!("{}", e),
    }
}

/// Load the bindings, attach the keyboard hook and dispatch hotkeys until `shutdown`
/// fires or the key source closes. The hook is released on every exit path.
/// Returns the number of key presses that triggered at least one binding.
pub async fn serve(
    config_path: &Path,
    monitors: MonitorControl,
    source: impl KeyEventSource + 'static,
    shutdown: CancellationToken,
) -> Result<usize, AppError> {
    config::ensure_config_file(config_path)?;
    let bindings = config::load(config_path)?;
    log::info!("Loaded {} binding(s) from {:?}", bindings.len(), config_path);

    log_monitor_survey(&monitors).await;

    let mut hook = HotkeyHook::new(source);
    let (_, events) = hook.subscribe();
    if let Err(e) = hook.start() {
        hook.unload();
        return Err(e.into());
    }

    let engine = DispatchEngine::new(bindings, monitors);
    let handled = engine.run(events, shutdown).await;

    hook.unload();
    Ok(handled)
}

/// Cancel `token` on Ctrl-C or SIGTERM
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut terminate) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = terminate.recv() => {}
                    }
                }
                Err(e) => {
                    log::warn!("Cannot listen for SIGTERM: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        log::info!("Signal received, shutting down");
        token.cancel();
    });
}

fn check(config_path: &Path) -> Result<(), AppError> {
    config::ensure_config_file(config_path)?;
    let bindings = config::load(config_path)?;

    println!("{}: {} binding(s)", config_path.display(), bindings.len());
    for binding in &bindings {
        let writes: Vec<String> = binding
            .monitors
            .iter()
            .flat_map(|monitor| {
                monitor
                    .codes
                    .iter()
                    .map(move |s| format!("{} 0x{:02x}={}", monitor.id, s.code, s.value))
            })
            .collect();
        println!("  {} -> {}", binding.key_binding, writes.join(", "));
    }
    Ok(())
}

async fn print_inputs(monitors: &MonitorControl) -> Result<(), AppError> {
    for (id, input) in monitors.survey_inputs().await? {
        println!("{}\t{}", id, input);
    }
    Ok(())
}

/// One line per connected output: id, input source, bus, preferred mode.
/// Outputs whose input cannot be read show `-`.
async fn print_outputs(monitors: &MonitorControl, port: Arc<I2cMonitors>) -> Result<(), AppError> {
    let outputs = tokio::task::spawn_blocking(move || port.outputs())
        .await
        .map_err(|e| VcpError::Enumerate(e.to_string()))??;
    let inputs = monitors.survey_inputs().await?;

    for output in outputs {
        let input = inputs
            .iter()
            .find(|(id, _)| *id == output.id)
            .map(|(_, input)| input.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{}\t{}\t{}",
            output.id,
            input,
            output.bus.display(),
            output.mode.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn flip(monitors: &MonitorControl) -> Result<(), AppError> {
    let mut first_error = None;
    for (id, result) in monitors.flip_all_monitors().await? {
        match result {
            Ok(input) => println!("{}\t{}", id, input.value()),
            Err(e) => {
                log::error!("{}", e);
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

async fn execute(cli: Cli) -> Result<(), AppError> {
    let config_path: PathBuf = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };
    let port = Arc::new(I2cMonitors::new());
    let monitors = MonitorControl::new(port.clone())
        .with_timeout(cli.vcp_timeout())
        .with_settle_delay(cli.settle_delay());

    match cli.command.unwrap_or(Command::Run) {
        Command::ConfigPath => {
            println!("{}", config_path.display());
            Ok(())
        }
        Command::Check => check(&config_path),
        Command::Inputs { verbose: false } => print_inputs(&monitors).await,
        Command::Inputs { verbose: true } => print_outputs(&monitors, port).await,
        Command::Flip => flip(&monitors).await,
        Command::Run => {
            let shutdown = CancellationToken::new();
            cancel_on_signal(shutdown.clone());
            let handled = serve(&config_path, monitors, EvdevKeyboards::new(), shutdown).await?;
            log::info!("Handled {} hotkey press(es)", handled);
            Ok(())
        }
    }
}

/// Entry point used by the binary
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
