use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod context;
pub mod control;
pub mod lifecycle;
pub mod mpris;
pub mod player;
pub mod renderer;

pub use config::AppConfig;
use context::BridgeContext;
use lifecycle::{LifecycleEvent, LifecycleSignals};
use mpris::MprisError;
use renderer::{ProcessError, RendererCommand};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// How long the renderer must survive after startup.
const STARTUP_GRACE: Duration = Duration::from_secs(2);
/// How long shutdown waits for the supervisor task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum AppError {
  #[error("Renderer error: {0}")]
  Renderer(#[from] ProcessError),
  #[error("MPRIS error: {0}")]
  Mpris(#[from] MprisError),
  #[error("Failed to install signal handlers: {0}")]
  Signals(#[from] std::io::Error),
  #[error("Renderer supervisor exited during startup")]
  SupervisorExited,
}

/// Route `log` records to a tracing fmt subscriber. `RUST_LOG` wins over
/// the `-v` flag.
pub fn init_logging(verbose: bool) {
  let level = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

  if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
    eprintln!("Logging already initialised: {}", e);
  }
}

pub async fn run() -> Result<(), AppError> {
  let verbose = std::env::args().skip(1).any(|arg| arg == "-v");
  init_logging(verbose);

  let config = AppConfig::load(Path::new(config::CONFIG_PATH));
  let identity = config::read_identity(Path::new(config::UUID_PATH));
  log::info!("Starting renderer '{}' ({})", config.system_name, identity);

  let command = RendererCommand::from_config(&config, &identity)?;
  let ctx = Arc::new(BridgeContext::new(config, command));
  let mut signals = LifecycleSignals::install()?;

  let connection = mpris::connect(ctx.config.bus, ctx.bridge.clone(), ctx.control.clone()).await?;
  let emitter = tokio::spawn(mpris::forward_changes(
    connection.clone(),
    ctx.bridge.subscribe(),
  ));

  let mut supervisor = tokio::spawn(ctx.clone().run_supervisor());

  tokio::time::sleep(STARTUP_GRACE).await;
  if supervisor.is_finished() {
    match (&mut supervisor).await {
      Ok(Err(e)) => log::error!("Renderer failed to start: {}", e),
      Ok(Ok(())) => log::error!("Renderer supervisor stopped during startup"),
      Err(e) => log::error!("Renderer supervisor panicked: {}", e),
    }
    emitter.abort();
    return Err(AppError::SupervisorExited);
  }

  let name_lost = mpris::name_lost(&connection);
  tokio::pin!(name_lost);
  let mut watch_name = true;

  loop {
    tokio::select! {
      event = signals.next() => {
        if ctx.handle_lifecycle(event).is_break() {
          break;
        }
      }
      lost = &mut name_lost, if watch_name => match lost {
        Ok(()) => {
          let _ = ctx.handle_lifecycle(LifecycleEvent::Terminate);
          break;
        }
        Err(e) => {
          log::warn!("Cannot watch bus name ownership: {}", e);
          watch_name = false;
        }
      },
    }
  }

  ctx.supervisor.terminate();
  match tokio::time::timeout(SHUTDOWN_TIMEOUT, supervisor).await {
    Ok(Ok(Ok(()))) => {}
    Ok(Ok(Err(e))) => log::warn!("Renderer supervisor failed: {}", e),
    Ok(Err(e)) => log::warn!("Renderer supervisor panicked: {}", e),
    Err(_) => log::warn!("Renderer supervisor did not stop in time"),
  }
  emitter.abort();

  log::info!("Exiting");
  Ok(())
}
