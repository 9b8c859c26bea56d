//! OS signals that stop playback or shut the service down.

use tokio::signal::unix::{signal, Signal, SignalKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
  /// SIGUSR1: interrupt playback, keep running.
  StopPlayback,
  /// SIGTERM or SIGINT: shut down.
  Terminate,
}

/// Registered signal streams.
pub struct LifecycleSignals {
  usr1: Signal,
  term: Signal,
  int: Signal,
}

impl LifecycleSignals {
  pub fn install() -> std::io::Result<Self> {
    Ok(Self {
      usr1: signal(SignalKind::user_defined1())?,
      term: signal(SignalKind::terminate())?,
      int: signal(SignalKind::interrupt())?,
    })
  }

  /// Wait for the next trigger.
  pub async fn next(&mut self) -> LifecycleEvent {
    tokio::select! {
      _ = self.usr1.recv() => {
        log::info!("Received SIGUSR1");
        LifecycleEvent::StopPlayback
      }
      _ = self.term.recv() => {
        log::info!("Received SIGTERM");
        LifecycleEvent::Terminate
      }
      _ = self.int.recv() => {
        log::info!("Received SIGINT");
        LifecycleEvent::Terminate
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn test_usr1_stops_playback() {
    let mut signals = LifecycleSignals::install().unwrap();

    let status = std::process::Command::new("kill")
      .arg("-USR1")
      .arg(std::process::id().to_string())
      .status()
      .unwrap();
    assert!(status.success());

    let event = tokio::time::timeout(Duration::from_secs(5), signals.next())
      .await
      .unwrap();
    assert_eq!(event, LifecycleEvent::StopPlayback);
  }
}
