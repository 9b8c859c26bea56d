//! Renderer supervision: launch, stream stdout lines, restart on exit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio_util::sync::CancellationToken;

use super::process::{ProcessError, RendererCommand};

/// Fixed pause between the renderer exiting and its relaunch.
pub const RESTART_DELAY: Duration = Duration::from_secs(3);

/// How often a renderer that closed stdout is checked for exit.
const REAP_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle of the supervised renderer process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessState {
  #[default]
  NotStarted,
  Running { pid: Option<u32> },
  Exited { code: Option<i32> },
}

/// Keeps one renderer process alive until terminated.
///
/// The renderer is restarted after every exit, clean or not, with a fixed
/// delay and no attempt limit. [`stop`](Self::stop) only kills the current
/// child, so it comes back after the delay; this is how playback gets
/// interrupted since the renderer has no stop command of its own.
pub struct RendererSupervisor {
  command: RendererCommand,
  restart_delay: Duration,
  child: Mutex<Option<Child>>,
  state: Mutex<ProcessState>,
  launches: AtomicUsize,
  token: CancellationToken,
}

impl RendererSupervisor {
  pub fn new(command: RendererCommand) -> Self {
    Self {
      command,
      restart_delay: RESTART_DELAY,
      child: Mutex::new(None),
      state: Mutex::new(ProcessState::NotStarted),
      launches: AtomicUsize::new(0),
      token: CancellationToken::new(),
    }
  }

  pub fn with_restart_delay(mut self, delay: Duration) -> Self {
    self.restart_delay = delay;
    self
  }

  pub fn command(&self) -> &RendererCommand {
    &self.command
  }

  pub fn state(&self) -> ProcessState {
    *self.state.lock()
  }

  /// How many times the renderer has been launched successfully.
  pub fn launches(&self) -> usize {
    self.launches.load(Ordering::SeqCst)
  }

  pub fn is_terminated(&self) -> bool {
    self.token.is_cancelled()
  }

  /// Supervise the renderer, handing every non-empty stdout line to
  /// `on_line` with trailing whitespace removed.
  ///
  /// Returns an error only if the very first launch fails. Returns `Ok`
  /// once [`terminate`](Self::terminate) has been called.
  pub async fn run(&self, mut on_line: impl FnMut(&[u8])) -> Result<(), ProcessError> {
    if self.token.is_cancelled() {
      return Ok(());
    }

    let mut stdout = self.launch()?;

    loop {
      self.pump(stdout, &mut on_line).await;
      if self.token.is_cancelled() {
        break;
      }

      self.reap().await;

      stdout = match self.relaunch().await {
        Some(stdout) => stdout,
        None => break,
      };
    }

    self.kill_child();
    log::info!("Renderer supervisor stopped");
    Ok(())
  }

  /// Kill the running renderer. It is relaunched after the restart delay.
  ///
  /// Returns `false` if no renderer was running.
  pub fn stop(&self) -> bool {
    let mut child = self.child.lock();
    match child.as_mut() {
      Some(child) => {
        log::info!("Stopping renderer (pid: {:?})", child.id());
        if let Err(e) = child.start_kill() {
          log::warn!("Failed to kill renderer: {}", e);
        }
        true
      }
      None => {
        log::debug!("Stop requested but no renderer is running");
        false
      }
    }
  }

  /// Kill the renderer and make [`run`](Self::run) return instead of
  /// restarting it. Safe to call more than once.
  pub fn terminate(&self) {
    log::info!("Terminating renderer supervisor");
    self.token.cancel();
    self.stop();
  }

  fn launch(&self) -> Result<ChildStdout, ProcessError> {
    let mut child = self.command.spawn()?;
    let stdout = child.stdout.take().ok_or(ProcessError::NoOutput)?;
    let pid = child.id();

    *self.child.lock() = Some(child);
    *self.state.lock() = ProcessState::Running { pid };
    let launches = self.launches.fetch_add(1, Ordering::SeqCst) + 1;

    log::info!("Renderer running (pid: {:?}, launch #{})", pid, launches);
    Ok(stdout)
  }

  /// Sleep out the restart delay and launch again, retrying failed
  /// launches. `None` once terminated.
  async fn relaunch(&self) -> Option<ChildStdout> {
    loop {
      tokio::select! {
        _ = self.token.cancelled() => return None,
        _ = tokio::time::sleep(self.restart_delay) => {}
      }

      match self.launch() {
        Ok(stdout) => return Some(stdout),
        Err(e) => log::error!("Renderer relaunch failed: {}", e),
      }
    }
  }

  /// Forward lines until EOF, a read error or termination.
  async fn pump(&self, stdout: ChildStdout, on_line: &mut impl FnMut(&[u8])) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    loop {
      buf.clear();
      tokio::select! {
        biased;
        _ = self.token.cancelled() => return,
        read = reader.read_until(b'\n', &mut buf) => match read {
          Ok(0) => {
            log::debug!("Renderer closed stdout");
            return;
          }
          Ok(_) => {
            let line = buf.trim_ascii_end();
            if !line.is_empty() {
              on_line(line);
            }
          }
          Err(e) => {
            log::warn!("Error reading renderer output: {}", e);
            return;
          }
        },
      }
    }
  }

  /// Wait for the current child to exit and record its exit code.
  ///
  /// The child stays in `self.child` while we wait so `stop` can still
  /// kill a renderer that closed stdout but kept running.
  async fn reap(&self) {
    loop {
      let exited = {
        let mut slot = self.child.lock();
        let Some(child) = slot.as_mut() else {
          return;
        };
        match child.try_wait() {
          Ok(None) => None,
          Ok(Some(status)) => {
            slot.take();
            Some(status.code())
          }
          Err(e) => {
            log::warn!("Failed to poll renderer exit: {}", e);
            slot.take();
            Some(None)
          }
        }
      };

      if let Some(code) = exited {
        log::warn!("Renderer exited (code: {:?}), restarting in {:?}", code, self.restart_delay);
        *self.state.lock() = ProcessState::Exited { code };
        return;
      }

      tokio::select! {
        _ = self.token.cancelled() => return,
        _ = tokio::time::sleep(REAP_INTERVAL) => {}
      }
    }
  }

  fn kill_child(&self) {
    if let Some(mut child) = self.child.lock().take() {
      if let Err(e) = child.start_kill() {
        log::debug!("Renderer already gone: {}", e);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;

  fn sh(script: &str) -> RendererCommand {
    RendererCommand::new("/bin/sh", vec!["-c".to_string(), script.to_string()])
  }

  fn supervisor(script: &str) -> Arc<RendererSupervisor> {
    Arc::new(RendererSupervisor::new(sh(script)).with_restart_delay(Duration::from_millis(50)))
  }

  async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
      while !condition() {
        tokio::time::sleep(Duration::from_millis(10)).await;
      }
    })
    .await
    .expect("condition not reached in time");
  }

  fn spawn_collecting(
    sup: &Arc<RendererSupervisor>,
  ) -> (
    Arc<Mutex<Vec<String>>>,
    tokio::task::JoinHandle<Result<(), ProcessError>>,
  ) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    let sup = sup.clone();
    let handle = tokio::spawn(async move {
      sup
        .run(move |line| sink.lock().push(String::from_utf8_lossy(line).into_owned()))
        .await
    });
    (lines, handle)
  }

  async fn shutdown(sup: &RendererSupervisor, handle: tokio::task::JoinHandle<Result<(), ProcessError>>) {
    sup.terminate();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
      .await
      .expect("supervisor did not stop")
      .unwrap();
    assert!(result.is_ok());
  }

  #[tokio::test]
  async fn test_lines_are_forwarded() {
    let sup = supervisor("printf 'one\\n\\ntwo  \\nthree'; exec sleep 30");
    let (lines, handle) = spawn_collecting(&sup);

    wait_until(|| lines.lock().len() >= 2).await;
    assert_eq!(&lines.lock()[..2], &["one".to_string(), "two".to_string()]);

    shutdown(&sup, handle).await;
  }

  #[tokio::test]
  async fn test_restart_after_exit() {
    let sup = supervisor("echo run");
    let (lines, handle) = spawn_collecting(&sup);

    wait_until(|| sup.launches() >= 3).await;
    assert!(lines.lock().iter().all(|l| l == "run"));
    assert_eq!(sup.command(), &sh("echo run"));

    shutdown(&sup, handle).await;
  }

  #[tokio::test]
  async fn test_exit_code_recorded() {
    let sup = Arc::new(RendererSupervisor::new(sh("exit 7")).with_restart_delay(Duration::from_secs(30)));
    let (_lines, handle) = spawn_collecting(&sup);

    wait_until(|| sup.state() == ProcessState::Exited { code: Some(7) }).await;
    assert_eq!(sup.launches(), 1);

    shutdown(&sup, handle).await;
  }

  #[tokio::test]
  async fn test_stop_kills_and_restarts() {
    let sup = supervisor("echo up; exec sleep 30");
    let (lines, handle) = spawn_collecting(&sup);

    wait_until(|| lines.lock().len() == 1).await;
    assert!(matches!(sup.state(), ProcessState::Running { .. }));
    assert!(sup.stop());

    wait_until(|| sup.launches() >= 2).await;
    assert!(!sup.is_terminated());

    shutdown(&sup, handle).await;
  }

  #[tokio::test]
  async fn test_stop_after_stdout_closed() {
    let sup = supervisor("exec >&-; exec sleep 30");
    let (_lines, handle) = spawn_collecting(&sup);

    wait_until(|| matches!(sup.state(), ProcessState::Running { .. })).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(sup.stop());
    wait_until(|| sup.launches() >= 2).await;

    shutdown(&sup, handle).await;
  }

  #[tokio::test]
  async fn test_terminate_stops_loop() {
    let sup = supervisor("exec sleep 30");
    let (_lines, handle) = spawn_collecting(&sup);

    wait_until(|| matches!(sup.state(), ProcessState::Running { .. })).await;
    shutdown(&sup, handle).await;

    assert_eq!(sup.launches(), 1);
    assert!(!sup.stop());
    sup.terminate();
  }

  #[tokio::test]
  async fn test_first_launch_failure() {
    let sup = RendererSupervisor::new(RendererCommand::new("/nonexistent/gmediarender", Vec::new()));
    let result = sup.run(|_| {}).await;
    assert!(matches!(result, Err(ProcessError::SpawnFailed { .. })));
    assert_eq!(sup.state(), ProcessState::NotStarted);
  }

  #[tokio::test]
  async fn test_controls_before_start_are_noops() {
    let sup = supervisor("echo never");
    assert!(!sup.stop());
    sup.terminate();
    assert!(sup.run(|_| panic!("no output expected")).await.is_ok());
    assert_eq!(sup.launches(), 0);
  }
}
