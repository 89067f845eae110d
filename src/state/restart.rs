//! Server restart on client request

use std::process::Command;
use std::time::Duration;

use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum RestartError {
    #[error("Cannot locate server executable: {0}")]
    Executable(String),
}

/// Schedules a restart of the server process.
///
/// `schedule` must return quickly; the restart itself happens later, off
/// the connection task, so the acknowledgment can still be delivered.
pub trait RestartHook: Send + Sync {
    fn schedule(&self) -> Result<(), RestartError>;
}

/// Re-executes the current binary with the same arguments, then exits
#[derive(Debug, Clone)]
pub struct ProcessRestart {
    /// Grace period before the new process is spawned
    pub delay: Duration,
}

impl Default for ProcessRestart {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
        }
    }
}

impl RestartHook for ProcessRestart {
    fn schedule(&self) -> Result<(), RestartError> {
        let exe = std::env::current_exe().map_err(|e| RestartError::Executable(e.to_string()))?;
        let args: Vec<String> = std::env::args().skip(1).collect();
        let delay = self.delay;

        tokio::task::spawn_blocking(move || {
            std::thread::sleep(delay);
            info!("Restarting server: {} {:?}", exe.display(), args);
            match Command::new(&exe).args(&args).spawn() {
                Ok(_) => std::process::exit(0),
                Err(e) => error!("Failed to restart server: {}", e),
            }
        });
        Ok(())
    }
}
