//! Engine child process supervision
//!
//! The engine is restarted on every activation so it reloads its
//! configuration from disk.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, SubswitchError};

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// No child process
    Stopped,
    /// Child spawned and not yet observed to exit
    Running,
    /// Child exited on its own
    Exited,
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Stopped => write!(f, "stopped"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Exited => write!(f, "exited"),
        }
    }
}

pub struct EngineProcess {
    binary: PathBuf,
    data_dir: PathBuf,
    child: Mutex<Option<Child>>,
}

impl EngineProcess {
    pub fn new(binary: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            binary,
            data_dir,
            child: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> ProcessState {
        let mut child = self.child.lock().await;
        match child.as_mut() {
            None => ProcessState::Stopped,
            Some(c) => match c.try_wait() {
                Ok(None) => ProcessState::Running,
                Ok(Some(_)) | Err(_) => ProcessState::Exited,
            },
        }
    }

    /// Kill any running instance and start a fresh one
    pub async fn restart(&self) -> Result<()> {
        let mut child = self.child.lock().await;

        if let Some(mut previous) = child.take() {
            stop_child(&mut previous).await;
        }

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-d")
            .arg(&self.data_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        info!("Starting engine: {:?} -d {:?}", self.binary, self.data_dir);

        let spawned = cmd.spawn().map_err(|e| {
            SubswitchError::EngineUnavailable(format!(
                "failed to spawn {:?}: {}",
                self.binary, e
            ))
        })?;
        debug!("Engine started with pid {:?}", spawned.id());

        *child = Some(spawned);
        Ok(())
    }

    /// Stop the running instance, if any
    pub async fn stop(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            stop_child(&mut child).await;
            info!("Engine stopped");
        }
    }
}

async fn stop_child(child: &mut Child) {
    if let Ok(Some(status)) = child.try_wait() {
        debug!("Engine had already exited with {}", status);
        return;
    }

    if let Err(e) = child.kill().await {
        warn!("Failed to kill engine process: {}", e);
    }
}
