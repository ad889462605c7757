//! Local proxy engine
//!
//! Activation writes a single-proxy configuration, restarts the engine,
//! waits for its control API and selects the proxy in the global group.

pub mod config;
pub mod control;
pub mod process;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{Result, SubswitchError};
use crate::models::ServerDescriptor;

pub use control::ControlClient;
pub use process::{EngineProcess, ProcessState};

/// Makes a server the engine's active upstream
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Activate `server`; returns once traffic is expected to flow through it
    async fn activate(&self, server: &ServerDescriptor) -> Result<()>;

    /// Release engine resources on shutdown
    async fn shutdown(&self) {}
}

/// Engine driven through its config file, child process and control API
pub struct ClashEngine {
    config: EngineConfig,
    process: EngineProcess,
    control: ControlClient,
}

impl ClashEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let process = EngineProcess::new(config.binary.clone(), config.data_dir.clone());
        let control = ControlClient::new(config.controller_url(), config.secret.clone())?;

        Ok(Self {
            config,
            process,
            control,
        })
    }

    /// Create the data directory, seed the GeoIP database and write the config
    async fn prepare(&self, server: &ServerDescriptor) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.data_dir).await?;

        let mmdb_name = self
            .config
            .mmdb_source
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("Country.mmdb"));
        let mmdb_target = self.config.data_dir.join(mmdb_name);
        if !tokio::fs::try_exists(&mmdb_target).await?
            && tokio::fs::try_exists(&self.config.mmdb_source).await?
        {
            tokio::fs::copy(&self.config.mmdb_source, &mmdb_target).await?;
            debug!("Seeded {:?}", mmdb_target);
        }

        let document = config::render(server, &self.config)?;
        tokio::fs::write(self.config.config_path(), document).await?;
        debug!("Wrote {:?}", self.config.config_path());

        Ok(())
    }
}

#[async_trait]
impl EngineAdapter for ClashEngine {
    async fn activate(&self, server: &ServerDescriptor) -> Result<()> {
        self.prepare(server).await?;

        self.process.restart().await?;
        if let Err(e) = self.control.wait_ready(self.config.startup_timeout).await {
            let state = self.process.state().await;
            debug!("Engine process is {} after failed startup", state);
            if state == ProcessState::Exited {
                return Err(SubswitchError::EngineUnavailable(format!(
                    "{:?} exited during startup",
                    self.config.binary
                )));
            }
            return Err(e);
        }
        self.control.select_proxy(server.fingerprint()).await?;

        tokio::time::sleep(self.config.settle_delay).await;
        info!("Engine now routes through {}", server);
        Ok(())
    }

    async fn shutdown(&self) {
        self.process.stop().await;
    }
}
