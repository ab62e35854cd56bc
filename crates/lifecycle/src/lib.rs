mod docker;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{error, info, warn};

use common::backtest::JobController;
use common::{JobState, Result};

pub use docker::DockerRuntime;

/// Label key marking containers owned by this service. Discovery, stop and
/// exit checks only ever touch containers carrying it.
pub const OWNER_LABEL: &str = "backtestd";

const CONTAINER_NAME: &str = "passivbot_backtest";
const STOP_GRACE_SECS: u32 = 2;
const LOG_TAIL_LINES: usize = 100;

/// Everything needed to create one backtest container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub labels: HashMap<String, String>,
    /// `host:container` bind mounts.
    pub binds: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    /// Engine state string (`created`, `running`, `exited`, ...).
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct ContainerStatus {
    pub status: String,
    pub running: bool,
    pub exit_code: Option<i64>,
}

/// Seam to the job substrate. `DockerRuntime` implements it against the
/// engine API; tests use an in-memory fake.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_labeled(&self, label: &str) -> Result<Vec<ContainerSummary>>;
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;
    async fn start(&self, id: &str) -> Result<()>;
    async fn stop(&self, id: &str, grace_secs: u32) -> Result<()>;
    async fn remove(&self, id: &str) -> Result<()>;
    async fn inspect(&self, id: &str) -> Result<ContainerStatus>;
    async fn tail_logs(&self, id: &str, lines: usize) -> Result<String>;
}

/// Host paths bind-mounted into the backtest container.
#[derive(Debug, Clone)]
pub struct MountPaths {
    pub configs: String,
    pub api_keys: String,
    pub backtests: String,
    pub historical_data: String,
}

impl MountPaths {
    fn binds(&self) -> Vec<String> {
        vec![
            format!("{}:/passivbot/configs", self.configs),
            format!("{}:/passivbot/api-keys.json", self.api_keys),
            format!("{}:/passivbot/backtests", self.backtests),
            format!("{}:/passivbot/historical_data", self.historical_data),
        ]
    }
}

/// Manages the single exclusive backtest job: at most one owned container
/// exists at a time, and every operation re-derives the job's condition
/// from the substrate rather than trusting remembered state.
pub struct LifecycleController {
    runtime: Box<dyn ContainerRuntime>,
    image: String,
    mounts: MountPaths,
    /// Host path the job spec payload is written to before each start.
    job_config_path: PathBuf,
}

impl LifecycleController {
    pub fn new(
        runtime: Box<dyn ContainerRuntime>,
        image: impl Into<String>,
        mounts: MountPaths,
        job_config_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runtime,
            image: image.into(),
            mounts,
            job_config_path: job_config_path.into(),
        }
    }

    fn spec(&self, config_id: &str) -> ContainerSpec {
        ContainerSpec {
            name: CONTAINER_NAME.to_string(),
            image: self.image.clone(),
            cmd: vec![
                "python".to_string(),
                "-u".to_string(),
                "backtest.py".to_string(),
                "--disable_plotting".to_string(),
                format!("configs/{config_id}"),
            ],
            labels: HashMap::from([(OWNER_LABEL.to_string(), "1".to_string())]),
            binds: self.mounts.binds(),
        }
    }

    /// Current job state, derived from the substrate on demand.
    pub async fn state(&self) -> Result<JobState> {
        let containers = self.runtime.list_labeled(OWNER_LABEL).await?;
        let Some(container) = containers.first() else {
            return Ok(JobState::Idle);
        };
        Ok(match container.status.as_str() {
            "created" => JobState::Starting,
            "removing" => JobState::StopRequested,
            "exited" | "dead" => JobState::Exited,
            // Anything else (running, restarting, paused) counts as busy.
            _ => JobState::Running,
        })
    }
}

#[async_trait]
impl JobController for LifecycleController {
    async fn start(&self, config_id: &str, job_config: &str) -> bool {
        if !self.stop().await {
            return false;
        }

        if let Err(e) = tokio::fs::write(&self.job_config_path, job_config).await {
            error!(path = %self.job_config_path.display(), error = %e, "Failed to write job config");
            return false;
        }

        let spec = self.spec(config_id);
        let id = match self.runtime.create(&spec).await {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "Failed to create backtest container");
                return false;
            }
        };
        if let Err(e) = self.runtime.start(&id).await {
            error!(id = %id, error = %e, "Failed to start backtest container");
            return false;
        }
        info!(id = %id, config_id = %config_id, "Backtest container started");
        true
    }

    async fn stop(&self) -> bool {
        let containers = match self.runtime.list_labeled(OWNER_LABEL).await {
            Ok(containers) => containers,
            Err(e) => {
                error!(error = %e, "Failed to list owned containers");
                return false;
            }
        };

        for container in containers {
            info!(id = %container.id, "Stopping backtest container");
            if let Err(e) = self.runtime.stop(&container.id, STOP_GRACE_SECS).await {
                warn!(id = %container.id, error = %e, "Failed to stop container");
            }
            if let Err(e) = self.runtime.remove(&container.id).await {
                warn!(id = %container.id, error = %e, "Failed to remove container");
            }
        }
        true
    }

    async fn has_exited(&self) -> bool {
        let containers = match self.runtime.list_labeled(OWNER_LABEL).await {
            Ok(containers) => containers,
            Err(e) => {
                warn!(error = %e, "Failed to list owned containers; assuming still running");
                return false;
            }
        };
        if containers.is_empty() {
            return true;
        }

        for container in &containers {
            match self.runtime.inspect(&container.id).await {
                Ok(status) if status.running => return false,
                Ok(_) => {}
                Err(e) => {
                    warn!(id = %container.id, error = %e, "Failed to inspect container; assuming still running");
                    return false;
                }
            }
        }

        // Every owned container has exited. Surface their final output once.
        for container in &containers {
            match self.runtime.tail_logs(&container.id, LOG_TAIL_LINES).await {
                Ok(logs) => info!(id = %container.id, "Backtest container exited:\n{logs}"),
                Err(e) => warn!(id = %container.id, error = %e, "Failed to read container logs"),
            }
        }
        true
    }
}
