//! Software updater run before an update rebuilds the bridge.

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use log::{info, warn};
use tokio::process::Command;

#[async_trait]
pub trait SoftwareUpdater: Send + Sync {
    async fn update(&self) -> Result<()>;
}

/// Runs a shell command (`BRIDGE_UPDATE_COMMAND`). Without a command the
/// update is a plain rebuild.
pub struct CommandUpdater {
    command: Option<String>,
}

impl CommandUpdater {
    pub fn new(command: Option<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl SoftwareUpdater for CommandUpdater {
    async fn update(&self) -> Result<()> {
        let Some(command) = &self.command else {
            info!("[Update] No update command configured, rebuilding only");
            return Ok(());
        };

        info!("[Update] Running: {}", command);
        let output = Command::new("sh").arg("-c").arg(command).output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            info!("[Update] {}", line);
        }

        if output.status.success() {
            info!("[Update] Update command finished");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("[Update] Update command failed: {}", stderr.trim());
            Err(BridgeError::UpdateFailure(format!(
                "`{}` exited with {}",
                command, output.status
            )))
        }
    }
}
