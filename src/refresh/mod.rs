//! External refresh collaborator
//!
//! The proposal datasets are updated by an external command; the core
//! only needs to run it to completion and interpret its exit status.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::RefreshConfig;
use crate::errors::RefreshError;

/// Something that can bring the on-disk proposal datasets up to date
#[async_trait]
pub trait RefreshCollaborator: Send + Sync {
    async fn refresh_all(&self) -> Result<(), RefreshError>;
}

/// Runs the configured refresh command as a child process
#[derive(Debug, Clone)]
pub struct CommandRefresher {
    command: String,
    args: Vec<String>,
}

impl CommandRefresher {
    pub fn new(config: &RefreshConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

#[async_trait]
impl RefreshCollaborator for CommandRefresher {
    async fn refresh_all(&self) -> Result<(), RefreshError> {
        debug!("Running refresh command: {} {:?}", self.command, self.args);
        let output = Command::new(&self.command)
            .args(&self.args)
            .output()
            .await
            .map_err(|source| RefreshError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RefreshError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!("Refresh command completed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_is_ok() {
        let refresher = CommandRefresher::new(&RefreshConfig {
            command: "true".to_string(),
            args: vec![],
        });
        assert!(refresher.refresh_all().await.is_ok());
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let refresher = CommandRefresher::new(&RefreshConfig {
            command: "false".to_string(),
            args: vec![],
        });
        match refresher.refresh_all().await {
            Err(RefreshError::Failed { code, .. }) => assert_eq!(code, Some(1)),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_command_is_a_spawn_error() {
        let refresher = CommandRefresher::new(&RefreshConfig {
            command: "definitely-not-a-real-command-xyz".to_string(),
            args: vec![],
        });
        assert!(matches!(
            refresher.refresh_all().await,
            Err(RefreshError::Spawn { .. })
        ));
    }
}
