//! Deployment manager
//!
//! Promotes a validated image to the long-lived deployment container on the
//! configured network. Deployment is all-or-nothing: any failure tears down
//! whatever was partially created before the job is failed.

use botforge_core::domain::job::{BuildError, BuildErrorKind, BuildStage};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::runtime::{ContainerRuntime, RunContainer, RuntimeError};

/// Outcome of a successful deployment
#[derive(Debug, Clone)]
pub struct Deployment {
    pub container_id: String,
    pub endpoint: String,
}

pub struct DeploymentManager {
    runtime: Arc<dyn ContainerRuntime>,
    network: String,
}

impl DeploymentManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, network: String) -> Self {
        Self { runtime, network }
    }

    /// Name of the deployment container for a chatbot; one deployment per
    /// chatbot, replaced on rebuild
    pub fn container_name(chatbot_id: Uuid) -> String {
        format!("bf-bot-{}", chatbot_id)
    }

    /// Starts the validated image as the chatbot's deployment
    pub async fn deploy(
        &self,
        chatbot_id: Uuid,
        image_tag: &str,
        service_port: u16,
    ) -> Result<Deployment, BuildError> {
        let name = Self::container_name(chatbot_id);

        // A rebuild replaces the previous deployment of the same chatbot
        if let Err(e) = self.runtime.remove_container(&name).await {
            if e.is_infrastructure() {
                return Err(deploy_error(&e));
            }
        }

        let container_id = self
            .runtime
            .run_container(&RunContainer {
                name: name.clone(),
                image: image_tag.to_string(),
                network: Some(self.network.clone()),
                publish_port: Some(service_port),
            })
            .await
            .map_err(|e| deploy_error(&e))?;

        let endpoint = match self.runtime.mapped_port(&name, service_port).await {
            Ok(addr) => format!("http://{}", addr),
            Err(e) => {
                // Partial deployment: remove the container before failing
                warn!("Deployment of {} has no reachable port, rolling back", name);
                if let Err(rm) = self.runtime.stop_container(&name).await {
                    warn!("Rollback stop failed for {}: {}", name, rm);
                }
                if let Err(rm) = self.runtime.remove_container(&name).await {
                    warn!("Rollback remove failed for {}: {}", name, rm);
                }
                return Err(deploy_error(&e));
            }
        };

        info!(
            "Chatbot {} deployed as {} at {}",
            chatbot_id, container_id, endpoint
        );

        Ok(Deployment {
            container_id,
            endpoint,
        })
    }

    /// Stops and removes a chatbot's deployment container
    ///
    /// Used by cleanup and by rollback paths.
    pub async fn teardown(&self, chatbot_id: Uuid) -> Result<(), RuntimeError> {
        let name = Self::container_name(chatbot_id);

        if let Err(e) = self.runtime.stop_container(&name).await {
            warn!("Failed to stop deployment {}: {}", name, e);
        }
        self.runtime.remove_container(&name).await?;

        info!("Deployment {} torn down", name);
        Ok(())
    }
}

fn deploy_error(e: &RuntimeError) -> BuildError {
    let kind = if e.is_infrastructure() {
        BuildErrorKind::Infrastructure
    } else {
        BuildErrorKind::Deployment
    };
    BuildError::new(BuildStage::Deploy, kind, e.to_string())
}
