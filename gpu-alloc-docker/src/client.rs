//! Docker Engine client wrapper
//!
//! Provides a simplified interface to the Docker API over the local socket.

use std::time::Duration;

use anyhow::{Context, Result};
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::models::{ContainerInspectResponse, ContainerSummary};
use bollard::{Docker, API_DEFAULT_VERSION};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Default Docker control socket
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Docker client wrapper
///
/// The socket is opened on first use and reopened after a failed
/// connection attempt, so the daemon may come up after the exporter.
pub struct DockerClient {
    docker: Mutex<Option<Docker>>,
    socket: String,
    timeout: Duration,
}

impl DockerClient {
    /// Create a client for the given unix socket
    ///
    /// `timeout` bounds every request made through this client.
    pub fn new(socket: &str, timeout: Duration) -> Self {
        Self {
            docker: Mutex::new(None),
            socket: socket.to_string(),
            timeout,
        }
    }

    /// Socket this client talks to
    pub fn socket(&self) -> &str {
        &self.socket
    }

    /// Connected bollard client, connecting if needed
    async fn docker(&self) -> Result<Docker> {
        let mut docker = self.docker.lock().await;
        if let Some(connected) = docker.as_ref() {
            return Ok(connected.clone());
        }

        let connected = Docker::connect_with_unix(
            &self.socket,
            self.timeout.as_secs().max(1),
            API_DEFAULT_VERSION,
        )
        .with_context(|| format!("Failed to connect to Docker socket: {}", self.socket))?;

        debug!(socket = %self.socket, timeout = ?self.timeout, "Docker client connected");
        *docker = Some(connected.clone());
        Ok(connected)
    }

    /// Check if the Docker daemon is reachable
    pub async fn health_check(&self) -> Result<()> {
        self.docker()
            .await?
            .ping()
            .await
            .with_context(|| format!("Docker daemon not reachable at {}", self.socket))?;
        info!(socket = %self.socket, "Connected to Docker daemon");
        Ok(())
    }

    /// List running containers
    pub async fn list_running(&self) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };

        self.docker()
            .await?
            .list_containers(Some(options))
            .await
            .context("Failed to list running containers")
    }

    /// Inspect a container by id or name
    pub async fn inspect(&self, id: &str) -> Result<ContainerInspectResponse> {
        self.docker()
            .await?
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .with_context(|| format!("Failed to inspect container: {}", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_does_not_touch_socket() {
        let client = DockerClient::new("/nonexistent/docker.sock", Duration::from_secs(2));
        assert_eq!(client.socket(), "/nonexistent/docker.sock");
    }

    #[tokio::test]
    async fn test_missing_socket_is_an_error_per_request() {
        let client = DockerClient::new("/nonexistent/docker.sock", Duration::from_secs(2));
        assert!(client.health_check().await.is_err());
        assert!(client.list_running().await.is_err());
        assert!(client.inspect("abc").await.is_err());
        assert!(client.docker.lock().await.is_none());
    }
}
