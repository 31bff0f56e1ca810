//! Container runtime client abstraction
//!
//! [`ContainerRuntime`] is the capability set a node needs from the runtime:
//! create, start, stop, wait, remove, pause, unpause, inspect the main
//! process id, and execute a shell command inside the container. Any runtime
//! could satisfy it; [`DockerRuntime`] is the bollard-backed implementation
//! talking to the local Docker daemon.

use crate::{Error, Result};
use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::CreateContainerOptions;
use bollard::Docker;
use futures::StreamExt;

/// Parameters for creating a node's container
///
/// The container is always created detached with a TTY and a privileged host
/// configuration: topology nodes wire interfaces into their namespaces, which
/// needs device access.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    /// Runtime-visible container name
    pub name: String,
    /// Image reference to run
    pub image: String,
    /// Initial process command
    pub command: String,
    /// Docker network mode; `"none"` leaves the container without any
    /// network attachment so links can be wired in later
    pub network_mode: String,
    /// Host-path-to-container-path bind mounts
    pub binds: Option<Vec<String>>,
}

/// Abstract container runtime capability set
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a container, returning the runtime-assigned container id
    async fn create_container(&self, spec: &CreateSpec) -> Result<String>;

    /// Start a created container
    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Request the container to stop
    async fn stop_container(&self, container_id: &str) -> Result<()>;

    /// Block until the container has exited
    async fn wait_container(&self, container_id: &str) -> Result<()>;

    /// Remove a stopped container
    async fn remove_container(&self, container_id: &str) -> Result<()>;

    /// Freeze the container's processes
    async fn pause_container(&self, container_id: &str) -> Result<()>;

    /// Unfreeze the container's processes
    async fn unpause_container(&self, container_id: &str) -> Result<()>;

    /// Host process id of the container's main process, if running
    async fn container_pid(&self, container_id: &str) -> Result<Option<i64>>;

    /// Run `command` through `shell -c` inside the container and return its
    /// collected output; nonzero exit is an error
    async fn exec_shell(&self, container_id: &str, shell: &str, command: &str) -> Result<String>;
}

/// Docker implementation of [`ContainerRuntime`] using bollard
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon with default settings
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    /// Wrap an existing bollard client
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// The underlying bollard client
    pub fn client(&self) -> &Docker {
        &self.docker
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, spec: &CreateSpec) -> Result<String> {
        tracing::info!(
            "Creating container '{}' from image '{}'",
            spec.name,
            spec.image
        );

        let host_config = HostConfig {
            // Topology nodes manipulate interfaces inside their namespace
            privileged: Some(true),
            // Avoid connecting to the host bridge, usually docker0
            network_mode: Some(spec.network_mode.clone()),
            binds: spec.binds.clone(),
            ..Default::default()
        };

        let config = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.split_whitespace().map(String::from).collect()),
            tty: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: Some(spec.name.clone()),
                    platform: String::new(),
                }),
                config,
            )
            .await?;

        tracing::info!(
            "Container created: {} (ID: {})",
            spec.name,
            response.id
        );

        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        tracing::info!("Starting container: {}", container_id);
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        tracing::info!("Stopping container: {}", container_id);
        self.docker
            .stop_container(container_id, Some(StopContainerOptions { t: 10 }))
            .await?;
        Ok(())
    }

    async fn wait_container(&self, container_id: &str) -> Result<()> {
        let mut wait = self
            .docker
            .wait_container(container_id, None::<WaitContainerOptions<String>>);

        match wait.next().await {
            Some(Ok(response)) => {
                tracing::debug!(
                    "Container '{}' exited with status {}",
                    container_id,
                    response.status_code
                );
                Ok(())
            }
            // A nonzero exit status still confirms the container has exited,
            // which is all the caller is waiting for.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                tracing::debug!("Container '{}' exited with status {}", container_id, code);
                Ok(())
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        tracing::info!("Removing container: {}", container_id);
        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    v: true,
                    force: false,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }

    async fn pause_container(&self, container_id: &str) -> Result<()> {
        tracing::info!("Pausing container: {}", container_id);
        self.docker.pause_container(container_id).await?;
        Ok(())
    }

    async fn unpause_container(&self, container_id: &str) -> Result<()> {
        tracing::info!("Unpausing container: {}", container_id);
        self.docker.unpause_container(container_id).await?;
        Ok(())
    }

    async fn container_pid(&self, container_id: &str) -> Result<Option<i64>> {
        let inspect = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await?;
        Ok(inspect.state.and_then(|state| state.pid))
    }

    async fn exec_shell(&self, container_id: &str, shell: &str, command: &str) -> Result<String> {
        tracing::debug!("Executing in container {}: {}", container_id, command);

        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(vec![
                        shell.to_string(),
                        "-c".to_string(),
                        command.to_string(),
                    ]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut collected = String::new();
        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(msg) = output.next().await {
                collected.push_str(&msg?.to_string());
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        let exit_code = inspect.exit_code.unwrap_or(0);
        if exit_code != 0 {
            return Err(Error::CommandFailed {
                command: command.to_string(),
                container_id: container_id.to_string(),
                exit_code,
                output: collected,
            });
        }

        Ok(collected)
    }
}
