//! Interface state control strategies
//!
//! Bringing a container interface up or down requires executing something in
//! the container's network namespace. The default strategy shells into the
//! container (`ip link set dev <iface> <up|down>`), which assumes the image
//! carries a shell interpreter. Minimal images without one can use
//! [`NamespaceLinkControl`], which enters the namespace from the host via the
//! container's recorded process id instead.

use crate::runtime::ContainerRuntime;
use crate::{Error, Result};
use async_trait::async_trait;

/// The container a link operation targets
#[derive(Debug, Clone, Copy)]
pub struct LinkTarget<'a> {
    /// Node identifier, for diagnostics
    pub identifier: &'a str,
    /// Runtime container id
    pub container_id: &'a str,
    /// Host process id of the container's main process, once started
    pub pid: Option<i64>,
}

/// Build the `ip link` command for an interface state change
pub(crate) fn link_command(iface: &str, up: bool) -> String {
    format!("ip link set dev {} {}", iface, if up { "up" } else { "down" })
}

/// Strategy for toggling interface state inside a node's namespace
#[async_trait]
pub trait LinkControl: Send + Sync {
    /// Bring `iface` up (`true`) or down (`false`) inside the target container
    async fn set_link(
        &self,
        runtime: &dyn ContainerRuntime,
        target: LinkTarget<'_>,
        iface: &str,
        up: bool,
    ) -> Result<()>;
}

/// Default strategy: run `ip link` through a shell inside the container
///
/// Precondition: the image has a shell interpreter at the configured name.
pub struct ShellLinkControl {
    shell: String,
}

impl ShellLinkControl {
    /// Use the given shell (e.g. `"bash"`, `"sh"`)
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellLinkControl {
    fn default() -> Self {
        Self::new("bash")
    }
}

#[async_trait]
impl LinkControl for ShellLinkControl {
    async fn set_link(
        &self,
        runtime: &dyn ContainerRuntime,
        target: LinkTarget<'_>,
        iface: &str,
        up: bool,
    ) -> Result<()> {
        runtime
            .exec_shell(target.container_id, &self.shell, &link_command(iface, up))
            .await?;
        Ok(())
    }
}

/// Host-side strategy for images without a shell: enter the container's
/// network namespace through its process id and run `ip link` on the host
///
/// Requires `nsenter` and `ip` on the host and a started node (the process id
/// is only recorded after start).
#[derive(Debug, Default)]
pub struct NamespaceLinkControl;

#[async_trait]
impl LinkControl for NamespaceLinkControl {
    async fn set_link(
        &self,
        _runtime: &dyn ContainerRuntime,
        target: LinkTarget<'_>,
        iface: &str,
        up: bool,
    ) -> Result<()> {
        let pid = target
            .pid
            .ok_or_else(|| Error::NotStarted(target.identifier.to_string()))?;

        let output = tokio::process::Command::new("nsenter")
            .arg("-t")
            .arg(pid.to_string())
            .arg("-n")
            .args(["ip", "link", "set", "dev", iface])
            .arg(if up { "up" } else { "down" })
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: link_command(iface, up),
                container_id: target.container_id.to_string(),
                exit_code: i64::from(output.status.code().unwrap_or(-1)),
                output: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(())
    }
}
