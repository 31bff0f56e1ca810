//! Docker-backed topology node
//!
//! [`DockerNode`] owns one container standing in for a network node: it
//! creates the container at construction, starts/stops/pauses it on topology
//! lifecycle transitions, and toggles interface state for fine-grained link
//! control. [`ContainerNode`] is the trait the topology framework drives;
//! concrete node variants supply a factory and inherit the shared lifecycle
//! logic through its default methods.

use crate::link::{LinkControl, LinkTarget, ShellLinkControl};
use crate::runtime::{ContainerRuntime, CreateSpec, DockerRuntime};
use crate::spec::{BidirectionalLink, BidirectionalPort, TopologyNode};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn default_image() -> String {
    "ubuntu".to_string()
}

fn default_command() -> String {
    "bash".to_string()
}

fn default_network_mode() -> String {
    "none".to_string()
}

fn default_shell() -> String {
    "bash".to_string()
}

/// Node construction options from the topology specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOptions {
    /// Image to run on this node
    #[serde(default = "default_image")]
    pub image: String,

    /// Command run when the container is brought up
    #[serde(default = "default_command")]
    pub command: String,

    /// Host-path-to-container-path bind mounts
    #[serde(default)]
    pub binds: Option<Vec<String>>,

    /// Docker network mode; the default `"none"` starts the container with
    /// no network attachment so links can be wired in afterwards
    #[serde(default = "default_network_mode")]
    pub network_mode: String,

    /// Shell used for in-container command execution
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            image: default_image(),
            command: default_command(),
            binds: None,
            network_mode: default_network_mode(),
            shell: default_shell(),
        }
    }
}

/// Process-wide instance counter; container names combine the node identifier
/// with this value so nodes sharing an identifier root do not collide.
static NODE_INSTANCE: AtomicU64 = AtomicU64::new(0);

fn container_name(identifier: &str) -> String {
    format!("{}_{}", identifier, NODE_INSTANCE.fetch_add(1, Ordering::Relaxed))
}

/// Shared implementation of a Docker-backed topology node
///
/// Construction creates the container in a stopped, detached state; the node
/// then moves through `start` → (`pause` ⇄ `unpause`)* → `stop`. `stop` is
/// terminal: it removes the container and the node must not be reused.
/// Transitions are not guarded; an invalid one surfaces the runtime's own
/// error. All operations are synchronous in effect (each completes or fails
/// before returning) and the node performs no internal locking.
pub struct DockerNode {
    identifier: String,
    image: String,
    command: String,
    container_id: String,
    pid: Option<i64>,
    ports: BTreeMap<String, String>,
    shell: String,
    link_control: Box<dyn LinkControl>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl DockerNode {
    /// Create the node's container on the given runtime
    ///
    /// The container is created detached with a TTY and a privileged host
    /// configuration, but not started. A create failure propagates and
    /// aborts construction.
    pub async fn new(
        runtime: Arc<dyn ContainerRuntime>,
        identifier: impl Into<String>,
        options: NodeOptions,
    ) -> Result<Self> {
        let identifier = identifier.into();
        let spec = CreateSpec {
            name: container_name(&identifier),
            image: options.image.clone(),
            command: options.command.clone(),
            network_mode: options.network_mode.clone(),
            binds: options.binds.clone(),
        };

        let container_id = runtime.create_container(&spec).await?;

        Ok(Self {
            identifier,
            image: options.image,
            command: options.command,
            container_id,
            pid: None,
            ports: BTreeMap::new(),
            link_control: Box::new(ShellLinkControl::new(options.shell.clone())),
            shell: options.shell,
            runtime,
        })
    }

    /// Connect to the local Docker daemon and create the node's container
    pub async fn connect(identifier: impl Into<String>, options: NodeOptions) -> Result<Self> {
        let runtime = Arc::new(DockerRuntime::new()?);
        Self::new(runtime, identifier, options).await
    }

    /// Replace the interface-state strategy (e.g. [`NamespaceLinkControl`]
    /// for images without a shell)
    ///
    /// [`NamespaceLinkControl`]: crate::link::NamespaceLinkControl
    pub fn with_link_control(mut self, link_control: Box<dyn LinkControl>) -> Self {
        self.link_control = link_control;
        self
    }

    /// Unique identifier of the node within the topology
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Image this node runs
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Initial process command
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Runtime-assigned container id; non-empty for any constructed node
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Host process id of the container's main process; set by `start`
    pub fn pid(&self) -> Option<i64> {
        self.pid
    }

    /// Port label → interface name registry
    pub fn ports(&self) -> &BTreeMap<String, String> {
        &self.ports
    }

    /// Record the interface name assigned to a port label
    ///
    /// Called by the framework with the name returned from
    /// [`ContainerNode::notify_add_biport`]; entries are never removed for
    /// the node's lifetime.
    pub fn register_port(&mut self, label: impl Into<String>, iface: impl Into<String>) {
        self.ports.insert(label.into(), iface.into());
    }

    /// Execute a shell command string inside the container and return its
    /// collected output
    pub async fn exec_shell(&self, command: &str) -> Result<String> {
        self.runtime
            .exec_shell(&self.container_id, &self.shell, command)
            .await
    }

    /// Start the container and record its main process id
    ///
    /// The recorded pid is what the framework uses to enter the container's
    /// network namespace when wiring deferred interfaces.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!("Starting node '{}'", self.identifier);
        self.runtime.start_container(&self.container_id).await?;
        self.pid = self.runtime.container_pid(&self.container_id).await?;
        Ok(())
    }

    /// Stop, wait for exit, then remove the container
    ///
    /// Removal of a still-running container is rejected by the runtime, so
    /// the wait must complete before remove is attempted. Any step failing
    /// aborts the sequence; a failed stop may leave the container
    /// stopped-but-not-removed for the caller to clean up.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("Stopping node '{}'", self.identifier);
        self.runtime.stop_container(&self.container_id).await?;
        self.runtime.wait_container(&self.container_id).await?;
        self.runtime.remove_container(&self.container_id).await?;
        self.pid = None;
        Ok(())
    }

    /// Down every registered interface, then pause the container
    ///
    /// A paused container's interfaces stay up at the kernel level, which
    /// would let peers observe a link that appears alive while this node
    /// cannot respond. Downing them first makes the pause observable to the
    /// topology as a link outage.
    pub async fn pause(&self) -> Result<()> {
        tracing::info!("Pausing node '{}'", self.identifier);
        for label in self.ports.keys() {
            self.port_state(label, false).await?;
        }
        self.runtime.pause_container(&self.container_id).await?;
        Ok(())
    }

    /// Unpause the container, then bring every registered interface up
    ///
    /// Toggling an interface requires execution inside the container, so the
    /// container must be running again before its interfaces come back up.
    pub async fn unpause(&self) -> Result<()> {
        tracing::info!("Unpausing node '{}'", self.identifier);
        self.runtime.unpause_container(&self.container_id).await?;
        for label in self.ports.keys() {
            self.port_state(label, true).await?;
        }
        Ok(())
    }

    /// Set the interface mapped to `portlbl` up (`true`) or down (`false`)
    ///
    /// An unknown label fails before any command is issued.
    pub async fn port_state(&self, portlbl: &str, state: bool) -> Result<()> {
        let iface = self
            .ports
            .get(portlbl)
            .ok_or_else(|| Error::UnknownPort(portlbl.to_string()))?;

        let target = LinkTarget {
            identifier: &self.identifier,
            container_id: &self.container_id,
            pid: self.pid,
        };
        self.link_control
            .set_link(self.runtime.as_ref(), target, iface, state)
            .await
    }
}

/// A container-backed topology node, as the framework drives it
///
/// Variants implement the two accessors over their shared [`DockerNode`] and
/// inherit the lifecycle operations; hooks (`notify_add_bilink`,
/// `notify_post_build`) default to no-ops and are overridden where a variant
/// needs to react to link attachment or run deferred setup after the full
/// topology exists.
#[async_trait]
pub trait ContainerNode: Send + Sync {
    /// The shared node implementation
    fn docker(&self) -> &DockerNode;

    /// Mutable access to the shared node implementation
    fn docker_mut(&mut self) -> &mut DockerNode;

    /// Unique identifier of the node within the topology
    fn identifier(&self) -> &str {
        self.docker().identifier()
    }

    /// Interface name this node will use for a newly declared port
    ///
    /// Preferentially the name labeled on the port's metadata, falling back
    /// to the port's own identifier. The framework wires the interface and
    /// records the name via [`register_port`](Self::register_port); the node
    /// does not perform the wiring itself.
    fn notify_add_biport(&mut self, _node: &TopologyNode, biport: &BidirectionalPort) -> String {
        biport
            .label()
            .unwrap_or(&biport.identifier)
            .to_string()
    }

    /// Called when a bidirectional link is attached to one of this node's
    /// ports
    fn notify_add_bilink(
        &mut self,
        _nodeport: (&TopologyNode, &BidirectionalPort),
        _bilink: &BidirectionalLink,
    ) {
    }

    /// Called once after the entire topology has finished building
    async fn notify_post_build(&mut self) -> Result<()> {
        Ok(())
    }

    /// Record the interface name assigned to a port label
    fn register_port(&mut self, label: String, iface: String) {
        self.docker_mut().register_port(label, iface);
    }

    /// Start the node's container
    async fn start(&mut self) -> Result<()> {
        self.docker_mut().start().await
    }

    /// Stop and remove the node's container; terminal
    async fn stop(&mut self) -> Result<()> {
        self.docker_mut().stop().await
    }

    /// Pause the node, downing its interfaces first
    async fn pause(&self) -> Result<()> {
        self.docker().pause().await
    }

    /// Unpause the node, bringing its interfaces back up
    async fn unpause(&self) -> Result<()> {
        self.docker().unpause().await
    }

    /// Fine-grained link control for a single port
    async fn port_state(&self, portlbl: &str, state: bool) -> Result<()> {
        self.docker().port_state(portlbl, state).await
    }
}

/// Stock node variant: a plain host running the default image and command
pub struct HostNode {
    docker: DockerNode,
}

impl HostNode {
    /// Create a host node on the local Docker daemon with default options
    pub async fn new(identifier: impl Into<String>) -> Result<Self> {
        let docker = DockerNode::connect(identifier, NodeOptions::default()).await?;
        Ok(Self { docker })
    }

    /// Create a host node on the given runtime
    pub async fn with_runtime(
        runtime: Arc<dyn ContainerRuntime>,
        identifier: impl Into<String>,
        options: NodeOptions,
    ) -> Result<Self> {
        let docker = DockerNode::new(runtime, identifier, options).await?;
        Ok(Self { docker })
    }
}

impl ContainerNode for HostNode {
    fn docker(&self) -> &DockerNode {
        &self.docker
    }

    fn docker_mut(&mut self) -> &mut DockerNode {
        &mut self.docker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every runtime call in order; pid and wait behavior are
    /// configurable per test.
    struct RecordingRuntime {
        calls: Mutex<Vec<String>>,
        pid: i64,
        fail_wait: bool,
    }

    impl RecordingRuntime {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                pid: 4242,
                fail_wait: false,
            }
        }

        fn failing_wait() -> Self {
            Self {
                fail_wait: true,
                ..Self::new()
            }
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContainerRuntime for RecordingRuntime {
        async fn create_container(&self, spec: &CreateSpec) -> Result<String> {
            self.record(format!("create {}", spec.name));
            Ok(format!("cid-{}", spec.name))
        }

        async fn start_container(&self, container_id: &str) -> Result<()> {
            self.record(format!("start {container_id}"));
            Ok(())
        }

        async fn stop_container(&self, container_id: &str) -> Result<()> {
            self.record(format!("stop {container_id}"));
            Ok(())
        }

        async fn wait_container(&self, container_id: &str) -> Result<()> {
            self.record(format!("wait {container_id}"));
            if self.fail_wait {
                return Err(Error::Io(std::io::Error::other("wait failed")));
            }
            Ok(())
        }

        async fn remove_container(&self, container_id: &str) -> Result<()> {
            self.record(format!("remove {container_id}"));
            Ok(())
        }

        async fn pause_container(&self, container_id: &str) -> Result<()> {
            self.record(format!("pause {container_id}"));
            Ok(())
        }

        async fn unpause_container(&self, container_id: &str) -> Result<()> {
            self.record(format!("unpause {container_id}"));
            Ok(())
        }

        async fn container_pid(&self, container_id: &str) -> Result<Option<i64>> {
            self.record(format!("inspect {container_id}"));
            Ok(Some(self.pid))
        }

        async fn exec_shell(
            &self,
            _container_id: &str,
            shell: &str,
            command: &str,
        ) -> Result<String> {
            self.record(format!("exec {shell}: {command}"));
            Ok(String::new())
        }
    }

    async fn node_with(runtime: &Arc<RecordingRuntime>) -> DockerNode {
        DockerNode::new(runtime.clone(), "n1", NodeOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn construction_creates_but_does_not_start() {
        let runtime = Arc::new(RecordingRuntime::new());
        let node = node_with(&runtime).await;

        assert!(!node.container_id().is_empty());
        assert_eq!(node.pid(), None);

        let calls = runtime.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("create n1_"));
    }

    #[tokio::test]
    async fn container_names_are_unique_per_instance() {
        let runtime = Arc::new(RecordingRuntime::new());
        let a = node_with(&runtime).await;
        let b = node_with(&runtime).await;

        assert_ne!(a.container_id(), b.container_id());
        let calls = runtime.calls();
        assert!(calls[0].starts_with("create n1_"));
        assert!(calls[1].starts_with("create n1_"));
        assert_ne!(calls[0], calls[1]);
    }

    #[tokio::test]
    async fn start_records_runtime_reported_pid() {
        let runtime = Arc::new(RecordingRuntime::new());
        let mut node = node_with(&runtime).await;

        node.start().await.unwrap();
        assert_eq!(node.pid(), Some(4242));

        let calls = runtime.calls();
        assert!(calls[1].starts_with("start "));
        assert!(calls[2].starts_with("inspect "));
    }

    #[tokio::test]
    async fn stop_issues_stop_wait_remove_in_order() {
        let runtime = Arc::new(RecordingRuntime::new());
        let mut node = node_with(&runtime).await;
        let cid = node.container_id().to_string();

        node.start().await.unwrap();
        node.stop().await.unwrap();

        let calls = runtime.calls();
        assert_eq!(
            &calls[3..],
            &[
                format!("stop {cid}"),
                format!("wait {cid}"),
                format!("remove {cid}"),
            ]
        );
    }

    #[tokio::test]
    async fn stop_aborts_before_remove_when_wait_fails() {
        let runtime = Arc::new(RecordingRuntime::failing_wait());
        let mut node = node_with(&runtime).await;

        assert!(node.stop().await.is_err());
        let calls = runtime.calls();
        assert!(calls.iter().any(|c| c.starts_with("wait ")));
        assert!(!calls.iter().any(|c| c.starts_with("remove ")));
    }

    #[tokio::test]
    async fn pause_downs_every_port_before_pausing() {
        let runtime = Arc::new(RecordingRuntime::new());
        let mut node = node_with(&runtime).await;
        node.register_port("p2", "eth2");
        node.register_port("p1", "eth1");

        node.pause().await.unwrap();

        let calls = runtime.calls();
        // Ascending label order, then the pause itself
        assert_eq!(calls[1], "exec bash: ip link set dev eth1 down");
        assert_eq!(calls[2], "exec bash: ip link set dev eth2 down");
        assert!(calls[3].starts_with("pause "));
        assert_eq!(calls.iter().filter(|c| c.starts_with("exec")).count(), 2);
    }

    #[tokio::test]
    async fn unpause_unpauses_before_upping_ports() {
        let runtime = Arc::new(RecordingRuntime::new());
        let mut node = node_with(&runtime).await;
        node.register_port("p1", "eth1");
        node.register_port("p2", "eth2");

        node.unpause().await.unwrap();

        let calls = runtime.calls();
        assert!(calls[1].starts_with("unpause "));
        assert_eq!(calls[2], "exec bash: ip link set dev eth1 up");
        assert_eq!(calls[3], "exec bash: ip link set dev eth2 up");
    }

    #[tokio::test]
    async fn port_state_targets_the_mapped_interface() {
        let runtime = Arc::new(RecordingRuntime::new());
        let mut node = node_with(&runtime).await;
        node.register_port("p1", "eth1");

        node.port_state("p1", true).await.unwrap();
        node.port_state("p1", false).await.unwrap();

        let calls = runtime.calls();
        assert_eq!(calls[1], "exec bash: ip link set dev eth1 up");
        assert_eq!(calls[2], "exec bash: ip link set dev eth1 down");
    }

    #[tokio::test]
    async fn unknown_port_label_issues_no_command() {
        let runtime = Arc::new(RecordingRuntime::new());
        let node = node_with(&runtime).await;

        let err = node.port_state("nope", true).await.unwrap_err();
        assert!(matches!(err, Error::UnknownPort(label) if label == "nope"));
        assert_eq!(runtime.calls().len(), 1); // just the create
    }

    #[tokio::test]
    async fn shell_selection_follows_options() {
        let runtime = Arc::new(RecordingRuntime::new());
        let options = NodeOptions {
            shell: "sh".to_string(),
            ..NodeOptions::default()
        };
        let mut node = DockerNode::new(runtime.clone(), "n1", options).await.unwrap();
        node.register_port("p1", "eth1");

        node.port_state("p1", false).await.unwrap();
        assert_eq!(runtime.calls()[1], "exec sh: ip link set dev eth1 down");
    }

    #[tokio::test]
    async fn biport_name_prefers_metadata_label() {
        let runtime = Arc::new(RecordingRuntime::new());
        let mut node = HostNode::with_runtime(runtime.clone(), "n1", NodeOptions::default())
            .await
            .unwrap();

        let spec_node = TopologyNode::new("n1");
        let labeled = BidirectionalPort::with_label("p1", "eth1");
        let unlabeled = BidirectionalPort::new("p2");

        assert_eq!(node.notify_add_biport(&spec_node, &labeled), "eth1");
        assert_eq!(node.notify_add_biport(&spec_node, &unlabeled), "p2");
    }

    #[tokio::test]
    async fn bilink_and_post_build_hooks_default_to_noops() {
        let runtime = Arc::new(RecordingRuntime::new());
        let mut node = HostNode::with_runtime(runtime.clone(), "n1", NodeOptions::default())
            .await
            .unwrap();

        let spec_node = TopologyNode::new("n1");
        let port = BidirectionalPort::with_label("p1", "eth1");
        let link = BidirectionalLink::new("l1");

        node.notify_add_bilink((&spec_node, &port), &link);
        node.notify_post_build().await.unwrap();

        // No runtime traffic beyond the create
        assert_eq!(runtime.calls().len(), 1);
    }

    /// Full topology build protocol against the recording runtime: declare a
    /// labeled port, start, fail a single link, pause, stop.
    #[tokio::test]
    async fn full_node_lifecycle_scenario() {
        let runtime = Arc::new(RecordingRuntime::new());
        let mut node = HostNode::with_runtime(runtime.clone(), "n1", NodeOptions::default())
            .await
            .unwrap();

        let spec_node = TopologyNode::new("n1");
        let biport = BidirectionalPort::with_label("p1", "eth1");
        let iface = node.notify_add_biport(&spec_node, &biport);
        assert_eq!(iface, "eth1");
        node.register_port("p1".to_string(), iface);

        node.start().await.unwrap();
        assert_eq!(node.docker().pid(), Some(4242));

        node.port_state("p1", false).await.unwrap();
        node.pause().await.unwrap();
        node.unpause().await.unwrap();
        node.stop().await.unwrap();

        let cid = node.docker().container_id().to_string();
        let calls = runtime.calls();
        let expected_tail = [
            format!("start {cid}"),
            format!("inspect {cid}"),
            "exec bash: ip link set dev eth1 down".to_string(),
            // pause downs the port again even though it is already down;
            // idempotent at the runtime level
            "exec bash: ip link set dev eth1 down".to_string(),
            format!("pause {cid}"),
            format!("unpause {cid}"),
            "exec bash: ip link set dev eth1 up".to_string(),
            format!("stop {cid}"),
            format!("wait {cid}"),
            format!("remove {cid}"),
        ];
        assert_eq!(&calls[1..], &expected_tail);
    }
}
