//! Docker-backed nodes for network topology simulation
//!
//! This crate provides the node type a topology framework instantiates when a
//! specification node should be realized as a Docker container. Each node
//! owns exactly one container: construction creates it detached and
//! unstarted, the topology build protocol declares ports and links on it,
//! and lifecycle transitions (`start`, `pause`/`unpause`, `stop`) map onto
//! container runtime operations. Link up/down state is toggled by
//! manipulating interface state inside the container's network namespace.
//!
//! # Architecture
//!
//! - [`runtime::ContainerRuntime`] — the abstract capability set consumed
//!   from the container runtime, implemented for the local Docker daemon by
//!   [`runtime::DockerRuntime`] (bollard).
//! - [`node::DockerNode`] — the shared node implementation holding the
//!   container id, process id, and port registry.
//! - [`node::ContainerNode`] — the trait the framework drives; concrete
//!   variants supply a factory and inherit the lifecycle logic through
//!   default methods.
//! - [`link::LinkControl`] — pluggable interface-state strategy: in-container
//!   shell by default, host-side namespace entry for shell-less images.
//!
//! # Example
//!
//! ```ignore
//! use nettopo_docker::{ContainerNode, HostNode};
//!
//! #[tokio::main]
//! async fn main() -> nettopo_docker::Result<()> {
//!     let mut node = HostNode::new("n1").await?;
//!     node.start().await?;
//!     node.port_state("p1", false).await?; // simulate a link failure
//!     node.stop().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod link;
pub mod node;
pub mod runtime;
pub mod spec;

pub use error::{Error, Result};
pub use link::{LinkControl, LinkTarget, NamespaceLinkControl, ShellLinkControl};
pub use node::{ContainerNode, DockerNode, HostNode, NodeOptions};
pub use runtime::{ContainerRuntime, CreateSpec, DockerRuntime};
pub use spec::{BidirectionalLink, BidirectionalPort, TopologyNode};
