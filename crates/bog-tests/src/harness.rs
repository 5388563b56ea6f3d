//! Test network harness for multi-node integration testing.
//!
//! Connections between test nodes are a pair of in-process channels driven
//! by forwarder tasks, standing in for the WebSocket transport. Frames flow
//! through the same endpoints as production traffic.

use std::sync::Arc;
use std::time::Duration;

use bog_net::PeerId;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::info;

use crate::node::TestNode;

const CONNECTION_CAPACITY: usize = 64;

/// Connects two nodes bidirectionally.
///
/// Returns `(b_in_a, a_in_b)`: the peer id `b` has inside `a`'s peer set,
/// and the id `a` has inside `b`'s. Must run inside a tokio runtime.
pub fn connect(a: &TestNode, b: &TestNode) -> (PeerId, PeerId) {
    let (to_b, mut from_a) = mpsc::channel::<String>(CONNECTION_CAPACITY);
    let (to_a, mut from_b) = mpsc::channel::<String>(CONNECTION_CAPACITY);

    let b_in_a = a.peers.add(to_b);
    let a_in_b = b.peers.add(to_a);

    let b_endpoint = b.endpoint.clone();
    tokio::spawn(async move {
        while let Some(text) = from_a.recv().await {
            b_endpoint.handle_frame(a_in_b, &text);
        }
    });

    let a_endpoint = a.endpoint.clone();
    tokio::spawn(async move {
        while let Some(text) = from_b.recv().await {
            a_endpoint.handle_frame(b_in_a, &text);
        }
    });

    (b_in_a, a_in_b)
}

/// A test network containing multiple nodes.
#[derive(Default)]
pub struct TestNetwork {
    nodes: Vec<Arc<TestNode>>,
}

impl TestNetwork {
    /// Creates a new empty test network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a test network with the specified number of nodes.
    pub fn with_nodes(count: usize) -> Self {
        let mut network = Self::new();
        for _ in 0..count {
            network.add_node();
        }
        network
    }

    /// Adds a new node to the network.
    pub fn add_node(&mut self) -> Arc<TestNode> {
        let node = Arc::new(TestNode::new());
        self.nodes.push(node.clone());
        info!(total = self.nodes.len(), "added node to test network");
        node
    }

    /// Returns the number of nodes in the network.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns all nodes in the network.
    pub fn nodes(&self) -> &[Arc<TestNode>] {
        &self.nodes
    }

    /// Returns a node by index.
    pub fn node(&self, index: usize) -> Option<&Arc<TestNode>> {
        self.nodes.get(index)
    }

    /// Connects all nodes in a mesh topology.
    pub fn connect_mesh(&self) {
        for i in 0..self.nodes.len() {
            for j in (i + 1)..self.nodes.len() {
                connect(&self.nodes[i], &self.nodes[j]);
            }
        }
        info!(nodes = self.nodes.len(), "connected nodes in mesh topology");
    }
}

/// Lets in-flight frames drain through the forwarder tasks.
pub async fn settle() {
    sleep(Duration::from_millis(100)).await;
}
