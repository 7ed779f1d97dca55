//! Replica identity.

use std::fmt;

use crate::socket::{Destination, WireProtocol};

/// Stable numeric identity of a replica within the cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One replica: id, host, port and the wire protocol it speaks.
///
/// Immutable after construction. Value equality; usable as a map key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Node {
    id: NodeId,
    host: String,
    port: u16,
    protocol: WireProtocol,
}

impl Node {
    pub fn new(id: NodeId, host: impl Into<String>, port: u16, protocol: WireProtocol) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            protocol,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol(&self) -> WireProtocol {
        self.protocol
    }

    /// The pool key this node's connections are checked out under.
    pub fn destination(&self) -> Destination {
        Destination::new(self.host.clone(), self.port, self.protocol)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} ({}:{})", self.id, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_node_and_endpoint() {
        let node = Node::new(NodeId(3), "kv-3.internal", 6666, WireProtocol::NativeV1);
        assert_eq!(node.to_string(), "node 3 (kv-3.internal:6666)");
    }

    #[test]
    fn destination_carries_protocol() {
        let node = Node::new(NodeId(0), "localhost", 6666, WireProtocol::NativeV3);
        let dest = node.destination();
        assert_eq!(dest.host(), "localhost");
        assert_eq!(dest.port(), 6666);
        assert_eq!(dest.protocol(), WireProtocol::NativeV3);
    }

    #[test]
    fn nodes_with_same_identity_are_equal() {
        let a = Node::new(NodeId(1), "h", 1, WireProtocol::NativeV1);
        let b = Node::new(NodeId(1), "h", 1, WireProtocol::NativeV1);
        assert_eq!(a, b);
    }
}
