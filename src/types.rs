//! Identifiers shared by the binding table, the pending notification pool and the session layer.

use serde::{Deserialize, Serialize};

pub type FabricIndex = u8;
pub type NodeId = u64;
pub type EndpointId = u16;
pub type ClusterId = u32;
pub type GroupId = u16;

/// Operational identity of a remote node: fabric index + node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId {
    pub fabric_index: FabricIndex,
    pub node_id: NodeId,
}

impl PeerId {
    pub fn new(fabric_index: FabricIndex, node_id: NodeId) -> Self {
        Self {
            fabric_index,
            node_id,
        }
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:016x}", self.fabric_index, self.node_id)
    }
}
