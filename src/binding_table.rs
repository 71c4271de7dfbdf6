//! Binding table rows and the read-only view the binding manager iterates.

use serde::{Deserialize, Serialize};

use crate::{
    error::{BindingError, Result},
    types::{ClusterId, EndpointId, FabricIndex, GroupId, NodeId, PeerId},
};

/// Default number of rows in the binding table.
pub const BINDING_TABLE_SIZE: usize = 10;

/// One row of the binding table: where changes of a local (endpoint, cluster) are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BindingEntry {
    Unicast {
        fabric_index: FabricIndex,
        node_id: NodeId,
        local_endpoint: EndpointId,
        remote_endpoint: EndpointId,
        #[serde(default)]
        cluster: Option<ClusterId>,
    },
    Multicast {
        fabric_index: FabricIndex,
        group_id: GroupId,
        local_endpoint: EndpointId,
        #[serde(default)]
        cluster: Option<ClusterId>,
    },
}

impl BindingEntry {
    pub fn unicast(
        fabric_index: FabricIndex,
        node_id: NodeId,
        local_endpoint: EndpointId,
        remote_endpoint: EndpointId,
        cluster: Option<ClusterId>,
    ) -> Self {
        Self::Unicast {
            fabric_index,
            node_id,
            local_endpoint,
            remote_endpoint,
            cluster,
        }
    }

    pub fn multicast(
        fabric_index: FabricIndex,
        group_id: GroupId,
        local_endpoint: EndpointId,
        cluster: Option<ClusterId>,
    ) -> Self {
        Self::Multicast {
            fabric_index,
            group_id,
            local_endpoint,
            cluster,
        }
    }

    pub fn fabric_index(&self) -> FabricIndex {
        match self {
            Self::Unicast { fabric_index, .. } | Self::Multicast { fabric_index, .. } => *fabric_index,
        }
    }

    pub fn local_endpoint(&self) -> EndpointId {
        match self {
            Self::Unicast { local_endpoint, .. } | Self::Multicast { local_endpoint, .. } => *local_endpoint,
        }
    }

    pub fn cluster(&self) -> Option<ClusterId> {
        match self {
            Self::Unicast { cluster, .. } | Self::Multicast { cluster, .. } => *cluster,
        }
    }

    /// Remote peer of a unicast binding, None for group bindings.
    pub fn peer(&self) -> Option<PeerId> {
        match self {
            Self::Unicast {
                fabric_index,
                node_id,
                ..
            } => Some(PeerId::new(*fabric_index, *node_id)),
            Self::Multicast { .. } => None,
        }
    }

    /// True when changes of `cluster` on local `endpoint` go to this binding.
    /// A binding without cluster filter covers every cluster of its endpoint.
    pub fn matches(&self, endpoint: EndpointId, cluster: ClusterId) -> bool {
        self.local_endpoint() == endpoint && self.cluster().map_or(true, |c| c == cluster)
    }

    fn validate(&self) -> Result<()> {
        if self.fabric_index() == 0 {
            return Err(BindingError::InvalidArgument(format!(
                "binding {:?} has undefined fabric index",
                self
            )));
        }
        if let Self::Unicast { node_id: 0, .. } = self {
            return Err(BindingError::InvalidArgument(format!(
                "binding {:?} has undefined node id",
                self
            )));
        }
        Ok(())
    }
}

/// Read-only view of the binding table.
pub trait BindingTableSource {
    fn entries(&self) -> Box<dyn Iterator<Item = &BindingEntry> + '_>;
}

impl BindingTableSource for Vec<BindingEntry> {
    fn entries(&self) -> Box<dyn Iterator<Item = &BindingEntry> + '_> {
        Box::new(self.iter())
    }
}

/// In-memory binding table with a fixed number of rows.
#[derive(Debug, Clone)]
pub struct BindingTable {
    entries: Vec<BindingEntry>,
    capacity: usize,
}

impl BindingTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn from_entries(capacity: usize, entries: &[BindingEntry]) -> Result<Self> {
        let mut table = Self::new(capacity);
        for e in entries {
            table.add(*e)?;
        }
        Ok(table)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BindingEntry> {
        self.entries.get(index)
    }

    pub fn list(&self) -> &[BindingEntry] {
        &self.entries
    }

    /// Store `entry` and return its index. Adding an identical row again returns the existing index.
    pub fn add(&mut self, entry: BindingEntry) -> Result<usize> {
        entry.validate()?;
        if let Some(pos) = self.entries.iter().position(|e| *e == entry) {
            return Ok(pos);
        }
        if self.entries.len() >= self.capacity {
            return Err(BindingError::NoMemory("binding table"));
        }
        self.entries.push(entry);
        Ok(self.entries.len() - 1)
    }

    pub fn remove_at(&mut self, index: usize) -> Result<BindingEntry> {
        if index >= self.entries.len() {
            return Err(BindingError::NotFound(index));
        }
        Ok(self.entries.remove(index))
    }

    pub fn remove_all_for_fabric(&mut self, fabric_index: FabricIndex) -> Vec<BindingEntry> {
        let (removed, kept): (Vec<BindingEntry>, Vec<BindingEntry>) = self
            .entries
            .drain(..)
            .partition(|e| e.fabric_index() == fabric_index);
        self.entries = kept;
        removed
    }

    pub fn has_unicast_to(&self, peer: PeerId) -> bool {
        self.entries.iter().any(|e| e.peer() == Some(peer))
    }
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::new(BINDING_TABLE_SIZE)
    }
}

impl BindingTableSource for BindingTable {
    fn entries(&self) -> Box<dyn Iterator<Item = &BindingEntry> + '_> {
        Box::new(self.entries.iter())
    }
}
