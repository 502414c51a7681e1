//! Node table for the Engage runtime
//!
//! Nodes are created on first discovery, merged on rediscovery and removed on
//! undiscovery. The whole table is cleared when the presence group is left or
//! the engine stops.

use engage_core::{
    channel::AppEvent,
    config::PresenceConfig,
    presence::PresenceDescriptor,
    types::NodeId,
};
use hashbrown::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct PresenceManager {
    nodes: HashMap<NodeId, PresenceDescriptor>,
    config: PresenceConfig,
    stats: PresenceStats,
}

impl PresenceManager {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            nodes: HashMap::new(),
            config,
            stats: PresenceStats::default(),
        }
    }

    /// First sighting or a repeat announcement of a node
    ///
    /// A known node is merged in place. Returns the notification to emit, if
    /// any, together with the stored descriptor.
    pub fn on_discovered(&mut self, descriptor: PresenceDescriptor) -> Option<(Option<AppEvent>, &PresenceDescriptor)> {
        let node_id = descriptor.node_id.clone();

        if self.nodes.contains_key(&node_id) {
            return self.merge(descriptor);
        }

        if self.nodes.len() >= self.config.max_tracked_nodes {
            self.stats.nodes_dropped += 1;
            warn!(node_id = %node_id, limit = self.config.max_tracked_nodes, "Node table full; ignoring discovery");
            return None;
        }

        let notify = self.config.notify_on_node_join && !descriptor.is_self;
        self.nodes.insert(node_id.clone(), descriptor);
        self.stats.nodes_discovered += 1;

        let node = self.nodes.get(&node_id)?;
        debug!(node_id = %node_id, name = node.friendly_name(), "Node discovered");
        let event = notify.then(|| AppEvent::NodeJoined { node: node.clone() });
        Some((event, node))
    }

    /// Rediscovery of a node; unknown nodes are treated as first sightings
    pub fn on_rediscovered(&mut self, descriptor: PresenceDescriptor) -> Option<(Option<AppEvent>, &PresenceDescriptor)> {
        if self.nodes.contains_key(&descriptor.node_id) {
            self.merge(descriptor)
        } else {
            self.on_discovered(descriptor)
        }
    }

    fn merge(&mut self, descriptor: PresenceDescriptor) -> Option<(Option<AppEvent>, &PresenceDescriptor)> {
        let node = self.nodes.get_mut(&descriptor.node_id)?;
        node.merge(descriptor);
        self.stats.nodes_updated += 1;
        let event = AppEvent::NodeUpdated { node: node.clone() };
        Some((Some(event), node))
    }

    /// Remove a node after clearing its memberships
    pub fn on_undiscovered(&mut self, node_id: &NodeId) -> Option<AppEvent> {
        let mut node = match self.nodes.remove(node_id) {
            Some(node) => node,
            None => {
                debug!(node_id = %node_id, "Undiscovery for unknown node");
                return None;
            }
        };
        node.clear_memberships();
        self.stats.nodes_undiscovered += 1;
        debug!(node_id = %node_id, "Node undiscovered");

        (self.config.notify_on_node_leave && !node.is_self).then(|| AppEvent::NodeLeft {
            node_id: node.node_id.clone(),
            friendly_name: node.friendly_name().to_string(),
        })
    }

    /// Empty the table; returns whether anything was removed
    pub fn clear(&mut self) -> bool {
        let had_nodes = !self.nodes.is_empty();
        if had_nodes {
            debug!(count = self.nodes.len(), "Clearing node table");
        }
        self.nodes.clear();
        had_nodes
    }

    pub fn get(&self, node_id: &NodeId) -> Option<&PresenceDescriptor> {
        self.nodes.get(node_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PresenceDescriptor> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stats(&self) -> &PresenceStats {
        &self.stats
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceStats {
    pub nodes_discovered: u64,
    pub nodes_updated: u64,
    pub nodes_undiscovered: u64,
    pub nodes_dropped: u64,
}
