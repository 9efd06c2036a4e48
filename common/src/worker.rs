use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type NodeId = String;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub running: bool,
    pub error: bool,
}

/// Vista de un nodo tal como se publica en el snapshot de la sala.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: NodeId,
    pub running: bool,
    pub error: bool,
}

/// Nodos conectados a una sala, en orden de llegada.
#[derive(Debug, Default, Clone)]
pub struct NodeRegistry {
    nodes: HashMap<NodeId, NodeState>,
    order: Vec<NodeId>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra el nodo. Si ya existía se resetea su estado pero conserva su lugar.
    pub fn join(&mut self, node: &str) {
        if self.nodes.insert(node.to_string(), NodeState::default()).is_none() {
            self.order.push(node.to_string());
        }
    }

    /// Devuelve false si el nodo no estaba registrado.
    pub fn leave(&mut self, node: &str) -> bool {
        if self.nodes.remove(node).is_none() {
            return false;
        }
        self.order.retain(|id| id != node);
        true
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn get(&self, node: &str) -> Option<NodeState> {
        self.nodes.get(node).copied()
    }

    pub fn mark_running(&mut self, node: &str) -> bool {
        match self.nodes.get_mut(node) {
            Some(state) => {
                state.running = true;
                true
            }
            None => false,
        }
    }

    /// Un nodo con error deja de contar como corriendo.
    pub fn mark_error(&mut self, node: &str) -> bool {
        match self.nodes.get_mut(node) {
            Some(state) => {
                state.running = false;
                state.error = true;
                true
            }
            None => false,
        }
    }

    pub fn set_all(&mut self, running: bool, error: bool) {
        for state in self.nodes.values_mut() {
            state.running = running;
            state.error = error;
        }
    }

    /// Al cerrar un job: nadie corre, los errores quedan marcados.
    pub fn mark_all_idle(&mut self) {
        for state in self.nodes.values_mut() {
            state.running = false;
        }
    }

    pub fn count(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.order.clear();
    }

    /// Ids en orden de registro.
    pub fn ids(&self) -> Vec<NodeId> {
        self.order.clone()
    }

    pub fn infos(&self) -> Vec<NodeInfo> {
        self.order
            .iter()
            .filter_map(|id| {
                self.nodes.get(id).map(|s| NodeInfo {
                    node_id: id.clone(),
                    running: s.running,
                    error: s.error,
                })
            })
            .collect()
    }
}
