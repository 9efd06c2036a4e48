use common::{CoordResult, CoordinatorError, NodeId, RoomId, ServerEvent};
use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, PoisonError},
};
use tokio::sync::mpsc;
use tracing::debug;

/// Canal dúplex visto desde el coordinador: punto a punto o broadcast.
///
/// Los envíos no bloquean (se llaman con el lock de la sala tomado).
pub trait Channel: Send + Sync {
    fn send_to(&self, node: &str, event: ServerEvent) -> CoordResult<()>;
    fn broadcast_room(&self, room: &str, event: ServerEvent);
    fn broadcast_all(&self, event: ServerEvent);
}

struct Connection {
    tx: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashSet<RoomId>,
}

/// Conexiones WebSocket vivas y las salas a las que está suscripta cada una.
#[derive(Default)]
pub struct Hub {
    conns: Mutex<HashMap<NodeId, Connection>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    fn conns(&self) -> std::sync::MutexGuard<'_, HashMap<NodeId, Connection>> {
        self.conns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registra una conexión y devuelve el receptor que drena su writer.
    pub fn register(&self, node: &str) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.conns().insert(
            node.to_string(),
            Connection {
                tx,
                rooms: HashSet::new(),
            },
        );
        rx
    }

    pub fn subscribe(&self, node: &str, room: &str) {
        if let Some(conn) = self.conns().get_mut(node) {
            conn.rooms.insert(room.to_string());
        }
    }

    pub fn unsubscribe(&self, node: &str, room: &str) {
        if let Some(conn) = self.conns().get_mut(node) {
            conn.rooms.remove(room);
        }
    }

    /// Saca la conexión y devuelve las salas en las que estaba.
    pub fn disconnect(&self, node: &str) -> Vec<RoomId> {
        self.conns()
            .remove(node)
            .map(|conn| conn.rooms.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn connections(&self) -> usize {
        self.conns().len()
    }
}

impl Channel for Hub {
    fn send_to(&self, node: &str, event: ServerEvent) -> CoordResult<()> {
        let conns = self.conns();
        let conn = conns
            .get(node)
            .ok_or_else(|| CoordinatorError::ChannelDelivery(node.to_string()))?;
        conn.tx
            .send(event)
            .map_err(|_| CoordinatorError::ChannelDelivery(node.to_string()))
    }

    fn broadcast_room(&self, room: &str, event: ServerEvent) {
        let conns = self.conns();
        let mut sent = 0;
        for conn in conns.values().filter(|c| c.rooms.contains(room)) {
            if conn.tx.send(event.clone()).is_ok() {
                sent += 1;
            }
        }
        debug!("broadcast a sala {} ({} conexiones)", room, sent);
    }

    fn broadcast_all(&self, event: ServerEvent) {
        for conn in self.conns().values() {
            let _ = conn.tx.send(event.clone());
        }
    }
}
