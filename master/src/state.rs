// master/src/state.rs

use common::{CoordResult, CoordinatorError, RoomId, RoomSnapshot};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::channel::{Channel, Hub};
use crate::failover::RedeliveryPolicy;
use crate::room::RoomCoordinator;
use crate::store::ConfigStore;
use tracing::debug;

/// Un lock por sala: dos reportes de la misma sala nunca se procesan a la vez.
pub type SharedRoom = Arc<Mutex<RoomCoordinator>>;

#[derive(Clone)]
pub struct AppState {
    // el lock del mapa solo se usa para buscar/crear/soltar salas; nunca se espera
    // el lock de una sala con el del mapa tomado
    pub rooms: Arc<Mutex<HashMap<RoomId, SharedRoom>>>,
    pub hub: Arc<Hub>,
    pub store: Arc<dyn ConfigStore>,
    pub redelivery: RedeliveryPolicy,
}

pub fn lock_room(room: &SharedRoom) -> MutexGuard<'_, RoomCoordinator> {
    room.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AppState {
    pub fn new(store: Arc<dyn ConfigStore>, redelivery: RedeliveryPolicy) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            hub: Arc::new(Hub::new()),
            store,
            redelivery,
        }
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<RoomId, SharedRoom>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn room(&self, id: &str) -> Option<SharedRoom> {
        self.rooms().get(id).cloned()
    }

    pub fn room_or_create(&self, id: &str) -> SharedRoom {
        let channel: Arc<dyn Channel> = self.hub.clone();
        self.rooms()
            .entry(id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(RoomCoordinator::new(
                    id,
                    channel,
                    self.redelivery,
                )))
            })
            .clone()
    }

    pub fn all_rooms(&self) -> Vec<SharedRoom> {
        self.rooms().values().cloned().collect()
    }

    /// La config se lee del store antes de tomar el lock de la sala.
    /// Una sala que nadie creó no tiene nodos: no se crea para rechazarla.
    pub fn start_room(&self, id: &str) -> CoordResult<RoomSnapshot> {
        let config = self.store.load(id)?;
        let shared = self
            .room(id)
            .ok_or_else(|| CoordinatorError::NoNodes(id.to_string()))?;
        let mut room = lock_room(&shared);
        room.job_init(config)?;
        Ok(room.snapshot())
    }

    pub fn abort_room(&self, id: &str) -> CoordResult<RoomSnapshot> {
        let shared = self
            .room(id)
            .ok_or_else(|| CoordinatorError::UnknownRoom(id.to_string()))?;
        let mut room = lock_room(&shared);
        room.abort();
        Ok(room.snapshot())
    }

    pub fn snapshot(&self, id: &str) -> Option<RoomSnapshot> {
        self.room(id).map(|shared| lock_room(&shared).snapshot())
    }

    /// Una conexión se cerró: sale de todas las salas donde estaba.
    pub fn disconnect(&self, node: &str) {
        for room_id in self.hub.disconnect(node) {
            if let Some(shared) = self.room(&room_id) {
                lock_room(&shared).leave(node);
            }
            self.prune_room(&room_id);
        }
    }

    /// Suelta la sala si quedó vacía, sin job y sin historial.
    ///
    /// Solo se toca si el mapa tiene el único handle: nadie más puede estar por
    /// tomar su lock, porque un handle nuevo requiere el lock del mapa.
    pub fn prune_room(&self, id: &str) -> bool {
        let mut rooms = self.rooms();
        let disposable = match rooms.get(id) {
            Some(shared) if Arc::strong_count(shared) == 1 => shared
                .try_lock()
                .map(|room| room.is_disposable())
                .unwrap_or(false),
            _ => false,
        };
        if disposable {
            rooms.remove(id);
            debug!("sala {} vacía, se descarta", id);
        }
        disposable
    }
}
