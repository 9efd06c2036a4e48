use thiserror::Error;

use crate::task::RoomId;
use crate::worker::NodeId;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// El store no tiene registro (o está incompleto) para la sala.
    #[error("no se pudo cargar la configuración: {0}")]
    ConfigLoad(String),

    #[error("la sala {0} ya tiene un job corriendo")]
    DuplicateStart(RoomId),

    #[error("la sala {0} no tiene nodos registrados")]
    NoNodes(RoomId),

    #[error("el nodo {node} reportó un error: {detail}")]
    WorkerReported { node: NodeId, detail: String },

    /// No debería pasar si el predicado de terminación es correcto.
    #[error("la generación {0} está vacía")]
    EmptyGeneration(u32),

    #[error("no se pudo entregar el mensaje al nodo {0}")]
    ChannelDelivery(NodeId),

    #[error("resultado inválido: {population} cromosomas pero {fitnesses} fitness")]
    MalformedResult { population: usize, fitnesses: usize },

    #[error("el nodo {0} no está registrado en la sala")]
    UnknownNode(NodeId),

    #[error("la sala {0} no existe")]
    UnknownRoom(RoomId),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CoordResult<T> = Result<T, CoordinatorError>;
