use serde::{Deserialize, Serialize};

use crate::job::RoomSnapshot;
use crate::task::{Chromosome, FinishedTask, RoomId, Task};

/* --------- Mensajes que llegan por el socket --------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientEvent {
    Join { room: RoomId },
    Leave { room: RoomId },
    /// Recibir los broadcasts de la sala sin ser nodo (vista de admin)
    Watch { room: RoomId },
    Start { room: RoomId },
    Abort { room: RoomId },
    FinishedTask { room: RoomId, task: FinishedTask },
    JobError { room: RoomId, error: String },
}

impl ClientEvent {
    pub fn room(&self) -> &str {
        match self {
            ClientEvent::Join { room }
            | ClientEvent::Leave { room }
            | ClientEvent::Watch { room }
            | ClientEvent::Start { room }
            | ClientEvent::Abort { room }
            | ClientEvent::FinishedTask { room, .. }
            | ClientEvent::JobError { room, .. } => room,
        }
    }
}

/* --------- Mensajes que manda el coordinador --------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    /// Tarea punto a punto para un nodo
    Call { room: RoomId, task: Task },
    Update { snapshot: RoomSnapshot },
    Abort { room: RoomId },
    RunComplete {
        room: RoomId,
        winning_chromosome: Chromosome,
        fitness: f64,
    },
    Error { message: String },
}
