use std::time::{Duration, SystemTime};

use common::Task;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::state::{lock_room, AppState};

/// Qué hacer con una tarea que quedó en manos de un nodo que se fue, falló o no responde.
///
/// Por defecto las tareas se pierden (fire and forget). `Requeue` es un cambio de
/// comportamiento explícito y solo se activa con `--requeue-lost-tasks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedeliveryPolicy {
    #[default]
    FireAndForget,
    Requeue {
        max_attempts: u32,
        task_timeout: Option<Duration>,
    },
}

impl RedeliveryPolicy {
    /// Devuelve la tarea lista para re-encolar, o None si se descarta.
    pub fn requeue(&self, mut task: Task) -> Option<Task> {
        match self {
            RedeliveryPolicy::FireAndForget => None,
            RedeliveryPolicy::Requeue { max_attempts, .. } => {
                if task.attempt + 1 <= *max_attempts {
                    task.attempt += 1;
                    Some(task)
                } else {
                    None
                }
            }
        }
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        match self {
            RedeliveryPolicy::Requeue { task_timeout, .. } => *task_timeout,
            RedeliveryPolicy::FireAndForget => None,
        }
    }
}

/// Loop de tolerancia a fallos: re-encola tareas en vuelo hace más de `task_timeout`.
pub async fn run_failover_loop(state: AppState, every: Duration) {
    loop {
        sleep(every).await;

        let requeued = sweep_once(&state, SystemTime::now());
        if requeued > 0 {
            info!("failover sweep: {} tareas re-encoladas", requeued);
        }
    }
}

/// Una pasada por todas las salas. Cada sala se bloquea por separado.
pub fn sweep_once(state: &AppState, now: SystemTime) -> usize {
    if state.redelivery.task_timeout().is_none() {
        return 0;
    }

    let mut total = 0;
    for shared in state.all_rooms() {
        let mut room = lock_room(&shared);
        let n = room.requeue_stale(now);
        if n > 0 {
            warn!("sala {}: {} tareas vencidas re-encoladas", room.room(), n);
        }
        total += n;
    }
    total
}
