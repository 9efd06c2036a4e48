use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use common::{ClientEvent, CoordResult, CoordinatorError, ServerEvent};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::channel::Channel;
use crate::state::{lock_room, AppState};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// Una conexión = un nodo (o un admin mirando). El writer drena el canal del hub.
async fn handle_socket(state: AppState, socket: WebSocket) {
    let node_id = uuid::Uuid::new_v4().to_string();
    let mut rx = state.hub.register(&node_id);
    let (mut sender, mut receiver) = socket.split();

    info!("conexión {} abierta ({} conexiones)", node_id, state.hub.connections());

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("no se pudo serializar el evento: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    if let Err(e) = handle_client_event(&state, &node_id, event) {
                        report_error(&state, &node_id, e);
                    }
                }
                Err(e) => {
                    warn!("mensaje inválido de {}: {e}", node_id);
                    let _ = state.hub.send_to(
                        &node_id,
                        ServerEvent::Error {
                            message: format!("mensaje inválido: {e}"),
                        },
                    );
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("error de websocket en {}: {e}", node_id);
                break;
            }
        }
    }

    state.disconnect(&node_id);
    writer.abort();
    info!("conexión {} cerrada", node_id);
}

/// Aplica un evento del canal. Cada evento toma solo el lock de su sala.
pub fn handle_client_event(state: &AppState, node: &str, event: ClientEvent) -> CoordResult<()> {
    debug!("evento de {} en sala {}: {:?}", node, event.room(), event);

    match event {
        ClientEvent::Join { room } => {
            state.hub.subscribe(node, &room);
            lock_room(&state.room_or_create(&room)).join(node);
        }
        ClientEvent::Leave { room } => {
            if let Some(shared) = state.room(&room) {
                lock_room(&shared).leave(node);
            }
            state.hub.unsubscribe(node, &room);
            state.prune_room(&room);
        }
        ClientEvent::Watch { room } => {
            state.hub.subscribe(node, &room);
            if let Some(snapshot) = state.snapshot(&room) {
                state.hub.send_to(node, ServerEvent::Update { snapshot })?;
            }
        }
        ClientEvent::Start { room } => {
            state.start_room(&room)?;
        }
        ClientEvent::Abort { room } => {
            state.abort_room(&room)?;
        }
        ClientEvent::FinishedTask { room, task } => {
            let shared = state
                .room(&room)
                .ok_or_else(|| CoordinatorError::UnknownRoom(room.clone()))?;
            lock_room(&shared).report_finished(node, task)?;
        }
        ClientEvent::JobError { room, error } => {
            let shared = state
                .room(&room)
                .ok_or_else(|| CoordinatorError::UnknownRoom(room.clone()))?;
            lock_room(&shared).job_error(node, &error)?;
        }
    }
    Ok(())
}

fn report_error(state: &AppState, node: &str, err: CoordinatorError) {
    match &err {
        // ya quedó registrado por la sala
        CoordinatorError::WorkerReported { .. } => return,
        CoordinatorError::DuplicateStart(_) | CoordinatorError::NoNodes(_) => {
            warn!("{}", err)
        }
        _ => error!("evento de {} falló: {}", node, err),
    }
    let _ = state.hub.send_to(
        node,
        ServerEvent::Error {
            message: err.to_string(),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failover::RedeliveryPolicy;
    use crate::store::{ConfigStore, JsonConfigStore};
    use common::{FinishedTask, JobPhase, RoomConfig};
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn state(population_size: usize) -> AppState {
        let store = JsonConfigStore::in_memory();
        let config: RoomConfig = serde_json::from_value(serde_json::json!({
            "parameters": {
                "population_size": population_size,
                "chromosome_length": 4,
                "generations": 1
            },
            "fitness": {"function": "count_ones"},
            "selection": {"name": "s", "function": "s"}
        }))
        .unwrap();
        store.save("r", config).unwrap();
        AppState::new(Arc::new(store), RedeliveryPolicy::FireAndForget)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn join(state: &AppState, node: &str) -> UnboundedReceiver<ServerEvent> {
        let rx = state.hub.register(node);
        handle_client_event(
            state,
            node,
            ClientEvent::Join {
                room: "r".to_string(),
            },
        )
        .unwrap();
        rx
    }

    #[test]
    fn run_completo_por_eventos() {
        let state = state(2);
        let mut a = join(&state, "a");
        let mut watcher = state.hub.register("admin");
        handle_client_event(&state, "admin", ClientEvent::Watch { room: "r".to_string() }).unwrap();
        assert!(matches!(drain(&mut watcher).as_slice(), [ServerEvent::Update { .. }]));

        handle_client_event(&state, "admin", ClientEvent::Start { room: "r".to_string() }).unwrap();
        assert!(drain(&mut a)
            .iter()
            .any(|ev| matches!(ev, ServerEvent::Call { .. })));

        let done = FinishedTask {
            gen: 1,
            population: vec![vec!["1".to_string()], vec!["0".to_string()]],
            fitnesses: vec![1.0, 0.0],
        };
        handle_client_event(
            &state,
            "a",
            ClientEvent::FinishedTask {
                room: "r".to_string(),
                task: done,
            },
        )
        .unwrap();

        let events = drain(&mut watcher);
        assert!(events.iter().any(|ev| matches!(
            ev,
            ServerEvent::RunComplete { fitness, .. } if *fitness == 1.0
        )));
        assert_eq!(state.snapshot("r").unwrap().phase, JobPhase::Idle);
    }

    #[test]
    fn start_duplicado_devuelve_error() {
        let state = state(4);
        let _a = join(&state, "a");
        let start = || ClientEvent::Start { room: "r".to_string() };

        handle_client_event(&state, "a", start()).unwrap();
        assert!(matches!(
            handle_client_event(&state, "a", start()),
            Err(CoordinatorError::DuplicateStart(_))
        ));
    }

    #[test]
    fn finished_task_en_sala_desconocida() {
        let state = state(4);
        let err = handle_client_event(
            &state,
            "a",
            ClientEvent::FinishedTask {
                room: "nope".to_string(),
                task: FinishedTask {
                    gen: 0,
                    population: vec![],
                    fitnesses: vec![],
                },
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoordinatorError::UnknownRoom(_)));
    }

    #[test]
    fn job_error_se_propaga_y_report_error_no_responde() {
        let state = state(4);
        let mut a = join(&state, "a");
        drain(&mut a);

        let err = handle_client_event(
            &state,
            "a",
            ClientEvent::JobError {
                room: "r".to_string(),
                error: "boom".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoordinatorError::WorkerReported { .. }));

        // solo el UPDATE de la sala, sin ERROR punto a punto
        report_error(&state, "a", err);
        let events = drain(&mut a);
        assert!(events.iter().all(|ev| matches!(ev, ServerEvent::Update { .. })));
    }

    #[test]
    fn leave_saca_el_nodo_y_la_suscripcion() {
        let state = state(4);
        let mut a = join(&state, "a");
        let _b = join(&state, "b");
        handle_client_event(&state, "a", ClientEvent::Leave { room: "r".to_string() }).unwrap();
        drain(&mut a);

        let nodes = state.snapshot("r").unwrap().nodes;
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_id, "b");
        handle_client_event(&state, "x", ClientEvent::Abort { room: "r".to_string() }).unwrap();
        assert!(drain(&mut a).is_empty());
    }

    #[test]
    fn leave_del_ultimo_nodo_suelta_la_sala() {
        let state = state(4);
        let _a = join(&state, "a");
        handle_client_event(&state, "a", ClientEvent::Leave { room: "r".to_string() }).unwrap();

        assert!(state.room("r").is_none());
        assert!(matches!(
            handle_client_event(&state, "a", ClientEvent::Start { room: "r".to_string() }),
            Err(CoordinatorError::NoNodes(_))
        ));
    }
}
