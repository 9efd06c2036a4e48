use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{CoordinatorError, RoomConfig, RoomSnapshot, RunRecord};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::sockets::ws_handler;
use crate::state::{lock_room, AppState};

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/api/v1/rooms", get(list_rooms))
        .route("/api/v1/rooms/:room", get(get_room))
        .route("/api/v1/rooms/:room/start", post(start_room))
        .route("/api/v1/rooms/:room/abort", post(abort_room))
        .route("/api/v1/rooms/:room/history", get(room_history))
        .route(
            "/api/v1/rooms/:room/config",
            get(get_room_config).put(put_room_config),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn status_for(err: &CoordinatorError) -> StatusCode {
    match err {
        CoordinatorError::ConfigLoad(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoordinatorError::DuplicateStart(_) | CoordinatorError::NoNodes(_) => StatusCode::CONFLICT,
        CoordinatorError::UnknownRoom(_) | CoordinatorError::UnknownNode(_) => StatusCode::NOT_FOUND,
        CoordinatorError::MalformedResult { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: CoordinatorError) -> (StatusCode, String) {
    (status_for(&err), err.to_string())
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomSnapshot>> {
    let mut rooms: Vec<RoomSnapshot> = state
        .all_rooms()
        .iter()
        .map(|shared| lock_room(shared).snapshot())
        .collect();
    rooms.sort_by(|a, b| a.room.cmp(&b.room));
    Json(rooms)
}

async fn get_room(State(state): State<AppState>, Path(room): Path<String>) -> ApiResult<RoomSnapshot> {
    state
        .snapshot(&room)
        .map(Json)
        .ok_or_else(|| api_error(CoordinatorError::UnknownRoom(room)))
}

// Arranca un job en la sala con la config guardada en el store
async fn start_room(State(state): State<AppState>, Path(room): Path<String>) -> ApiResult<RoomSnapshot> {
    match state.start_room(&room) {
        Ok(snapshot) => {
            info!("start de la sala {} por HTTP", room);
            Ok(Json(snapshot))
        }
        Err(e) => {
            warn!("start de la sala {} rechazado: {}", room, e);
            Err(api_error(e))
        }
    }
}

async fn abort_room(State(state): State<AppState>, Path(room): Path<String>) -> ApiResult<RoomSnapshot> {
    state.abort_room(&room).map(Json).map_err(api_error)
}

async fn room_history(State(state): State<AppState>, Path(room): Path<String>) -> ApiResult<Vec<RunRecord>> {
    let shared = state
        .room(&room)
        .ok_or_else(|| api_error(CoordinatorError::UnknownRoom(room.clone())))?;
    let history = lock_room(&shared).history().to_vec();
    Ok(Json(history))
}

async fn get_room_config(State(state): State<AppState>, Path(room): Path<String>) -> ApiResult<RoomConfig> {
    state
        .store
        .get(&room)
        .map(Json)
        .ok_or_else(|| api_error(CoordinatorError::UnknownRoom(room)))
}

async fn put_room_config(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Json(config): Json<RoomConfig>,
) -> ApiResult<RoomConfig> {
    state.store.save(&room, config.clone()).map_err(api_error)?;
    info!("config de la sala {} actualizada", room);
    Ok(Json(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failover::RedeliveryPolicy;
    use crate::store::JsonConfigStore;
    use axum::{body::Body, http::Request};
    use common::JobPhase;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn config_json(population_size: usize) -> serde_json::Value {
        serde_json::json!({
            "parameters": {
                "population_size": population_size,
                "chromosome_length": 4,
                "generations": 3
            },
            "fitness": {"function": "count_ones"},
            "selection": {"name": "roulette", "function": "roulette"}
        })
    }

    fn state() -> AppState {
        AppState::new(Arc::new(JsonConfigStore::in_memory()), RedeliveryPolicy::FireAndForget)
    }

    async fn send(state: &AppState, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                req = req.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let res = build_router(state.clone())
            .oneshot(req.body(body).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn health_responde_ok() {
        let (status, body) = send(&state(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn config_put_y_get() {
        let state = state();

        let (status, _) = send(&state, "GET", "/api/v1/rooms/r/config", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&state, "PUT", "/api/v1/rooms/r/config", Some(config_json(0))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&state, "PUT", "/api/v1/rooms/r/config", Some(config_json(6))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&state, "GET", "/api/v1/rooms/r/config", None).await;
        assert_eq!(status, StatusCode::OK);
        let config: RoomConfig = serde_json::from_slice(&body).unwrap();
        assert_eq!(config.parameters.population_size, 6);
    }

    #[tokio::test]
    async fn start_mapea_errores_a_status() {
        let state = state();

        // sin config
        let (status, _) = send(&state, "POST", "/api/v1/rooms/r/start", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        send(&state, "PUT", "/api/v1/rooms/r/config", Some(config_json(4))).await;

        // config pero sin nodos
        let (status, _) = send(&state, "POST", "/api/v1/rooms/r/start", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let _rx = state.hub.register("n1");
        lock_room(&state.room_or_create("r")).join("n1");

        let (status, body) = send(&state, "POST", "/api/v1/rooms/r/start", None).await;
        assert_eq!(status, StatusCode::OK);
        let snap: RoomSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snap.phase, JobPhase::Running);

        let (status, _) = send(&state, "POST", "/api/v1/rooms/r/start", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn sala_desconocida_es_404() {
        let state = state();
        for (method, uri) in [
            ("GET", "/api/v1/rooms/x"),
            ("POST", "/api/v1/rooms/x/abort"),
            ("GET", "/api/v1/rooms/x/history"),
        ] {
            let (status, _) = send(&state, method, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn lista_salas_y_abort() {
        let state = state();
        state.room_or_create("b");
        state.room_or_create("a");

        let (status, body) = send(&state, "GET", "/api/v1/rooms", None).await;
        assert_eq!(status, StatusCode::OK);
        let rooms: Vec<RoomSnapshot> = serde_json::from_slice(&body).unwrap();
        let names: Vec<&str> = rooms.iter().map(|r| r.room.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let (status, body) = send(&state, "POST", "/api/v1/rooms/a/abort", None).await;
        assert_eq!(status, StatusCode::OK);
        let snap: RoomSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snap.phase, JobPhase::Idle);

        let (status, body) = send(&state, "GET", "/api/v1/rooms/a/history", None).await;
        assert_eq!(status, StatusCode::OK);
        let history: Vec<RunRecord> = serde_json::from_slice(&body).unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn status_de_errores_internos() {
        assert_eq!(
            status_for(&CoordinatorError::EmptyGeneration(3)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&CoordinatorError::MalformedResult {
                population: 1,
                fitnesses: 2
            }),
            StatusCode::BAD_REQUEST
        );
    }
}
