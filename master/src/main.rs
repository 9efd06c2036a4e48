mod channel;
mod failover;
mod handlers;
mod room;
mod sockets;
mod state;
mod store;

use anyhow::Result;
use clap::Parser;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::failover::RedeliveryPolicy;
use crate::state::AppState;
use crate::store::{ConfigStore, JsonConfigStore};

#[derive(Parser)]
#[command(name = "master", about = "Coordinador de salas de algoritmos genéticos distribuidos")]
struct Cli {
    /// Dirección donde escucha HTTP + WebSocket
    #[arg(long, default_value = "0.0.0.0:8080", env = "COORDINATOR_LISTEN")]
    listen: String,

    /// Archivo JSON con la config de cada sala (sin él, el store vive en memoria)
    #[arg(long, env = "COORDINATOR_CONFIG_STORE")]
    config_store: Option<String>,

    /// Re-encolar tareas de nodos que se van o fallan
    #[arg(long)]
    requeue_lost_tasks: bool,

    #[arg(long, default_value_t = 3)]
    max_task_attempts: u32,

    /// Tareas en vuelo más viejas que esto se re-encolan (requiere --requeue-lost-tasks)
    #[arg(long)]
    task_timeout_secs: Option<u64>,

    #[arg(long, default_value_t = 5)]
    sweep_interval_secs: u64,
}

impl Cli {
    fn redelivery(&self) -> RedeliveryPolicy {
        if !self.requeue_lost_tasks {
            return RedeliveryPolicy::FireAndForget;
        }
        RedeliveryPolicy::Requeue {
            max_attempts: self.max_task_attempts,
            task_timeout: self.task_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "master=debug,tower_http=info,axum=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let store: Arc<dyn ConfigStore> = match &cli.config_store {
        Some(path) => Arc::new(JsonConfigStore::open(path)?),
        None => {
            warn!("sin --config-store: la configuración de salas vive solo en memoria");
            Arc::new(JsonConfigStore::in_memory())
        }
    };

    let redelivery = cli.redelivery();
    if cli.task_timeout_secs.is_some() && !cli.requeue_lost_tasks {
        warn!("--task-timeout-secs no tiene efecto sin --requeue-lost-tasks");
    }
    info!("política de re-entrega: {:?}", redelivery);

    let state = AppState::new(store, redelivery);

    // sweep de tareas vencidas en segundo plano
    if redelivery.task_timeout().is_some() {
        let sweep_state = state.clone();
        let every = Duration::from_secs(cli.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            failover::run_failover_loop(sweep_state, every).await;
        });
    }

    let app = handlers::build_router(state);

    let listener = TcpListener::bind(&cli.listen).await?;
    info!("master escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("master detenido");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("no se pudo instalar el handler de SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => info!("SIGINT recibido"),
        _ = terminate => info!("SIGTERM recibido"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requeue_solo_con_el_flag() {
        let cli = Cli::parse_from(["master", "--task-timeout-secs", "10"]);
        assert_eq!(cli.redelivery(), RedeliveryPolicy::FireAndForget);

        let cli = Cli::parse_from([
            "master",
            "--requeue-lost-tasks",
            "--max-task-attempts",
            "5",
            "--task-timeout-secs",
            "10",
        ]);
        assert_eq!(
            cli.redelivery(),
            RedeliveryPolicy::Requeue {
                max_attempts: 5,
                task_timeout: Some(Duration::from_secs(10)),
            }
        );
    }
}
