use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use common::{JobPhase, RoomConfig, RoomSnapshot, RunRecord};
use reqwest::{Client, Response};
use std::fs;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI para administrar las salas del coordinador")]
struct Cli {
    /// En Docker: http://master:8080
    #[arg(long, env = "MASTER_URL", default_value = "http://localhost:8080")]
    master_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lista todas las salas conocidas
    Rooms,
    /// Estado de una sala
    Status {
        #[arg(value_name = "SALA")]
        room: String,
    },
    /// Arranca un job con la config guardada
    Start {
        #[arg(value_name = "SALA")]
        room: String,
    },
    Abort {
        #[arg(value_name = "SALA")]
        room: String,
    },
    /// Runs terminados de una sala
    History {
        #[arg(value_name = "SALA")]
        room: String,
    },
    /// Muestra la config de una sala, o la reemplaza con --set
    Config {
        #[arg(value_name = "SALA")]
        room: String,

        /// Archivo JSON con la nueva config
        #[arg(long, value_name = "ARCHIVO")]
        set: Option<String>,
    },
}

/// Corta con el mensaje del master si la respuesta no es 2xx.
async fn check(resp: Response, what: &str) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    bail!("{what} falló (status {status}): {body}")
}

fn print_snapshot(s: &RoomSnapshot) {
    let phase = match s.phase {
        JobPhase::Idle => "idle",
        JobPhase::Running => "running",
    };
    println!("Sala {}:", s.room);
    println!("  estado       : {}", phase);
    if let Some(outcome) = s.last_outcome {
        println!("  último run   : {:?}", outcome);
    }
    if let Some(pop) = s.population_size {
        println!("  población    : {}", pop);
    }
    if let Some(max_gen) = s.max_gen {
        println!("  max_gen      : {}", max_gen);
    }
    if let Some(ref started) = s.started_at {
        println!("  iniciado     : {}", started);
    }
    println!("  tareas cola  : {}", s.queued_tasks);
    println!(
        "  telemetría   : total_fitness={:.3}, cromosomas={}",
        s.total_fitness, s.chromosomes_returned
    );
    if let Some(ref last) = s.last_result {
        println!(
            "  último gen   : max_generation={}, max_fitness={:.3}",
            last.max_generation, last.max_fitness
        );
    }

    if s.generations.is_empty() {
        println!("  generaciones : (sin datos)");
    } else {
        println!("  generaciones :");
        for g in &s.generations {
            println!("    - gen {}: {} cromosomas", g.gen, g.collected);
        }
    }

    if s.nodes.is_empty() {
        println!("  nodos        : (ninguno)");
    } else {
        println!("  nodos        :");
        for n in &s.nodes {
            println!(
                "    - {} running={} error={}",
                n.node_id, n.running, n.error
            );
        }
    }
}

fn print_record(r: &RunRecord) {
    let duration = r
        .duration_ms()
        .map(|ms| format!("{ms} ms"))
        .unwrap_or_else(|| "?".to_string());
    println!(
        "  - {} nodos={} fitness={:.3} duración={} cromosoma={}",
        r.finished_at,
        r.nodes,
        r.fitness,
        duration,
        r.winning_chromosome.join("")
    );
}

fn read_config(path: &str) -> Result<RoomConfig> {
    let data = fs::read_to_string(path).with_context(|| format!("no se pudo leer {path}"))?;
    let config: RoomConfig =
        serde_json::from_str(&data).with_context(|| format!("{path} no es una config válida"))?;
    Ok(config)
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = cli.master_url.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Rooms => {
            let url = format!("{}/api/v1/rooms", base_url);
            let resp = check(client.get(&url).send().await?, "listar salas").await?;
            let rooms: Vec<RoomSnapshot> = resp.json().await?;
            if rooms.is_empty() {
                println!("No hay salas.");
            }
            for room in &rooms {
                print_snapshot(room);
                println!();
            }
        }

        Commands::Status { room } => {
            let url = format!("{}/api/v1/rooms/{room}", base_url);
            let resp = check(client.get(&url).send().await?, "status").await?;
            let snapshot: RoomSnapshot = resp.json().await?;
            print_snapshot(&snapshot);
        }

        Commands::Start { room } => {
            let url = format!("{}/api/v1/rooms/{room}/start", base_url);
            let resp = check(client.post(&url).send().await?, "start").await?;
            let snapshot: RoomSnapshot = resp.json().await?;
            println!("Job iniciado.");
            print_snapshot(&snapshot);
        }

        Commands::Abort { room } => {
            let url = format!("{}/api/v1/rooms/{room}/abort", base_url);
            let resp = check(client.post(&url).send().await?, "abort").await?;
            let snapshot: RoomSnapshot = resp.json().await?;
            println!("Job abortado.");
            print_snapshot(&snapshot);
        }

        Commands::History { room } => {
            let url = format!("{}/api/v1/rooms/{room}/history", base_url);
            let resp = check(client.get(&url).send().await?, "history").await?;
            let history: Vec<RunRecord> = resp.json().await?;
            println!("Runs de la sala {}:", room);
            if history.is_empty() {
                println!("  (sin runs terminados)");
            }
            for record in &history {
                print_record(record);
            }
        }

        Commands::Config { room, set } => {
            let url = format!("{}/api/v1/rooms/{room}/config", base_url);
            let resp = match set {
                Some(path) => {
                    let config = read_config(&path)?;
                    check(client.put(&url).json(&config).send().await?, "guardar config").await?
                }
                None => check(client.get(&url).send().await?, "leer config").await?,
            };
            let config: RoomConfig = resp.json().await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsea_config_con_set() {
        let cli = Cli::parse_from(["client", "config", "sala1", "--set", "cfg.json"]);
        match cli.command {
            Commands::Config { room, set } => {
                assert_eq!(room, "sala1");
                assert_eq!(set.as_deref(), Some("cfg.json"));
            }
            _ => panic!("esperaba Config"),
        }
    }

    #[test]
    fn read_config_valida_el_json() {
        let dir = std::env::temp_dir().join("client_cli_tests");
        fs::create_dir_all(&dir).unwrap();

        let ok = dir.join("ok.json");
        fs::write(
            &ok,
            r#"{
                "parameters": {"population_size": 8, "chromosome_length": 10, "generations": 5},
                "fitness": {"function": "f"},
                "selection": {"name": "roulette", "function": "s"}
            }"#,
        )
        .unwrap();
        let config = read_config(ok.to_str().unwrap()).unwrap();
        assert_eq!(config.parameters.generations, 5);
        assert_eq!(config.parameters.gene_pool, vec!["1".to_string(), "0".to_string()]);

        let bad = dir.join("bad.json");
        fs::write(&bad, "[]").unwrap();
        assert!(read_config(bad.to_str().unwrap()).is_err());
        assert!(read_config(dir.join("no-existe.json").to_str().unwrap()).is_err());
    }
}
