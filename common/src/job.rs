use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bucket::GenerationProgress;
use crate::error::{CoordResult, CoordinatorError};
use crate::operators::{FitnessDescriptor, MutationDescriptor, SelectionDescriptor};
use crate::results::LastResult;
use crate::task::{FinishedTask, Gene, RoomId, TaskBlueprint};
use crate::worker::NodeInfo;

fn default_gene_pool() -> Vec<Gene> {
    vec!["1".to_string(), "0".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmParams {
    pub population_size: usize,
    pub chromosome_length: usize,

    /// Generación máxima: el run termina cuando esta generación se completa
    pub generations: u32,

    /// Se guardan pero no participan de la terminación ni de la selección
    #[serde(default)]
    pub elitism: bool,
    #[serde(default)]
    pub fitness_goal: Option<f64>,

    #[serde(default = "default_gene_pool")]
    pub gene_pool: Vec<Gene>,
}

/// Registro de una sala en el store de configuración.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomConfig {
    pub parameters: AlgorithmParams,
    pub fitness: FitnessDescriptor,
    #[serde(default)]
    pub mutations: Vec<MutationDescriptor>,
    pub selection: SelectionDescriptor,
}

impl RoomConfig {
    /// Un registro incompleto cuenta como error de carga.
    pub fn validate(&self, room: &str) -> CoordResult<()> {
        let fail = |why: &str| -> CoordResult<()> {
            Err(CoordinatorError::ConfigLoad(format!("sala {room}: {why}")))
        };
        let p = &self.parameters;

        if p.population_size == 0 {
            return fail("population_size tiene que ser mayor a 0");
        }
        if p.chromosome_length == 0 {
            return fail("chromosome_length tiene que ser mayor a 0");
        }
        if p.generations == 0 {
            return fail("generations tiene que ser mayor a 0");
        }
        if p.gene_pool.is_empty() {
            return fail("gene_pool vacío");
        }
        if self.fitness.function.trim().is_empty() {
            return fail("falta la función de fitness");
        }
        if self.selection.function.trim().is_empty() {
            return fail("falta la función de selección");
        }
        for m in &self.mutations {
            if m.function.trim().is_empty() {
                return fail("mutación sin función");
            }
            if !(0.0..=1.0).contains(&m.chance_of_mutation) {
                return fail("chance_of_mutation fuera de [0, 1]");
            }
        }
        Ok(())
    }

    pub fn blueprint(&self, room: &str) -> TaskBlueprint {
        TaskBlueprint {
            room: room.to_string(),
            population_size: self.parameters.population_size,
            fitness: self.fitness.clone(),
            mutations: self.mutations.clone(),
            selection: self.selection.clone(),
            chromosome_length: self.parameters.chromosome_length,
            gene_pool: self.parameters.gene_pool.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPhase {
    Idle,
    Running,
}

/// Cómo terminó la última corrida (la sala ya volvió a Idle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    Completed,
    Aborted,
}

/// Máquina de estados del job de una sala y sus contadores.
#[derive(Debug, Clone)]
pub struct JobLifecycle {
    phase: JobPhase,
    last_outcome: Option<RunOutcome>,
    pub started_at: Option<DateTime<Utc>>,
    pub max_gen: Option<u32>,
    pub total_fitness: f64,
    pub chromosomes_returned: u64,
    pub last_result: Option<LastResult>,
}

impl Default for JobLifecycle {
    fn default() -> Self {
        Self {
            phase: JobPhase::Idle,
            last_outcome: None,
            started_at: None,
            max_gen: None,
            total_fitness: 0.0,
            chromosomes_returned: 0,
            last_result: None,
        }
    }
}

impl JobLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.last_outcome
    }

    pub fn is_running(&self) -> bool {
        self.phase == JobPhase::Running
    }

    /// Idle -> Running. Si ya está corriendo no toca nada.
    pub fn begin(&mut self, room: &str, max_gen: u32, now: DateTime<Utc>) -> CoordResult<()> {
        if self.is_running() {
            return Err(CoordinatorError::DuplicateStart(room.to_string()));
        }
        self.phase = JobPhase::Running;
        self.started_at = Some(now);
        self.max_gen = Some(max_gen);
        self.total_fitness = 0.0;
        self.chromosomes_returned = 0;
        Ok(())
    }

    /// Fin normal del job.
    pub fn stop(&mut self) {
        self.phase = JobPhase::Idle;
        self.last_outcome = Some(RunOutcome::Completed);
        self.started_at = None;
        self.max_gen = None;
        self.last_result = Some(LastResult::default());
    }

    pub fn abort(&mut self) {
        self.phase = JobPhase::Idle;
        self.last_outcome = Some(RunOutcome::Aborted);
        self.started_at = None;
    }

    /// Contadores de telemetría; no participan de la terminación.
    pub fn record(&mut self, finished: &FinishedTask) {
        self.total_fitness += finished.fitnesses.iter().take(2).sum::<f64>();
        self.chromosomes_returned += finished.population.len() as u64;
    }
}

/// Lo que se publica a la sala en cada UPDATE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: RoomId,
    pub phase: JobPhase,
    pub last_outcome: Option<RunOutcome>,
    pub nodes: Vec<NodeInfo>,
    pub queued_tasks: usize,
    pub generations: Vec<GenerationProgress>,
    pub started_at: Option<DateTime<Utc>>,
    pub max_gen: Option<u32>,
    pub population_size: Option<usize>,
    pub elitism: Option<bool>,
    pub fitness_goal: Option<f64>,
    pub total_fitness: f64,
    pub chromosomes_returned: u64,
    pub last_result: Option<LastResult>,
}
