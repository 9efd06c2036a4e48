use chrono::Utc;
use common::{
    generate_tasks, select_fittest, should_terminate, CoordResult, CoordinatorError, FinishedTask,
    GenerationBucket, JobLifecycle, NodeId, NodeRegistry, RoomConfig, RoomId, RoomSnapshot,
    RunRecord, ServerEvent, Task, TaskBlueprint,
};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::SystemTime,
};
use tracing::{debug, error, info, warn};

use crate::channel::Channel;
use crate::failover::RedeliveryPolicy;

/// Tareas por nodo al arrancar un job, para que los nodos rápidos tengan de dónde tirar.
pub const TASKS_PER_NODE: usize = 4;

#[derive(Debug, Clone)]
pub struct InFlight {
    pub task: Task,
    pub started_at: SystemTime,
}

/// Qué pasó con un FINISHED_TASK.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    /// Llegó con la sala en Idle
    Ignored,
    Continued { dispatched: bool },
    Completed(RunRecord),
}

/// Estado y protocolo de una sala. Todas las operaciones son síncronas y se
/// ejecutan con el lock de la sala tomado.
pub struct RoomCoordinator {
    room: RoomId,
    nodes: NodeRegistry,
    tasks: VecDeque<Task>,
    bucket: GenerationBucket,
    job: JobLifecycle,
    config: Option<RoomConfig>,
    blueprint: Option<TaskBlueprint>,
    in_flight: HashMap<NodeId, InFlight>,
    history: Vec<RunRecord>,
    redelivery: RedeliveryPolicy,
    channel: Arc<dyn Channel>,
}

impl RoomCoordinator {
    pub fn new(room: &str, channel: Arc<dyn Channel>, redelivery: RedeliveryPolicy) -> Self {
        Self {
            room: room.to_string(),
            nodes: NodeRegistry::new(),
            tasks: VecDeque::new(),
            bucket: GenerationBucket::new(),
            job: JobLifecycle::new(),
            config: None,
            blueprint: None,
            in_flight: HashMap::new(),
            history: Vec::new(),
            redelivery,
            channel,
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn is_job_running(&self) -> bool {
        self.job.is_running()
    }

    pub fn total_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.count()
    }

    pub fn history(&self) -> &[RunRecord] {
        &self.history
    }

    /// Sin nodos, sin job y sin historial: la sala se puede soltar.
    pub fn is_disposable(&self) -> bool {
        self.nodes.is_empty() && !self.job.is_running() && self.history.is_empty()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let params = self.config.as_ref().map(|c| &c.parameters);
        RoomSnapshot {
            room: self.room.clone(),
            phase: self.job.phase(),
            last_outcome: self.job.last_outcome(),
            nodes: self.nodes.infos(),
            queued_tasks: self.tasks.len(),
            generations: self.bucket.progress(),
            started_at: self.job.started_at,
            max_gen: self.job.max_gen,
            population_size: params.map(|p| p.population_size),
            elitism: params.map(|p| p.elitism),
            fitness_goal: params.and_then(|p| p.fitness_goal),
            total_fitness: self.job.total_fitness,
            chromosomes_returned: self.job.chromosomes_returned,
            last_result: self.job.last_result.clone(),
        }
    }

    fn broadcast_update(&self) {
        self.channel.broadcast_room(
            &self.room,
            ServerEvent::Update {
                snapshot: self.snapshot(),
            },
        );
    }

    /* ---------------- nodos ---------------- */

    pub fn join(&mut self, node: &str) {
        self.nodes.join(node);
        info!("nodo {} se unió a la sala {} ({} nodos)", node, self.room, self.nodes.count());
        self.broadcast_update();
    }

    /// Devuelve false si el nodo no estaba en la sala.
    pub fn leave(&mut self, node: &str) -> bool {
        if !self.nodes.leave(node) {
            return false;
        }
        info!("nodo {} dejó la sala {}", node, self.room);
        self.lost_task(node);
        self.broadcast_update();
        true
    }

    /// El nodo queda marcado con error; el job sigue y su tarea no se reasigna
    /// (salvo con re-encolado activado). Siempre devuelve el error al caller.
    pub fn job_error(&mut self, node: &str, detail: &str) -> CoordResult<()> {
        if !self.nodes.mark_error(node) {
            return Err(CoordinatorError::UnknownNode(node.to_string()));
        }
        error!("JOB_ERROR en sala {} para el nodo {}: {}", self.room, node, detail);
        self.lost_task(node);
        self.broadcast_update();
        Err(CoordinatorError::WorkerReported {
            node: node.to_string(),
            detail: detail.to_string(),
        })
    }

    /* ---------------- ciclo de vida del job ---------------- */

    /// Carga la configuración y, si no hay un job corriendo, arranca uno y
    /// reparte una tarea a cada nodo en orden de registro.
    pub fn job_init(&mut self, config: RoomConfig) -> CoordResult<()> {
        if self.job.is_running() {
            warn!("la sala {} ya tiene un job corriendo, se ignora el start", self.room);
            return Err(CoordinatorError::DuplicateStart(self.room.clone()));
        }
        config.validate(&self.room)?;
        if self.nodes.is_empty() {
            warn!("start en sala {} sin nodos registrados", self.room);
            return Err(CoordinatorError::NoNodes(self.room.clone()));
        }

        self.blueprint = Some(config.blueprint(&self.room));
        let max_gen = config.parameters.generations;
        self.config = Some(config);
        self.broadcast_update();

        self.start_job(max_gen)?;

        for node in self.nodes.ids() {
            self.distribute_work(&node);
        }

        self.broadcast_update();
        Ok(())
    }

    fn start_job(&mut self, max_gen: u32) -> CoordResult<()> {
        self.job.begin(&self.room, max_gen, Utc::now())?;
        self.nodes.set_all(true, false);
        self.bucket.clear();
        self.in_flight.clear();

        let units = TASKS_PER_NODE * self.nodes.count();
        self.tasks = match &self.blueprint {
            Some(bp) => generate_tasks(0, units, bp).into(),
            None => VecDeque::new(),
        };

        info!(
            "job iniciado en sala {}: {} tareas para {} nodos (max_gen={})",
            self.room,
            self.tasks.len(),
            self.nodes.count(),
            max_gen
        );
        Ok(())
    }

    /// Cancela el run: vacía cola, bucket y registro de nodos.
    pub fn abort(&mut self) {
        self.job.abort();
        self.tasks.clear();
        self.bucket.clear();
        self.in_flight.clear();
        self.nodes.clear();
        warn!("job abortado en sala {}", self.room);
        self.channel.broadcast_room(
            &self.room,
            ServerEvent::Abort {
                room: self.room.clone(),
            },
        );
    }

    /// Fin normal del job.
    pub fn stop_job(&mut self) {
        self.job.stop();
        self.nodes.mark_all_idle();
        self.tasks.clear();
        self.bucket.clear();
        self.in_flight.clear();
    }

    /* ---------------- reparto de trabajo ---------------- */

    /// Manda la primera tarea de la cola al nodo. Cola vacía o nodo con una
    /// tarea en vuelo: no hace nada.
    pub fn distribute_work(&mut self, node: &str) -> bool {
        if self.tasks.is_empty()
            || self.in_flight.contains_key(node)
            || !self.nodes.mark_running(node)
        {
            return false;
        }
        let Some(task) = self.tasks.pop_front() else {
            return false;
        };

        debug!(
            "asignando tarea gen={} (slice={}) al nodo {} en sala {}",
            task.gen, task.population_size, node, self.room
        );

        let event = ServerEvent::Call {
            room: self.room.clone(),
            task: task.clone(),
        };
        match self.channel.send_to(node, event) {
            Ok(()) => {
                self.in_flight.insert(
                    node.to_string(),
                    InFlight {
                        task,
                        started_at: SystemTime::now(),
                    },
                );
                true
            }
            Err(e) => {
                warn!("{}; se trata como leave", e);
                self.in_flight.insert(
                    node.to_string(),
                    InFlight {
                        task,
                        started_at: SystemTime::now(),
                    },
                );
                self.leave(node);
                false
            }
        }
    }

    /// Procesa el resultado de un nodo: acumula, termina o sigue repartiendo.
    pub fn report_finished(
        &mut self,
        node: &str,
        finished: FinishedTask,
    ) -> CoordResult<ReportOutcome> {
        finished.validate()?;
        if !self.nodes.contains(node) {
            return Err(CoordinatorError::UnknownNode(node.to_string()));
        }
        if !self.job.is_running() {
            debug!(
                "resultado de gen {} del nodo {} con la sala {} en Idle, se descarta",
                finished.gen, node, self.room
            );
            return Ok(ReportOutcome::Ignored);
        }

        self.in_flight.remove(node);
        self.job.record(&finished);

        let gen = finished.gen;
        let collected = self.bucket.merge(finished);
        debug!("sala {}: gen {} acumula {} cromosomas", self.room, gen, collected);

        let outcome = if self.should_terminate() {
            let record = self.finish()?;
            ReportOutcome::Completed(record)
        } else {
            let dispatched = !self.tasks.is_empty() && self.distribute_work(node);
            self.create_more_tasks(gen);
            ReportOutcome::Continued { dispatched }
        };

        self.broadcast_update();
        Ok(outcome)
    }

    pub fn should_terminate(&self) -> bool {
        match (self.job.max_gen, &self.config) {
            (Some(max_gen), Some(config)) => should_terminate(
                &self.bucket,
                max_gen,
                config.parameters.population_size,
                self.job.is_running(),
            ),
            _ => false,
        }
    }

    /// Generación completa: se recicla como una sola tarea. Si no, se pide una más.
    fn create_more_tasks(&mut self, gen: u32) {
        let Some(bp) = &self.blueprint else {
            return;
        };

        if self.bucket.is_generation_complete(gen, bp.population_size) {
            if let Some(entry) = self.bucket.take(gen) {
                debug!("sala {}: gen {} completa, se recicla", self.room, gen);
                self.tasks
                    .push_back(bp.recycle(gen, entry.population, entry.fitnesses));
            }
        } else {
            self.tasks.extend(generate_tasks(gen, 1, bp));
        }
    }

    /// Selección final sobre la generación máxima y cierre del job.
    fn finish(&mut self) -> CoordResult<RunRecord> {
        let max_gen = self.job.max_gen.unwrap_or_default();
        let fittest = match self.bucket.get(max_gen).map(select_fittest) {
            Some(Ok(f)) => f,
            Some(Err(e)) => {
                error!("sala {}: {}; se aborta el run", self.room, e);
                self.abort();
                return Err(e);
            }
            None => {
                error!("sala {}: falta la generación {}; se aborta el run", self.room, max_gen);
                self.abort();
                return Err(CoordinatorError::EmptyGeneration(max_gen));
            }
        };

        let record = RunRecord {
            room: self.room.clone(),
            nodes: self.nodes.count(),
            winning_chromosome: fittest.chromosome.clone(),
            fitness: fittest.fitness,
            started_at: self.job.started_at,
            finished_at: Utc::now(),
        };

        info!(
            "sala {} terminó en {:?} ms; mejor fitness {} cromosoma {:?}",
            self.room,
            record.duration_ms(),
            record.fitness,
            record.winning_chromosome
        );

        self.channel.broadcast_all(ServerEvent::RunComplete {
            room: self.room.clone(),
            winning_chromosome: fittest.chromosome,
            fitness: fittest.fitness,
        });
        self.history.push(record.clone());
        self.tasks.clear();
        self.stop_job();
        Ok(record)
    }

    /* ---------------- re-encolado opcional ---------------- */

    /// La tarea en vuelo del nodo se pierde, salvo que la política diga re-encolar.
    /// Las re-encoladas van al frente de la cola.
    fn lost_task(&mut self, node: &str) {
        let Some(inflight) = self.in_flight.remove(node) else {
            return;
        };
        if !self.job.is_running() {
            return;
        }
        match self.redelivery.requeue(inflight.task) {
            Some(task) => {
                info!(
                    "re-encolando tarea gen={} de la sala {} (attempt={})",
                    task.gen, self.room, task.attempt
                );
                self.tasks.push_front(task);
                self.dispatch_to_idle(&[]);
            }
            None => warn!("tarea del nodo {} en sala {} perdida", node, self.room),
        }
    }

    /// Re-encola tareas en vuelo hace más que el timeout de la política.
    pub fn requeue_stale(&mut self, now: SystemTime) -> usize {
        let Some(timeout) = self.redelivery.task_timeout() else {
            return 0;
        };
        if !self.job.is_running() {
            return 0;
        }

        let stale: Vec<NodeId> = self
            .in_flight
            .iter()
            .filter(|(_, f)| {
                now.duration_since(f.started_at)
                    .map(|elapsed| elapsed > timeout)
                    .unwrap_or(false)
            })
            .map(|(node, _)| node.clone())
            .collect();

        let mut requeued = 0;
        for node in &stale {
            if let Some(inflight) = self.in_flight.remove(node) {
                if let Some(task) = self.redelivery.requeue(inflight.task) {
                    self.tasks.push_front(task);
                    requeued += 1;
                }
            }
        }

        // los nodos vencidos no reciben trabajo en esta pasada
        if requeued > 0 {
            self.dispatch_to_idle(&stale);
            self.broadcast_update();
        }
        requeued
    }

    /// Reparte la cola entre nodos sanos sin tarea en vuelo, salvo los de `skip`.
    fn dispatch_to_idle(&mut self, skip: &[NodeId]) {
        for node in self.nodes.ids() {
            if self.tasks.is_empty() {
                break;
            }
            if skip.contains(&node) {
                continue;
            }
            let healthy = self.nodes.get(&node).map(|s| !s.error).unwrap_or(false);
            if healthy && !self.in_flight.contains_key(&node) {
                self.distribute_work(&node);
            }
        }
    }
}
