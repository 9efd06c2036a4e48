use serde::{Deserialize, Serialize};

use crate::error::{CoordResult, CoordinatorError};
use crate::operators::{FitnessDescriptor, MutationDescriptor, SelectionDescriptor};

pub type RoomId = String;
pub type Gene = String;
pub type Chromosome = Vec<Gene>;

/// Unidad de trabajo que se le entrega a un nodo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub gen: u32,
    pub room: RoomId,

    /// Tamaño del slice de población que tiene que producir el worker
    pub population_size: usize,

    /// Vacíos en tareas nuevas; con datos cuando se recicla un bucket completo
    #[serde(default)]
    pub population: Vec<Chromosome>,
    #[serde(default)]
    pub fitnesses: Vec<f64>,

    pub fitness: FitnessDescriptor,
    pub mutations: Vec<MutationDescriptor>,
    pub selection: SelectionDescriptor,
    pub chromosome_length: usize,
    pub gene_pool: Vec<Gene>,

    /// Intentos de entrega (solo lo usa el re-encolado opcional)
    #[serde(default)]
    pub attempt: u32,
}

/// Resultado que devuelve un worker para una Task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedTask {
    pub gen: u32,
    pub population: Vec<Chromosome>,
    pub fitnesses: Vec<f64>,
}

impl FinishedTask {
    /// population y fitnesses tienen que ser paralelos.
    pub fn validate(&self) -> CoordResult<()> {
        if self.population.len() != self.fitnesses.len() {
            return Err(CoordinatorError::MalformedResult {
                population: self.population.len(),
                fitnesses: self.fitnesses.len(),
            });
        }
        Ok(())
    }
}

/// Todo lo que una Task hereda de la sala, salvo la generación y el slice.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskBlueprint {
    pub room: RoomId,
    pub population_size: usize,
    pub fitness: FitnessDescriptor,
    pub mutations: Vec<MutationDescriptor>,
    pub selection: SelectionDescriptor,
    pub chromosome_length: usize,
    pub gene_pool: Vec<Gene>,
}

impl TaskBlueprint {
    fn task(&self, gen: u32, slice: usize) -> Task {
        Task {
            gen,
            room: self.room.clone(),
            population_size: slice,
            population: Vec::new(),
            fitnesses: Vec::new(),
            fitness: self.fitness.clone(),
            mutations: self.mutations.clone(),
            selection: self.selection.clone(),
            chromosome_length: self.chromosome_length,
            gene_pool: self.gene_pool.clone(),
            attempt: 0,
        }
    }

    /// Convierte una generación ya acumulada en una sola Task para seguir evolucionándola.
    pub fn recycle(&self, gen: u32, population: Vec<Chromosome>, fitnesses: Vec<f64>) -> Task {
        let mut task = self.task(gen, population.len());
        task.population = population;
        task.fitnesses = fitnesses;
        task
    }
}

/// Parte `population_size` en `unit_count` tareas para la generación `gen`.
///
/// El resto de la división se reparte de a uno entre las primeras tareas, así la
/// suma de los slices siempre es exactamente `population_size`. `unit_count` se
/// acota a `[1, population_size]` para no emitir slices vacíos.
pub fn generate_tasks(gen: u32, unit_count: usize, blueprint: &TaskBlueprint) -> Vec<Task> {
    let total = blueprint.population_size;
    if total == 0 {
        return Vec::new();
    }

    let units = unit_count.clamp(1, total);
    let base = total / units;
    let remainder = total % units;

    (0..units)
        .map(|i| {
            let slice = if i < remainder { base + 1 } else { base };
            blueprint.task(gen, slice)
        })
        .collect()
}
