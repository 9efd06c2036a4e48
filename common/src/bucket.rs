use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::task::{Chromosome, FinishedTask};

/// Todo lo que llegó para una generación hasta ahora.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketEntry {
    pub gen: u32,
    pub population: Vec<Chromosome>,
    pub fitnesses: Vec<f64>,
}

impl BucketEntry {
    pub fn len(&self) -> usize {
        self.population.len()
    }

    pub fn is_empty(&self) -> bool {
        self.population.is_empty()
    }
}

impl From<FinishedTask> for BucketEntry {
    fn from(ft: FinishedTask) -> Self {
        Self {
            gen: ft.gen,
            population: ft.population,
            fitnesses: ft.fitnesses,
        }
    }
}

/// Progreso de una generación, para el snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationProgress {
    pub gen: u32,
    pub collected: usize,
}

/// Barrera generacional: acumula resultados parciales por número de generación.
#[derive(Debug, Default, Clone)]
pub struct GenerationBucket {
    entries: BTreeMap<u32, BucketEntry>,
}

impl GenerationBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatena el resultado en su generación y devuelve el tamaño acumulado.
    pub fn merge(&mut self, finished: FinishedTask) -> usize {
        match self.entries.get_mut(&finished.gen) {
            Some(entry) => {
                entry.population.extend(finished.population);
                entry.fitnesses.extend(finished.fitnesses);
                entry.len()
            }
            None => {
                let gen = finished.gen;
                let entry = BucketEntry::from(finished);
                let len = entry.len();
                self.entries.insert(gen, entry);
                len
            }
        }
    }

    pub fn is_generation_complete(&self, gen: u32, population_size: usize) -> bool {
        self.entries
            .get(&gen)
            .map(|e| e.len() >= population_size)
            .unwrap_or(false)
    }

    pub fn collected(&self, gen: u32) -> usize {
        self.entries.get(&gen).map(BucketEntry::len).unwrap_or(0)
    }

    pub fn get(&self, gen: u32) -> Option<&BucketEntry> {
        self.entries.get(&gen)
    }

    /// Saca la entrada (se usa al reciclar una generación completa en una Task).
    pub fn take(&mut self, gen: u32) -> Option<BucketEntry> {
        self.entries.remove(&gen)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn progress(&self) -> Vec<GenerationProgress> {
        self.entries
            .values()
            .map(|e| GenerationProgress {
                gen: e.gen,
                collected: e.len(),
            })
            .collect()
    }
}

/// Predicado de terminación de la sala: la generación máxima está llena y el job sigue corriendo.
pub fn should_terminate(
    bucket: &GenerationBucket,
    max_gen: u32,
    population_size: usize,
    job_running: bool,
) -> bool {
    job_running && bucket.is_generation_complete(max_gen, population_size)
}
