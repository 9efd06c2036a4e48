use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bucket::BucketEntry;
use crate::error::{CoordResult, CoordinatorError};
use crate::task::{Chromosome, RoomId};

/// El individuo más apto de una generación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fittest {
    pub fitness: f64,
    pub chromosome: Chromosome,
}

/// Selección final: recorre de izquierda a derecha y gana el primer máximo.
pub fn select_fittest(entry: &BucketEntry) -> CoordResult<Fittest> {
    let mut pairs = entry.fitnesses.iter().zip(entry.population.iter());

    let (first_fit, first_chromo) = pairs
        .next()
        .ok_or(CoordinatorError::EmptyGeneration(entry.gen))?;

    let (fitness, chromosome) = pairs.fold(
        (*first_fit, first_chromo),
        |best, (fit, chromo)| if *fit > best.0 { (*fit, chromo) } else { best },
    );

    Ok(Fittest {
        fitness,
        chromosome: chromosome.clone(),
    })
}

/// Placeholder que queda en la sala al cerrar un job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastResult {
    pub max_generation: u32,
    pub max_fitness: f64,
}

/// Registro histórico de una corrida terminada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub room: RoomId,
    pub nodes: usize,
    pub winning_chromosome: Chromosome,
    pub fitness: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn duration_ms(&self) -> Option<i64> {
        self.started_at
            .map(|start| (self.finished_at - start).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(fitnesses: Vec<f64>, genes: &[&str]) -> BucketEntry {
        BucketEntry {
            gen: 5,
            population: genes.iter().map(|g| vec![g.to_string()]).collect(),
            fitnesses,
        }
    }

    #[test]
    fn gana_el_primer_maximo() {
        let e = entry(vec![3.0, 7.0, 7.0, 2.0], &["a", "b", "c", "d"]);

        let best = select_fittest(&e).unwrap();
        assert_eq!(best.fitness, 7.0);
        assert_eq!(best.chromosome, vec!["b".to_string()]);
    }

    #[test]
    fn empate_con_decimales() {
        let e = entry(vec![1.2, 4.5, 4.5, 0.9], &["w", "x", "y", "z"]);

        let best = select_fittest(&e).unwrap();
        assert_eq!(best.fitness, 4.5);
        assert_eq!(best.chromosome, vec!["x".to_string()]);
    }

    #[test]
    fn un_solo_individuo() {
        let e = entry(vec![-1.0], &["solo"]);
        assert_eq!(select_fittest(&e).unwrap().fitness, -1.0);
    }

    #[test]
    fn generacion_vacia_es_error() {
        let e = entry(vec![], &[]);
        assert!(matches!(
            select_fittest(&e),
            Err(CoordinatorError::EmptyGeneration(5))
        ));
    }

    #[test]
    fn duracion_del_run() {
        let start = Utc::now();
        let record = RunRecord {
            room: "r".to_string(),
            nodes: 2,
            winning_chromosome: vec![],
            fitness: 0.0,
            started_at: Some(start),
            finished_at: start + chrono::Duration::milliseconds(1500),
        };
        assert_eq!(record.duration_ms(), Some(1500));
    }
}
