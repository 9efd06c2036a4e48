use serde::{Deserialize, Serialize};

/// Descriptores opacos de operadores genéticos.
/// El coordinador no los ejecuta: solo los reenvía a los workers dentro de cada Task.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessDescriptor {
    /// Código / nombre de la función de fitness que interpreta el worker.
    pub function: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationDescriptor {
    pub function: String,

    /// Probabilidad de aplicar esta mutación, en [0, 1].
    pub chance_of_mutation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionDescriptor {
    pub name: String,
    pub function: String,
}
