pub mod bucket;
pub mod error;
pub mod job;
pub mod operators;
pub mod protocol;
pub mod results;
pub mod task;
pub mod worker;

pub use bucket::{should_terminate, BucketEntry, GenerationBucket, GenerationProgress};
pub use error::{CoordResult, CoordinatorError};
pub use job::{AlgorithmParams, JobLifecycle, JobPhase, RoomConfig, RoomSnapshot, RunOutcome};
pub use operators::{FitnessDescriptor, MutationDescriptor, SelectionDescriptor};
pub use protocol::{ClientEvent, ServerEvent};
pub use results::{select_fittest, Fittest, LastResult, RunRecord};
pub use task::{generate_tasks, Chromosome, FinishedTask, Gene, RoomId, Task, TaskBlueprint};
pub use worker::{NodeId, NodeInfo, NodeRegistry, NodeState};
