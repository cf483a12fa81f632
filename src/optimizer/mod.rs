//! # Optimizer Module
//!
//! Macchinario per singolo file, separato in sottomoduli:
//! - `pipeline`: Orchestratore principale (validazione, upload, quarantena)
//! - `task_processor`: Worker che esegue la catena di step di un task
//! - `executor`: Adattatore verso i tool esterni
//! - `concurrency`: Pool di permessi per le catene di ottimizzazione
//! - `path_resolver`: Logica di calcolo path centralizzata

pub mod concurrency;
pub mod executor;
pub mod path_resolver;
pub mod pipeline;
pub mod task_processor;

#[cfg(test)]
pub(crate) mod test_support;

pub use concurrency::ConcurrencyLimiter;
pub use executor::{ShellExecutor, StepContext, StepExecutor};
pub use path_resolver::PathResolver;
pub use pipeline::{FailureStage, FilePipeline, PipelineOutcome};
pub use task_processor::{ProcessedArtifact, ProcessingOutcome, TaskProcessor, UploadDecision};
