//! The Narravo worker: consumes scheduler tasks and drives the generation
//! pipeline - document parsing, the three material stages, and chapter
//! video synthesis.

pub mod config;
pub mod error;
pub mod executor;
pub mod parse_task;
pub mod parser;
pub mod stages;
pub mod synthesizer;
pub mod video_task_runner;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::TaskExecutor;
pub use parser::{DocumentParser, HeuristicParser};
pub use synthesizer::SentenceSynthesizer;
pub use video_task_runner::VideoTaskRunner;

use std::sync::Arc;

use narravo_catalog::Catalog;
use narravo_queue::ProgressChannel;
use narravo_storage::{MaterialResolver, StorageClient};
use narravo_subtitle::Transcriber;

/// Shared dependencies threaded through every task.
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub catalog: Catalog,
    pub storage: StorageClient,
    pub resolver: MaterialResolver,
    pub progress: ProgressChannel,
    pub transcriber: Arc<dyn Transcriber>,
    pub parser: Arc<dyn DocumentParser>,
}
