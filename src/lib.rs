pub mod config;
pub mod error;
pub mod db;
pub mod repo;
pub mod ocr;
pub mod extract;
pub mod link;
pub mod pipeline;

pub use config::Config;
pub use error::{BolError, Result};
pub use pipeline::{IngestionPipeline, ProcessOutcome, UploadRequest};
