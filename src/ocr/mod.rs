pub mod http;
pub mod invoker;

pub use http::HttpOcrClient;
pub use invoker::{OcrCallOutcome, OcrCallReport, OcrInvoker, RetryPolicy};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::Result;

/// A recognized table: rows of cell strings. Column 0 is treated as the label
/// and column 1 as the value by the extraction table fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrTable {
    pub rows: Vec<Vec<String>>,
}

/// Result of a successful OCR recognition pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrOutput {
    pub text: String,
    #[serde(default)]
    pub tables: Vec<OcrTable>,
    /// Mean recognition confidence reported by the backend, when available
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// OCR backend seam. The backend is a black box: bytes in, text/tables out.
///
/// Implementations should surface backend failures as [`crate::error::BolError::Ocr`];
/// the invoker converts those (and timeouts) into durable document state.
#[async_trait]
pub trait OcrClient: Send + Sync {
    /// Recognize text and tables in a document payload
    async fn recognize(&self, payload: &[u8]) -> Result<OcrOutput>;

    /// Liveness probe against the backend
    async fn health(&self) -> Result<()>;
}
