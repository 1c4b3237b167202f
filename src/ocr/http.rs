use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, BolError};
use super::{OcrClient, OcrOutput, OcrTable};

/// Request structure for the OCR backend recognize endpoint
#[derive(Serialize)]
struct RecognizeRequest {
    mode: String,
    data: String,
}

/// Response structure from the OCR backend
#[derive(Deserialize)]
struct RecognizeResponse {
    success: bool,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tables: Option<Vec<OcrTable>>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the OCR recognition backend.
///
/// Speaks the backend's JSON protocol: base64 payload in, `{success, text,
/// tables, confidence, error}` out. Recognition accuracy is the backend's
/// concern; this client only moves bytes and reports failures.
pub struct HttpOcrClient {
    client: Client,
    endpoint: String,
}

impl HttpOcrClient {
    /// Create a new OCR backend client.
    ///
    /// `endpoint` is the backend base URL. The reqwest-level timeout is a
    /// transport safety net; the pipeline's hard budget is enforced by the
    /// invoker on top of this.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// normal operation)
    pub fn new(endpoint: impl Into<String>, transport_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(transport_timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl OcrClient for HttpOcrClient {
    async fn recognize(&self, payload: &[u8]) -> Result<OcrOutput> {
        let request = RecognizeRequest {
            mode: "base64".to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(payload),
        };

        let response = self
            .client
            .post(format!("{}/recognize", self.endpoint))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| BolError::Ocr(format!("Network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(BolError::Ocr(format!(
                "OCR backend error {}: {}",
                status, body
            )));
        }

        let result: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| BolError::Ocr(format!("Failed to parse response: {}", e)))?;

        if !result.success {
            return Err(BolError::Ocr(
                result
                    .error
                    .unwrap_or_else(|| "Backend reported failure without a reason".to_string()),
            ));
        }

        Ok(OcrOutput {
            text: result.text.unwrap_or_default(),
            tables: result.tables.unwrap_or_default(),
            confidence: result.confidence,
        })
    }

    async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
            .map_err(|e| BolError::Ocr(format!("Health probe failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(BolError::Ocr(format!(
                "Health probe returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognize_response_parses_success_shape() {
        let json = r#"{
            "success": true,
            "text": "BOL Number: BL-77821",
            "tables": [{"rows": [["BOL", "BL-77821"]]}],
            "confidence": 0.93
        }"#;
        let parsed: RecognizeResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.text.as_deref(), Some("BOL Number: BL-77821"));
        assert_eq!(parsed.tables.unwrap()[0].rows[0][1], "BL-77821");
        assert_eq!(parsed.confidence, Some(0.93));
    }

    #[test]
    fn test_recognize_response_parses_failure_shape() {
        // Failure responses from the backend omit text/tables entirely
        let json = r#"{"success": false, "error": "DependencyError: paddleocr missing"}"#;
        let parsed: RecognizeResponse = serde_json::from_str(json).unwrap();
        assert!(!parsed.success);
        assert!(parsed.error.unwrap().contains("DependencyError"));
        assert!(parsed.text.is_none());
    }
}
