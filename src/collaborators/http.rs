use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CollaboratorError, Detection, DetectionReport, Detector, Element, ModelGenerator};

fn build_client() -> Result<Client, CollaboratorError> {
    Ok(Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    Err(CollaboratorError::Remote {
        status: status.as_u16(),
        message,
    })
}

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    path: &'a str,
    threshold: f64,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    count: Option<usize>,
    detections: Vec<Detection>,
}

/// Calls a detection service that reads the uploaded image from a shared path.
pub struct HttpDetector {
    client: Client,
    url: String,
}

impl HttpDetector {
    pub fn new(url: impl Into<String>) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, source: &Path, threshold: f64) -> Result<DetectionReport, CollaboratorError> {
        let path = source.to_string_lossy();
        let response = self
            .client
            .post(&self.url)
            .json(&DetectRequest { path: &path, threshold })
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    CollaboratorError::Unavailable(e.to_string())
                } else {
                    CollaboratorError::Request(e)
                }
            })?;
        let body: DetectResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::Malformed(e.to_string()))?;

        let count = body.count.unwrap_or(body.detections.len());
        Ok(DetectionReport {
            count,
            detections: body.detections,
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    project: &'a str,
    elements: &'a [Element],
    output_path: &'a str,
}

/// Calls a model-generation service that writes the IFC file to `output_path`.
pub struct HttpGenerator {
    client: Client,
    url: String,
}

impl HttpGenerator {
    pub fn new(url: impl Into<String>) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ModelGenerator for HttpGenerator {
    async fn generate(&self, project: &str, elements: &[Element], output: &Path) -> Result<(), CollaboratorError> {
        let output_path = output.to_string_lossy();
        let response = self
            .client
            .post(&self.url)
            .json(&GenerateRequest {
                project,
                elements,
                output_path: &output_path,
            })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
