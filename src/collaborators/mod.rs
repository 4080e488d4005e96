//! Narrow interfaces to the external services the job core depends on.
//!
//! The orchestrator only sees [`Detector`] and [`ModelGenerator`]; the chat
//! interpreter only sees [`TextGenerator`]. HTTP adapters for the first two
//! live in [`http`], the Anthropic-backed text generator in
//! [`crate::anthropic`].

pub mod http;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::{HttpDetector, HttpGenerator};

/// One labelled bounding box in source-image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub confidence: f64,
    /// `[x1, y1, x2, y2]`
    pub bbox: [f64; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub count: usize,
    pub detections: Vec<Detection>,
}

impl DetectionReport {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            count: detections.len(),
            detections,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Column,
    Door,
    Window,
    Stair,
    Slab,
    Proxy,
}

/// A box-shaped building element in model space (meters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub kind: ElementKind,
    pub name: String,
    /// `(x, y)` of the footprint center.
    pub center: (f64, f64),
    pub width: f64,
    pub depth: f64,
    pub height: f64,
    pub elevation: f64,
}

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("service returned status {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Image → labelled bounding boxes.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, source: &Path, threshold: f64) -> Result<DetectionReport, CollaboratorError>;
}

/// Element list → persisted model file at `output`.
#[async_trait]
pub trait ModelGenerator: Send + Sync {
    async fn generate(&self, project: &str, elements: &[Element], output: &Path) -> Result<(), CollaboratorError>;
}

/// Prompt → text. Implementations report an absent model as `Unavailable`.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, CollaboratorError>;
}
