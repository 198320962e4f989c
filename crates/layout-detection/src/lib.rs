//! Document layout detection using DocLayout-YOLO via ONNX Runtime
//!
//! This module runs a YOLO-style document layout model exported to ONNX
//! format over a single RGB page image and returns classified, confidence
//! sorted bounding boxes in the original image's coordinate space. Class
//! names (title, plain text, figure, table, formula, ...) and the padding
//! stride are read from the model artifact's own metadata.
//!
//! # Features
//! - Stride-aligned letterbox preprocessing (aspect ratio preserved)
//! - Confidence filtering and coordinate rescaling to the input frame
//! - Class-name mapping parsed from the ONNX metadata properties
//! - Swappable inference backend for testing without a model file
//!
//! # Example
//! ```no_run
//! use doc_layout_detection::{LayoutDetector, LayoutDetectionConfig};
//! use image::open;
//!
//! # fn main() -> Result<(), doc_layout_detection::LayoutDetectionError> {
//! let config = LayoutDetectionConfig::default();
//! let detector = LayoutDetector::new("doclayout_yolo.onnx", config)?;
//!
//! let img = open("page.png").unwrap().to_rgb8();
//! let layout = detector.detect(&img)?;
//!
//! for det in layout.iter() {
//!     println!(
//!         "{}: {:.2}% at {:?}",
//!         layout.class_name(det.class_id).unwrap_or("unknown"),
//!         det.confidence * 100.0,
//!         det.bbox
//!     );
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod metadata;
pub mod postprocess;
pub mod preprocess;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub use backend::{InferenceBackend, OrtBackend};
pub use metadata::ModelMetadata;
pub use preprocess::{Letterboxed, TargetSize};

/// Error types for layout detection
#[derive(Debug, Error)]
pub enum LayoutDetectionError {
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Model metadata error: {0}")]
    Metadata(String),

    #[error("Invalid input image: {0}")]
    InvalidInput(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(#[from] ort::Error),
}

/// Configuration for layout detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutDetectionConfig {
    /// Minimum confidence for a detection to be kept (exclusive bound)
    pub confidence_threshold: f32,
    /// Model input size; derived from the image height and the model stride
    /// when unset
    pub target_size: Option<TargetSize>,
}

impl Default for LayoutDetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            target_size: None,
        }
    }
}

/// One detected layout element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Corner coordinates `[x1, y1, x2, y2]` in the original image frame
    pub bbox: [f32; 4],
    /// Confidence score (0-1)
    pub confidence: f32,
    /// Index into the model's class-name mapping
    pub class_id: u32,
}

/// Detections for one image, ordered by descending confidence
#[derive(Debug, Clone)]
pub struct DetectionSet {
    detections: Vec<Detection>,
    names: Arc<HashMap<u32, String>>,
}

impl DetectionSet {
    pub(crate) fn new(detections: Vec<Detection>, names: Arc<HashMap<u32, String>>) -> Self {
        Self { detections, names }
    }

    /// Detections sorted by descending confidence. Relative order of equal
    /// confidences is unspecified.
    #[must_use]
    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Look up the class name for a detection's class index
    #[must_use]
    pub fn class_name(&self, class_id: u32) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }

    /// The shared class-index-to-name mapping
    #[must_use]
    pub fn names(&self) -> &HashMap<u32, String> {
        &self.names
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}

/// Layout detector over a pre-loaded DocLayout-YOLO model
pub struct LayoutDetector<B = OrtBackend> {
    backend: B,
    names: Arc<HashMap<u32, String>>,
    stride: u32,
    config: LayoutDetectionConfig,
}

impl LayoutDetector<OrtBackend> {
    /// Load the ONNX model and its metadata from a file.
    ///
    /// Fails if the session cannot be built or if the artifact is missing
    /// either of the two required metadata properties (`names`, `stride`).
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        config: LayoutDetectionConfig,
    ) -> Result<Self, LayoutDetectionError> {
        let path = model_path.as_ref();
        info!("Loading layout model from {}", path.display());

        let session = Session::builder()
            .map_err(|e| LayoutDetectionError::ModelLoad(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| LayoutDetectionError::ModelLoad(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| LayoutDetectionError::ModelLoad(e.to_string()))?;

        let metadata = ModelMetadata::from_session(&session)?;
        info!(
            "Layout model loaded: {} classes, stride {}",
            metadata.names.len(),
            metadata.stride
        );

        Ok(Self::with_backend(
            OrtBackend::new(session),
            metadata,
            config,
        ))
    }
}

impl<B: InferenceBackend> LayoutDetector<B> {
    /// Construct from an already-built backend and parsed metadata.
    ///
    /// This is the seam for tests: a fake backend plus synthetic metadata
    /// exercises the full pre/post-processing path without a model file.
    pub fn with_backend(backend: B, metadata: ModelMetadata, config: LayoutDetectionConfig) -> Self {
        Self {
            backend,
            names: Arc::new(metadata.names),
            stride: metadata.stride,
            config,
        }
    }

    /// Detect layout elements in a single RGB image.
    ///
    /// Returns boxes in the original image's coordinate space, sorted by
    /// descending confidence. Zero detections is a normal outcome, not an
    /// error.
    pub fn detect(&self, image: &RgbImage) -> Result<DetectionSet, LayoutDetectionError> {
        let (orig_w, orig_h) = image.dimensions();
        if orig_w == 0 || orig_h == 0 {
            return Err(LayoutDetectionError::InvalidInput(format!(
                "image has zero dimension: {orig_w}x{orig_h}"
            )));
        }

        // The upstream model derives its input size from the page height,
        // floored to a stride multiple.
        let target = self.config.target_size.unwrap_or(TargetSize::Square(
            ((orig_h / self.stride) * self.stride).max(self.stride),
        ));

        debug!(
            "Running layout detection on {}x{} image, target {:?}",
            orig_w, orig_h, target
        );

        let boxed = preprocess::letterbox(image, target, self.stride);
        let tensor = preprocess::to_input_tensor(&boxed);
        let preds = self.backend.forward(&tensor)?;

        let result = postprocess::postprocess(
            preds.view(),
            (boxed.height, boxed.width),
            (orig_h, orig_w),
            Arc::clone(&self.names),
            self.config.confidence_threshold,
        )?;

        debug!("Detected {} layout elements", result.len());

        Ok(result)
    }

    /// The model's class-index-to-name mapping
    #[must_use]
    pub fn names(&self) -> &HashMap<u32, String> {
        &self.names
    }

    /// The model's padding alignment stride
    #[must_use]
    pub fn stride(&self) -> u32 {
        self.stride
    }
}
