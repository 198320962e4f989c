//! Inference backends
//!
//! The forward pass is opaque to the rest of the pipeline: a fixed-shape
//! NCHW tensor goes in, the model's first output tensor comes out as a
//! matrix of candidate rows. `OrtBackend` runs it through ONNX Runtime;
//! tests substitute their own implementation.

use std::sync::Mutex;

use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::value::TensorRef;
use tracing::debug;

use crate::LayoutDetectionError;

/// A single forward pass over a pre-loaded model
pub trait InferenceBackend {
    /// Run the model on a normalized NCHW batch-1 tensor.
    ///
    /// Rows of the result are candidate detections with the confidence in
    /// the second-to-last column and the class index in the last. Runtime
    /// failures propagate unmodified; no retries happen at this layer.
    fn forward(&self, input: &Array4<f32>) -> Result<Array2<f32>, LayoutDetectionError>;
}

/// ONNX Runtime backend over a loaded session
pub struct OrtBackend {
    /// `Session::run` needs `&mut self`; the mutex serializes concurrent
    /// callers, which the runtime does not allow on a single session.
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OrtBackend {
    pub(crate) fn new(session: Session) -> Self {
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "images".to_string());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "output0".to_string());

        Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        }
    }
}

impl InferenceBackend for OrtBackend {
    fn forward(&self, input: &Array4<f32>) -> Result<Array2<f32>, LayoutDetectionError> {
        let mut session = self.session.lock().map_err(|e| {
            LayoutDetectionError::Inference(format!("failed to lock session mutex: {e}"))
        })?;

        let input_contiguous = input.as_standard_layout();
        let tensor = TensorRef::from_array_view(&input_contiguous)?;

        let outputs = session.run(ort::inputs![self.input_name.as_str() => tensor])?;
        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            LayoutDetectionError::Inference(format!("output '{}' not found", self.output_name))
        })?;

        let (shape, data) = output.try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        debug!("model output shape {:?}", dims);

        // The first output arrives as (1, rows, cols) or already flattened
        // to (rows, cols); collapse the batch axis either way.
        let (rows, cols) = match dims.as_slice() {
            [1, rows, cols] => (*rows, *cols),
            [rows, cols] => (*rows, *cols),
            other => {
                return Err(LayoutDetectionError::Inference(format!(
                    "unexpected output shape {other:?}"
                )))
            }
        };

        Array2::from_shape_vec((rows, cols), data.to_vec())
            .map_err(|e| LayoutDetectionError::Inference(format!("output reshape failed: {e}")))
    }
}
