//! Confidence filtering, coordinate unscaling, and ordering
//!
//! The model's raw predictions are rows of `[x1, y1, x2, y2, ..., conf,
//! class]` in the letterboxed input frame. Rows above the confidence
//! threshold are mapped back to the original image frame and sorted by
//! descending confidence.

use std::collections::HashMap;
use std::sync::Arc;

use ndarray::ArrayView2;
use tracing::debug;

use crate::{Detection, DetectionSet, LayoutDetectionError};

/// Rescale box corners from the letterboxed input frame back to the
/// original image frame.
///
/// Shapes are (height, width). The gain and padding are recomputed here
/// from the two shapes rather than threaded through from the preprocessor;
/// the min-ratio formula keeps both numerically consistent. The `-0.1`
/// bias before rounding reproduces the floor split of `pad / 2` used when
/// padding was applied, and must be preserved for output compatibility.
pub fn scale_boxes(input_shape: (u32, u32), bbox: [f32; 4], original_shape: (u32, u32)) -> [f32; 4] {
    let (in_h, in_w) = (input_shape.0 as f32, input_shape.1 as f32);
    let (orig_h, orig_w) = (original_shape.0 as f32, original_shape.1 as f32);

    let gain = f32::min(in_h / orig_h, in_w / orig_w);

    let pad_x = ((in_w - orig_w * gain) / 2.0 - 0.1).round();
    let pad_y = ((in_h - orig_h * gain) / 2.0 - 0.1).round();

    [
        (bbox[0] - pad_x) / gain,
        (bbox[1] - pad_y) / gain,
        (bbox[2] - pad_x) / gain,
        (bbox[3] - pad_y) / gain,
    ]
}

/// Filter raw predictions, map surviving boxes to the original image frame,
/// and sort by descending confidence.
///
/// The confidence column (second to last) is the single source of truth:
/// rows are kept only when strictly above the threshold. Zero survivors is
/// a normal outcome. The model graph already suppresses duplicate boxes, so
/// no NMS runs here.
pub fn postprocess(
    preds: ArrayView2<'_, f32>,
    input_shape: (u32, u32),
    original_shape: (u32, u32),
    names: Arc<HashMap<u32, String>>,
    confidence_threshold: f32,
) -> Result<DetectionSet, LayoutDetectionError> {
    let cols = preds.ncols();
    if preds.nrows() > 0 && cols < 6 {
        return Err(LayoutDetectionError::Inference(format!(
            "prediction rows have {cols} columns, expected at least 6"
        )));
    }

    let mut detections = Vec::new();
    for row in preds.rows() {
        let confidence = row[cols - 2];
        if confidence <= confidence_threshold {
            continue;
        }

        let bbox = scale_boxes(
            input_shape,
            [row[0], row[1], row[2], row[3]],
            original_shape,
        );

        detections.push(Detection {
            bbox,
            confidence,
            class_id: row[cols - 1] as u32,
        });
    }

    // Descending confidence; relative order of ties is unspecified.
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    debug!(
        "{} detections above threshold {:.2}",
        detections.len(),
        confidence_threshold
    );

    Ok(DetectionSet::new(detections, names))
}
