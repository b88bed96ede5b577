/// YOLO object detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, per-class confidence
/// filtering and class-aware NMS. Class names come from the model's
/// `names` metadata.
use std::path::Path;

use crate::detection::domain::class_labels::ClassLabels;
use crate::detection::domain::detection::{BoundingBox, Detection};
use crate::detection::domain::object_detector::ObjectDetector;
use crate::detection::error::DetectorError;
use crate::shared::frame::Frame;

use super::execution_provider::{accelerator_name, preferred_execution_providers};
use super::math::argmax;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Number of box values (cx, cy, w, h) ahead of the class scores in each row.
const BOX_VALUES: usize = 4;

/// Padding value for the letterbox border (YOLO convention).
const PAD_VALUE: f32 = 114.0 / 255.0;

/// YOLO detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    labels: ClassLabels,
    confidence: f32,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(model_path: &Path, confidence: f32) -> Result<Self, DetectorError> {
        if !model_path.is_file() {
            return Err(DetectorError::ModelNotFound(model_path.to_path_buf()));
        }
        let load_error = |reason: String| DetectorError::ModelLoad {
            path: model_path.to_path_buf(),
            reason,
        };

        let session = ort::session::Session::builder()
            .map_err(|e| load_error(e.to_string()))?
            .with_execution_providers(preferred_execution_providers())
            .map_err(|e| load_error(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| load_error(e.to_string()))?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    // NCHW; H and W are equal for exported YOLO models.
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        let labels = session
            .metadata()
            .ok()
            .and_then(|meta| meta.custom("names").ok().flatten())
            .map(|raw| ClassLabels::parse(&raw))
            .unwrap_or_default();

        log::info!(
            "Loaded {} ({}x{} input, {} classes, {})",
            model_path.display(),
            input_size,
            input_size,
            labels.len(),
            accelerator_name()
        );

        Ok(Self {
            session,
            labels,
            confidence,
            input_size,
        })
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }
}

impl ObjectDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        if frame.is_empty() || frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let (input_tensor, letterbox) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err(DetectorError::Inference("model produced no outputs".into()).into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor
            .as_slice()
            .ok_or_else(|| DetectorError::Inference("output tensor is not contiguous".into()))?;

        let candidates = decode(data, &shape, self.confidence, &letterbox)?;
        let kept = nms(candidates, NMS_IOU_THRESH);

        Ok(kept
            .into_iter()
            .map(|c| Detection {
                bbox: c.bbox.clamp(frame.width(), frame.height()),
                class_id: c.class_id,
                label: self.labels.label(c.class_id),
                confidence: c.confidence,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// How a frame was placed inside the square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    /// Maps a point in model input coordinates back to frame coordinates.
    fn to_frame(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size` as an NCHW
/// float32 tensor.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let mut tensor = ndarray::Array4::<f32>::from_elem(
        (1, 3, target_size as usize, target_size as usize),
        PAD_VALUE,
    );

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbor resize into the padded region.
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Candidate {
    bbox: BoundingBox,
    class_id: usize,
    confidence: f32,
}

/// Decodes a YOLO detection head into candidates above `confidence`.
///
/// Each prediction is `[cx, cy, w, h, score_0, .., score_n]`. The output is
/// either `[1, features, predictions]` (the usual export, transposed) or
/// `[1, predictions, features]`.
fn decode(
    data: &[f32],
    shape: &[usize],
    confidence: f32,
    letterbox: &Letterbox,
) -> Result<Vec<Candidate>, DetectorError> {
    if shape.len() != 3 {
        return Err(DetectorError::OutputShape(shape.to_vec()));
    }
    let transposed = shape[1] < shape[2];
    let (num_preds, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats <= BOX_VALUES || data.len() < num_preds * num_feats {
        return Err(DetectorError::OutputShape(shape.to_vec()));
    }

    let mut row = vec![0.0f32; num_feats];
    let mut candidates = Vec::new();
    for i in 0..num_preds {
        if transposed {
            for (f, value) in row.iter_mut().enumerate() {
                *value = data[f * num_preds + i];
            }
        } else {
            row.copy_from_slice(&data[i * num_feats..(i + 1) * num_feats]);
        }

        let Some((class_id, score)) = argmax(&row[BOX_VALUES..]) else {
            continue;
        };
        if score < confidence {
            continue;
        }

        let (cx, cy) = letterbox.to_frame(row[0] as f64, row[1] as f64);
        let w = row[2] as f64 / letterbox.scale;
        let h = row[3] as f64 / letterbox.scale;

        candidates.push(Candidate {
            bbox: BoundingBox::from_center(cx, cy, w, h),
            class_id,
            confidence: score,
        });
    }
    Ok(candidates)
}

/// Greedy class-aware NMS: sort by confidence descending, suppress
/// overlapping boxes of the same class.
fn nms(mut dets: Vec<Candidate>, iou_thresh: f64) -> Vec<Candidate> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    for det in dets {
        let overlaps = keep
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > iou_thresh);
        if !overlaps {
            keep.push(det);
        }
    }
    keep
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
