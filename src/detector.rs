use crate::config::Config;
use crate::error::{FaceGateError, Result};
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::sync::Arc;

const NMS_IOU_THRESHOLD: f32 = 0.45;
const MAX_FACES_PER_FRAME: usize = 5;

#[derive(Debug, Clone)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

/// YOLOv8-style single-class face detector running through ONNX Runtime.
pub struct FaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    config: Config,
}

impl FaceDetector {
    pub fn new(config: &Config) -> Result<Self> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .build()
                .map_err(|e| FaceGateError::Model(format!("Failed to create environment: {}", e)))?,
        );

        let model_path = &config.models.detector_path;
        if !model_path.exists() {
            return Err(FaceGateError::Model(format!(
                "Detector model not found at: {:?}",
                model_path
            )));
        }

        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        Ok(Self {
            session,
            _environment: environment,
            config: config.clone(),
        })
    }

    /// Detects face regions in a frame, returning boxes in original image
    /// coordinates, highest confidence first.
    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let img_array = if image.width() == self.config.detector.input_width
            && image.height() == self.config.detector.input_height
        {
            self.image_to_array(image)
        } else {
            let resized = image.resize_exact(
                self.config.detector.input_width,
                self.config.detector.input_height,
                FilterType::Nearest,
            );
            self.image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let mut faces = self.parse_detections(&outputs)?;

        // Scale coordinates back to original image dimensions
        let scale_x = orig_width / self.config.detector.input_width as f32;
        let scale_y = orig_height / self.config.detector.input_height as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        Ok(faces)
    }

    fn image_to_array(&self, img: &DynamicImage) -> Array4<f32> {
        let gray = img.to_luma8();
        let width = img.width() as usize;
        let height = img.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));

        let norm_factor = 1.0 / 255.0;
        let raw = gray.as_raw();
        for y in 0..height {
            let row_offset = y * width;
            for x in 0..width {
                let pixel_value = raw[row_offset + x] as f32 * norm_factor;
                // Replicate the grayscale channel into all three inputs
                array[[0, 0, y, x]] = pixel_value;
                array[[0, 1, y, x]] = pixel_value;
                array[[0, 2, y, x]] = pixel_value;
            }
        }

        array
    }

    fn parse_detections(&self, outputs: &[Value]) -> Result<Vec<FaceBox>> {
        let mut faces = Vec::new();

        let Some(output) = outputs.first() else {
            return Ok(faces);
        };
        let output = output.try_extract::<f32>()?.view().to_owned();
        let shape = output.shape().to_vec();

        // YOLOv8 emits [1, 8400, 5] or the transposed [1, 5, 8400]
        let (num_predictions, prediction_length, is_transposed) = if shape.len() >= 3 {
            if shape[2] > shape[1] && shape[1] <= 10 {
                (shape[2], shape[1], true)
            } else {
                (shape[1], shape[2], false)
            }
        } else if shape.len() == 2 {
            (shape[0], shape[1], false)
        } else {
            tracing::warn!("Unexpected detector output shape: {:?}", shape);
            return Ok(faces);
        };

        let output_array = output
            .as_slice()
            .ok_or_else(|| FaceGateError::Model("Detector output not contiguous".into()))?;

        for i in 0..num_predictions {
            let (x_center_raw, y_center_raw, width_raw, height_raw, confidence) = if is_transposed {
                (
                    output_array[i],
                    output_array[num_predictions + i],
                    output_array[2 * num_predictions + i],
                    output_array[3 * num_predictions + i],
                    if prediction_length > 4 {
                        output_array[4 * num_predictions + i]
                    } else {
                        0.0
                    },
                )
            } else {
                let base_idx = i * prediction_length;
                (
                    output_array[base_idx],
                    output_array[base_idx + 1],
                    output_array[base_idx + 2],
                    output_array[base_idx + 3],
                    if prediction_length > 4 {
                        output_array[base_idx + 4]
                    } else {
                        0.0
                    },
                )
            };

            // Some exports emit normalized coordinates, others pixel space
            let scale_factor = if x_center_raw > 1.0
                || y_center_raw > 1.0
                || width_raw > 1.0
                || height_raw > 1.0
            {
                1.0
            } else {
                self.config.detector.input_width as f32
            };

            let x_center = x_center_raw * scale_factor;
            let y_center = y_center_raw * scale_factor;
            let width = width_raw * scale_factor;
            let height = height_raw * scale_factor;

            if confidence > 0.001 {
                let x1 = (x_center - width / 2.0).max(0.0);
                let y1 = (y_center - height / 2.0).max(0.0);
                let x2 = (x_center + width / 2.0).min(self.config.detector.input_width as f32);
                let y2 = (y_center + height / 2.0).min(self.config.detector.input_height as f32);

                if x2 > x1 && y2 > y1 && (x2 - x1) > 10.0 && (y2 - y1) > 10.0 {
                    faces.push(FaceBox {
                        x1,
                        y1,
                        x2,
                        y2,
                        confidence,
                    });
                }
            }
        }

        // NMS first on everything, then the configured confidence cut
        faces = apply_nms(faces, NMS_IOU_THRESHOLD);
        faces.retain(|face| face.confidence >= self.config.detector.confidence_threshold);

        faces.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        faces.truncate(MAX_FACES_PER_FRAME);

        Ok(faces)
    }
}

fn apply_nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    if boxes.is_empty() {
        return boxes;
    }

    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut indices: Vec<usize> = (0..boxes.len()).collect();

    while !indices.is_empty() {
        let i = indices[0];
        keep.push(boxes[i].clone());

        indices = indices[1..]
            .iter()
            .filter(|&&j| calculate_iou(&boxes[i], &boxes[j]) < iou_threshold)
            .copied()
            .collect();
    }

    keep
}

fn calculate_iou(box1: &FaceBox, box2: &FaceBox) -> f32 {
    let x1 = box1.x1.max(box2.x1);
    let y1 = box1.y1.max(box2.y1);
    let x2 = box1.x2.min(box2.x2);
    let y2 = box1.y2.min(box2.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1.x2 - box1.x1) * (box1.y2 - box1.y1);
    let area2 = (box2.x2 - box2.x1) * (box2.y2 - box2.y1);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> FaceBox {
        FaceBox {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = face(0.0, 0.0, 100.0, 100.0, 0.9);
        assert!((calculate_iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = face(0.0, 0.0, 50.0, 50.0, 0.9);
        let b = face(100.0, 100.0, 150.0, 150.0, 0.9);
        assert_eq!(calculate_iou(&a, &b), 0.0);
    }

    #[test]
    fn nms_drops_heavy_overlaps_keeping_most_confident() {
        let boxes = vec![
            face(0.0, 0.0, 100.0, 100.0, 0.7),
            face(5.0, 5.0, 105.0, 105.0, 0.9),
            face(300.0, 300.0, 400.0, 400.0, 0.8),
        ];
        let kept = apply_nms(boxes, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.8);
    }

    #[test]
    fn nms_keeps_non_overlapping_boxes() {
        let boxes = vec![
            face(0.0, 0.0, 50.0, 50.0, 0.6),
            face(200.0, 200.0, 250.0, 250.0, 0.8),
        ];
        assert_eq!(apply_nms(boxes, 0.45).len(), 2);
    }
}
