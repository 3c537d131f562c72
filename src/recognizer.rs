use crate::config::Config;
use crate::detector::FaceBox;
use crate::error::{FaceGateError, Result};
use crate::store::EncodingRecord;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::sync::Arc;

/// Fixed-length feature vector for one face, produced by the recognition
/// model. Opaque to the storage layer.
pub type Encoding = Vec<f32>;

pub struct FaceRecognizer {
    session: Session,
    _environment: Arc<Environment>,
    config: Config,
}

impl FaceRecognizer {
    pub fn new(config: &Config) -> Result<Self> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("face_recognizer")
                .build()
                .map_err(|e| FaceGateError::Model(format!("Failed to create environment: {}", e)))?,
        );

        let model_path = &config.models.recognizer_path;
        if !model_path.exists() {
            return Err(FaceGateError::Model(format!(
                "Recognition model not found at: {:?}",
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

    /// Computes the encoding for one detected face region.
    pub fn encode(&self, image: &DynamicImage, face: &FaceBox) -> Result<Encoding> {
        let face_img = self.crop_face(image, face);

        let resized = face_img.resize_exact(
            self.config.recognizer.input_size,
            self.config.recognizer.input_size,
            FilterType::Triangle,
        );

        let input_array = self.preprocess_face(&resized);
        let cow_array = CowArray::from(input_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;

        let outputs = self.session.run(vec![input_tensor])?;

        let encoding = outputs[0].try_extract::<f32>()?.view().to_owned().into_raw_vec();
        Ok(encoding)
    }

    fn crop_face(&self, image: &DynamicImage, face: &FaceBox) -> DynamicImage {
        let x = face.x1.max(0.0) as u32;
        let y = face.y1.max(0.0) as u32;
        let width = (face.x2 - face.x1).max(1.0) as u32;
        let height = (face.y2 - face.y1).max(1.0) as u32;

        image.crop_imm(x, y, width, height)
    }

    fn preprocess_face(&self, img: &DynamicImage) -> Array4<f32> {
        let gray = img.to_luma8();
        let size = self.config.recognizer.input_size as usize;
        let mut array = Array4::<f32>::zeros((1, 1, size, size));

        let norm_val = self.config.recognizer.normalization_value;
        for y in 0..size {
            for x in 0..size {
                let pixel = gray.get_pixel(x as u32, y as u32);
                array[[0, 0, y, x]] = (pixel[0] as f32 - norm_val) / norm_val;
            }
        }

        array
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Matches a probe encoding against the gallery, returning the first record
/// whose similarity clears `threshold`. The gallery arrives sorted by
/// username from the store, so "first match" is deterministic.
pub fn match_encodings<'a>(
    gallery: &'a [EncodingRecord],
    probe: &Encoding,
    threshold: f32,
) -> Option<&'a EncodingRecord> {
    gallery
        .iter()
        .find(|record| cosine_similarity(&record.encoding, probe) >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(username: &str, encoding: Encoding) -> EncodingRecord {
        EncodingRecord {
            version: 1,
            username: username.to_string(),
            encoding,
        }
    }

    #[test]
    fn identical_vectors_have_unit_similarity() {
        let v = vec![0.3, -0.7, 0.2];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_zero_similarity() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_yields_zero_similarity() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn probe_matching_one_record_resolves_it() {
        let gallery = vec![
            record("alice", vec![1.0, 0.0, 0.0]),
            record("bob", vec![0.0, 1.0, 0.0]),
        ];
        let probe = vec![0.0, 0.98, 0.01];

        let matched = match_encodings(&gallery, &probe, 0.6).unwrap();
        assert_eq!(matched.username, "bob");
    }

    #[test]
    fn probe_matching_nothing_returns_none() {
        let gallery = vec![record("alice", vec![1.0, 0.0, 0.0])];
        let probe = vec![0.0, 0.0, 1.0];

        assert!(match_encodings(&gallery, &probe, 0.6).is_none());
    }

    #[test]
    fn first_record_wins_when_several_clear_threshold() {
        // Both entries satisfy the threshold; sorted order decides.
        let gallery = vec![
            record("alice", vec![0.9, 0.1]),
            record("bob", vec![1.0, 0.0]),
        ];
        let probe = vec![1.0, 0.0];

        let matched = match_encodings(&gallery, &probe, 0.8).unwrap();
        assert_eq!(matched.username, "alice");
    }

    #[test]
    fn empty_gallery_never_matches() {
        let probe = vec![1.0, 0.0];
        assert!(match_encodings(&[], &probe, 0.0).is_none());
    }
}
