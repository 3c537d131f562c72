use crate::{
    audit::{VerificationLog, VerifyResult},
    camera::Camera,
    config::Config,
    detector::{FaceBox, FaceDetector},
    error::Result,
    preview::{clear_screen, poll_key, AsciiRenderer, CaptureKey, LabeledFace, TerminalGuard},
    recognizer::{match_encodings, FaceRecognizer},
    store::{EncodingRecord, EncodingStore},
};
use image::{DynamicImage, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::io;

const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// An encoding was captured and saved.
    Captured,
    /// The operator backed out before saving.
    Cancelled,
}

/// Drives one camera session: frames in, detection and overlay out, key
/// polls in between. Camera and terminal state are released on every exit
/// path, including errors.
pub struct CaptureController {
    camera: Camera,
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    config: Config,
}

impl CaptureController {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            camera: Camera::new(config)?,
            detector: FaceDetector::new(config)?,
            recognizer: FaceRecognizer::new(config)?,
            config: config.clone(),
        })
    }

    /// Registration session: scan until the operator presses 's' with a
    /// face in view, then save the first detected encoding for `username`.
    pub fn run_registration(
        &mut self,
        username: &str,
        store: &EncodingStore,
    ) -> Result<RegistrationOutcome> {
        let renderer = AsciiRenderer::new(self.config.preview.width, self.config.preview.height);
        let status = format!("'s' = save face for '{}', 'q' = cancel", username);
        let save_snapshots = self.config.storage.save_snapshots;

        let _guard = TerminalGuard::new()?;
        clear_screen().ok();

        let mut session = self.camera.start_session()?;

        loop {
            let frame = session.capture_frame()?;
            let faces = self.detector.detect(&frame)?;

            let labeled: Vec<LabeledFace<'_>> = faces
                .iter()
                .map(|face| LabeledFace { face, label: None })
                .collect();
            draw_preview(&renderer, &frame, &labeled, &status)?;

            match poll_key()? {
                Some(CaptureKey::Save) if !faces.is_empty() => {
                    let encoding = self.recognizer.encode(&frame, &faces[0])?;
                    store.save(username, &encoding)?;
                    if save_snapshots {
                        save_snapshot(store, username, &frame, &faces);
                    }
                    return Ok(RegistrationOutcome::Captured);
                }
                Some(CaptureKey::Cancel) => return Ok(RegistrationOutcome::Cancelled),
                _ => {}
            }
        }
    }

    /// Verification session: compare every detected face against the
    /// gallery each frame and log the outcome, until the operator quits.
    /// One log row per detected face per frame, matched or not.
    pub fn run_verification(
        &mut self,
        gallery: &[EncodingRecord],
        log: &VerificationLog,
    ) -> Result<()> {
        let renderer = AsciiRenderer::new(self.config.preview.width, self.config.preview.height);
        let threshold = self.config.verify.similarity_threshold;

        let _guard = TerminalGuard::new()?;
        clear_screen().ok();

        let mut session = self.camera.start_session()?;

        loop {
            let frame = session.capture_frame()?;
            let faces = self.detector.detect(&frame)?;

            let mut names: Vec<String> = Vec::with_capacity(faces.len());
            for face in &faces {
                let encoding = self.recognizer.encode(&frame, face)?;
                match match_encodings(gallery, &encoding, threshold) {
                    Some(record) => {
                        log.append(&record.username, VerifyResult::Match, "")?;
                        names.push(record.username.clone());
                    }
                    None => {
                        log.append(UNKNOWN_NAME, VerifyResult::Fail, "")?;
                        names.push(UNKNOWN_NAME.to_string());
                    }
                }
            }

            let labeled: Vec<LabeledFace<'_>> = faces
                .iter()
                .zip(names.iter())
                .map(|(face, name)| LabeledFace {
                    face,
                    label: Some(name.as_str()),
                })
                .collect();
            draw_preview(&renderer, &frame, &labeled, "Scanning... 'q' = quit")?;

            if poll_key()? == Some(CaptureKey::Cancel) {
                return Ok(());
            }
        }
    }
}

fn draw_preview(
    renderer: &AsciiRenderer,
    frame: &DynamicImage,
    faces: &[LabeledFace<'_>],
    status: &str,
) -> Result<()> {
    let ascii = renderer.render_frame(frame, faces);
    crossterm::execute!(
        io::stdout(),
        crossterm::cursor::MoveTo(0, 0),
        crossterm::style::Print(&ascii),
        crossterm::cursor::MoveTo(0, (renderer.height() + 1) as u16),
        crossterm::style::Print(format!("{:<60}", status)),
    )
    .map_err(|e| crate::error::FaceGateError::Other(anyhow::anyhow!("Render failed: {}", e)))?;
    Ok(())
}

/// Saves an annotated copy of the registration frame beside the store.
/// Snapshot failures are logged, never fatal: the encoding is already saved.
fn save_snapshot(store: &EncodingStore, username: &str, frame: &DynamicImage, faces: &[FaceBox]) {
    let snapshot_dir = store.data_dir().join("snapshots");
    if let Err(e) = std::fs::create_dir_all(&snapshot_dir) {
        tracing::warn!("Could not create snapshot dir: {}", e);
        return;
    }

    let annotated = annotate_frame(frame, faces);
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = snapshot_dir.join(format!("{}_{}.jpg", username, timestamp));
    if let Err(e) = annotated.save(&path) {
        tracing::warn!("Could not save snapshot {:?}: {}", path, e);
    }
}

fn annotate_frame(frame: &DynamicImage, faces: &[FaceBox]) -> DynamicImage {
    let mut img = frame.to_rgb8();
    let box_color = Rgb([0, 255, 0]);

    for face in faces {
        let x1 = face.x1.max(0.0) as i32;
        let y1 = face.y1.max(0.0) as i32;
        let x2 = (face.x2.min(img.width() as f32) as i32).max(x1 + 1);
        let y2 = (face.y2.min(img.height() as f32) as i32).max(y1 + 1);

        let rect = Rect::at(x1, y1).of_size((x2 - x1) as u32, (y2 - y1) as u32);
        draw_hollow_rect_mut(&mut img, rect, box_color);
    }

    DynamicImage::ImageRgb8(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotate_preserves_frame_dimensions() {
        let frame = DynamicImage::new_luma8(64, 48);
        let faces = vec![FaceBox {
            x1: 10.0,
            y1: 10.0,
            x2: 40.0,
            y2: 40.0,
            confidence: 0.9,
        }];
        let annotated = annotate_frame(&frame, &faces);
        assert_eq!(annotated.width(), 64);
        assert_eq!(annotated.height(), 48);
    }

    #[test]
    fn annotate_clamps_boxes_outside_frame() {
        let frame = DynamicImage::new_luma8(32, 32);
        let faces = vec![FaceBox {
            x1: -5.0,
            y1: -5.0,
            x2: 100.0,
            y2: 100.0,
            confidence: 0.5,
        }];
        // Must not panic on out-of-bounds coordinates
        let annotated = annotate_frame(&frame, &faces);
        assert_eq!(annotated.width(), 32);
    }
}
