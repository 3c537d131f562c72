pub mod audit;
pub mod camera;
pub mod capture;
pub mod config;
pub mod detector;
pub mod error;
pub mod menu;
pub mod preview;
pub mod recognizer;
pub mod store;

// Re-export commonly used types
pub use audit::{LogEntry, VerificationLog, VerifyResult};
pub use camera::Camera;
pub use capture::{CaptureController, RegistrationOutcome};
pub use config::Config;
pub use detector::{FaceBox, FaceDetector};
pub use error::{FaceGateError, Result};
pub use recognizer::{cosine_similarity, match_encodings, Encoding, FaceRecognizer};
pub use store::{normalize_username, EncodingRecord, EncodingStore};
