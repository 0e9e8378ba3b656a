pub mod config;
pub mod error;
pub mod gemini;
pub mod logger;
pub mod models;

pub use config::{GeminiConfig, RetryPolicy};
pub use error::{AdGenError, Result};
pub use gemini::{AdRequestClient, HttpTransport, Sleeper, TokioSleeper, Transport, TransportResponse};
pub use models::{
    find_scene, scene_catalog, ErrorKind, GenerationRequest, GenerationResult, ImageMimeType,
    ImagePayload, SceneCategory, SceneFormat, SCENE_FORMATS,
};
pub use tokio_util::sync::CancellationToken;
