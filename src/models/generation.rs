use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;

use crate::error::{AdGenError, Result};
use crate::models::{ImagePayload, SceneFormat};

const INSTRUCTION_PREFIX: &str =
    "Generate a photorealistic advertisement featuring the following product. Context: ";

/// One unit of work: a product photo placed into one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub instruction_text: String,
    pub image: ImagePayload,
    pub scene_id: Option<String>,
}

impl GenerationRequest {
    pub fn new(image: ImagePayload, scene: &SceneFormat) -> Self {
        Self {
            instruction_text: instruction_for(scene),
            image,
            scene_id: Some(scene.id.to_string()),
        }
    }

    /// Builds a request from whatever the user has picked so far.
    pub fn from_selection(
        image: Option<ImagePayload>,
        scene: Option<&SceneFormat>,
    ) -> Result<Self> {
        match (image, scene) {
            (Some(image), Some(scene)) => Ok(Self::new(image, scene)),
            _ => Err(AdGenError::InvalidInput(
                "Please upload an image and select an ad format first.".into(),
            )),
        }
    }
}

pub fn instruction_for(scene: &SceneFormat) -> String {
    format!("{}{}", INSTRUCTION_PREFIX, scene.prompt_text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    ApiError,
    ModelRefusal,
    TransportError,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::ApiError => "api_error",
            ErrorKind::ModelRefusal => "model_refusal",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one `submit` call. Exactly one is produced per call.
#[derive(Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Success { image_bytes: Vec<u8>, mime_type: String },
    Failure { reason: String, kind: ErrorKind },
}

impl fmt::Debug for GenerationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationResult::Success {
                image_bytes,
                mime_type,
            } => f
                .debug_struct("Success")
                .field("len", &image_bytes.len())
                .field("mime_type", mime_type)
                .finish(),
            GenerationResult::Failure { reason, kind } => f
                .debug_struct("Failure")
                .field("reason", reason)
                .field("kind", kind)
                .finish(),
        }
    }
}

impl GenerationResult {
    pub(crate) fn failure(kind: ErrorKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        // Reasons are displayed directly, so never hand back a blank one.
        let reason = if reason.trim().is_empty() {
            format!("Generation failed ({})", kind)
        } else {
            reason
        };
        GenerationResult::Failure { reason, kind }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GenerationResult::Success { .. })
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            GenerationResult::Success { .. } => None,
            GenerationResult::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            GenerationResult::Success { .. } => None,
            GenerationResult::Failure { reason, .. } => Some(reason),
        }
    }

    /// `data:<mime>;base64,...` for a successful result.
    pub fn to_data_url(&self) -> Option<String> {
        match self {
            GenerationResult::Success {
                image_bytes,
                mime_type,
            } => Some(format!(
                "data:{};base64,{}",
                mime_type,
                STANDARD.encode(image_bytes)
            )),
            GenerationResult::Failure { .. } => None,
        }
    }
}

impl From<AdGenError> for GenerationResult {
    fn from(err: AdGenError) -> Self {
        let kind = err.kind();
        let reason = match kind {
            ErrorKind::InvalidInput => err.to_string(),
            _ => format!("An error occurred: {}", err),
        };
        GenerationResult::failure(kind, reason)
    }
}
