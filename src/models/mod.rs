pub mod gemini;
pub mod generation;
pub mod image;
pub mod scene;

pub use generation::*;
pub use image::*;
pub use scene::*;
