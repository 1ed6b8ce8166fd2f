//! Data sources: FRED, synthetic samples, and series transforms.

pub mod fred;
pub mod sample;
pub mod transform;

pub use transform::{apply_transform, inner_join};
