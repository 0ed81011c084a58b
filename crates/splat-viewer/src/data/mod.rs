// src/data/mod.rs
//! Data handling modules for the splat viewer.
//!
//! This module provides functionality for:
//! - Holding Gaussian attributes on the CPU and flattening them for the GPU.
//! - Defining the uniform block and render modes the shader consumes.

pub mod gaussian_set;
pub mod types;

// Re-export commonly used types for convenience.
pub use self::gaussian_set::{normalize_quat, Gaussian, GaussianSet};
pub use self::types::{RenderMode, SplatUniforms};
