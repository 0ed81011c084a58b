// src/lib.rs
//! Interactive 3D Gaussian Splatting viewer library.
//!
//! Loads 3DGS point clouds from PLY files, keeps them depth-sorted back to
//! front for the current camera, and renders them as instanced, alpha-blended
//! splats with wgpu.

pub mod app;
pub mod camera;
pub mod config;
pub mod data;
pub mod error;
pub mod input;
pub mod renderer;
pub mod sort;
pub mod ui;
pub mod world;

pub use error::ViewerError;
