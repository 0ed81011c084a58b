//! Error taxonomy shared by the viewer library.

use splat_ply::PlyError;

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    /// Malformed or short point-cloud file, or inconsistent attribute widths.
    #[error("format error: {0}")]
    Format(#[from] PlyError),

    /// Zero-length direction or quaternion that had no defined fallback.
    #[error("degenerate input: {0}")]
    DegenerateInput(&'static str),

    /// Shader/pipeline creation or GPU buffer allocation failed.
    #[error("GPU resource error: {0}")]
    Resource(String),
}

impl ViewerError {
    pub(crate) fn shape(name: &str, expected: usize, found: usize) -> Self {
        Self::Format(PlyError::ShapeMismatch {
            name: name.to_owned(),
            expected,
            found,
        })
    }
}
