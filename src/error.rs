//! Error taxonomy shared by the analysis, layout and rendering paths

use thiserror::Error;

/// Errors raised by the core visualizer components
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WavError {
    /// A buffer, canvas or array could not be allocated
    #[error("Allocation failure: {0}")]
    AllocationFailure(String),
    /// Style parameters cannot produce a bar layout for the canvas
    #[error("Layout infeasible: {0}")]
    LayoutInfeasible(String),
    /// The spectral transform could not be planned or executed
    #[error("Transform failure: {0}")]
    TransformFailure(String),
    /// The compositor refused a submitted buffer
    #[error("Presentation rejected: {0}")]
    PresentationRejected(String),
}

impl WavError {
    /// Whether this error must terminate the process.
    ///
    /// Allocation failures are only fatal for the process-wide analysis
    /// buffers; callers that hit one at surface granularity drop the surface
    /// instead of asking this.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WavError::TransformFailure(_))
    }
}
