//! Audio capture and spectral analysis
//!
//! The capture side runs on whatever thread delivers samples and owns the
//! [`SpectralAnalyzer`]; the render side only ever sees the
//! [`SharedSpectrum`] it publishes into.

mod analyzer;
mod capture;
mod loudness;
mod spectrum;

pub use analyzer::SpectralAnalyzer;
pub use capture::{AudioSource, Capture, list_devices};
pub use spectrum::{SharedSpectrum, SpectrumSnapshot};

/// Wakes the render loop when the window enters or leaves silence.
///
/// Implementations must latch: a wake raised while the loop is busy is
/// observed on its next iteration.
pub trait WakeSignal: Send {
    fn wake(&self);
}

impl WakeSignal for calloop::ping::Ping {
    fn wake(&self) {
        self.ping();
    }
}
