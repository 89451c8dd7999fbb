//! Decaying spectrum shared between the audio thread and the renderer

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Per-band amplitudes that fall linearly over time and are raised by new
/// measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    bands: Vec<f32>,
    peak: f32,
    silent: bool,
    /// Amplitude units lost per second
    diminish_rate: f32,
    last_decay: Option<Instant>,
}

impl SpectrumFrame {
    pub fn new(band_count: usize, diminish_rate: f32) -> Self {
        Self {
            bands: vec![0.0; band_count],
            peak: 0.0,
            silent: true,
            diminish_rate,
            last_decay: None,
        }
    }

    pub fn bands(&self) -> &[f32] {
        &self.bands
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// Lower every band by `elapsed * diminish_rate`, never below zero
    pub fn decay(&mut self, elapsed: Duration) {
        let drop = elapsed.as_secs_f32() * self.diminish_rate;
        let mut peak = 0.0f32;
        for band in &mut self.bands {
            *band = (*band - drop).max(0.0);
            peak = peak.max(*band);
        }
        self.peak = peak;
    }

    /// Decay by the wall-clock time since the previous call.
    ///
    /// The first call only records `now`.
    pub fn decay_to(&mut self, now: Instant) {
        if let Some(last) = self.last_decay {
            self.decay(now.saturating_duration_since(last));
        }
        self.last_decay = Some(now);
    }

    /// Raise bands to `measured` where it is higher
    pub fn hold(&mut self, measured: &[f32]) {
        for (band, &value) in self.bands.iter_mut().zip(measured) {
            *band = band.max(value);
            self.peak = self.peak.max(*band);
        }
    }
}

/// What the renderer reads each frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectrumSnapshot {
    pub bands: Vec<f32>,
    pub peak: f32,
    pub silent: bool,
}

impl SpectrumSnapshot {
    /// Whether any band still holds amplitude that has not decayed away
    pub fn has_residual(&self) -> bool {
        self.bands.iter().any(|&band| band > 0.0)
    }
}

/// Mutex-guarded [`SpectrumFrame`]; readers always see a whole update
#[derive(Debug)]
pub struct SharedSpectrum {
    frame: Mutex<SpectrumFrame>,
}

impl SharedSpectrum {
    pub fn new(band_count: usize, diminish_rate: f32) -> Self {
        Self {
            frame: Mutex::new(SpectrumFrame::new(band_count, diminish_rate)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SpectrumFrame> {
        self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn band_count(&self) -> usize {
        self.lock().bands.len()
    }

    /// Decay to `now`, then hold a fresh measurement
    pub fn publish(&self, measured: &[f32], now: Instant) {
        let mut frame = self.lock();
        frame.decay_to(now);
        frame.hold(measured);
        frame.silent = false;
    }

    pub fn mark_silent(&self) {
        self.lock().silent = true;
    }

    /// Decay to `now` and copy the result into `out`, reusing its storage
    pub fn snapshot_into(&self, now: Instant, out: &mut SpectrumSnapshot) {
        let mut frame = self.lock();
        frame.decay_to(now);
        out.bands.clear();
        out.bands.extend_from_slice(&frame.bands);
        out.peak = frame.peak;
        out.silent = frame.silent;
    }
}
