//! Sliding-window spectral analysis
//!
//! Every delivered chunk shifts the window left and appends, so consecutive
//! transforms overlap. The window length is `sample_rate / frequency_step`,
//! which puts transform bin `i + 1` at band `i`.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use super::WakeSignal;
use super::loudness::weighting;
use super::spectrum::SharedSpectrum;
use crate::error::WavError;

/// Transition of the whole window between all-zero and not
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceEdge {
    Entered,
    Left,
}

/// Outcome of one analysis cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analysis {
    /// The window is all zeros; the transform was skipped
    Silent,
    /// Fresh amplitudes are in [`SpectralAnalyzer::measured`]
    Measured,
}

pub struct SpectralAnalyzer {
    window: Vec<f32>,
    fft: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    output: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    weights: Vec<f32>,
    measured: Vec<f32>,
    silent: bool,
    spectrum: Arc<SharedSpectrum>,
}

impl SpectralAnalyzer {
    /// Plan the transform for `sample_rate / frequency_step` samples.
    ///
    /// `band_count` is capped at the number of non-DC bins; `None` takes all
    /// of them. The published spectrum has one slot per band.
    pub fn new(
        sample_rate: u32,
        frequency_step: u32,
        band_count: Option<usize>,
        diminish_rate: f32,
    ) -> Result<Self, WavError> {
        let window_len = sample_rate.checked_div(frequency_step).unwrap_or(0) as usize;
        if window_len < 2 {
            return Err(WavError::TransformFailure(format!(
                "{sample_rate} Hz at {frequency_step} Hz resolution gives a {window_len} sample window"
            )));
        }

        let available = window_len / 2;
        let bands = match band_count {
            Some(requested) if requested > available => {
                warn!(
                    "{requested} bars requested but only {available} bands fit a {window_len} sample window"
                );
                available
            }
            Some(requested) => requested,
            None => available,
        };

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_len);
        let input = fft.make_input_vec();
        let output = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();

        info!("Analyzing {bands} bands over a {window_len} sample window at {sample_rate} Hz");

        Ok(Self {
            window: vec![0.0; window_len],
            fft,
            input,
            output,
            scratch,
            weights: weighting(bands, frequency_step, window_len),
            measured: vec![0.0; bands],
            silent: true,
            spectrum: Arc::new(SharedSpectrum::new(bands, diminish_rate)),
        })
    }

    /// Handle for the rendering side
    pub fn spectrum(&self) -> Arc<SharedSpectrum> {
        Arc::clone(&self.spectrum)
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn measured(&self) -> &[f32] {
        &self.measured
    }

    /// Shift `samples` into the window, reporting a silence transition once
    pub fn ingest(&mut self, samples: &[f32]) -> Option<SilenceEdge> {
        let len = self.window.len();
        if samples.len() >= len {
            self.window.copy_from_slice(&samples[samples.len() - len..]);
        } else {
            self.window.copy_within(samples.len().., 0);
            self.window[len - samples.len()..].copy_from_slice(samples);
        }

        let silent = self.window.iter().all(|&sample| sample == 0.0);
        if silent == self.silent {
            return None;
        }
        self.silent = silent;
        Some(if silent {
            SilenceEdge::Entered
        } else {
            SilenceEdge::Left
        })
    }

    /// Transform the current window into weighted cube-root amplitudes
    pub fn compute_spectrum(&mut self) -> Result<Analysis, WavError> {
        if self.silent {
            return Ok(Analysis::Silent);
        }

        // the transform uses its input as scratch space
        self.input.copy_from_slice(&self.window);
        self.fft
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
            .map_err(|e| WavError::TransformFailure(e.to_string()))?;

        for (i, (amplitude, weight)) in self.measured.iter_mut().zip(&self.weights).enumerate() {
            *amplitude = self.output[i + 1].norm().cbrt() * weight;
        }
        Ok(Analysis::Measured)
    }

    /// One audio delivery: ingest, analyze, publish, and wake the renderer on
    /// a silence transition
    pub fn process(&mut self, samples: &[f32], wake: &dyn WakeSignal) -> Result<(), WavError> {
        let edge = self.ingest(samples);
        match self.compute_spectrum()? {
            Analysis::Silent => self.spectrum.mark_silent(),
            Analysis::Measured => self.spectrum.publish(&self.measured, Instant::now()),
        }
        if let Some(edge) = edge {
            debug!("Silence edge: {edge:?}");
            wake.wake();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SpectrumSnapshot;
    use std::f32::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingWake(AtomicUsize);

    impl WakeSignal for CountingWake {
        fn wake(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * freq * n as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    fn argmax(values: &[f32]) -> usize {
        values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_window_length_from_resolution() {
        let analyzer = SpectralAnalyzer::new(44100, 10, Some(64), 0.5).unwrap();
        assert_eq!(analyzer.window_len(), 4410);
        assert_eq!(analyzer.measured().len(), 64);
    }

    #[test]
    fn test_band_count_capped_and_defaulted() {
        let analyzer = SpectralAnalyzer::new(1000, 100, Some(50), 0.5).unwrap();
        assert_eq!(analyzer.measured().len(), 5);
        assert_eq!(analyzer.spectrum().band_count(), 5);

        let analyzer = SpectralAnalyzer::new(1000, 100, None, 0.5).unwrap();
        assert_eq!(analyzer.measured().len(), 5);
    }

    #[test]
    fn test_degenerate_window_fails() {
        assert!(matches!(
            SpectralAnalyzer::new(44100, 0, None, 0.5),
            Err(WavError::TransformFailure(_))
        ));
        assert!(matches!(
            SpectralAnalyzer::new(100, 200, None, 0.5),
            Err(WavError::TransformFailure(_))
        ));
    }

    #[test]
    fn test_ingest_shifts_and_appends() {
        let mut analyzer = SpectralAnalyzer::new(1000, 100, None, 0.5).unwrap();
        analyzer.ingest(&[1.0; 10]);
        analyzer.ingest(&[2.0; 3]);
        assert_eq!(
            analyzer.window,
            vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0]
        );
    }

    #[test]
    fn test_oversized_chunk_keeps_latest_samples() {
        let mut analyzer = SpectralAnalyzer::new(1000, 100, None, 0.5).unwrap();
        let chunk: Vec<f32> = (0..15).map(|n| n as f32).collect();
        analyzer.ingest(&chunk);
        assert_eq!(analyzer.window, chunk[5..].to_vec());
    }

    #[test]
    fn test_silence_edges_wake_once_per_transition() {
        let mut analyzer = SpectralAnalyzer::new(1000, 100, None, 0.5).unwrap();
        let wake = CountingWake::default();
        let zero = [0.0; 10];
        let loud = [0.25; 10];

        for window in [&zero, &zero, &loud, &loud, &zero] {
            analyzer.process(window, &wake).unwrap();
        }
        assert_eq!(wake.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_edges_are_reported_in_order() {
        let mut analyzer = SpectralAnalyzer::new(1000, 100, None, 0.5).unwrap();
        assert_eq!(analyzer.ingest(&[0.0; 10]), None);
        assert_eq!(analyzer.ingest(&[0.0, 0.1]), Some(SilenceEdge::Left));
        assert_eq!(analyzer.ingest(&[0.0; 4]), None);
        assert_eq!(analyzer.ingest(&[0.0; 10]), Some(SilenceEdge::Entered));
    }

    #[test]
    fn test_zero_window_skips_transform() {
        let mut analyzer = SpectralAnalyzer::new(44100, 10, Some(64), 0.5).unwrap();
        analyzer.ingest(&[0.0; 4410]);

        assert_eq!(analyzer.compute_spectrum().unwrap(), Analysis::Silent);
        assert!(analyzer.measured().iter().all(|&amplitude| amplitude == 0.0));

        let mut snapshot = SpectrumSnapshot::default();
        analyzer.process(&[0.0; 441], &CountingWake::default()).unwrap();
        analyzer.spectrum().snapshot_into(Instant::now(), &mut snapshot);
        assert!(snapshot.silent);
    }

    #[test]
    fn test_sine_peaks_in_its_band() {
        let mut analyzer = SpectralAnalyzer::new(44100, 10, Some(64), 0.5).unwrap();
        analyzer.ingest(&sine(440.0, 44100, 4410));

        assert_eq!(analyzer.compute_spectrum().unwrap(), Analysis::Measured);
        assert_eq!(argmax(analyzer.measured()), 43);
    }

    #[test]
    fn test_high_sine_peaks_in_its_band() {
        let mut analyzer = SpectralAnalyzer::new(44100, 10, Some(300), 0.5).unwrap();
        analyzer.ingest(&sine(2500.0, 44100, 4410));

        analyzer.compute_spectrum().unwrap();
        assert_eq!(argmax(analyzer.measured()), 249);
    }

    #[test]
    fn test_process_publishes_measurement() {
        let mut analyzer = SpectralAnalyzer::new(44100, 10, Some(64), 0.0).unwrap();
        analyzer
            .process(&sine(440.0, 44100, 4410), &CountingWake::default())
            .unwrap();

        let mut snapshot = SpectrumSnapshot::default();
        analyzer.spectrum().snapshot_into(Instant::now(), &mut snapshot);
        assert!(!snapshot.silent);
        assert_eq!(snapshot.bands, analyzer.measured());
        assert_eq!(argmax(&snapshot.bands), 43);
        assert!(snapshot.peak > 0.0);
    }
}
