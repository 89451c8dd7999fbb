//! Display scale that chases the spectrum peak

const INITIAL_SCALE: f32 = 0.125;
const ATTACK: f32 = 0.75;
const RELEASE: f32 = 1.0 / 32.0;

/// Asymmetric exponential smoothing: rises quickly towards a louder peak,
/// falls slowly when the peak drops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleSmoother {
    scale: f32,
}

impl Default for ScaleSmoother {
    fn default() -> Self {
        Self {
            scale: INITIAL_SCALE,
        }
    }
}

impl ScaleSmoother {
    pub fn value(&self) -> f32 {
        self.scale
    }

    pub fn update(&mut self, peak: f32) -> f32 {
        let inertia = if peak > self.scale { ATTACK } else { RELEASE };
        self.scale = inertia * peak + (1.0 - inertia) * self.scale;
        self.scale
    }
}
