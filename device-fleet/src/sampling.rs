//! Random generators shared by the device models and ambient zones.

use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

/// Relative step of the multiplicative random walk
pub const DRIFT_SIGMA: f64 = 0.002;

/// Relative noise applied on top of sinusoid samples
pub const SINE_NOISE_SIGMA: f64 = 0.01;

/// Normal draw clamped to one standard deviation.
///
/// Mean and deviation are both scaled by `1 + modifier` before sampling, so
/// the result lies in `[mu' - sigma', mu' + sigma']`.
pub fn clamped_normal<R: Rng + ?Sized>(rng: &mut R, mu: f64, sigma: f64, modifier: f64) -> f64 {
    let mu = mu * (1.0 + modifier);
    let sigma = (sigma * (1.0 + modifier)).abs();
    if !mu.is_finite() || !sigma.is_finite() || sigma == 0.0 {
        return mu;
    }

    let z: f64 = rng.sample(StandardNormal);
    (mu + sigma * z).clamp(mu - sigma, mu + sigma)
}

/// `x * N(1, sigma)`
pub fn jitter<R: Rng + ?Sized>(rng: &mut R, x: f64, sigma: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    x * (1.0 + sigma * z)
}

/// One random-walk step, `x * N(1, 0.002)`
pub fn drift<R: Rng + ?Sized>(rng: &mut R, x: f64) -> f64 {
    jitter(rng, x, DRIFT_SIGMA)
}

/// Parameters of a periodic generator
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SineParams {
    pub offset: f64,
    pub amplitude: f64,
    /// Period in seconds
    pub period: f64,
    /// Phase shift in radians
    pub phase: f64,
}

impl SineParams {
    pub fn new(offset: f64, amplitude: f64, period: f64, phase: f64) -> Self {
        Self {
            offset,
            amplitude,
            period,
            phase,
        }
    }

    /// Noisy sample at `t` seconds
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, t: f64) -> f64 {
        let clean = if self.period == 0.0 {
            self.offset
        } else {
            self.offset + self.amplitude * (2.0 * PI * t / self.period + self.phase).sin()
        };
        jitter(rng, clean, SINE_NOISE_SIGMA)
    }
}

/// True with probability `p`
pub fn coin<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
    rng.gen::<f64>() < p
}

/// Two-state chain step
pub fn markov_bool<R: Rng + ?Sized>(rng: &mut R, current: bool, on_if_on: f64, on_if_off: f64) -> bool {
    if current {
        coin(rng, on_if_on)
    } else {
        coin(rng, on_if_off)
    }
}
