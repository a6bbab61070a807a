//! Shared DSP utility math helpers.

/// Convert linear amplitude to dBFS with a configurable floor.
#[inline]
pub fn linear_to_db(linear: f32, min_linear: f32) -> f32 {
    20.0 * linear.abs().max(min_linear).log10()
}

/// Root-mean-square of a block. Empty blocks are silent.
#[inline]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Absolute peak of a block.
#[inline]
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()))
}
