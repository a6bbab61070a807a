//! Sample scaling between the host's normalized float range and the
//! kernel's int16-style amplitude range.
//!
//! RNNoise expects float samples in ~[-32768, 32767]; host pipelines deliver
//! [-1.0, 1.0]. The scale factor is a power of two, so the round trip is exact
//! for every finite sample.

/// Scaling factor from [-1.0, 1.0] to the 16-bit amplitude range
pub const PCM_SCALE: f32 = 32768.0;

/// Scale a single host sample into kernel range. Non-finite input becomes silence.
#[inline]
pub fn to_kernel_sample(sample: f32) -> f32 {
    if sample.is_finite() {
        sample * PCM_SCALE
    } else {
        0.0
    }
}

/// Scale a single kernel-range sample back to host range.
#[inline]
pub fn to_host_sample(sample: f32) -> f32 {
    sample / PCM_SCALE
}

/// Scale `src` into `dst` (kernel range). Both slices must have equal length.
pub fn to_kernel_range(src: &[f32], dst: &mut [f32]) {
    debug_assert_eq!(src.len(), dst.len());
    for (out, &sample) in dst.iter_mut().zip(src) {
        *out = to_kernel_sample(sample);
    }
}

/// Scale a kernel-range block back to host range in place.
pub fn to_host_range_in_place(buffer: &mut [f32]) {
    for sample in buffer.iter_mut() {
        *sample = to_host_sample(*sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scale_maps_to_pcm_range() {
        assert_eq!(to_kernel_sample(1.0), 32768.0);
        assert_eq!(to_kernel_sample(-1.0), -32768.0);
        assert_eq!(to_host_sample(-32768.0), -1.0);
    }

    #[test]
    fn test_round_trip_is_exact() {
        let src = [0.0, 0.123_456_79, -0.999_9, 1.0e-7, 0.5];
        let mut scaled = [0.0f32; 5];
        to_kernel_range(&src, &mut scaled);
        to_host_range_in_place(&mut scaled);
        assert_eq!(scaled, src);
    }

    #[test]
    fn test_non_finite_input_is_silenced() {
        assert_eq!(to_kernel_sample(f32::NAN), 0.0);
        assert_eq!(to_kernel_sample(f32::INFINITY), 0.0);
    }
}
