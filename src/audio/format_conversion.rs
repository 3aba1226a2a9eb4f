// Sample format conversion for the output sinks
//
// The synthesizer renders interleaved stereo f32. The WAV sink stores 16-bit
// PCM; the device sink adapts each stereo frame to whatever channel count and
// sample type the device opened with.

use cpal::{FromSample, Sample};

/// f32 in [-1.0, 1.0] to 16-bit PCM, clamping out-of-range input
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    let scale = if clamped < 0.0 { 32768.0 } else { i16::MAX as f32 };
    (clamped * scale) as i16
}

/// Fill one device frame from a stereo pair
///
/// Channels beyond the second get silence; a mono device gets the average.
#[inline]
pub fn write_stereo_to_interleaved_frame<T>((left, right): (f32, f32), frame: &mut [T])
where
    T: Sample + FromSample<f32>,
{
    match frame {
        [] => {}
        [mono] => *mono = T::from_sample((left + right) * 0.5),
        [l, r, rest @ ..] => {
            *l = T::from_sample(left);
            *r = T::from_sample(right);
            for extra in rest {
                *extra = T::from_sample(0.0f32);
            }
        }
    }
}
