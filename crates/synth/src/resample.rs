//! Incremental linear resampler for 16-bit mono PCM.
//!
//! Piper voices produce audio at the model's native rate; when the deployment
//! pins a target rate (browser playback paths often want 16 kHz) the chunks
//! are resampled on the fly. State carries across chunks so segment
//! boundaries stay continuous.

/// Streaming linear-interpolation resampler.
pub struct LinearResampler {
    /// Input samples per output sample.
    step: f64,
    /// Time of the next output sample, in input-sample units relative to
    /// `prev`. Always kept in `[0, 1)` between calls once primed.
    t: f64,
    prev: i16,
    primed: bool,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            step: f64::from(from_rate) / f64::from(to_rate),
            t: 0.0,
            prev: 0,
            primed: false,
        }
    }

    /// Resample one chunk of samples, carrying interpolation state over from
    /// the previous chunk.
    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        let mut out = Vec::with_capacity(
            (input.len() as f64 / self.step) as usize + 2,
        );
        for &cur in input {
            if !self.primed {
                self.primed = true;
                self.prev = cur;
                continue;
            }
            while self.t < 1.0 {
                let v = f64::from(self.prev) + (f64::from(cur) - f64::from(self.prev)) * self.t;
                out.push(v.round() as i16);
                self.t += self.step;
            }
            self.t -= 1.0;
            self.prev = cur;
        }
        out
    }

    /// Emit the held final sample once the input stream ends.
    pub fn flush(&mut self) -> Vec<i16> {
        if self.primed && self.t < 1.0 {
            self.primed = false;
            vec![self.prev]
        } else {
            Vec::new()
        }
    }
}

/// Reinterpret little-endian PCM16 bytes as samples. The caller guarantees
/// an even byte count.
pub(crate) fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

pub(crate) fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}
