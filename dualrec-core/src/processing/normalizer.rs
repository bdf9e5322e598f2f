//! Conversion of provider blocks into the canonical format.
//!
//! Every block entering a ring buffer passes through here, so the mixing and
//! encoding paths only ever see planar f32 stereo at 48 kHz.
//!
//! Supported input encodings are f32, signed 16-bit and signed 32-bit
//! integers, interleaved or planar. Anything else is rejected with
//! [`CaptureError::FormatUnsupported`]; nothing is guessed.

use crate::models::error::CaptureError;

use super::format::{AudioBlock, InputBlock, SampleData, SampleEncoding, CANONICAL_SAMPLE_RATE};

/// Most input channels accepted by the remix step.
pub const MAX_INPUT_CHANNELS: usize = 8;

/// Accepted input sample rates in Hz.
const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<f64> = 1_000.0..=768_000.0;

const I16_SCALE: f32 = 1.0 / 32_768.0;
const I32_SCALE: f32 = 1.0 / 2_147_483_648.0;

/// Per-source converter from provider blocks to [`AudioBlock`]s.
///
/// Holds resampler state so consecutive blocks of one source join without
/// discontinuities. Use one normalizer per source.
#[derive(Debug, Default)]
pub struct FormatNormalizer {
    resampler: Option<LinearResampler>,
}

impl FormatNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode, remix and resample `block` into the canonical format.
    pub fn normalize(&mut self, block: &InputBlock<'_>) -> Result<AudioBlock, CaptureError> {
        let planes = decode(block)?;
        self.conform(planes, block.format.sample_rate)
    }

    /// Remix and resample already-decoded planar samples.
    pub fn conform(&mut self, planes: Vec<Vec<f32>>, sample_rate: f64) -> Result<AudioBlock, CaptureError> {
        if !sample_rate.is_finite() || !SAMPLE_RATE_RANGE.contains(&sample_rate) {
            return Err(CaptureError::FormatUnsupported(format!(
                "sample rate {} Hz cannot be converted",
                sample_rate
            )));
        }

        let [left, right] = remix_to_stereo(planes)?;

        if same_rate(sample_rate, CANONICAL_SAMPLE_RATE as f64) {
            self.resampler = None;
            return AudioBlock::from_channels(left, right)
                .ok_or_else(|| CaptureError::FormatUnsupported("channels differ in length".into()));
        }

        let stale = self
            .resampler
            .as_ref()
            .is_some_and(|r| !same_rate(r.input_rate(), sample_rate));
        if stale {
            log::debug!("Input rate changed to {} Hz, rebuilding resampler", sample_rate);
            self.resampler = None;
        }
        let resampler = self
            .resampler
            .get_or_insert_with(|| LinearResampler::new(sample_rate, CANONICAL_SAMPLE_RATE as f64));
        Ok(resampler.process(left, right))
    }

    /// Drop resampler state, e.g. between recordings.
    pub fn reset(&mut self) {
        self.resampler = None;
    }
}

/// Decode the raw bytes of `block` into planar f32, keeping its rate and channel count.
pub fn decode(block: &InputBlock<'_>) -> Result<Vec<Vec<f32>>, CaptureError> {
    let format = &block.format;
    let channels = format.channels as usize;
    if channels == 0 {
        return Err(CaptureError::FormatUnsupported("block has no channels".into()));
    }

    let convert: fn(&[u8]) -> f32 = match (format.encoding, format.bits_per_sample) {
        (SampleEncoding::Float, 32) => |b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]),
        (SampleEncoding::SignedInt, 16) => |b| i16::from_ne_bytes([b[0], b[1]]) as f32 * I16_SCALE,
        (SampleEncoding::SignedInt, 32) => |b| i32::from_ne_bytes([b[0], b[1], b[2], b[3]]) as f32 * I32_SCALE,
        (encoding, bits) => {
            return Err(CaptureError::FormatUnsupported(format!(
                "{}-bit {:?} samples",
                bits, encoding
            )))
        }
    };
    let width = format.bytes_per_sample();
    let frame_bytes = |channels: usize| {
        block
            .frames
            .checked_mul(channels)
            .and_then(|samples| samples.checked_mul(width))
            .ok_or_else(|| CaptureError::FormatUnsupported(format!("frame count {} is out of range", block.frames)))
    };

    match &block.data {
        SampleData::Interleaved(bytes) => {
            let expected = frame_bytes(channels)?;
            if bytes.len() != expected {
                return Err(CaptureError::FormatUnsupported(format!(
                    "interleaved buffer holds {} bytes, expected {}",
                    bytes.len(),
                    expected
                )));
            }
            let mut planes = vec![Vec::with_capacity(block.frames); channels];
            for (i, sample) in bytes.chunks_exact(width).enumerate() {
                planes[i % channels].push(convert(sample));
            }
            Ok(planes)
        }
        SampleData::Planar(buffers) => {
            if buffers.len() != channels {
                return Err(CaptureError::FormatUnsupported(format!(
                    "{} planar buffers for {} channels",
                    buffers.len(),
                    channels
                )));
            }
            let expected = frame_bytes(1)?;
            buffers
                .iter()
                .map(|bytes| {
                    if bytes.len() != expected {
                        return Err(CaptureError::FormatUnsupported(format!(
                            "planar buffer holds {} bytes, expected {}",
                            bytes.len(),
                            expected
                        )));
                    }
                    Ok(bytes.chunks_exact(width).map(convert).collect())
                })
                .collect()
        }
    }
}

/// Map an arbitrary channel set onto left/right.
///
/// Mono is duplicated; layouts of three to eight channels keep the first two
/// (front-left, front-right in WAVE speaker order).
pub fn remix_to_stereo(mut planes: Vec<Vec<f32>>) -> Result<[Vec<f32>; 2], CaptureError> {
    match planes.len() {
        1 => {
            let mono = planes.remove(0);
            Ok([mono.clone(), mono])
        }
        2..=MAX_INPUT_CHANNELS => {
            planes.truncate(2);
            let right = planes.remove(1);
            let left = planes.remove(0);
            Ok([left, right])
        }
        n => Err(CaptureError::FormatUnsupported(format!("cannot remix {} channels to stereo", n))),
    }
}

fn same_rate(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.01
}

/// Streaming linear-interpolation resampler for stereo audio.
///
/// Input frames that are still needed for interpolation are carried over to
/// the next call, so splitting a stream into blocks does not change the output.
#[derive(Debug)]
pub struct LinearResampler {
    input_rate: f64,
    step: f64,
    pos: f64,
    pending: [Vec<f32>; 2],
}

impl LinearResampler {
    pub fn new(input_rate: f64, output_rate: f64) -> Self {
        Self {
            input_rate,
            step: input_rate / output_rate,
            pos: 0.0,
            pending: [Vec::new(), Vec::new()],
        }
    }

    pub fn input_rate(&self) -> f64 {
        self.input_rate
    }

    /// Feed one block of input and return every output frame it completes.
    pub fn process(&mut self, left: Vec<f32>, right: Vec<f32>) -> AudioBlock {
        let [pending_l, pending_r] = &mut self.pending;
        pending_l.extend(left);
        pending_r.extend(right);

        let available = pending_l.len().min(pending_r.len());
        let estimate = (available as f64 / self.step) as usize + 1;
        let mut out_l = Vec::with_capacity(estimate);
        let mut out_r = Vec::with_capacity(estimate);

        while self.pos + 1.0 < available as f64 {
            let i0 = self.pos as usize;
            let frac = (self.pos - i0 as f64) as f32;
            out_l.push(pending_l[i0] * (1.0 - frac) + pending_l[i0 + 1] * frac);
            out_r.push(pending_r[i0] * (1.0 - frac) + pending_r[i0 + 1] * frac);
            self.pos += self.step;
        }

        let consumed = (self.pos as usize).min(available);
        if consumed > 0 {
            pending_l.drain(..consumed);
            pending_r.drain(..consumed);
            self.pos -= consumed as f64;
        }

        AudioBlock::from_channels(out_l, out_r).unwrap_or_default()
    }
}
