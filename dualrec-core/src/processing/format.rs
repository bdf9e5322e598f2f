//! Canonical audio representation and the raw input blocks providers deliver.

/// Sample rate of the canonical format in Hz.
pub const CANONICAL_SAMPLE_RATE: u32 = 48_000;

/// Channel count of the canonical format (stereo).
pub const CANONICAL_CHANNELS: usize = 2;

/// Frames mixed per tick.
pub const MIX_BLOCK_FRAMES: usize = 4096;

/// A block of audio in the canonical format: planar f32, 48 kHz, stereo.
///
/// Every channel holds the same number of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    channels: [Vec<f32>; CANONICAL_CHANNELS],
}

impl AudioBlock {
    pub fn empty() -> Self {
        Self {
            channels: [Vec::new(), Vec::new()],
        }
    }

    pub fn silence(frames: usize) -> Self {
        Self {
            channels: [vec![0.0; frames], vec![0.0; frames]],
        }
    }

    /// Build a block from left/right channel data.
    ///
    /// Returns `None` when the channels differ in length.
    pub fn from_channels(left: Vec<f32>, right: Vec<f32>) -> Option<Self> {
        if left.len() != right.len() {
            return None;
        }
        Some(Self {
            channels: [left, right],
        })
    }

    /// A block holding `frames` copies of `value` on both channels.
    pub fn constant(value: f32, frames: usize) -> Self {
        Self {
            channels: [vec![value; frames], vec![value; frames]],
        }
    }

    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>; CANONICAL_CHANNELS] {
        &self.channels
    }

    pub(crate) fn channels_mut(&mut self) -> &mut [Vec<f32>; CANONICAL_CHANNELS] {
        &mut self.channels
    }

    /// Interleave into `[L0, R0, L1, R1, ...]`.
    pub fn interleaved(&self) -> Vec<f32> {
        let [left, right] = &self.channels;
        let mut out = Vec::with_capacity(left.len() * CANONICAL_CHANNELS);
        for (l, r) in left.iter().zip(right) {
            out.push(*l);
            out.push(*r);
        }
        out
    }
}

impl Default for AudioBlock {
    fn default() -> Self {
        Self::empty()
    }
}

/// Numeric encoding of the samples in an input block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleEncoding {
    /// IEEE-754 floating point.
    Float,
    /// Two's-complement signed integer.
    SignedInt,
}

/// Description of the samples a provider delivers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamFormat {
    pub sample_rate: f64,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub encoding: SampleEncoding,
}

impl StreamFormat {
    pub fn f32(sample_rate: f64, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 32,
            encoding: SampleEncoding::Float,
        }
    }

    pub fn i16(sample_rate: f64, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
            encoding: SampleEncoding::SignedInt,
        }
    }

    pub fn i32(sample_rate: f64, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 32,
            encoding: SampleEncoding::SignedInt,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Whether this is already the canonical rate and channel count.
    pub fn is_canonical_layout(&self) -> bool {
        self.channels as usize == CANONICAL_CHANNELS && (self.sample_rate - CANONICAL_SAMPLE_RATE as f64).abs() < 0.01
    }
}

/// Sample storage of an input block, in native byte order.
#[derive(Debug, Clone)]
pub enum SampleData<'a> {
    /// One buffer, samples ordered frame by frame.
    Interleaved(&'a [u8]),
    /// One buffer per channel.
    Planar(Vec<&'a [u8]>),
}

/// A block of audio exactly as a capture provider produced it.
#[derive(Debug, Clone)]
pub struct InputBlock<'a> {
    pub format: StreamFormat,
    pub frames: usize,
    pub data: SampleData<'a>,
}

impl<'a> InputBlock<'a> {
    pub fn new(format: StreamFormat, frames: usize, data: SampleData<'a>) -> Self {
        Self { format, frames, data }
    }

    /// Interleaved f32 samples; the frame count is derived from the slice length.
    pub fn interleaved_f32(samples: &'a [f32], sample_rate: f64, channels: u16) -> Self {
        let frames = samples.len() / channels.max(1) as usize;
        Self::new(
            StreamFormat::f32(sample_rate, channels),
            frames,
            SampleData::Interleaved(bytemuck::cast_slice(samples)),
        )
    }

    /// Interleaved signed 16-bit samples.
    pub fn interleaved_i16(samples: &'a [i16], sample_rate: f64, channels: u16) -> Self {
        let frames = samples.len() / channels.max(1) as usize;
        Self::new(
            StreamFormat::i16(sample_rate, channels),
            frames,
            SampleData::Interleaved(bytemuck::cast_slice(samples)),
        )
    }

    /// Interleaved signed 32-bit integer samples.
    pub fn interleaved_i32(samples: &'a [i32], sample_rate: f64, channels: u16) -> Self {
        let frames = samples.len() / channels.max(1) as usize;
        Self::new(
            StreamFormat::i32(sample_rate, channels),
            frames,
            SampleData::Interleaved(bytemuck::cast_slice(samples)),
        )
    }

    /// Planar f32 samples, one slice per channel.
    pub fn planar_f32(channels: &[&'a [f32]], sample_rate: f64) -> Self {
        let frames = channels.first().map_or(0, |c| c.len());
        Self::new(
            StreamFormat::f32(sample_rate, channels.len() as u16),
            frames,
            SampleData::Planar(channels.iter().map(|c| bytemuck::cast_slice::<f32, u8>(*c)).collect()),
        )
    }
}
