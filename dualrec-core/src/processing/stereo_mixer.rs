use super::format::AudioBlock;

/// Lowest level shown by the meter, in dBFS. Maps to 0.0.
pub const METER_FLOOR_DB: f32 = -60.0;

/// Pure-math mixing and metering on canonical blocks.
///
/// Mixing is a plain volume-scaled sum. No limiter is applied: volumes above
/// 1.0 can push samples past full scale.
#[derive(Debug, Default)]
pub struct StereoMixer {
    mix: AudioBlock,
    contributed: bool,
}

impl StereoMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `source` scaled by `volume` into the accumulator.
    ///
    /// The accumulator grows to the longest contribution; shorter sources are
    /// treated as silence past their end. Empty sources are ignored.
    pub fn add(&mut self, source: &AudioBlock, volume: f32) {
        if source.is_empty() {
            return;
        }
        let frames = self.mix.frames().max(source.frames());
        for (acc, input) in self.mix.channels_mut().iter_mut().zip(source.channels()) {
            acc.resize(frames, 0.0);
            for (a, s) in acc.iter_mut().zip(input) {
                *a += s * volume;
            }
        }
        self.contributed = true;
    }

    /// The mixed block, or `None` if no source contributed any frames.
    pub fn finish(self) -> Option<AudioBlock> {
        self.contributed.then_some(self.mix)
    }

    /// Mix several `(block, volume)` pairs in one call.
    pub fn mix_sources(sources: &[(&AudioBlock, f32)]) -> Option<AudioBlock> {
        let mut mixer = Self::new();
        for (block, volume) in sources {
            mixer.add(block, *volume);
        }
        mixer.finish()
    }

    /// Root-mean-square of `samples`.
    pub fn rms_level(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }

    /// Map an RMS amplitude to the 0.0–1.0 meter scale.
    ///
    /// -60 dBFS and below read 0.0, 0 dBFS and above read 1.0, linear in dB
    /// in between.
    pub fn level_from_rms(rms: f32) -> f32 {
        if rms.is_nan() || rms <= 0.0 {
            return 0.0;
        }
        let db = 20.0 * rms.log10();
        ((db - METER_FLOOR_DB) / -METER_FLOOR_DB).clamp(0.0, 1.0)
    }

    /// Meter level of a single channel of samples.
    pub fn meter_level(samples: &[f32]) -> f32 {
        Self::level_from_rms(Self::rms_level(samples))
    }

    /// Meter level of a block, measured on its first channel only.
    pub fn block_level(block: &AudioBlock) -> f32 {
        Self::meter_level(block.channel(0))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn volume_scales_single_source() {
        let system = AudioBlock::constant(1.0, 8);
        let mixed = StereoMixer::mix_sources(&[(&system, 0.5)]).unwrap();

        assert_eq!(mixed.frames(), 8);
        assert!(mixed.channel(0).iter().all(|s| (*s - 0.5).abs() < 1e-6));
        assert!(mixed.channel(1).iter().all(|s| (*s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn sources_sum_without_clamping() {
        let system = AudioBlock::constant(0.8, 4);
        let mic = AudioBlock::constant(0.6, 4);

        let mixed = StereoMixer::mix_sources(&[(&system, 1.0), (&mic, 2.0)]).unwrap();
        assert_relative_eq!(mixed.channel(0)[0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn shorter_source_is_padded_with_silence() {
        let system = AudioBlock::constant(0.5, 4);
        let mic = AudioBlock::constant(0.25, 2);

        let mixed = StereoMixer::mix_sources(&[(&system, 1.0), (&mic, 1.0)]).unwrap();
        assert_eq!(mixed.frames(), 4);
        assert_eq!(mixed.channel(0), &[0.75, 0.75, 0.5, 0.5]);
    }

    #[test]
    fn no_frames_means_no_output() {
        let empty = AudioBlock::empty();
        assert!(StereoMixer::mix_sources(&[(&empty, 1.0), (&empty, 1.0)]).is_none());
        assert!(StereoMixer::mix_sources(&[]).is_none());
    }

    #[test]
    fn zero_volume_still_counts_as_contribution() {
        let system = AudioBlock::constant(1.0, 3);
        let mixed = StereoMixer::mix_sources(&[(&system, 0.0)]).unwrap();
        assert_eq!(mixed, AudioBlock::silence(3));
    }

    #[test]
    fn rms_level_silence() {
        assert_eq!(StereoMixer::rms_level(&[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(StereoMixer::rms_level(&[]), 0.0);
    }

    #[test]
    fn rms_level_full_scale() {
        assert_relative_eq!(StereoMixer::rms_level(&[1.0, -1.0, 1.0]), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn meter_mapping_endpoints() {
        assert_eq!(StereoMixer::level_from_rms(0.0), 0.0);
        assert_eq!(StereoMixer::level_from_rms(1.0), 1.0);
        assert_eq!(StereoMixer::level_from_rms(4.0), 1.0);
        assert_eq!(StereoMixer::level_from_rms(1e-4), 0.0); // -80 dB
        assert_relative_eq!(StereoMixer::level_from_rms(0.001), 0.0, epsilon = 1e-5); // -60 dB
        assert_relative_eq!(StereoMixer::level_from_rms(0.031_622_78), 0.5, epsilon = 1e-4); // -30 dB
    }

    #[test]
    fn block_level_uses_first_channel() {
        let block = AudioBlock::from_channels(vec![0.0; 16], vec![1.0; 16]).unwrap();
        assert_eq!(StereoMixer::block_level(&block), 0.0);
    }
}
