use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::models::audio_models::{AudioLevels, MixerDiagnostics, SourceKind};
use crate::models::config::{EncoderSettings, MixerConfiguration, MAX_VOLUME};
use crate::models::error::CaptureError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult, SourceTrack};
use crate::processing::format::{InputBlock, CANONICAL_SAMPLE_RATE};
use crate::processing::normalizer::{self, FormatNormalizer};
use crate::processing::ring_buffer::RingBuffer;
use crate::processing::stereo_mixer::StereoMixer;
use crate::storage::aac_encoder::AacEncoderFactory;
use crate::storage::{metadata, recording_file};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::encoder::{AudioEncoder, EncoderFactory};

use super::tick::TickWorker;

/// Ring buffer, converter and settings of one source.
struct SourceChannel {
    kind: SourceKind,
    buffer: Mutex<RingBuffer>,
    normalizer: Mutex<FormatNormalizer>,
    enabled: AtomicBool,
    volume: AtomicU32,
    reported_format_error: AtomicBool,
}

impl SourceChannel {
    fn new(kind: SourceKind, capacity: usize) -> Self {
        Self {
            kind,
            buffer: Mutex::new(RingBuffer::new(capacity)),
            normalizer: Mutex::new(FormatNormalizer::new()),
            enabled: AtomicBool::new(true),
            volume: AtomicU32::new(1.0f32.to_bits()),
            reported_format_error: AtomicBool::new(false),
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    fn set_volume(&self, volume: f32) {
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn reset(&self) {
        self.buffer.lock().reset();
        self.normalizer.lock().reset();
        self.reported_format_error.store(false, Ordering::Relaxed);
    }

    fn track(&self) -> SourceTrack {
        SourceTrack {
            source: self.kind,
            enabled: self.is_enabled(),
            volume: self.volume(),
        }
    }
}

/// State shared between the mixer handle, capture threads and the tick thread.
struct MixerCore {
    system: SourceChannel,
    microphone: SourceChannel,
    recording: AtomicBool,
    block_frames: usize,
    levels: Mutex<AudioLevels>,
    diagnostics: Mutex<MixerDiagnostics>,
    delegate: RwLock<Option<Arc<dyn CaptureDelegate>>>,
}

impl MixerCore {
    fn channel(&self, kind: SourceKind) -> &SourceChannel {
        match kind {
            SourceKind::System => &self.system,
            SourceKind::Microphone => &self.microphone,
        }
    }

    fn receive(&self, kind: SourceKind, block: &InputBlock<'_>) {
        let channel = self.channel(kind);
        if !self.recording.load(Ordering::Acquire) || !channel.is_enabled() {
            return;
        }
        self.diagnostics.lock().source_mut(kind).blocks_received += 1;

        let converted = normalizer::decode(block).and_then(|planes| {
            // metered before conversion so a failing resample still moves the meter
            let level = planes.first().map_or(0.0, |p| StereoMixer::meter_level(p));
            self.publish_level(|levels| levels.set_source(kind, level));
            channel.normalizer.lock().conform(planes, block.format.sample_rate)
        });

        let audio = match converted {
            Ok(audio) => audio,
            Err(e) => {
                if channel.reported_format_error.swap(true, Ordering::Relaxed) {
                    log::debug!("Dropped {} block: {}", kind, e);
                } else {
                    log::warn!("Dropped {} block: {}", kind, e);
                }
                self.diagnostics.lock().source_mut(kind).blocks_dropped += 1;
                return;
            }
        };

        let stored = channel.buffer.lock().write(&audio);
        let mut diagnostics = self.diagnostics.lock();
        let source = diagnostics.source_mut(kind);
        source.frames_buffered += stored as u64;
        source.frames_overflowed += (audio.frames() - stored) as u64;
    }

    /// Mix one block from every enabled source and hand it to `encoder`.
    ///
    /// Returns whether any source contributed frames.
    fn tick(&self, encoder: &mut dyn AudioEncoder) -> bool {
        let mut mixer = StereoMixer::new();
        for channel in [&self.system, &self.microphone] {
            if channel.is_enabled() {
                let block = channel.buffer.lock().read(self.block_frames);
                mixer.add(&block, channel.volume());
            }
        }
        self.diagnostics.lock().ticks += 1;

        let Some(mixed) = mixer.finish() else {
            return false;
        };

        let level = StereoMixer::block_level(&mixed);
        self.publish_level(|levels| levels.mixed = level);

        match encoder.write(&mixed) {
            Ok(()) => {
                let mut diagnostics = self.diagnostics.lock();
                diagnostics.ticks_written += 1;
                diagnostics.frames_written += mixed.frames() as u64;
            }
            Err(e) => {
                log::error!("Failed to write mixed audio: {}", e);
                self.diagnostics.lock().write_failures += 1;
            }
        }
        true
    }

    fn publish_level(&self, update: impl FnOnce(&mut AudioLevels)) {
        let snapshot = {
            let mut levels = self.levels.lock();
            update(&mut levels);
            *levels
        };
        if let Some(delegate) = self.delegate.read().as_ref() {
            delegate.on_levels_updated(&snapshot);
        }
    }
}

/// The active recording: its tick worker and file paths.
struct ActiveRecording {
    worker: TickWorker,
    in_progress: PathBuf,
    destination: PathBuf,
}

/// Combines the system and microphone streams into one AAC file.
///
/// Capture threads push blocks through [`Mixer::receive_system_audio`] and
/// [`Mixer::receive_microphone_audio`]; they are normalized and buffered per
/// source. A tick thread mixes one block from each enabled buffer every
/// interval and writes it to the encoder.
///
/// ```text
/// [System] → normalize → [RingBuffer] ─┐
///                                      ├→ volume-scaled sum → [Encoder] → <dest>.recording
/// [Mic]    → normalize → [RingBuffer] ─┘
/// ```
///
/// All methods take `&self`; share the mixer with capture callbacks through
/// an `Arc`.
pub struct Mixer {
    core: Arc<MixerCore>,
    config: MixerConfiguration,
    factory: Arc<dyn EncoderFactory>,
    settings: EncoderSettings,
    active: Mutex<Option<ActiveRecording>>,
}

impl Mixer {
    pub fn new(
        config: MixerConfiguration,
        factory: Arc<dyn EncoderFactory>,
        settings: EncoderSettings,
    ) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        let capacity = config.buffer_capacity_frames;
        Ok(Self {
            core: Arc::new(MixerCore {
                system: SourceChannel::new(SourceKind::System, capacity),
                microphone: SourceChannel::new(SourceKind::Microphone, capacity),
                recording: AtomicBool::new(false),
                block_frames: config.block_frames,
                levels: Mutex::new(AudioLevels::default()),
                diagnostics: Mutex::new(MixerDiagnostics::default()),
                delegate: RwLock::new(None),
            }),
            config,
            factory,
            settings,
            active: Mutex::new(None),
        })
    }

    /// Mixer writing AAC through ffmpeg, located via `DUALREC_FFMPEG` or `PATH`.
    pub fn with_aac_encoder(config: MixerConfiguration) -> Result<Self, CaptureError> {
        Self::new(config, Arc::new(AacEncoderFactory), EncoderSettings::from_env())
    }

    pub fn set_delegate(&self, delegate: Option<Arc<dyn CaptureDelegate>>) {
        *self.core.delegate.write() = delegate;
    }

    /// Open the encoder and begin mixing. Returns the final destination path.
    pub fn start_recording(&self, destination: &Path) -> Result<PathBuf, CaptureError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(CaptureError::ConfigurationFailed("a recording is already in progress".into()));
        }

        let destination = recording_file::final_path(destination);
        let in_progress = recording_file::in_progress_path(&destination);
        // a leftover in-progress file is a recording whose rename failed
        if in_progress.exists() {
            return Err(CaptureError::EncoderOpenFailed(format!(
                "{} holds an unfinished recording; move it before recording to {}",
                in_progress.display(),
                destination.display()
            )));
        }
        let encoder = self.factory.open(&in_progress, &self.settings)?;

        for channel in [&self.core.system, &self.core.microphone] {
            channel.reset();
        }
        *self.core.levels.lock() = AudioLevels::default();
        *self.core.diagnostics.lock() = MixerDiagnostics::default();

        let core = Arc::clone(&self.core);
        let max_drain_ticks = self.config.buffer_capacity_frames / self.config.block_frames + 1;
        let worker = match TickWorker::spawn(self.config.tick_interval, max_drain_ticks, encoder, move |encoder| {
            core.tick(encoder)
        }) {
            Ok(worker) => worker,
            Err(e) => {
                recording_file::discard(&in_progress);
                return Err(e);
            }
        };

        self.core.recording.store(true, Ordering::Release);
        log::info!("Recording to {}", in_progress.display());

        *active = Some(ActiveRecording {
            worker,
            in_progress,
            destination: destination.clone(),
        });
        Ok(destination)
    }

    /// Flush buffered audio, close the encoder and move the file into place.
    pub fn stop_recording(&self) -> Result<RecordingResult, CaptureError> {
        let recording = self
            .active
            .lock()
            .take()
            .ok_or_else(|| CaptureError::ConfigurationFailed("not recording".into()))?;
        self.core.recording.store(false, Ordering::Release);

        if let Err(e) = recording.worker.stop(true) {
            log::error!(
                "Failed to close encoder, partial recording left at {}: {}",
                recording.in_progress.display(),
                e
            );
            return Err(e);
        }

        recording_file::finalize(&recording.in_progress, &recording.destination)?;
        self.finalize_result(&recording.destination)
    }

    /// Stop without finalizing and remove the in-progress file.
    pub fn abort_recording(&self) {
        let Some(recording) = self.active.lock().take() else {
            return;
        };
        self.core.recording.store(false, Ordering::Release);
        if let Err(e) = recording.worker.stop(false) {
            log::debug!("Encoder close failed while aborting: {}", e);
        }
        recording_file::discard(&recording.in_progress);
        log::info!("Recording to {} aborted", recording.destination.display());
    }

    fn finalize_result(&self, destination: &Path) -> Result<RecordingResult, CaptureError> {
        let frames_written = self.core.diagnostics.lock().frames_written;
        let duration_secs = frames_written as f64 / CANONICAL_SAMPLE_RATE as f64;
        let checksum = recording_file::sha256_file(destination)?;

        let metadata = RecordingMetadata::new_mixed(
            duration_secs,
            &destination.to_string_lossy(),
            &checksum,
            self.settings.bitrate,
            vec![self.core.system.track(), self.core.microphone.track()],
        );
        if self.config.write_metadata_sidecar {
            if let Err(e) = metadata::write_metadata(&metadata, destination) {
                log::warn!("Recording saved without metadata: {}", e);
            }
        }

        log::info!("Saved {:.1}s recording to {}", duration_secs, destination.display());
        Ok(RecordingResult {
            file_path: destination.to_path_buf(),
            duration_secs,
            frames_written,
            checksum,
            metadata,
        })
    }

    /// Accept a block from the system audio capture thread.
    pub fn receive_system_audio(&self, block: &InputBlock<'_>) {
        self.core.receive(SourceKind::System, block);
    }

    /// Accept a block from the microphone capture thread.
    pub fn receive_microphone_audio(&self, block: &InputBlock<'_>) {
        self.core.receive(SourceKind::Microphone, block);
    }

    /// Set both volumes, clamped to 0.0–2.0. Takes effect on the next tick.
    pub fn update_volumes(&self, system: f32, microphone: f32) -> Result<(), CaptureError> {
        if !system.is_finite() || !microphone.is_finite() {
            return Err(CaptureError::ConfigurationFailed(format!(
                "volumes must be finite (system {}, microphone {})",
                system, microphone
            )));
        }
        self.core.system.set_volume(system.clamp(0.0, MAX_VOLUME));
        self.core.microphone.set_volume(microphone.clamp(0.0, MAX_VOLUME));
        Ok(())
    }

    pub fn update_enabled_sources(&self, system: bool, microphone: bool) {
        self.core.system.enabled.store(system, Ordering::Relaxed);
        self.core.microphone.enabled.store(microphone, Ordering::Relaxed);
    }

    pub fn is_recording(&self) -> bool {
        self.core.recording.load(Ordering::Acquire)
    }

    pub fn volume(&self, kind: SourceKind) -> f32 {
        self.core.channel(kind).volume()
    }

    pub fn is_source_enabled(&self, kind: SourceKind) -> bool {
        self.core.channel(kind).is_enabled()
    }

    pub fn current_levels(&self) -> AudioLevels {
        *self.core.levels.lock()
    }

    pub fn diagnostics(&self) -> MixerDiagnostics {
        *self.core.diagnostics.lock()
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        self.abort_recording();
    }
}
