pub mod format;
pub mod normalizer;
pub mod ring_buffer;
pub mod stereo_mixer;
