pub mod aac_encoder;
pub mod metadata;
pub mod recording_file;
