//! Records system audio and the microphone into one `.m4a` file.
//!
//! ```text
//! cargo run -p dualrec-windows --example record -- meeting.m4a --seconds 30 [--no-mic] [--mic <device-id>]
//! cargo run -p dualrec-windows --example record -- --list
//! ```
//!
//! Set `RUST_LOG=debug` for capture details and `DUALREC_FFMPEG` to point at
//! an ffmpeg binary outside `PATH`.

use std::path::PathBuf;

use clap::Parser;

/// Record system audio and the microphone into one .m4a file
#[derive(Parser, Debug)]
#[command(name = "record")]
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
struct Args {
    /// Output file; `.m4a` is added when it has no extension
    #[arg(value_name = "FILE", default_value = "recording.m4a")]
    destination: PathBuf,

    /// Recording length in seconds
    #[arg(short, long, default_value_t = 10)]
    seconds: u64,

    /// Record system audio only
    #[arg(long, conflicts_with = "mic")]
    no_mic: bool,

    /// Microphone device ID (see --list)
    #[arg(long, value_name = "ID")]
    mic: Option<String>,

    /// List microphones and exit
    #[arg(long)]
    list: bool,
}

#[cfg(target_os = "windows")]
fn main() {
    env_logger::init();
    if let Err(e) = windows_demo::run(Args::parse()) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(target_os = "windows"))]
fn main() {
    env_logger::init();
    let args = Args::parse();
    log::debug!("{:?}", args);
    eprintln!("the record demo needs the Windows WASAPI backend");
    std::process::exit(1);
}

#[cfg(target_os = "windows")]
mod windows_demo {
    use std::path::Path;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use parking_lot::Mutex;

    use dualrec_core::{
        AudioLevels, CaptureDelegate, CaptureError, CaptureOrchestrator, CaptureProvider, RecordingRequest,
        RecordingState,
    };
    use dualrec_windows::{wasapi_mic, WasapiLoopbackCapture, WasapiMicCapture};

    use super::Args;

    /// Prints recorder events to the terminal.
    struct ConsoleDelegate {
        last_levels: Mutex<AudioLevels>,
    }

    impl CaptureDelegate for ConsoleDelegate {
        fn on_state_changed(&self, state: &RecordingState) {
            log::info!("state: {:?}", state);
        }

        fn on_recording_started(&self, path: &Path) {
            println!("recording to {}", path.display());
        }

        fn on_recording_stopped(&self, path: Option<&Path>) {
            match path {
                Some(path) => println!("saved {}", path.display()),
                None => println!("nothing saved"),
            }
        }

        fn on_levels_updated(&self, levels: &AudioLevels) {
            *self.last_levels.lock() = *levels;
        }

        fn on_error(&self, error: &CaptureError) {
            eprintln!("capture error: {}", error);
        }
    }

    fn meter(level: f32) -> String {
        let filled = (level * 20.0).round() as usize;
        format!("{:<20}", "#".repeat(filled.min(20)))
    }

    pub(crate) fn run(args: Args) -> Result<(), CaptureError> {
        if args.list {
            let mic = WasapiMicCapture::default_device();
            for device in mic.available_devices()? {
                let marker = if device.is_default { "*" } else { " " };
                println!("{} {}  {}", marker, device.id, device.name);
            }
            return Ok(());
        }

        let mut request = RecordingRequest::new(args.destination);
        request.sources.microphone = !args.no_mic;
        request.mic_device_id = args.mic;
        let seconds = args.seconds;

        if let Some(name) = wasapi_mic::default_microphone_name() {
            log::info!("default microphone: {}", name);
        }

        let mut recorder =
            CaptureOrchestrator::with_aac_encoder(WasapiMicCapture::default_device(), WasapiLoopbackCapture::default_device())?;
        let delegate = Arc::new(ConsoleDelegate {
            last_levels: Mutex::new(AudioLevels::default()),
        });
        recorder.set_delegate(delegate.clone());

        recorder.start_recording(request)?;
        for _ in 0..seconds * 4 {
            thread::sleep(Duration::from_millis(250));
            let levels = *delegate.last_levels.lock();
            print!(
                "\rsys [{}] mic [{}] mix [{}]",
                meter(levels.system),
                meter(levels.microphone),
                meter(levels.mixed)
            );
        }
        println!();

        if let Some(result) = recorder.stop_recording()? {
            println!(
                "{:.1}s, {} frames, sha256 {}",
                result.duration_secs, result.frames_written, result.checksum
            );
        }
        Ok(())
    }
}
