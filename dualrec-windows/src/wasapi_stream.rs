//! Shared-mode WASAPI capture loop used by both providers.
//!
//! The endpoint is opened on a dedicated thread registered with MMCSS. Open
//! failures are handed back to the caller of [`CaptureStream::start`]; later
//! device errors go to the provider's error callback. Buffers are delivered
//! in the endpoint's mix format and normalized by the core.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use windows::core::w;
use windows::Win32::Media::Audio::*;
use windows::Win32::Media::KernelStreaming::{KSDATAFORMAT_SUBTYPE_PCM, WAVE_FORMAT_EXTENSIBLE};
use windows::Win32::Media::Multimedia::{KSDATAFORMAT_SUBTYPE_IEEE_FLOAT, WAVE_FORMAT_IEEE_FLOAT};
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::AvSetMmThreadCharacteristicsW;

use dualrec_core::models::error::CaptureError;
use dualrec_core::processing::format::{InputBlock, SampleData, SampleEncoding, StreamFormat};
use dualrec_core::traits::capture_provider::{BlockCallback, ErrorCallback};

use crate::com::ComInit;
use crate::device_enumerator::DeviceEnumerator;

/// Shared-mode buffer duration in 100 ns units (100 ms).
const BUFFER_DURATION: i64 = 1_000_000;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Which endpoint a stream records.
#[derive(Debug, Clone)]
pub(crate) enum Endpoint {
    /// A capture endpoint, the default one when no ID is given.
    Capture(Option<String>),
    /// Loopback of the default render endpoint.
    Loopback,
}

/// A running capture thread.
pub(crate) struct CaptureStream {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureStream {
    /// Open `endpoint` and start delivering blocks.
    ///
    /// Returns once the endpoint is capturing or failed to open.
    pub(crate) fn start(
        thread_name: &str,
        endpoint: Endpoint,
        on_block: BlockCallback,
        on_error: ErrorCallback,
    ) -> Result<Self, CaptureError> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || {
                let opened = ComInit::new().and_then(|com| OpenStream::open(&endpoint).map(|stream| (com, stream)));
                let (_com, stream) = match opened {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(stream.format));

                let result = stream.run(&thread_running, &on_block);
                stream.stop();
                if let Err(e) = result {
                    if thread_running.load(Ordering::SeqCst) {
                        on_error(e);
                    }
                }
            })
            .map_err(|e| CaptureError::DeviceUnavailable(format!("failed to spawn capture thread: {}", e)))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(CaptureError::DeviceUnavailable("capture thread exited".into())));
        match ready {
            Ok(format) => {
                log::info!(
                    "{} capturing {} Hz, {} ch, {}-bit {:?}",
                    thread_name,
                    format.sample_rate,
                    format.channels,
                    format.bits_per_sample,
                    format.encoding
                );
                Ok(Self {
                    running,
                    handle: Some(handle),
                })
            }
            Err(e) => {
                let _ = handle.join();
                Err(e)
            }
        }
    }

    /// Stop capturing and wait for the thread to release the endpoint.
    pub(crate) fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// COM objects of an open endpoint. Confined to the capture thread.
struct OpenStream {
    client: IAudioClient,
    capture: IAudioCaptureClient,
    format: StreamFormat,
    block_align: usize,
}

impl OpenStream {
    fn open(endpoint: &Endpoint) -> Result<Self, CaptureError> {
        let enumerator = DeviceEnumerator::new()?;
        let (device, stream_flags) = match endpoint {
            Endpoint::Capture(id) => (enumerator.capture_device(id.as_deref())?, 0),
            Endpoint::Loopback => (enumerator.render_device()?, AUDCLNT_STREAMFLAGS_LOOPBACK),
        };

        unsafe {
            let client: IAudioClient = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| CaptureError::DeviceUnavailable(format!("Activate failed: {}", e)))?;

            let mix_format = client
                .GetMixFormat()
                .map_err(|e| CaptureError::DeviceUnavailable(format!("GetMixFormat failed: {}", e)))?;
            let parsed = parse_format(&*mix_format);
            let block_align = (*mix_format).nBlockAlign as usize;

            let initialized = client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                stream_flags | AUDCLNT_STREAMFLAGS_NOPERSIST,
                BUFFER_DURATION,
                0,
                mix_format,
                None,
            );
            CoTaskMemFree(Some(mix_format as *const _));
            let format = parsed?;
            initialized
                .map_err(|e| CaptureError::DeviceUnavailable(format!("IAudioClient::Initialize failed: {}", e)))?;

            let capture: IAudioCaptureClient = client
                .GetService()
                .map_err(|e| CaptureError::DeviceUnavailable(format!("GetService failed: {}", e)))?;

            let mut task_index = 0u32;
            if let Err(e) = AvSetMmThreadCharacteristicsW(w!("Pro Audio"), &mut task_index) {
                log::debug!("MMCSS registration failed: {}", e);
            }

            client
                .Start()
                .map_err(|e| CaptureError::DeviceUnavailable(format!("IAudioClient::Start failed: {}", e)))?;

            Ok(Self {
                client,
                capture,
                format,
                block_align,
            })
        }
    }

    fn run(&self, running: &AtomicBool, on_block: &BlockCallback) -> Result<(), CaptureError> {
        while running.load(Ordering::SeqCst) {
            let mut packet_length = self.next_packet_size()?;
            while packet_length > 0 {
                let mut data: *mut u8 = std::ptr::null_mut();
                let mut frames = 0u32;
                let mut flags = 0u32;
                unsafe {
                    self.capture
                        .GetBuffer(&mut data, &mut frames, &mut flags, None, None)
                        .map_err(|e| CaptureError::DeviceUnavailable(format!("GetBuffer failed: {}", e)))?;
                }

                let len = frames as usize * self.block_align;
                if len > 0 {
                    if data.is_null() || flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                        let silence = vec![0u8; len];
                        on_block(&self.block(frames, &silence));
                    } else {
                        let bytes = unsafe { std::slice::from_raw_parts(data, len) };
                        on_block(&self.block(frames, bytes));
                    }
                }

                unsafe {
                    self.capture
                        .ReleaseBuffer(frames)
                        .map_err(|e| CaptureError::DeviceUnavailable(format!("ReleaseBuffer failed: {}", e)))?;
                }
                packet_length = self.next_packet_size()?;
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    fn block<'a>(&self, frames: u32, bytes: &'a [u8]) -> InputBlock<'a> {
        InputBlock::new(self.format, frames as usize, SampleData::Interleaved(bytes))
    }

    fn next_packet_size(&self) -> Result<u32, CaptureError> {
        unsafe {
            self.capture
                .GetNextPacketSize()
                .map_err(|e| CaptureError::DeviceUnavailable(format!("GetNextPacketSize failed: {}", e)))
        }
    }

    fn stop(&self) {
        unsafe {
            let _ = self.client.Stop();
        }
    }
}

/// Describe a WASAPI mix format.
///
/// Plain and extensible PCM and IEEE float formats are recognized; depths
/// the core cannot convert are rejected there, per block.
fn parse_format(fmt: &WAVEFORMATEX) -> Result<StreamFormat, CaptureError> {
    let tag = fmt.wFormatTag as u32;
    let encoding = if tag == WAVE_FORMAT_IEEE_FLOAT {
        SampleEncoding::Float
    } else if tag == WAVE_FORMAT_PCM {
        SampleEncoding::SignedInt
    } else if tag == WAVE_FORMAT_EXTENSIBLE {
        let ext = unsafe { &*(fmt as *const WAVEFORMATEX as *const WAVEFORMATEXTENSIBLE) };
        let subformat = unsafe { std::ptr::read_unaligned(std::ptr::addr_of!(ext.SubFormat)) };
        if subformat == KSDATAFORMAT_SUBTYPE_IEEE_FLOAT {
            SampleEncoding::Float
        } else if subformat == KSDATAFORMAT_SUBTYPE_PCM {
            SampleEncoding::SignedInt
        } else {
            return Err(CaptureError::FormatUnsupported(format!("mix format subtype {:?}", subformat)));
        }
    } else {
        return Err(CaptureError::FormatUnsupported(format!("mix format tag {:#x}", tag)));
    };

    Ok(StreamFormat {
        sample_rate: fmt.nSamplesPerSec as f64,
        channels: fmt.nChannels,
        bits_per_sample: fmt.wBitsPerSample,
        encoding,
    })
}
