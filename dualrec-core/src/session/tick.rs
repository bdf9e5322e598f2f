//! The periodic mixing thread of one recording session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::models::error::CaptureError;
use crate::traits::encoder::AudioEncoder;

#[derive(Default)]
struct TickControl {
    cancelled: AtomicBool,
    drain: AtomicBool,
}

/// Owns the encoder and runs `tick` every interval until stopped.
///
/// On stop the worker optionally keeps ticking until a tick reports that it
/// wrote nothing, then finishes the encoder, all on its own thread.
pub(crate) struct TickWorker {
    control: Arc<TickControl>,
    handle: JoinHandle<Result<(), CaptureError>>,
}

impl TickWorker {
    pub(crate) fn spawn<F>(
        interval: Duration,
        max_drain_ticks: usize,
        mut encoder: Box<dyn AudioEncoder>,
        mut tick: F,
    ) -> Result<Self, CaptureError>
    where
        F: FnMut(&mut dyn AudioEncoder) -> bool + Send + 'static,
    {
        let control = Arc::new(TickControl::default());
        let worker_control = Arc::clone(&control);

        let handle = thread::Builder::new()
            .name("dualrec-mix-tick".into())
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                while !worker_control.cancelled.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if now < deadline {
                        thread::park_timeout(deadline - now);
                        continue;
                    }
                    deadline += interval;
                    if deadline < now {
                        // fell behind; skip missed ticks instead of bursting
                        deadline = now + interval;
                    }
                    tick(encoder.as_mut());
                }

                if worker_control.drain.load(Ordering::Acquire) {
                    let mut drained = 0;
                    while drained < max_drain_ticks && tick(encoder.as_mut()) {
                        drained += 1;
                    }
                    log::debug!("Final drain wrote {} blocks", drained);
                }
                encoder.finish()
            })
            .map_err(|e| CaptureError::EncoderOpenFailed(format!("failed to spawn mix thread: {}", e)))?;

        Ok(Self { control, handle })
    }

    /// Cancel the timer and wait for the worker to close the encoder.
    pub(crate) fn stop(self, drain: bool) -> Result<(), CaptureError> {
        self.control.drain.store(drain, Ordering::Release);
        self.control.cancelled.store(true, Ordering::Release);
        self.handle.thread().unpark();
        self.handle
            .join()
            .map_err(|_| CaptureError::EncoderWriteFailed("mix thread panicked".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::format::AudioBlock;
    use std::sync::atomic::AtomicUsize;

    struct CountingEncoder {
        writes: Arc<AtomicUsize>,
        finished: Arc<AtomicBool>,
    }

    impl AudioEncoder for CountingEncoder {
        fn write(&mut self, _block: &AudioBlock) -> Result<(), CaptureError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<(), CaptureError> {
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counting_encoder() -> (Box<dyn AudioEncoder>, Arc<AtomicUsize>, Arc<AtomicBool>) {
        let writes = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let encoder = CountingEncoder {
            writes: Arc::clone(&writes),
            finished: Arc::clone(&finished),
        };
        (Box::new(encoder), writes, finished)
    }

    #[test]
    fn stop_wakes_worker_without_waiting_for_interval() {
        let (encoder, _writes, finished) = counting_encoder();
        let worker = TickWorker::spawn(Duration::from_secs(3600), 4, encoder, |_| false).unwrap();

        let started = Instant::now();
        worker.stop(true).unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn drain_runs_until_nothing_written() {
        let (encoder, writes, _finished) = counting_encoder();
        let mut remaining = 3;
        let worker = TickWorker::spawn(Duration::from_secs(3600), 10, encoder, move |encoder| {
            if remaining == 0 {
                return false;
            }
            remaining -= 1;
            encoder.write(&AudioBlock::silence(1)).is_ok()
        })
        .unwrap();

        worker.stop(true).unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn drain_is_bounded() {
        let (encoder, writes, _finished) = counting_encoder();
        let worker = TickWorker::spawn(Duration::from_secs(3600), 5, encoder, |encoder| {
            encoder.write(&AudioBlock::silence(1)).is_ok()
        })
        .unwrap();

        worker.stop(true).unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn stop_without_drain_still_finishes() {
        let (encoder, writes, finished) = counting_encoder();
        let worker = TickWorker::spawn(Duration::from_secs(3600), 5, encoder, |encoder| {
            encoder.write(&AudioBlock::silence(1)).is_ok()
        })
        .unwrap();

        worker.stop(false).unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 0);
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn ticks_run_periodically() {
        let (encoder, writes, _finished) = counting_encoder();
        let worker = TickWorker::spawn(Duration::from_millis(2), 0, encoder, |encoder| {
            encoder.write(&AudioBlock::silence(1)).is_ok()
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while writes.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        worker.stop(false).unwrap();
        assert!(writes.load(Ordering::SeqCst) >= 3);
    }
}
