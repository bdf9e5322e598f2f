use super::format::{AudioBlock, CANONICAL_CHANNELS};

/// Fixed-capacity circular store of canonical stereo frames.
///
/// One writer (a capture callback) and one reader (the mixing tick) share it
/// through `Arc<parking_lot::Mutex<RingBuffer>>`; the lock only covers index
/// arithmetic and the copy.
///
/// Overflow behavior: frames that do not fit in the free space are dropped
/// from the end of the incoming block. The producer never blocks.
#[derive(Debug)]
pub struct RingBuffer {
    channels: [Vec<f32>; CANONICAL_CHANNELS],
    write_index: usize,
    read_index: usize,
    available: usize,
    capacity: usize,
}

impl RingBuffer {
    /// Create a buffer holding `capacity` frames per channel.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            channels: [vec![0.0; capacity], vec![0.0; capacity]],
            write_index: 0,
            read_index: 0,
            available: 0,
            capacity,
        }
    }

    /// Append as many frames of `block` as fit; returns the number stored.
    pub fn write(&mut self, block: &AudioBlock) -> usize {
        let to_write = block.frames().min(self.free());
        if to_write == 0 {
            return 0;
        }

        let first = to_write.min(self.capacity - self.write_index);
        let second = to_write - first;
        for (dst, src) in self.channels.iter_mut().zip(block.channels()) {
            dst[self.write_index..self.write_index + first].copy_from_slice(&src[..first]);
            dst[..second].copy_from_slice(&src[first..to_write]);
        }

        self.write_index = (self.write_index + to_write) % self.capacity;
        self.available += to_write;
        to_write
    }

    /// Remove and return up to `max_frames` frames in FIFO order.
    ///
    /// Returns an empty block if nothing is buffered.
    pub fn read(&mut self, max_frames: usize) -> AudioBlock {
        let to_read = max_frames.min(self.available);
        if to_read == 0 {
            return AudioBlock::empty();
        }

        let first = to_read.min(self.capacity - self.read_index);
        let second = to_read - first;
        let mut block = AudioBlock::silence(to_read);
        for (dst, src) in block.channels_mut().iter_mut().zip(&self.channels) {
            dst[..first].copy_from_slice(&src[self.read_index..self.read_index + first]);
            dst[first..].copy_from_slice(&src[..second]);
        }

        self.read_index = (self.read_index + to_read) % self.capacity;
        self.available -= to_read;
        block
    }

    /// Frames currently available for reading.
    pub fn available(&self) -> usize {
        self.available
    }

    /// Frames that can be written before data is dropped.
    pub fn free(&self) -> usize {
        self.capacity - self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Forget all buffered frames. Storage is left as is.
    pub fn reset(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
