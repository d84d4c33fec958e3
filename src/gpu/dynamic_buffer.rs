//! Growable GPU buffers.
//!
//! [`DynamicBuffer`] reallocates with a 2x growth strategy when data exceeds
//! its capacity. [`UniformArena`] packs many uniform blocks into one such
//! buffer at aligned offsets so each draw selects its block with a dynamic
//! offset.

/// A GPU buffer that can grow dynamically
///
/// Uses a 2x growth strategy when capacity is exceeded.
/// Never shrinks (GPU buffers cannot be resized in place).
pub struct DynamicBuffer {
    buffer: wgpu::Buffer,
    capacity: usize, // Capacity in bytes
    len: usize,      // Current data length in bytes
    usage: wgpu::BufferUsages,
    label: String,
}

impl DynamicBuffer {
    /// Buffer with the given initial byte capacity.
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        initial_capacity: usize,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let capacity = initial_capacity.max(64); // Minimum 64 bytes

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity as u64,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            buffer,
            capacity,
            len: 0,
            usage,
            label: label.to_owned(),
        }
    }

    /// Write raw bytes to buffer, growing if necessary.
    ///
    /// Returns `true` if buffer was reallocated (bind groups need recreation).
    pub fn write_bytes(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[u8]) -> bool {
        let needed = data.len();

        let reallocated = if needed > self.capacity {
            // 2x growth, minimum 1KB
            let new_capacity = (needed * 2).max(self.capacity + 1024);

            self.buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&self.label),
                size: new_capacity as u64,
                usage: self.usage | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            self.capacity = new_capacity;
            true
        } else {
            false
        };

        if needed > 0 {
            queue.write_buffer(&self.buffer, 0, data);
        }
        self.len = needed;

        reallocated
    }

    /// The current GPU buffer.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Bytes written by the last write.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the last write was empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// CPU staging for uniform blocks addressed by dynamic offsets.
///
/// Blocks are appended during a frame and uploaded in one write at flush.
#[derive(Debug, Clone)]
pub struct UniformArena {
    data: Vec<u8>,
    alignment: usize,
    block_size: usize,
}

impl UniformArena {
    /// Arena for blocks of up to `block_size` bytes at `alignment`
    /// (the device's `min_uniform_buffer_offset_alignment`).
    #[must_use]
    pub fn new(block_size: usize, alignment: usize) -> Self {
        Self {
            data: Vec::new(),
            alignment: alignment.max(1),
            block_size: block_size.max(16),
        }
    }

    /// Size each block occupies, rounded up to the alignment.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.block_size.div_ceil(self.alignment) * self.alignment
    }

    /// Bytes visible to the shader per block.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Append a block and return its byte offset.
    pub fn push(&mut self, block: &[u8]) -> u32 {
        let offset = self.data.len();
        let stride = self.stride();
        self.data.resize(offset + stride, 0);
        let len = block.len().min(self.block_size);
        self.data[offset..offset + len].copy_from_slice(&block[..len]);
        offset as u32
    }

    /// Staged bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Whether nothing was pushed since the last reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Forget all blocks.
    pub fn reset(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_offsets_respect_alignment() {
        let mut arena = UniformArena::new(100, 256);
        assert_eq!(arena.stride(), 256);
        assert_eq!(arena.push(&[1; 100]), 0);
        assert_eq!(arena.push(&[2; 100]), 256);
        assert_eq!(arena.bytes().len(), 512);
        assert_eq!(arena.bytes()[256], 2);
        assert_eq!(arena.bytes()[200], 0);
        arena.reset();
        assert!(arena.is_empty());
    }
}
