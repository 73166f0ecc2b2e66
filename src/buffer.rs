/// Fixed-capacity byte ring. Writes are best-effort: only the bytes that fit
/// are stored.
#[derive(Debug)]
pub(crate) struct RingBuffer {
    data: Box<[u8]>,
    read_pos: usize,
    len: usize,
}

impl RingBuffer {
    pub fn with_capacity(capacity: usize) -> RingBuffer {
        RingBuffer {
            data: vec![0; capacity].into_boxed_slice(),
            read_pos: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Append as much of `bytes` as fits, returning the stored count.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let count = bytes.len().min(self.free());
        if count == 0 {
            return 0;
        }
        let capacity = self.capacity();
        let write_pos = (self.read_pos + self.len) % capacity;
        let first = count.min(capacity - write_pos);
        self.data[write_pos..write_pos + first].copy_from_slice(&bytes[..first]);
        self.data[..count - first].copy_from_slice(&bytes[first..count]);
        self.len += count;
        count
    }

    /// Copy up to `buf.len()` of the oldest bytes without consuming them.
    pub fn peek(&self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.len);
        if count == 0 {
            return 0;
        }
        let first = count.min(self.capacity() - self.read_pos);
        buf[..first].copy_from_slice(&self.data[self.read_pos..self.read_pos + first]);
        buf[first..count].copy_from_slice(&self.data[..count - first]);
        count
    }

    pub fn consume(&mut self, len: usize) {
        assert!(len <= self.len());
        if len == 0 {
            return;
        }
        self.read_pos = (self.read_pos + len) % self.capacity();
        self.len -= len;
        if self.len == 0 {
            self.read_pos = 0;
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let count = self.peek(buf);
        self.consume(count);
        count
    }

    pub fn push(&mut self, byte: u8) -> bool {
        self.write(&[byte]) == 1
    }

    pub fn pop(&mut self) -> Option<u8> {
        let mut byte = [0];
        match self.read(&mut byte) {
            0 => None,
            _ => Some(byte[0]),
        }
    }

    pub fn front(&self) -> Option<u8> {
        let mut byte = [0];
        match self.peek(&mut byte) {
            0 => None,
            _ => Some(byte[0]),
        }
    }
}
