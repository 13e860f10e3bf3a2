//! Fixed-capacity circular byte buffer used to stage connection input and output

use crate::error::RingError;

/// A byte source that reports how much it can currently yield
pub trait Readable {
    fn readable(&self) -> usize;

    /// Copies at most `dst.len()` bytes. A read that moves nothing, whether
    /// the source or the destination is empty, is an error rather than `Ok(0)`.
    fn read(&mut self, dst: &mut [u8]) -> Result<usize, RingError>;
}

/// A byte sink that reports how much it can currently accept
pub trait Writable {
    fn writable(&self) -> usize;

    /// Copies as many bytes as fit. Fewer bytes than requested is reported
    /// as [`RingError::ShortWrite`] after the ones that fit were written.
    fn write(&mut self, src: &[u8]) -> Result<usize, RingError>;
}

/// Circular buffer with independent read and write positions
///
/// One slot of the backing storage is never filled so that a full buffer
/// (`write` one behind `read`) can be told apart from an empty one
/// (`write == read`).
#[derive(Debug)]
pub struct RingBuffer {
    capacity: usize,
    bytes: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            bytes: vec![0; capacity + 1].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }
}

impl Readable for RingBuffer {
    fn readable(&self) -> usize {
        if self.read_pos <= self.write_pos {
            self.write_pos - self.read_pos
        } else {
            self.bytes.len() - self.read_pos + self.write_pos
        }
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<usize, RingError> {
        let n = dst.len().min(self.readable());
        if n == 0 {
            return Err(RingError::Empty);
        }

        let end = self.bytes.len();
        if self.read_pos + n > end {
            let first = end - self.read_pos;
            dst[..first].copy_from_slice(&self.bytes[self.read_pos..]);
            dst[first..n].copy_from_slice(&self.bytes[..n - first]);
        } else {
            dst[..n].copy_from_slice(&self.bytes[self.read_pos..self.read_pos + n]);
        }

        self.read_pos = (self.read_pos + n) % end;
        Ok(n)
    }
}

impl Writable for RingBuffer {
    fn writable(&self) -> usize {
        if self.read_pos <= self.write_pos {
            self.bytes.len() - self.write_pos + self.read_pos - 1
        } else {
            self.read_pos - self.write_pos - 1
        }
    }

    fn write(&mut self, src: &[u8]) -> Result<usize, RingError> {
        let n = src.len().min(self.writable());

        let end = self.bytes.len();
        if self.write_pos + n > end {
            let first = end - self.write_pos;
            self.bytes[self.write_pos..].copy_from_slice(&src[..first]);
            self.bytes[..n - first].copy_from_slice(&src[first..n]);
        } else {
            self.bytes[self.write_pos..self.write_pos + n].copy_from_slice(&src[..n]);
        }

        self.write_pos = (self.write_pos + n) % end;

        if n != src.len() {
            return Err(RingError::ShortWrite {
                written: n,
                requested: src.len(),
            });
        }
        Ok(n)
    }
}

impl Writable for Vec<u8> {
    fn writable(&self) -> usize {
        isize::MAX as usize - self.len()
    }

    fn write(&mut self, src: &[u8]) -> Result<usize, RingError> {
        self.extend_from_slice(src);
        Ok(src.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_counts() {
        let ring = RingBuffer::new(8);
        assert_eq!(ring.capacity(), 8);
        assert_eq!(ring.readable(), 0);
        assert_eq!(ring.writable(), 8);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let mut ring = RingBuffer::new(8);
        assert_eq!(ring.write(&[1, 2, 3]).unwrap(), 3);
        assert_eq!(ring.readable(), 3);
        assert_eq!(ring.writable(), 5);

        let mut out = [0u8; 8];
        assert_eq!(ring.read(&mut out).unwrap(), 3);
        assert_eq!(out[..3], [1, 2, 3]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_wraps_around_the_end() {
        let mut ring = RingBuffer::new(5);
        let mut out = [0u8; 5];

        ring.write(&[1, 2, 3, 4]).unwrap();
        assert_eq!(ring.read(&mut out[..3]).unwrap(), 3);

        // write position is at 4 of 6 slots, so this straddles the end
        ring.write(&[5, 6, 7, 8]).unwrap();
        assert_eq!(ring.readable(), 5);
        assert_eq!(ring.writable(), 0);

        assert_eq!(ring.read(&mut out).unwrap(), 5);
        assert_eq!(out, [4, 5, 6, 7, 8]);
        assert_eq!(ring.writable(), 5);
    }

    #[test]
    fn test_short_write_keeps_what_fits() {
        let mut ring = RingBuffer::new(4);
        let err = ring.write(&[1, 2, 3, 4, 5, 6]).unwrap_err();
        assert_eq!(
            err,
            RingError::ShortWrite {
                written: 4,
                requested: 6
            }
        );
        assert_eq!(ring.readable(), 4);
        assert!(ring.write(&[9]).is_err());

        let mut out = [0u8; 4];
        ring.read(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_read_empty_is_error() {
        let mut ring = RingBuffer::new(4);
        let mut out = [0u8; 2];
        assert_eq!(ring.read(&mut out), Err(RingError::Empty));
        assert_eq!(ring.read(&mut []), Err(RingError::Empty));

        ring.write(&[1]).unwrap();
        assert_eq!(ring.read(&mut []), Err(RingError::Empty));
        assert_eq!(ring.readable(), 1);
    }

    #[test]
    fn test_partial_read() {
        let mut ring = RingBuffer::new(16);
        ring.write(b"hello world").unwrap();

        let mut out = [0u8; 5];
        assert_eq!(ring.read(&mut out).unwrap(), 5);
        assert_eq!(&out, b"hello");
        assert_eq!(ring.readable(), 6);
    }

    #[test]
    fn test_many_cycles_preserve_order() {
        let mut ring = RingBuffer::new(7);
        let mut expected = 0u8;
        let mut next = 0u8;
        let mut out = [0u8; 3];

        for _ in 0..100 {
            let chunk = [next, next.wrapping_add(1)];
            ring.write(&chunk).unwrap();
            next = next.wrapping_add(2);

            let n = ring.read(&mut out).unwrap();
            for byte in &out[..n] {
                assert_eq!(*byte, expected);
                expected = expected.wrapping_add(1);
            }
        }
    }
}
