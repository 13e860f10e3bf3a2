//! Bounds-checked big-endian cursor with an explicit bit-packing mode
//!
//! [`ByteCursor`] wraps any byte container and tracks a single offset. Every
//! read or write is checked against the end of the container first, so a
//! short payload surfaces as [`CursorError::OutOfRange`] instead of garbage
//! or a panic. The container never grows.
//!
//! Bit-level fields are written through a [`BitCursor`], obtained with
//! [`ByteCursor::start_bit_access`]. The bit cursor mutably borrows its byte
//! cursor, so byte-mode calls cannot be interleaved with bit-mode calls.
//! Ending bit access rounds the position up to the next whole byte.

use crate::error::{CursorError, RingError};
use crate::ring::Readable;

/// Byte that terminates strings on the wire
pub const STRING_TERMINATOR: u8 = 0;

/// Cursor over a fixed-length byte container
#[derive(Debug, Clone)]
pub struct ByteCursor<B> {
    bytes: B,
    offset: usize,
}

impl ByteCursor<Vec<u8>> {
    /// Creates a cursor over a zeroed buffer of the given length
    pub fn with_length(length: usize) -> Self {
        Self::new(vec![0; length])
    }
}

impl<B: AsRef<[u8]>> ByteCursor<B> {
    pub fn new(bytes: B) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Moves the cursor to an absolute position. The position may equal the
    /// length (cursor at end) but not exceed it.
    pub fn set_offset(&mut self, offset: usize) -> Result<(), CursorError> {
        if offset > self.len() {
            return Err(CursorError::OutOfRange {
                offset: self.offset,
                requested: offset.saturating_sub(self.offset),
                length: self.len(),
            });
        }
        self.offset = offset;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bytes.as_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining(&self) -> usize {
        self.len() - self.offset
    }

    pub fn get_ref(&self) -> &B {
        &self.bytes
    }

    pub fn into_inner(self) -> B {
        self.bytes
    }

    fn check(&self, n: usize) -> Result<(), CursorError> {
        if self.remaining() < n {
            return Err(CursorError::OutOfRange {
                offset: self.offset,
                requested: n,
                length: self.len(),
            });
        }
        Ok(())
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CursorError> {
        self.check(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes.as_ref()[self.offset..self.offset + N]);
        self.offset += N;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), CursorError> {
        self.check(n)?;
        self.offset += n;
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, CursorError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    pub fn get_u32(&mut self) -> Result<u32, CursorError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    pub fn get_u64(&mut self) -> Result<u64, CursorError> {
        Ok(u64::from_be_bytes(self.take()?))
    }

    pub fn get_bool(&mut self) -> Result<bool, CursorError> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CursorError::InvalidBoolean(other)),
        }
    }

    /// Reads `n` bytes and returns them as a borrowed slice
    pub fn get_bytes(&mut self, n: usize) -> Result<&[u8], CursorError> {
        self.check(n)?;
        let start = self.offset;
        self.offset += n;
        Ok(&self.bytes.as_ref()[start..start + n])
    }

    /// Reads a NUL-terminated string. The terminator is consumed but not
    /// returned. Invalid UTF-8 is replaced rather than rejected.
    pub fn get_cstring(&mut self) -> Result<String, CursorError> {
        let tail = &self.bytes.as_ref()[self.offset..];
        let end = tail
            .iter()
            .position(|&b| b == STRING_TERMINATOR)
            .ok_or(CursorError::MissingTerminator(self.offset))?;

        let value = String::from_utf8_lossy(&tail[..end]).into_owned();
        self.offset += end + 1;
        Ok(value)
    }

    /// Enters bit mode at the current byte offset
    pub fn start_bit_access(&mut self) -> BitCursor<'_, B> {
        let bit_offset = self.offset * 8;
        BitCursor {
            cursor: self,
            bit_offset,
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> ByteCursor<B> {
    fn put<const N: usize>(&mut self, value: [u8; N]) -> Result<(), CursorError> {
        self.check(N)?;
        self.bytes.as_mut()[self.offset..self.offset + N].copy_from_slice(&value);
        self.offset += N;
        Ok(())
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), CursorError> {
        self.put([value])
    }

    pub fn put_u16(&mut self, value: u16) -> Result<(), CursorError> {
        self.put(value.to_be_bytes())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<(), CursorError> {
        self.put(value.to_be_bytes())
    }

    pub fn put_u64(&mut self, value: u64) -> Result<(), CursorError> {
        self.put(value.to_be_bytes())
    }

    pub fn put_bool(&mut self, value: bool) -> Result<(), CursorError> {
        self.put_u8(u8::from(value))
    }

    pub fn put_bytes(&mut self, value: &[u8]) -> Result<(), CursorError> {
        self.check(value.len())?;
        self.bytes.as_mut()[self.offset..self.offset + value.len()].copy_from_slice(value);
        self.offset += value.len();
        Ok(())
    }

    /// Writes the string followed by a terminator
    pub fn put_cstring(&mut self, value: &str) -> Result<(), CursorError> {
        if value.as_bytes().contains(&STRING_TERMINATOR) {
            return Err(CursorError::InteriorTerminator);
        }
        self.check(value.len() + 1)?;
        self.put_bytes(value.as_bytes())?;
        self.put_u8(STRING_TERMINATOR)
    }
}

impl<B: AsRef<[u8]>> Readable for ByteCursor<B> {
    fn readable(&self) -> usize {
        self.remaining()
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<usize, RingError> {
        let n = dst.len().min(self.remaining());
        if n == 0 {
            return Err(RingError::Empty);
        }
        dst[..n].copy_from_slice(&self.bytes.as_ref()[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

/// Bit-mode view of a [`ByteCursor`]
///
/// Bits are packed most-significant first and may straddle byte boundaries.
/// Dropping the bit cursor (or calling [`BitCursor::end_bit_access`]) rounds
/// the underlying byte offset up to the next byte boundary.
pub struct BitCursor<'a, B: AsRef<[u8]>> {
    cursor: &'a mut ByteCursor<B>,
    bit_offset: usize,
}

impl<B: AsRef<[u8]>> BitCursor<'_, B> {
    pub fn bit_offset(&self) -> usize {
        self.bit_offset
    }

    fn check_bits(&self, n: u32) -> Result<(), CursorError> {
        if n > 32 {
            return Err(CursorError::TooManyBits(n));
        }
        let bit_length = self.cursor.len() * 8;
        if self.bit_offset + n as usize > bit_length {
            return Err(CursorError::BitsOutOfRange {
                bit_offset: self.bit_offset,
                requested: n as usize,
                bit_length,
            });
        }
        Ok(())
    }

    /// Reads `n` bits (at most 32) as an unsigned value
    pub fn read_bits(&mut self, n: u32) -> Result<u32, CursorError> {
        self.check_bits(n)?;

        let bytes = self.cursor.bytes.as_ref();
        let mut value = 0u32;
        let mut remaining = n as usize;
        while remaining > 0 {
            let byte = bytes[self.bit_offset / 8];
            let free = 8 - self.bit_offset % 8;
            let take = free.min(remaining);
            let chunk = (byte >> (free - take)) & low_mask(take);

            value = (value << take) | u32::from(chunk);
            self.bit_offset += take;
            remaining -= take;
        }
        Ok(value)
    }

    /// Leaves bit mode
    pub fn end_bit_access(self) {}
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BitCursor<'_, B> {
    /// Packs the low `n` bits of `value` (at most 32)
    pub fn write_bits(&mut self, value: u32, n: u32) -> Result<(), CursorError> {
        self.check_bits(n)?;

        let bytes = self.cursor.bytes.as_mut();
        let mut remaining = n as usize;
        while remaining > 0 {
            let index = self.bit_offset / 8;
            let free = 8 - self.bit_offset % 8;
            let take = free.min(remaining);
            let chunk = (value >> (remaining - take)) as u8 & low_mask(take);
            let shift = free - take;
            let mask = low_mask(take) << shift;

            bytes[index] = (bytes[index] & !mask) | (chunk << shift);
            self.bit_offset += take;
            remaining -= take;
        }
        Ok(())
    }
}

impl<B: AsRef<[u8]>> Drop for BitCursor<'_, B> {
    fn drop(&mut self) {
        // Rounding up never passes the end: bit_offset is bounded by len * 8.
        self.cursor.offset = self.bit_offset.div_ceil(8);
    }
}

fn low_mask(bits: usize) -> u8 {
    if bits >= 8 {
        0xFF
    } else {
        (1u8 << bits) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_big_endian() {
        let mut cursor = ByteCursor::with_length(15);
        cursor.put_u8(0xAB).unwrap();
        cursor.put_u16(0x0102).unwrap();
        cursor.put_u32(0x0304_0506).unwrap();
        cursor.put_u64(0x0708_090A_0B0C_0D0E).unwrap();
        assert_eq!(cursor.remaining(), 0);

        assert_eq!(
            cursor.get_ref().as_slice(),
            &[0xAB, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14]
        );

        cursor.set_offset(0).unwrap();
        assert_eq!(cursor.get_u8().unwrap(), 0xAB);
        assert_eq!(cursor.get_u16().unwrap(), 0x0102);
        assert_eq!(cursor.get_u32().unwrap(), 0x0304_0506);
        assert_eq!(cursor.get_u64().unwrap(), 0x0708_090A_0B0C_0D0E);
    }

    #[test]
    fn test_reads_past_end_fail_without_moving() {
        let mut cursor = ByteCursor::new([1u8, 2, 3]);
        cursor.skip(2).unwrap();

        let err = cursor.get_u16().unwrap_err();
        assert_eq!(
            err,
            CursorError::OutOfRange {
                offset: 2,
                requested: 2,
                length: 3
            }
        );
        assert_eq!(cursor.offset(), 2);
        assert_eq!(cursor.get_u8().unwrap(), 3);
        assert!(cursor.get_u8().is_err());
        assert!(cursor.skip(1).is_err());
    }

    #[test]
    fn test_writes_past_end_fail() {
        let mut cursor = ByteCursor::with_length(3);
        assert!(cursor.put_u32(7).is_err());
        assert_eq!(cursor.offset(), 0);
        assert!(cursor.put_u16(7).is_ok());
        assert!(cursor.put_u16(7).is_err());
        assert!(cursor.set_offset(4).is_err());
    }

    #[test]
    fn test_cstring() {
        let mut cursor = ByteCursor::with_length(32);
        cursor.put_cstring("praise sino").unwrap();
        assert_eq!(cursor.offset(), 12);
        assert_eq!(cursor.get_ref()[11], STRING_TERMINATOR);

        cursor.set_offset(0).unwrap();
        assert_eq!(cursor.get_cstring().unwrap(), "praise sino");
        assert_eq!(cursor.offset(), 12);
    }

    #[test]
    fn test_cstring_errors() {
        let mut cursor = ByteCursor::new(b"abc".to_vec());
        assert_eq!(cursor.get_cstring(), Err(CursorError::MissingTerminator(0)));

        let mut cursor = ByteCursor::with_length(4);
        assert!(cursor.put_cstring("abcd").is_err());
        assert_eq!(
            cursor.put_cstring("a\0b"),
            Err(CursorError::InteriorTerminator)
        );
    }

    #[test]
    fn test_bool() {
        let mut cursor = ByteCursor::with_length(2);
        cursor.put_bool(true).unwrap();
        cursor.put_bool(false).unwrap();
        cursor.set_offset(0).unwrap();
        assert!(cursor.get_bool().unwrap());
        assert!(!cursor.get_bool().unwrap());

        let mut bad = ByteCursor::new([2u8]);
        assert_eq!(bad.get_bool(), Err(CursorError::InvalidBoolean(2)));
    }

    #[test]
    fn test_bits_pack_msb_first_across_bytes() {
        let mut cursor = ByteCursor::with_length(3);
        {
            let mut bits = cursor.start_bit_access();
            bits.write_bits(0b1, 1).unwrap();
            bits.write_bits(0b01, 2).unwrap();
            bits.write_bits(0b1_0110_1001, 9).unwrap();
            assert_eq!(bits.bit_offset(), 12);
            bits.end_bit_access();
        }
        // 1 01 101101001 0000 -> 1011 0110 1001 0000
        assert_eq!(cursor.get_ref()[..2], [0b1011_0110, 0b1001_0000]);
        assert_eq!(cursor.offset(), 2);

        cursor.put_u8(0x7F).unwrap();
        assert_eq!(cursor.get_ref()[2], 0x7F);
    }

    #[test]
    fn test_bit_access_starts_at_byte_offset() {
        let mut cursor = ByteCursor::with_length(4);
        cursor.put_u8(0xFF).unwrap();

        let mut bits = cursor.start_bit_access();
        assert_eq!(bits.bit_offset(), 8);
        bits.write_bits(0x3, 2).unwrap();
        drop(bits);

        assert_eq!(cursor.offset(), 2);
        assert_eq!(cursor.get_ref()[..2], [0xFF, 0b1100_0000]);
    }

    #[test]
    fn test_read_bits_mirrors_write_bits() {
        let mut cursor = ByteCursor::with_length(8);
        let fields = [(5u32, 3u32), (1, 1), (1023, 10), (0xDEAD_BEEF, 32), (0, 4)];
        {
            let mut bits = cursor.start_bit_access();
            for (value, n) in fields {
                bits.write_bits(value, n).unwrap();
            }
        }
        assert_eq!(cursor.offset(), 7);

        cursor.set_offset(0).unwrap();
        let mut bits = cursor.start_bit_access();
        for (value, n) in fields {
            assert_eq!(bits.read_bits(n).unwrap(), value);
        }
    }

    #[test]
    fn test_bits_out_of_range() {
        let mut cursor = ByteCursor::with_length(1);
        let mut bits = cursor.start_bit_access();
        bits.write_bits(0, 6).unwrap();
        assert!(matches!(
            bits.write_bits(0, 3),
            Err(CursorError::BitsOutOfRange { .. })
        ));
        assert_eq!(bits.write_bits(0, 33), Err(CursorError::TooManyBits(33)));
        bits.write_bits(0b11, 2).unwrap();
        bits.end_bit_access();
        assert_eq!(cursor.offset(), 1);
        assert_eq!(cursor.get_ref()[0], 0b0000_0011);
    }

    #[test]
    fn test_readable_source() {
        let mut cursor = ByteCursor::new(vec![1u8, 2, 3]);
        let mut dst = [0u8; 2];
        assert_eq!(cursor.read(&mut dst).unwrap(), 2);
        assert_eq!(cursor.readable(), 1);
        assert_eq!(cursor.read(&mut dst).unwrap(), 1);
        assert_eq!(cursor.read(&mut dst), Err(RingError::Empty));

        let mut cursor = ByteCursor::new(vec![1u8]);
        assert_eq!(cursor.read(&mut []), Err(RingError::Empty));
        assert_eq!(cursor.readable(), 1);
    }
}
