//! Dataset packing and unpacking.
//!
//! [`DataBlockWriter`] builds a data container in place inside a fixed
//! staging buffer; [`DataReader`] walks a received payload with the same
//! primitives.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;

use super::container::{CodecError, ContainerHeader, ContainerType};

/// Longest string (in UTF-16 units, NUL excluded) an MTP string can carry.
pub const MAX_STRING_UNITS: usize = 254;

/// Calendar timestamp as packed into MTP date-time strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MtpDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl MtpDateTime {
    /// Format as `YYYYMMDDTHHMMSS`.
    ///
    /// Digits are computed field by field; out-of-range fields are not
    /// validated and produce whatever characters the arithmetic yields.
    pub fn format(&self) -> String {
        let digit = |v: u16| char::from(b'0'.wrapping_add((v % 256) as u8));
        let year = self.year;
        let mut s = String::with_capacity(15);
        s.push(digit(year / 1000));
        s.push(digit((year / 100) % 10));
        s.push(digit((year / 10) % 10));
        s.push(digit(year % 10));
        for (i, v) in [self.month, self.day, self.hour, self.minute, self.second]
            .into_iter()
            .enumerate()
        {
            if i == 2 {
                s.push('T');
            }
            s.push(digit(v as u16 / 10));
            s.push(digit(v as u16 % 10));
        }
        s
    }
}

/// Open array whose element count lives in the block.
#[derive(Debug, Clone, Copy)]
pub struct ArrayMark {
    count_offset: usize,
    count: u32,
}

/// Writer that assembles a data container inside a fixed buffer.
pub struct DataBlockWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> DataBlockWriter<'a> {
    /// Start a data block answering command `code` / `transaction_id`.
    ///
    /// The header length is left at zero until [`finish`](Self::finish).
    pub fn start(buf: &'a mut [u8], code: u16, transaction_id: u32) -> Result<Self, CodecError> {
        ContainerHeader {
            length: 0,
            kind: ContainerType::Data,
            code,
            transaction_id,
        }
        .write_to(buf)?;
        Ok(Self {
            buf,
            pos: ContainerHeader::SIZE,
        })
    }

    fn reserve(&mut self, n: usize) -> Result<&mut [u8], CodecError> {
        if self.pos + n > self.buf.len() {
            return Err(CodecError::BufferFull {
                capacity: self.buf.len(),
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&mut self.buf[start..start + n])
    }

    pub fn put_bytes(&mut self, data: &[u8]) -> Result<(), CodecError> {
        self.reserve(data.len())?.copy_from_slice(data);
        Ok(())
    }

    pub fn put_u8(&mut self, v: u8) -> Result<(), CodecError> {
        self.reserve(1)?[0] = v;
        Ok(())
    }

    pub fn put_u16(&mut self, v: u16) -> Result<(), CodecError> {
        LittleEndian::write_u16(self.reserve(2)?, v);
        Ok(())
    }

    pub fn put_u32(&mut self, v: u32) -> Result<(), CodecError> {
        LittleEndian::write_u32(self.reserve(4)?, v);
        Ok(())
    }

    pub fn put_u64(&mut self, v: u64) -> Result<(), CodecError> {
        LittleEndian::write_u64(self.reserve(8)?, v);
        Ok(())
    }

    /// Pack a complete u16 array: 4-byte count followed by the elements.
    pub fn put_u16_array(&mut self, values: &[u16]) -> Result<(), CodecError> {
        self.put_u32(values.len() as u32)?;
        for &v in values {
            self.put_u16(v)?;
        }
        Ok(())
    }

    /// Pack an MTP string.
    ///
    /// Non-empty strings are a 1-byte unit count (NUL included) followed by
    /// UTF-16LE units ending in NUL; the empty string is a single zero byte.
    pub fn put_string(&mut self, s: &str) -> Result<(), CodecError> {
        let units: Vec<u16> = s.encode_utf16().take(MAX_STRING_UNITS).collect();
        if units.is_empty() {
            return self.put_u8(0);
        }
        self.put_u8((units.len() + 1) as u8)?;
        for u in units {
            self.put_u16(u)?;
        }
        self.put_u16(0)
    }

    pub fn put_date_time(&mut self, time: &MtpDateTime) -> Result<(), CodecError> {
        self.put_string(&time.format())
    }

    /// Reserve a zero element count and return a mark for appending.
    pub fn start_array(&mut self) -> Result<ArrayMark, CodecError> {
        let count_offset = self.pos;
        self.put_u32(0)?;
        Ok(ArrayMark {
            count_offset,
            count: 0,
        })
    }

    /// Append a u32 element, bumping the live count in the block.
    pub fn push_array_u32(&mut self, mark: &mut ArrayMark, v: u32) -> Result<(), CodecError> {
        self.put_u32(v)?;
        mark.count += 1;
        let at = mark.count_offset;
        LittleEndian::write_u32(&mut self.buf[at..at + 4], mark.count);
        Ok(())
    }

    /// Close an open array. The count is already up to date.
    pub fn finish_array(&mut self, mark: ArrayMark) -> u32 {
        mark.count
    }

    /// Bytes written so far, header included.
    /// Patch the header length and return the total container size.
    pub fn finish(self) -> usize {
        LittleEndian::write_u32(&mut self.buf[0..4], self.pos as u32);
        self.pos
    }
}

/// Sequential reader over a dataset payload.
pub struct DataReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> DataReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    fn short(&self, wanted: usize) -> CodecError {
        let data = self.cursor.get_ref();
        CodecError::BufferTooSmall {
            expected: self.cursor.position() as usize + wanted,
            actual: data.len(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.cursor
            .get_ref()
            .len()
            .saturating_sub(self.cursor.position() as usize)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.cursor.read_u8().map_err(|_| self.short(1))
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| self.short(2))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| self.short(4))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| self.short(8))
    }

    pub fn read_u16_array(&mut self) -> Result<Vec<u16>, CodecError> {
        let count = self.read_u32()? as usize;
        if count * 2 > self.remaining() {
            return Err(self.short(count * 2));
        }
        (0..count).map(|_| self.read_u16()).collect()
    }

    pub fn read_u32_array(&mut self) -> Result<Vec<u32>, CodecError> {
        let count = self.read_u32()? as usize;
        if count * 4 > self.remaining() {
            return Err(self.short(count * 4));
        }
        (0..count).map(|_| self.read_u32()).collect()
    }

    /// Read an MTP string, dropping the trailing NUL.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let count = self.read_u8()? as usize;
        if count == 0 {
            return Ok(String::new());
        }
        let mut units = Vec::with_capacity(count);
        for _ in 0..count {
            units.push(self.read_u16()?);
        }
        if units.last() != Some(&0) {
            return Err(CodecError::MalformedString);
        }
        units.pop();
        String::from_utf16(&units).map_err(|_| CodecError::MalformedString)
    }
}
