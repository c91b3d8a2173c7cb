use std::{fmt, io, io::Read};

/// Reads MSB-first values of arbitrary bit width from a byte source.
///
/// Bytes are only pulled from the source when a bit of them is needed, so
/// after [align](fn@BitReader::align) the source is positioned exactly after
/// the last byte touched.
pub struct BitReader<'a, R: Read> {
    reader: &'a mut R,
    last_byte: [u8; 1],
    offset: u8,
    bits_read: u64,
}

impl<R: Read> fmt::Debug for BitReader<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitReader")
            .field("last_byte", &format_args!("{:x?}", &self.last_byte))
            .field("offset", &self.offset)
            .field("bits_read", &self.bits_read)
            .finish()
    }
}

impl<'a, R: Read> BitReader<'a, R> {
    pub fn new(reader: &'a mut R) -> BitReader<'a, R> {
        Self {
            reader,
            last_byte: [0],
            offset: 8,
            bits_read: 0,
        }
    }

    pub fn next_bit(&mut self) -> io::Result<bool> {
        if self.offset == 8 {
            self.reader.read_exact(&mut self.last_byte)?;
            self.offset = 0;
        }
        let o = 7 - self.offset;
        self.offset += 1;
        self.bits_read += 1;
        Ok((self.last_byte[0] >> o) & 0x01 == 1)
    }

    /// Reads an unsigned value of `bits` width, at most 64.
    pub fn take(&mut self, bits: u8) -> io::Result<u64> {
        if bits > 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot read {} bits into a 64 bit value", bits),
            ));
        }

        let mut out: u64 = 0;
        for _ in 0..bits {
            out = (out << 1) | self.next_bit()? as u64;
        }
        Ok(out)
    }

    /// Skips to the next byte boundary, returning the number of pad bits.
    pub fn align(&mut self) -> u8 {
        let pad_bits = 8 - self.offset;
        if pad_bits != 0 {
            self.bits_read += pad_bits as u64;
            self.offset = 8;
        }
        pad_bits
    }

    pub fn is_aligned(&self) -> bool {
        self.offset == 8
    }

    pub fn bits_read(&self) -> u64 {
        self.bits_read
    }
}
