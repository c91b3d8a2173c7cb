use jp2::{JP2Decoder, JP2Error, JP2File};
use jpc::{CodestreamError, ContiguousCodestream, SubStream, MARKER_SYMBOL_SOC};
use log::{debug, info};
use std::fmt;
use std::io;
use std::io::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Jpeg2000Error {
    #[error("unrecognized format, first bytes {prefix:02X?}")]
    UnrecognizedFormat { prefix: Vec<u8> },

    #[error("error decoding jp2 container: {0}")]
    Container(#[from] JP2Error),

    #[error("error decoding jpc codestream: {0}")]
    Codestream(#[from] CodestreamError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

// LBox 12 followed by ‘jP\040\040’
const JP2_SIGNATURE_BOX_HEADER: [u8; 8] = [0, 0, 0, 12, 106, 80, 32, 32];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Format {
    JP2,
    Codestream,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Format::JP2 => write!(f, "JP2"),
            Format::Codestream => write!(f, "JPEG 2000 codestream"),
        }
    }
}

fn read_prefix<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    buffer: &mut [u8],
) -> io::Result<usize> {
    let mut length = 0;
    while length < buffer.len() {
        match reader.read(&mut buffer[length..]) {
            Ok(0) => break,
            Ok(n) => length += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(length)
}

/// Identifies the format from the first bytes of `reader` without consuming
/// them.
///
/// A JP2 file starts with the 8 byte Signature box header, a codestream with
/// the SOC marker. Shorter inputs are matched against the bytes available.
pub fn sniff<R: io::Read + io::Seek>(reader: &mut SubStream<R>) -> Result<Format, Jpeg2000Error> {
    let mut buffer = [0; 8];

    reader.mark();
    let read = read_prefix(reader, &mut buffer);
    reader.reset()?;
    let prefix = &buffer[..read?];
    debug!("Format prefix {:02X?}", prefix);

    if prefix == JP2_SIGNATURE_BOX_HEADER {
        Ok(Format::JP2)
    } else if prefix.starts_with(&MARKER_SYMBOL_SOC) {
        Ok(Format::Codestream)
    } else {
        Err(Jpeg2000Error::UnrecognizedFormat {
            prefix: prefix.to_vec(),
        })
    }
}

/// A decoded JP2 file or raw codestream.
#[derive(Debug)]
pub enum Jpeg2000 {
    JP2(JP2File),
    Codestream(ContiguousCodestream),
}

impl Jpeg2000 {
    pub fn format(&self) -> Format {
        match self {
            Jpeg2000::JP2(_) => Format::JP2,
            Jpeg2000::Codestream(_) => Format::Codestream,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Jpeg2000::JP2(jp2) => jp2.width(),
            Jpeg2000::Codestream(codestream) => codestream.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Jpeg2000::JP2(jp2) => jp2.height(),
            Jpeg2000::Codestream(codestream) => codestream.height(),
        }
    }

    pub fn codestream(&self) -> Option<&ContiguousCodestream> {
        match self {
            Jpeg2000::JP2(jp2) => jp2.codestream(),
            Jpeg2000::Codestream(codestream) => Some(codestream),
        }
    }

    /// Precision in bits of each component.
    pub fn precisions(&self) -> Vec<u8> {
        match self.codestream() {
            Some(codestream) => (0..codestream.no_components() as usize)
                .filter_map(|i| codestream.precision(i))
                .collect(),
            None => vec![],
        }
    }
}

/// Sniffs the format at the current position of `reader` and decodes it.
pub fn decode<R: io::Read + io::Seek>(reader: &mut R) -> Result<Jpeg2000, Jpeg2000Error> {
    let mut reader = SubStream::new(reader)?;

    let format = sniff(&mut reader)?;
    info!("Decoding {}", format);

    match format {
        Format::JP2 => {
            let mut decoder = JP2Decoder::from_sub_stream(reader);
            decoder.read_codestream()?;
            Ok(Jpeg2000::JP2(decoder.into_jp2_file()?))
        }
        Format::Codestream => Ok(Jpeg2000::Codestream(ContiguousCodestream::decode(
            &mut reader,
        )?)),
    }
}
