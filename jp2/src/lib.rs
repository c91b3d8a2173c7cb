use jpc::{CodestreamError, ContiguousCodestream, SubStream};
use log::{debug, info};
use std::fmt;
use std::io;
use std::io::prelude::*;
use std::mem;
use thiserror::Error;

mod colour_specification;
mod header;
mod palette;
mod resolution;

pub use colour_specification::{
    ColourSpecificationBox, ColourSpecificationMethods, EnumeratedColourSpaces,
};
pub use header::{
    BitDepth, BitsPerComponentBox, Channel, ChannelAssociation, ChannelDefinitionBox,
    ChannelTypes, HeaderSuperBox, ImageHeaderBox, JP2Box,
};
pub use palette::{ComponentMap, ComponentMapType, ComponentMappingBox, PaletteBox};
pub use resolution::{GridResolutionBox, ResolutionSuperBox};

#[derive(Debug, Error)]
pub enum JP2Error {
    #[error("expected signature box, found box type {:?} at offset {offset}", String::from_utf8_lossy(.box_type))]
    MissingSignature { box_type: BoxType, offset: u64 },

    #[error("unexpected duplicate signature box at offset {offset}")]
    DuplicateSignature { offset: u64 },

    #[error("expected file type box, found box type {:?} at offset {offset}", String::from_utf8_lossy(.box_type))]
    MissingFileType { box_type: BoxType, offset: u64 },

    #[error("unexpected duplicate box type {:?} at offset {offset}", String::from_utf8_lossy(.box_type))]
    DuplicateBox { box_type: BoxType, offset: u64 },

    #[error("contiguous codestream box before header box at offset {offset}")]
    CodestreamBeforeHeader { offset: u64 },

    #[error("box type {:?} missing", String::from_utf8_lossy(.box_type))]
    BoxMissing { box_type: BoxType },

    #[error("unexpected box type {:?} at offset {offset}", String::from_utf8_lossy(.box_type))]
    BoxUnexpected { box_type: BoxType, offset: u64 },

    #[error("malformed box type {:?} at offset {offset}: {reason}", String::from_utf8_lossy(.box_type))]
    BoxMalformed {
        box_type: BoxType,
        offset: u64,
        reason: String,
    },

    #[error("box type {:?} at offset {offset} declares {length} bytes but {consumed} were decoded", String::from_utf8_lossy(.box_type))]
    BoxLengthMismatch {
        box_type: BoxType,
        offset: u64,
        length: u64,
        consumed: u64,
    },

    #[error("box type {:?} at offset {offset} declares {length} bytes but only {remaining} remain", String::from_utf8_lossy(.box_type))]
    BoxOverrun {
        box_type: BoxType,
        offset: u64,
        length: u64,
        remaining: u64,
    },

    #[error("reserved box length {length} at offset {offset}")]
    ReservedLength { length: u32, offset: u64 },

    #[error("extended box length {length} at offset {offset} is out of range")]
    LengthOverflow { length: u64, offset: u64 },

    #[error("invalid signature {signature:?} at offset {offset}")]
    InvalidSignature { signature: [u8; 4], offset: u64 },

    #[error("'jp2 ' not found in compatibility list '{}'", .compatibility_list.join(", "))]
    NotCompatible { compatibility_list: Vec<String> },

    #[error("unsupported compression type {compression_type} at offset {offset}")]
    UnsupportedCompression { compression_type: u8, offset: u64 },

    #[error("unsupported packed palette column of {bit_depth} bits, signed {signed}, at offset {offset}")]
    UnsupportedPackedWidth {
        bit_depth: u8,
        signed: bool,
        offset: u64,
    },

    #[error("decoder used after a failed parse")]
    Aborted,

    #[error(transparent)]
    Codestream(#[from] CodestreamError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BoxType = [u8; 4];

// jP\040\040 (0x6A50 2020)
pub const BOX_TYPE_SIGNATURE: BoxType = [106, 80, 32, 32];
pub const BOX_TYPE_FILE_TYPE: BoxType = [102, 116, 121, 112];
pub const BOX_TYPE_HEADER: BoxType = [106, 112, 50, 104];
pub const BOX_TYPE_IMAGE_HEADER: BoxType = [105, 104, 100, 114];
pub const BOX_TYPE_BITS_PER_COMPONENT: BoxType = [98, 112, 99, 99];
pub const BOX_TYPE_COLOUR_SPECIFICATION: BoxType = [99, 111, 108, 114];
pub const BOX_TYPE_PALETTE: BoxType = [112, 99, 108, 114];
pub const BOX_TYPE_COMPONENT_MAPPING: BoxType = [99, 109, 97, 112];
pub const BOX_TYPE_CHANNEL_DEFINITION: BoxType = [99, 100, 101, 102];
pub const BOX_TYPE_RESOLUTION: BoxType = [114, 101, 115, 32];
pub const BOX_TYPE_CAPTURE_RESOLUTION: BoxType = [114, 101, 115, 99];
pub const BOX_TYPE_DEFAULT_DISPLAY_RESOLUTION: BoxType = [114, 101, 115, 100];
pub const BOX_TYPE_CONTIGUOUS_CODESTREAM: BoxType = [106, 112, 50, 99];
pub const BOX_TYPE_INTELLECTUAL_PROPERTY: BoxType = [106, 112, 50, 105];
pub const BOX_TYPE_XML: BoxType = [120, 109, 108, 32];
pub const BOX_TYPE_UUID: BoxType = [117, 117, 105, 100];
pub const BOX_TYPE_UUID_INFO: BoxType = [117, 105, 110, 102];
pub const BOX_TYPE_UUID_LIST: BoxType = [117, 108, 115, 116];
pub const BOX_TYPE_DATA_ENTRY_URL: BoxType = [117, 114, 108, 32];

// jp2\040
const BRAND_JP2: [u8; 4] = [106, 112, 50, 32];

// <CR><LF><0x87><LF> (0x0D0A 870A).
pub const SIGNATURE_MAGIC: [u8; 4] = [13, 10, 135, 10];

/// Box types known to this reader.
///
/// Intellectual property, XML and UUID boxes are recognised but carry nothing
/// this reader interprets, so they are skipped like unknown boxes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoxTypes {
    Signature,
    FileType,
    Header,
    ImageHeader,
    BitsPerComponent,
    ColourSpecification,
    Palette,
    ComponentMapping,
    ChannelDefinition,
    Resolution,
    CaptureResolution,
    DefaultDisplayResolution,
    ContiguousCodestream,
    IntellectualProperty,
    Xml,
    Uuid,
    UUIDInfo,
    UUIDList,
    DataEntryURL,
    Unknown,
}

impl fmt::Display for BoxTypes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl BoxTypes {
    pub fn new(value: BoxType) -> BoxTypes {
        match value {
            BOX_TYPE_SIGNATURE => BoxTypes::Signature,
            BOX_TYPE_FILE_TYPE => BoxTypes::FileType,
            BOX_TYPE_HEADER => BoxTypes::Header,
            BOX_TYPE_IMAGE_HEADER => BoxTypes::ImageHeader,
            BOX_TYPE_BITS_PER_COMPONENT => BoxTypes::BitsPerComponent,
            BOX_TYPE_COLOUR_SPECIFICATION => BoxTypes::ColourSpecification,
            BOX_TYPE_PALETTE => BoxTypes::Palette,
            BOX_TYPE_COMPONENT_MAPPING => BoxTypes::ComponentMapping,
            BOX_TYPE_CHANNEL_DEFINITION => BoxTypes::ChannelDefinition,

            BOX_TYPE_RESOLUTION => BoxTypes::Resolution,
            BOX_TYPE_CAPTURE_RESOLUTION => BoxTypes::CaptureResolution,
            BOX_TYPE_DEFAULT_DISPLAY_RESOLUTION => BoxTypes::DefaultDisplayResolution,

            BOX_TYPE_CONTIGUOUS_CODESTREAM => BoxTypes::ContiguousCodestream,
            BOX_TYPE_INTELLECTUAL_PROPERTY => BoxTypes::IntellectualProperty,
            BOX_TYPE_XML => BoxTypes::Xml,

            BOX_TYPE_UUID => BoxTypes::Uuid,
            BOX_TYPE_UUID_INFO => BoxTypes::UUIDInfo,
            BOX_TYPE_UUID_LIST => BoxTypes::UUIDList,
            BOX_TYPE_DATA_ENTRY_URL => BoxTypes::DataEntryURL,
            _ => BoxTypes::Unknown,
        }
    }
}

/// JPEG 2000 box trait.
///
/// The building-block of the JP2 file format is called a box.
///
/// All information contained within the JP2 file is encapsulated in boxes.
///
/// ISO/IEC 15444-1 / ITU T-800 defines several types of boxes;
/// the definition of each specific box type defines the kinds of information
/// that may be found within a box of that type. Some boxes will be defined to
/// contain other boxes.
///
/// `decode` runs inside a window of exactly the box's data length, see
/// [decode_box_payload].
///
/// For more information, see ISO/IEC 15444-1 / ITU T-800 Appendix I.4.
pub trait JBox {
    fn new(header: &BoxHeader) -> Self
    where
        Self: Sized;

    fn identifier(&self) -> BoxType;
    fn length(&self) -> u64;
    fn offset(&self) -> u64;

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut SubStream<R>)
        -> Result<(), JP2Error>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxHeader {
    // Byte offset of LBox.
    offset: u64,

    // Box Length
    //
    // This field specifies the length of the box, stored as a 4-byte big
    // endian unsigned integer.
    //
    // This value includes all of the fields of the box, including the length
    // and type. Kept here as the length of the box contents alone.
    box_length: u64,

    // Box Type
    //
    // This field specifies the type of information found in the DBox field.
    //
    // The value of this field is encoded as a 4-byte big endian unsigned
    // integer. However, boxes are generally referred to by an ISO 646
    // character string translation of the integer value.
    box_type: BoxType,

    // 8, or 16 with XLBox
    header_length: u8,
}

impl BoxHeader {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Byte offset of the box contents.
    pub fn data_offset(&self) -> u64 {
        self.offset + self.header_length as u64
    }

    /// Length of the box contents.
    pub fn box_length(&self) -> u64 {
        self.box_length
    }

    pub fn box_type(&self) -> BoxType {
        self.box_type
    }

    pub fn box_type_name(&self) -> String {
        String::from_utf8_lossy(&self.box_type).into_owned()
    }

    pub fn header_length(&self) -> u8 {
        self.header_length
    }
}

/// Decodes the LBox, TBox and optional XLBox fields at the current position.
///
/// The contents must fit in the innermost window of `reader`.
pub fn decode_box_header<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
) -> Result<BoxHeader, JP2Error> {
    let offset = reader.absolute_position();
    let mut box_type: BoxType = [0; 4];

    let lbox = reader.read_u32()?;
    reader.read_exact(&mut box_type)?;

    let (box_length, header_length) = match lbox {
        // If the value of this field is 0, then the length of the box was not
        // known when the LBox field was written. In this case, this box
        // contains all bytes up to the end of the file (or its superbox).
        0 => (reader.remaining(), 8),

        // If the value of this field is 1, then the XLBox field shall exist
        // and the value of that field shall be the actual length of the box,
        // including the LBox, TBox and XLBox fields.
        1 => {
            let xl_length = reader.read_u64()?;
            if xl_length < 16 || xl_length > i64::MAX as u64 {
                return Err(JP2Error::LengthOverflow {
                    length: xl_length,
                    offset,
                });
            }
            (xl_length - 16, 16)
        }

        // The values 2–7 are reserved for ISO use.
        2..=7 => {
            return Err(JP2Error::ReservedLength {
                length: lbox,
                offset,
            })
        }

        // Subtract LBox and TBox from length
        _ => (lbox as u64 - 8, 8),
    };

    if box_length > reader.remaining() {
        return Err(JP2Error::BoxOverrun {
            box_type,
            offset,
            length: box_length,
            remaining: reader.remaining(),
        });
    }

    let header = BoxHeader {
        offset,
        box_length,
        box_type,
        header_length,
    };
    debug!(
        "Box {:?} of {} bytes at byte offset {}",
        header.box_type_name(),
        box_length,
        offset
    );

    Ok(header)
}

/// Decodes the contents of the box described by `header` inside a window of
/// its length, failing unless the decoder consumes it exactly.
pub fn decode_box_payload<B: JBox, R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    header: &BoxHeader,
) -> Result<B, JP2Error> {
    let mut jbox = B::new(header);
    info!(
        "{}Box start at byte offset {}",
        BoxTypes::new(header.box_type),
        jbox.offset()
    );

    reader.with_window(header.box_length, |reader| -> Result<(), JP2Error> {
        jbox.decode(reader)?;

        if reader.remaining() != 0 {
            return Err(JP2Error::BoxLengthMismatch {
                box_type: header.box_type,
                offset: header.offset,
                length: header.box_length,
                consumed: header.box_length - reader.remaining(),
            });
        }

        Ok(())
    })?;

    info!(
        "{}Box finish at byte offset {}",
        BoxTypes::new(header.box_type),
        reader.absolute_position()
    );

    Ok(jbox)
}

pub(crate) fn skip_box<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    header: &BoxHeader,
) -> Result<(), JP2Error> {
    debug!(
        "Skipping box {:?} of {} bytes at byte offset {}",
        header.box_type_name(),
        header.box_length,
        header.offset
    );
    reader.skip(header.box_length)?;
    Ok(())
}

/// JPEG 2000 Signature box.
///
/// The Signature box identifies that the format of this file was defined by the
/// JPEG 2000 Recommendation | International Standard, as well as provides a
/// small amount of information which can help determine the validity of the rest
/// of the file.
///
/// The Signature box shall be the first box in the file, and all files shall
/// contain one and only one Signature box.
///
/// For file verification purposes, this box can be considered a fixed-length
/// 12-byte string which shall have the value: 0x0000 000C 6A50 2020 0D0A 870A.
///
/// For more information, see ISO/IEC 15444-1 / ITU T-800 Appendix I.5.1.
#[derive(Debug, Default)]
pub struct SignatureBox {
    length: u64,
    offset: u64,
}

impl SignatureBox {
    pub fn signature(&self) -> [u8; 4] {
        SIGNATURE_MAGIC
    }
}

impl JBox for SignatureBox {
    fn new(header: &BoxHeader) -> Self {
        SignatureBox {
            length: header.box_length(),
            offset: header.data_offset(),
        }
    }

    // The type of the JPEG 2000 Signature box shall be ‘jP\040\040’ (0x6A50 2020)
    fn identifier(&self) -> BoxType {
        BOX_TYPE_SIGNATURE
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    // The contents of this box shall be the 4-byte character string ‘<CR><LF><0x87><LF>’ (0x0D0A 870A).
    fn decode<R: io::Read + io::Seek>(
        &mut self,
        reader: &mut SubStream<R>,
    ) -> Result<(), JP2Error> {
        if self.length != 4 {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_SIGNATURE,
                offset: self.offset,
                reason: format!("signature of {} bytes", self.length),
            });
        }

        let mut buffer: [u8; 4] = [0; 4];
        reader.read_exact(&mut buffer)?;

        if buffer != SIGNATURE_MAGIC {
            return Err(JP2Error::InvalidSignature {
                signature: buffer,
                offset: self.offset,
            });
        };

        Ok(())
    }
}

type CompatibilityList = Vec<[u8; 4]>;

/// File Type box.
///
/// The File Type box completely defines all of the contents of this file, as
/// well as a separate list of readers with which this file is compatible, and
/// thus the file can be properly interpreted within the scope of that other
/// standard.
///
/// This box shall immediately follow the Signature box.
///
/// All files shall contain one and only one File Type box
///
/// For more information, see ISO/IEC 15444-1 / ITU T-800 Appendix I.5.2.
#[derive(Debug, Default)]
pub struct FileTypeBox {
    length: u64,
    offset: u64,
    brand: [u8; 4],
    min_version: [u8; 4],
    compatibility_list: CompatibilityList,
}

impl FileTypeBox {
    /// Brand.
    ///
    /// This field specifies the Recommendation | International Standard which
    /// completely defines this file.
    //
    // If the value of the Brand field is not ‘jp2\040’, then a value of
    // ‘jp2\040’ in the Compatibility list indicates that a JP2 reader can
    // interpret the file in some manner as intended by the creator of the
    // file.
    pub fn brand(&self) -> String {
        String::from_utf8_lossy(&self.brand).into_owned()
    }

    /// Minor version.
    ///
    /// The value of this field shall be zero. However, readers shall continue
    /// to parse and interpret this file even if the value of this field is not
    /// zero.
    pub fn min_version(&self) -> u32 {
        u32::from_be_bytes(self.min_version)
    }

    /// Compatibility list, each entry a four byte string of ISO 646
    /// characters.
    pub fn compatibility_list(&self) -> Vec<String> {
        self.compatibility_list
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect()
    }

    pub fn is_compatible(&self) -> bool {
        self.compatibility_list.contains(&BRAND_JP2)
    }
}

impl JBox for FileTypeBox {
    fn new(header: &BoxHeader) -> Self {
        FileTypeBox {
            length: header.box_length(),
            offset: header.data_offset(),
            ..Default::default()
        }
    }

    // The type of the File Type Box shall be ‘ftyp’ (0x6674 7970).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_FILE_TYPE
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(
        &mut self,
        reader: &mut SubStream<R>,
    ) -> Result<(), JP2Error> {
        if self.length < 8 || (self.length - 8) % 4 != 0 {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_FILE_TYPE,
                offset: self.offset,
                reason: format!("file type box of {} bytes", self.length),
            });
        }

        reader.read_exact(&mut self.brand)?;
        reader.read_exact(&mut self.min_version)?;

        // The number of CL fields is determined by the length of this box
        let size = (self.length - 8) / 4;
        self.compatibility_list = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let mut buffer: [u8; 4] = [0; 4];
            reader.read_exact(&mut buffer)?;
            self.compatibility_list.push(buffer);
        }

        debug!("Brand {:?}", self.brand());
        debug!("Minor version {:?}", self.min_version());
        debug!("Compatibility list {:?}", self.compatibility_list());

        // A file shall have at least one CL field in the File Type box, and
        // shall contain the value ‘jp2\040’ in one of the CL fields.
        if !self.is_compatible() {
            return Err(JP2Error::NotCompatible {
                compatibility_list: self.compatibility_list(),
            });
        }

        Ok(())
    }
}

// I.5.4
//
// Contiguous Codestream box
//
// The Contiguous Codestream box contains a valid and complete JPEG 2000
// codestream. When displaying the image, a conforming reader shall ignore all
// codestreams after the first codestream found in the file.
#[derive(Debug)]
pub struct ContiguousCodestreamBox {
    length: u64,
    offset: u64,
    codestream: Option<ContiguousCodestream>,
}

impl ContiguousCodestreamBox {
    /// The codestream, present once the box has been decoded.
    pub fn codestream(&self) -> Option<&ContiguousCodestream> {
        self.codestream.as_ref()
    }

    pub fn into_codestream(self) -> Option<ContiguousCodestream> {
        self.codestream
    }
}

impl JBox for ContiguousCodestreamBox {
    fn new(header: &BoxHeader) -> Self {
        ContiguousCodestreamBox {
            length: header.box_length(),
            offset: header.data_offset(),
            codestream: None,
        }
    }

    // The type of a Contiguous Codestream box shall be ‘jp2c’ (0x6A70 3263).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_CONTIGUOUS_CODESTREAM
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(
        &mut self,
        reader: &mut SubStream<R>,
    ) -> Result<(), JP2Error> {
        self.codestream = Some(ContiguousCodestream::decode(reader)?);
        Ok(())
    }
}

/// A decoded JP2 file, up to and including its first codestream.
#[derive(Debug)]
pub struct JP2File {
    length: u64,
    signature: SignatureBox,
    file_type: FileTypeBox,
    header: HeaderSuperBox,
    contiguous_codestream: Option<ContiguousCodestreamBox>,
    skipped_boxes: Vec<BoxHeader>,
}

impl JP2File {
    /// Bytes read from the start of the file to the end of the last decoded
    /// box.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn signature_box(&self) -> &SignatureBox {
        &self.signature
    }

    pub fn file_type_box(&self) -> &FileTypeBox {
        &self.file_type
    }

    pub fn header_box(&self) -> &HeaderSuperBox {
        &self.header
    }

    pub fn contiguous_codestream_box(&self) -> Option<&ContiguousCodestreamBox> {
        self.contiguous_codestream.as_ref()
    }

    pub fn codestream(&self) -> Option<&ContiguousCodestream> {
        self.contiguous_codestream
            .as_ref()
            .and_then(ContiguousCodestreamBox::codestream)
    }

    /// Top-level boxes passed over, such as XML, UUID and intellectual
    /// property boxes.
    pub fn skipped_boxes(&self) -> &[BoxHeader] {
        &self.skipped_boxes
    }

    pub fn width(&self) -> u32 {
        self.header.image_header_box().width()
    }

    pub fn height(&self) -> u32 {
        self.header.image_header_box().height()
    }
}

#[derive(Debug)]
enum DecoderState {
    AwaitingSignature,
    AwaitingFileType {
        signature: SignatureBox,
    },
    AwaitingHeader {
        signature: SignatureBox,
        file_type: FileTypeBox,
    },
    HeaderReady {
        signature: SignatureBox,
        file_type: FileTypeBox,
        header: HeaderSuperBox,
    },
    CodestreamFound {
        signature: SignatureBox,
        file_type: FileTypeBox,
        header: HeaderSuperBox,
        contiguous_codestream: ContiguousCodestreamBox,
    },
    Failed,
}

impl DecoderState {
    // The box the state is waiting for.
    fn expected_box_type(&self) -> BoxType {
        match self {
            DecoderState::AwaitingSignature => BOX_TYPE_SIGNATURE,
            DecoderState::AwaitingFileType { .. } => BOX_TYPE_FILE_TYPE,
            DecoderState::AwaitingHeader { .. } => BOX_TYPE_HEADER,
            DecoderState::HeaderReady { .. }
            | DecoderState::CodestreamFound { .. }
            | DecoderState::Failed => BOX_TYPE_CONTIGUOUS_CODESTREAM,
        }
    }

    fn header(&self) -> Option<&HeaderSuperBox> {
        match self {
            DecoderState::HeaderReady { header, .. }
            | DecoderState::CodestreamFound { header, .. } => Some(header),
            _ => None,
        }
    }

    fn contiguous_codestream(&self) -> Option<&ContiguousCodestreamBox> {
        match self {
            DecoderState::CodestreamFound {
                contiguous_codestream,
                ..
            } => Some(contiguous_codestream),
            _ => None,
        }
    }
}

/// Walks the top level of a JP2 file box by box.
///
/// The Signature box must come first, immediately followed by the File Type
/// box. Other boxes may precede the JP2 Header box and are skipped; the
/// Contiguous Codestream box must come after it. Once a parse fails the
/// decoder only returns [JP2Error::Aborted].
#[derive(Debug)]
pub struct JP2Decoder<R> {
    reader: SubStream<R>,
    start: u64,
    state: DecoderState,
    skipped_boxes: Vec<BoxHeader>,
}

impl<R: io::Read + io::Seek> JP2Decoder<R> {
    pub fn new(reader: R) -> Result<JP2Decoder<R>, JP2Error> {
        Ok(JP2Decoder::from_sub_stream(SubStream::new(reader)?))
    }

    /// Decodes the file starting at the current position of `reader`, within
    /// its innermost window.
    pub fn from_sub_stream(reader: SubStream<R>) -> JP2Decoder<R> {
        JP2Decoder {
            start: reader.absolute_position(),
            reader,
            state: DecoderState::AwaitingSignature,
            skipped_boxes: vec![],
        }
    }

    /// Reads boxes until the JP2 Header box has been decoded.
    pub fn read_header(&mut self) -> Result<&HeaderSuperBox, JP2Error> {
        while self.state.header().is_none() {
            self.advance()?;
        }
        self.state.header().ok_or(JP2Error::Aborted)
    }

    /// Reads boxes until the first Contiguous Codestream box has been decoded.
    pub fn read_codestream(&mut self) -> Result<&ContiguousCodestreamBox, JP2Error> {
        while self.state.contiguous_codestream().is_none() {
            self.advance()?;
        }
        self.state.contiguous_codestream().ok_or(JP2Error::Aborted)
    }

    pub fn header(&self) -> Option<&HeaderSuperBox> {
        self.state.header()
    }

    pub fn width(&self) -> Option<u32> {
        self.header()
            .map(|header| header.image_header_box().width())
    }

    pub fn height(&self) -> Option<u32> {
        self.header()
            .map(|header| header.image_header_box().height())
    }

    pub fn skipped_boxes(&self) -> &[BoxHeader] {
        &self.skipped_boxes
    }

    /// Finishes the session, the JP2 Header box must have been read.
    pub fn into_jp2_file(self) -> Result<JP2File, JP2Error> {
        let length = self.reader.absolute_position() - self.start;
        let (signature, file_type, header, contiguous_codestream) = match self.state {
            DecoderState::HeaderReady {
                signature,
                file_type,
                header,
            } => (signature, file_type, header, None),
            DecoderState::CodestreamFound {
                signature,
                file_type,
                header,
                contiguous_codestream,
            } => (signature, file_type, header, Some(contiguous_codestream)),
            DecoderState::Failed => return Err(JP2Error::Aborted),
            state => {
                return Err(JP2Error::BoxMissing {
                    box_type: state.expected_box_type(),
                })
            }
        };

        Ok(JP2File {
            length,
            signature,
            file_type,
            header,
            contiguous_codestream,
            skipped_boxes: self.skipped_boxes,
        })
    }

    fn advance(&mut self) -> Result<(), JP2Error> {
        let state = mem::replace(&mut self.state, DecoderState::Failed);
        self.state = self.step(state)?;
        Ok(())
    }

    fn skip(&mut self, header: BoxHeader) -> Result<(), JP2Error> {
        skip_box(&mut self.reader, &header)?;
        self.skipped_boxes.push(header);
        Ok(())
    }

    fn step(&mut self, state: DecoderState) -> Result<DecoderState, JP2Error> {
        match state {
            DecoderState::Failed => return Err(JP2Error::Aborted),
            DecoderState::CodestreamFound { .. } => return Ok(state),
            _ => {}
        }

        if self.reader.remaining() == 0 {
            return Err(JP2Error::BoxMissing {
                box_type: state.expected_box_type(),
            });
        }

        let box_header = decode_box_header(&mut self.reader)?;
        let box_type = box_header.box_type();
        let offset = box_header.offset();

        match (state, BoxTypes::new(box_type)) {
            (DecoderState::AwaitingSignature, BoxTypes::Signature) => {
                let signature = decode_box_payload(&mut self.reader, &box_header)?;
                Ok(DecoderState::AwaitingFileType { signature })
            }
            (DecoderState::AwaitingSignature, _) => {
                Err(JP2Error::MissingSignature { box_type, offset })
            }

            (DecoderState::AwaitingFileType { .. }, BoxTypes::Signature) => {
                Err(JP2Error::DuplicateSignature { offset })
            }
            (DecoderState::AwaitingFileType { signature }, BoxTypes::FileType) => {
                let file_type = decode_box_payload(&mut self.reader, &box_header)?;
                Ok(DecoderState::AwaitingHeader {
                    signature,
                    file_type,
                })
            }
            (DecoderState::AwaitingFileType { .. }, _) => {
                Err(JP2Error::MissingFileType { box_type, offset })
            }

            (
                DecoderState::AwaitingHeader { .. },
                BoxTypes::Signature | BoxTypes::FileType,
            ) => Err(JP2Error::DuplicateBox { box_type, offset }),
            (DecoderState::AwaitingHeader { .. }, BoxTypes::ContiguousCodestream) => {
                Err(JP2Error::CodestreamBeforeHeader { offset })
            }
            (
                DecoderState::AwaitingHeader {
                    signature,
                    file_type,
                },
                BoxTypes::Header,
            ) => {
                let header = decode_box_payload(&mut self.reader, &box_header)?;
                Ok(DecoderState::HeaderReady {
                    signature,
                    file_type,
                    header,
                })
            }
            (state @ DecoderState::AwaitingHeader { .. }, _) => {
                self.skip(box_header)?;
                Ok(state)
            }

            (
                DecoderState::HeaderReady { .. },
                BoxTypes::Signature | BoxTypes::FileType | BoxTypes::Header,
            ) => Err(JP2Error::DuplicateBox { box_type, offset }),
            (
                DecoderState::HeaderReady {
                    signature,
                    file_type,
                    header,
                },
                BoxTypes::ContiguousCodestream,
            ) => {
                let contiguous_codestream = decode_box_payload(&mut self.reader, &box_header)?;
                Ok(DecoderState::CodestreamFound {
                    signature,
                    file_type,
                    header,
                    contiguous_codestream,
                })
            }
            (state @ DecoderState::HeaderReady { .. }, _) => {
                self.skip(box_header)?;
                Ok(state)
            }

            (state, _) => Ok(state),
        }
    }
}

/// Decodes a JP2 file up to its first codestream.
pub fn decode_jp2<R: io::Read + io::Seek>(reader: &mut R) -> Result<JP2File, JP2Error> {
    let mut decoder = JP2Decoder::new(reader)?;
    decoder.read_codestream()?;
    decoder.into_jp2_file()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn init_logger() {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(log::LevelFilter::Debug)
            .try_init();
    }

    fn stream(bytes: Vec<u8>) -> SubStream<Cursor<Vec<u8>>> {
        SubStream::new(Cursor::new(bytes)).unwrap()
    }

    fn jbox(box_type: BoxType, payload: &[u8]) -> Vec<u8> {
        let mut bytes = (payload.len() as u32 + 8).to_be_bytes().to_vec();
        bytes.extend_from_slice(&box_type);
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_decode_box_header_lengths() {
        init_logger();
        let mut reader = stream(jbox(BOX_TYPE_XML, b"<a/>"));
        let header = decode_box_header(&mut reader).unwrap();
        assert_eq!(header.box_type(), BOX_TYPE_XML);
        assert_eq!(header.box_length(), 4);
        assert_eq!(header.header_length(), 8);
        assert_eq!(header.data_offset(), 8);

        // LBox = 0 runs to the end of the enclosing window.
        let mut bytes = vec![0, 0, 0, 0];
        bytes.extend_from_slice(&BOX_TYPE_XML);
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut reader = stream(bytes);
        assert_eq!(decode_box_header(&mut reader).unwrap().box_length(), 3);

        // LBox = 1 with XLBox
        let mut bytes = vec![0, 0, 0, 1];
        bytes.extend_from_slice(&BOX_TYPE_XML);
        bytes.extend_from_slice(&18u64.to_be_bytes());
        bytes.extend_from_slice(&[1, 2]);
        let mut reader = stream(bytes);
        let header = decode_box_header(&mut reader).unwrap();
        assert_eq!(header.box_length(), 2);
        assert_eq!(header.header_length(), 16);
        assert_eq!(reader.absolute_position(), 16);
    }

    #[test]
    fn test_decode_box_header_rejects_bad_lengths() {
        init_logger();
        let mut bytes = vec![0, 0, 0, 5];
        bytes.extend_from_slice(&BOX_TYPE_XML);
        assert!(matches!(
            decode_box_header(&mut stream(bytes)),
            Err(JP2Error::ReservedLength { length: 5, .. })
        ));

        let mut bytes = vec![0, 0, 0, 1];
        bytes.extend_from_slice(&BOX_TYPE_XML);
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        assert!(matches!(
            decode_box_header(&mut stream(bytes)),
            Err(JP2Error::LengthOverflow { .. })
        ));

        let mut bytes = vec![0, 0, 0, 1];
        bytes.extend_from_slice(&BOX_TYPE_XML);
        bytes.extend_from_slice(&8u64.to_be_bytes());
        assert!(matches!(
            decode_box_header(&mut stream(bytes)),
            Err(JP2Error::LengthOverflow { length: 8, .. })
        ));

        let mut bytes = jbox(BOX_TYPE_XML, b"<a/>");
        bytes.truncate(10);
        assert!(matches!(
            decode_box_header(&mut stream(bytes)),
            Err(JP2Error::BoxOverrun {
                length: 4,
                remaining: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_signature_box() {
        init_logger();
        let mut reader = stream(jbox(BOX_TYPE_SIGNATURE, &SIGNATURE_MAGIC));
        let header = decode_box_header(&mut reader).unwrap();
        let signature: SignatureBox = decode_box_payload(&mut reader, &header).unwrap();
        assert_eq!(signature.length(), 4);
        assert_eq!(signature.offset(), 8);
        assert_eq!(reader.absolute_position(), 12);

        let mut reader = stream(jbox(BOX_TYPE_SIGNATURE, &[13, 10, 7, 10]));
        let header = decode_box_header(&mut reader).unwrap();
        assert!(matches!(
            decode_box_payload::<SignatureBox, _>(&mut reader, &header),
            Err(JP2Error::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_file_type_box() {
        init_logger();
        let mut payload = b"jpx \0\0\0\0".to_vec();
        payload.extend_from_slice(b"jpx jp2 ");
        let mut reader = stream(jbox(BOX_TYPE_FILE_TYPE, &payload));
        let header = decode_box_header(&mut reader).unwrap();
        let file_type: FileTypeBox = decode_box_payload(&mut reader, &header).unwrap();
        assert_eq!(file_type.brand(), "jpx ");
        assert_eq!(file_type.min_version(), 0);
        assert_eq!(file_type.compatibility_list(), vec!["jpx ", "jp2 "]);

        let mut reader = stream(jbox(BOX_TYPE_FILE_TYPE, b"jpx \0\0\0\0jpx "));
        let header = decode_box_header(&mut reader).unwrap();
        assert!(matches!(
            decode_box_payload::<FileTypeBox, _>(&mut reader, &header),
            Err(JP2Error::NotCompatible { .. })
        ));
    }

    #[test]
    fn test_file_type_box_rejects_partial_entry() {
        init_logger();
        // Two padding bytes after the compatibility list.
        let mut reader = stream(jbox(BOX_TYPE_FILE_TYPE, b"jp2 \0\0\0\0jp2 \0\0"));
        let header = decode_box_header(&mut reader).unwrap();
        assert!(matches!(
            decode_box_payload::<FileTypeBox, _>(&mut reader, &header),
            Err(JP2Error::BoxMalformed { .. })
        ));
    }

    #[test]
    fn test_decoder_requires_signature_first() {
        init_logger();
        let bytes = jbox(BOX_TYPE_FILE_TYPE, b"jp2 \0\0\0\0jp2 ");
        let mut decoder = JP2Decoder::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            decoder.read_header(),
            Err(JP2Error::MissingSignature {
                box_type: BOX_TYPE_FILE_TYPE,
                offset: 0
            })
        ));
        assert!(matches!(decoder.read_header(), Err(JP2Error::Aborted)));
    }

    #[test]
    fn test_decoder_reports_missing_box_at_end() {
        init_logger();
        let mut bytes = jbox(BOX_TYPE_SIGNATURE, &SIGNATURE_MAGIC);
        bytes.extend(jbox(BOX_TYPE_FILE_TYPE, b"jp2 \0\0\0\0jp2 "));
        let mut decoder = JP2Decoder::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            decoder.read_header(),
            Err(JP2Error::BoxMissing {
                box_type: BOX_TYPE_HEADER
            })
        ));
        assert!(decoder.width().is_none());
    }
}
