use jpc::SubStream;
use log::{debug, info, warn};
use std::io;
use std::io::prelude::*;

use super::{
    decode_box_header, decode_box_payload, skip_box, BoxHeader, BoxType, BoxTypes,
    ColourSpecificationBox, ComponentMapType, ComponentMappingBox, JBox, JP2Error, PaletteBox,
    ResolutionSuperBox, BOX_TYPE_BITS_PER_COMPONENT, BOX_TYPE_CHANNEL_DEFINITION,
    BOX_TYPE_COLOUR_SPECIFICATION, BOX_TYPE_COMPONENT_MAPPING, BOX_TYPE_HEADER,
    BOX_TYPE_IMAGE_HEADER,
};

/// The boxes a JP2 Header box may contain, decoded.
#[derive(Debug)]
pub enum JP2Box {
    ImageHeader(ImageHeaderBox),
    BitsPerComponent(BitsPerComponentBox),
    ColourSpecification(ColourSpecificationBox),
    Palette(PaletteBox),
    ComponentMapping(ComponentMappingBox),
    ChannelDefinition(ChannelDefinitionBox),
    Resolution(ResolutionSuperBox),
    Skipped(BoxHeader),
}

pub(crate) fn decode_header_box<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    header: &BoxHeader,
) -> Result<JP2Box, JP2Error> {
    let jbox = match BoxTypes::new(header.box_type()) {
        BoxTypes::ImageHeader => JP2Box::ImageHeader(decode_box_payload(reader, header)?),
        BoxTypes::BitsPerComponent => {
            JP2Box::BitsPerComponent(decode_box_payload(reader, header)?)
        }
        BoxTypes::ColourSpecification => {
            JP2Box::ColourSpecification(decode_box_payload(reader, header)?)
        }
        BoxTypes::Palette => JP2Box::Palette(decode_box_payload(reader, header)?),
        BoxTypes::ComponentMapping => {
            JP2Box::ComponentMapping(decode_box_payload(reader, header)?)
        }
        BoxTypes::ChannelDefinition => {
            JP2Box::ChannelDefinition(decode_box_payload(reader, header)?)
        }
        BoxTypes::Resolution => JP2Box::Resolution(decode_box_payload(reader, header)?),
        BoxTypes::Signature
        | BoxTypes::FileType
        | BoxTypes::Header
        | BoxTypes::ContiguousCodestream => {
            return Err(JP2Error::BoxUnexpected {
                box_type: header.box_type(),
                offset: header.offset(),
            })
        }
        _ => {
            skip_box(reader, header)?;
            JP2Box::Skipped(*header)
        }
    };
    Ok(jbox)
}

fn set_once<B>(slot: &mut Option<B>, jbox: B, header: &BoxHeader) -> Result<(), JP2Error> {
    if slot.is_some() {
        return Err(JP2Error::DuplicateBox {
            box_type: header.box_type(),
            offset: header.offset(),
        });
    }
    *slot = Some(jbox);
    Ok(())
}

// I.5.3
//
// JP2 Header box (superbox)
//
// The JP2 Header box contains generic information about the file, such as the
// number of components, colourspace, and grid resolution.
//
// This box is a superbox.
//
// Within a JP2 file, there shall be one and only one JP2 Header box.
//
// The JP2 Header box may be located anywhere within the file after the File
// Type box but before the Contiguous Codestream box.
//
// The first box within the JP2 Header box shall be the Image Header box.
#[derive(Debug, Default)]
pub struct HeaderSuperBox {
    length: u64,
    offset: u64,
    image_header_box: ImageHeaderBox,
    bits_per_component_box: Option<BitsPerComponentBox>,
    colour_specification_boxes: Vec<ColourSpecificationBox>,
    palette_box: Option<PaletteBox>,
    component_mapping_box: Option<ComponentMappingBox>,
    channel_definition_box: Option<ChannelDefinitionBox>,
    resolution_box: Option<ResolutionSuperBox>,
}

impl HeaderSuperBox {
    pub fn image_header_box(&self) -> &ImageHeaderBox {
        &self.image_header_box
    }

    pub fn bits_per_component_box(&self) -> Option<&BitsPerComponentBox> {
        self.bits_per_component_box.as_ref()
    }

    /// Colour specification boxes in file order, there is at least one.
    ///
    /// A reader uses the first method it supports, see
    /// [precedence](fn@ColourSpecificationBox::precedence).
    pub fn colour_specification_boxes(&self) -> &[ColourSpecificationBox] {
        &self.colour_specification_boxes
    }

    pub fn palette_box(&self) -> Option<&PaletteBox> {
        self.palette_box.as_ref()
    }

    pub fn component_mapping_box(&self) -> Option<&ComponentMappingBox> {
        self.component_mapping_box.as_ref()
    }

    pub fn channel_definition_box(&self) -> Option<&ChannelDefinitionBox> {
        self.channel_definition_box.as_ref()
    }

    pub fn resolution_box(&self) -> Option<&ResolutionSuperBox> {
        self.resolution_box.as_ref()
    }

    /// Bit depth of each component, from the Image Header box or from the Bits
    /// Per Component box when they vary.
    pub fn bit_depths(&self) -> Vec<BitDepth> {
        match (
            self.image_header_box.bits_per_component(),
            &self.bits_per_component_box,
        ) {
            (Some(depth), _) => vec![depth; self.image_header_box.components_num() as usize],
            (None, Some(bpcc)) => bpcc.bits_per_component(),
            (None, None) => vec![],
        }
    }

    fn validate(&self) -> Result<(), JP2Error> {
        if self.colour_specification_boxes.is_empty() {
            return Err(JP2Error::BoxMissing {
                box_type: BOX_TYPE_COLOUR_SPECIFICATION,
            });
        }

        let components_num = self.image_header_box.components_num();
        match (
            self.image_header_box.bits_per_component(),
            &self.bits_per_component_box,
        ) {
            (None, None) => {
                return Err(JP2Error::BoxMissing {
                    box_type: BOX_TYPE_BITS_PER_COMPONENT,
                });
            }
            (_, Some(bpcc)) if bpcc.components_num() != components_num as usize => {
                return Err(JP2Error::BoxMalformed {
                    box_type: BOX_TYPE_BITS_PER_COMPONENT,
                    offset: bpcc.offset(),
                    reason: format!(
                        "{} bit depths for {} components",
                        bpcc.components_num(),
                        components_num
                    ),
                });
            }
            (Some(_), Some(bpcc)) => {
                warn!(
                    "Bits per component box at byte offset {} with a fixed bit depth",
                    bpcc.offset()
                );
            }
            _ => {}
        }

        // If the JP2 Header box contains a Palette box, then it shall also
        // contain a Component Mapping box.
        match (&self.palette_box, &self.component_mapping_box) {
            (Some(_), None) => {
                return Err(JP2Error::BoxMissing {
                    box_type: BOX_TYPE_COMPONENT_MAPPING,
                });
            }
            (palette, Some(cmap)) => {
                let columns = palette.as_ref().map(|p| p.num_components()).unwrap_or(0);
                for map in cmap.component_maps() {
                    if map.mapping_type() == ComponentMapType::Palette
                        && map.palette() >= columns
                    {
                        return Err(JP2Error::BoxMalformed {
                            box_type: BOX_TYPE_COMPONENT_MAPPING,
                            offset: cmap.offset(),
                            reason: format!(
                                "palette column {} of {}",
                                map.palette(),
                                columns
                            ),
                        });
                    }
                }
            }
            (None, None) => {}
        }

        Ok(())
    }
}

impl JBox for HeaderSuperBox {
    fn new(header: &BoxHeader) -> Self {
        HeaderSuperBox {
            length: header.box_length(),
            offset: header.data_offset(),
            ..Default::default()
        }
    }

    // The type of the JP2 Header box shall be ‘jp2h’ (0x6A70 3268).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_HEADER
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
        if reader.remaining() == 0 {
            return Err(JP2Error::BoxMissing {
                box_type: BOX_TYPE_IMAGE_HEADER,
            });
        }

        let header = decode_box_header(reader)?;
        if header.box_type() != BOX_TYPE_IMAGE_HEADER {
            return Err(JP2Error::BoxUnexpected {
                box_type: header.box_type(),
                offset: header.offset(),
            });
        }
        self.image_header_box = decode_box_payload(reader, &header)?;

        while reader.remaining() > 0 {
            let header = decode_box_header(reader)?;
            match decode_header_box(reader, &header)? {
                JP2Box::ImageHeader(_) => {
                    warn!(
                        "Ignoring image header box at byte offset {}",
                        header.offset()
                    );
                }
                JP2Box::BitsPerComponent(jbox) => {
                    set_once(&mut self.bits_per_component_box, jbox, &header)?
                }
                JP2Box::ColourSpecification(jbox) => {
                    self.colour_specification_boxes.push(jbox)
                }
                JP2Box::Palette(jbox) => set_once(&mut self.palette_box, jbox, &header)?,
                JP2Box::ComponentMapping(jbox) => {
                    set_once(&mut self.component_mapping_box, jbox, &header)?
                }
                JP2Box::ChannelDefinition(jbox) => {
                    set_once(&mut self.channel_definition_box, jbox, &header)?
                }
                JP2Box::Resolution(jbox) => set_once(&mut self.resolution_box, jbox, &header)?,
                JP2Box::Skipped(_) => {}
            }
        }

        self.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BitDepth {
    Signed { value: u8 },
    Unsigned { value: u8 },
}

impl BitDepth {
    /// Decodes a bit depth byte, the low 7 bits hold the depth minus one and
    /// the high bit is set for signed values.
    pub fn new(byte: u8) -> BitDepth {
        let value = (byte & 0x7F) + 1;
        if byte & 0x80 != 0 {
            BitDepth::Signed { value }
        } else {
            BitDepth::Unsigned { value }
        }
    }

    pub fn value(&self) -> u8 {
        match self {
            BitDepth::Signed { value } | BitDepth::Unsigned { value } => *value,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, BitDepth::Signed { .. })
    }
}

// I.5.3.1
//
// Image Header box
//
// This box contains fixed length generic information about the image, such as
// the image size and number of components.
//
// The contents of the JP2 Header box shall start with an Image Header box.
//
// Instances of this box in other places in the file shall be ignored.
//
// The length of the Image Header box shall be 22 bytes, including the box
// length and type fields.
//
// Much of the information within the Image Header box is redundant with
// information stored in the codestream itself.
#[derive(Debug, Default)]
pub struct ImageHeaderBox {
    length: u64,
    offset: u64,
    height: [u8; 4],
    width: [u8; 4],
    components_num: [u8; 2],
    components_bits: [u8; 1],
    compression_type: [u8; 1],
    colourspace_unknown: [u8; 1],
    intellectual_property: [u8; 1],
}

impl ImageHeaderBox {
    // Image area height.
    //
    // The value of this field shall be Ysiz – YOsiz, where Ysiz and YOsiz are
    // the values of the respective fields in the SIZ marker in the codestream.
    pub fn height(&self) -> u32 {
        u32::from_be_bytes(self.height)
    }

    // Image area width.
    //
    // The value of this field shall be Xsiz – XOsiz, where Xsiz and XOsiz are
    // the values of the respective fields in the SIZ marker in the codestream.
    pub fn width(&self) -> u32 {
        u32::from_be_bytes(self.width)
    }

    // Number of components.
    //
    // The value of this field shall be equal to the value of the Csiz field in
    // the SIZ marker in the codestream.
    pub fn components_num(&self) -> u16 {
        u16::from_be_bytes(self.components_num)
    }

    /// Bits per component byte as stored, 255 when the components vary in bit
    /// depth.
    pub fn components_bits(&self) -> u8 {
        self.components_bits[0]
    }

    /// Bits per component.
    ///
    /// If the bit depth is the same for all components, then this parameter
    /// specifies that bit depth and shall be equivalent to the values of the
    /// Ssiz<sup>i</sup> fields in the SIZ marker in the codestream.
    ///
    /// `None` when the components vary in bit depth, the JP2 Header box then
    /// contains a Bits Per Component box.
    pub fn bits_per_component(&self) -> Option<BitDepth> {
        // 1111 1111 (255) Components vary in bit depth
        match self.components_bits[0] {
            255 => None,
            byte => Some(BitDepth::new(byte)),
        }
    }

    /// Compression type.
    ///
    /// This parameter specifies the compression algorithm used to compress the
    /// image data. The value of this field shall be 7.
    pub fn compression_type(&self) -> u8 {
        self.compression_type[0]
    }

    /// Colourspace Unknown.
    ///
    /// This field specifies if the actual colourspace of the image data in the
    /// codestream is known. Legal values are 0 when the colourspace of the
    /// image is known and correctly specified in the Colourspace Specification
    /// boxes, and 1 when it is not.
    pub fn colourspace_unknown(&self) -> bool {
        self.colourspace_unknown[0] == 1
    }

    /// Intellectual Property.
    ///
    /// Indicates whether the file contains intellectual property rights
    /// information.
    pub fn intellectual_property(&self) -> bool {
        self.intellectual_property[0] == 1
    }
}

impl JBox for ImageHeaderBox {
    fn new(header: &BoxHeader) -> Self {
        ImageHeaderBox {
            length: header.box_length(),
            offset: header.data_offset(),
            ..Default::default()
        }
    }

    // The type of the Image Header box shall be ‘ihdr’ (0x6968 6472)
    fn identifier(&self) -> BoxType {
        BOX_TYPE_IMAGE_HEADER
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
        reader.read_exact(&mut self.height)?;
        reader.read_exact(&mut self.width)?;
        reader.read_exact(&mut self.components_num)?;
        reader.read_exact(&mut self.components_bits)?;
        reader.read_exact(&mut self.compression_type)?;
        reader.read_exact(&mut self.colourspace_unknown)?;
        reader.read_exact(&mut self.intellectual_property)?;

        info!("Height {:?}", self.height());
        info!("Width {:?}", self.width());
        info!("Number of components {:?}", self.components_num());
        info!("Bits per component {:?}", self.bits_per_component());
        debug!("Colourspace unknown {:?}", self.colourspace_unknown());
        debug!("Intellectual property {:?}", self.intellectual_property());

        // Other values are reserved for ISO use.
        if self.compression_type() != 7 {
            return Err(JP2Error::UnsupportedCompression {
                compression_type: self.compression_type(),
                offset: self.offset,
            });
        }

        Ok(())
    }
}

// I.5.3.2
//
// Bits Per Component box
//
// The Bits Per Component box specifies the bit depth of each component.
//
// If the bit depth of all components in the codestream is the same (in both
// sign and precision), then this box shall not be found. Otherwise, this box
// specifies the bit depth of each individual component.
//
// The order of bit depth values in this box is the actual order in which those
// components are enumerated within the codestream.
#[derive(Debug, Default)]
pub struct BitsPerComponentBox {
    length: u64,
    offset: u64,
    bits_per_component: Vec<u8>,
}

impl BitsPerComponentBox {
    pub fn bits_per_component(&self) -> Vec<BitDepth> {
        self.bits_per_component
            .iter()
            .map(|byte| BitDepth::new(*byte))
            .collect()
    }

    pub fn components_num(&self) -> usize {
        self.bits_per_component.len()
    }
}

impl JBox for BitsPerComponentBox {
    fn new(header: &BoxHeader) -> Self {
        BitsPerComponentBox {
            length: header.box_length(),
            offset: header.data_offset(),
            ..Default::default()
        }
    }

    // The type of the Bits Per Component Box shall be ‘bpcc’ (0x6270 6363).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_BITS_PER_COMPONENT
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    // The number of BPC fields shall be the same as the value of the NC field
    // from the Image Header box.
    fn decode<R: io::Read + io::Seek>(
        &mut self,
        reader: &mut SubStream<R>,
    ) -> Result<(), JP2Error> {
        self.bits_per_component = vec![0; reader.remaining() as usize];
        reader.read_exact(&mut self.bits_per_component)?;
        debug!("Bits per component {:?}", self.bits_per_component());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelTypes {
    ColourImageData,
    Opacity,
    PremultipliedOpacity,
    Unspecified,
    Reserved { value: u16 },
}

impl ChannelTypes {
    fn new(value: u16) -> ChannelTypes {
        match value {
            // This channel is the colour image data for the associated colour
            0 => ChannelTypes::ColourImageData,

            // Opacity. A sample value of 0 indicates that the sample is 100%
            // transparent and the maximum value of the channel indicates a
            // 100% opaque sample.
            1 => ChannelTypes::Opacity,

            // Premultiplied opacity. The value of the associated colour
            // channels have been multiplied by the value of this channel.
            2 => ChannelTypes::PremultipliedOpacity,

            // The type of this channel is not specified.
            0xFFFF => ChannelTypes::Unspecified,

            // Reserved for ISO use
            value => ChannelTypes::Reserved { value },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelAssociation {
    /// The channel is associated with the image as a whole, for example an
    /// opacity channel applying to all colours.
    WholeImage,

    /// The channel is not associated with any particular colour.
    Unassociated,

    /// The channel is associated with colour number `index`, counted from 1.
    Colour { index: u16 },
}

impl ChannelAssociation {
    fn new(value: u16) -> ChannelAssociation {
        match value {
            0 => ChannelAssociation::WholeImage,
            0xFFFF => ChannelAssociation::Unassociated,
            index => ChannelAssociation::Colour { index },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    channel_index: u16,
    channel_type: u16,
    association: u16,
}

impl Channel {
    /// Index of the channel described, Cn<sup>i</sup>.
    pub fn channel_index(&self) -> u16 {
        self.channel_index
    }

    pub fn channel_type(&self) -> ChannelTypes {
        ChannelTypes::new(self.channel_type)
    }

    pub fn association(&self) -> ChannelAssociation {
        ChannelAssociation::new(self.association)
    }
}

// I.5.3.6
//
// Channel Definition box
//
// The Channel Definition box specifies the meaning of the samples in each
// channel in the image.
//
// If this box does not exist, then the interpretation of each channel shall be
// determined by the Colour Specification box.
#[derive(Debug, Default)]
pub struct ChannelDefinitionBox {
    length: u64,
    offset: u64,
    channels: Vec<Channel>,
}

impl ChannelDefinitionBox {
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }
}

impl JBox for ChannelDefinitionBox {
    fn new(header: &BoxHeader) -> Self {
        ChannelDefinitionBox {
            length: header.box_length(),
            offset: header.data_offset(),
            ..Default::default()
        }
    }

    // The type of the Channel Definition box shall be ‘cdef’ (0x6364 6566).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_CHANNEL_DEFINITION
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
        // Number of channel descriptions, followed by that many 6 byte
        // descriptions.
        let size = reader.read_u16()?;
        self.channels = Vec::with_capacity(size as usize);

        for _ in 0..size {
            let channel = Channel {
                channel_index: reader.read_u16()?,
                channel_type: reader.read_u16()?,
                association: reader.read_u16()?,
            };
            debug!(
                "Channel {} type {:?} association {:?}",
                channel.channel_index(),
                channel.channel_type(),
                channel.association()
            );
            self.channels.push(channel);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{BOX_TYPE_PALETTE, BOX_TYPE_XML};

    fn init_logger() {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(log::LevelFilter::Debug)
            .try_init();
    }

    fn jbox(box_type: BoxType, payload: &[u8]) -> Vec<u8> {
        let mut bytes = (payload.len() as u32 + 8).to_be_bytes().to_vec();
        bytes.extend_from_slice(&box_type);
        bytes.extend_from_slice(payload);
        bytes
    }

    fn ihdr(components_num: u16, components_bits: u8, compression_type: u8) -> Vec<u8> {
        let mut payload = 32u32.to_be_bytes().to_vec();
        payload.extend_from_slice(&48u32.to_be_bytes());
        payload.extend_from_slice(&components_num.to_be_bytes());
        payload.extend_from_slice(&[components_bits, compression_type, 0, 0]);
        jbox(BOX_TYPE_IMAGE_HEADER, &payload)
    }

    fn colr() -> Vec<u8> {
        jbox(BOX_TYPE_COLOUR_SPECIFICATION, &[1, 0, 0, 0, 0, 0, 16])
    }

    fn decode(contents: Vec<u8>) -> Result<HeaderSuperBox, JP2Error> {
        let bytes = jbox(BOX_TYPE_HEADER, &contents);
        let mut reader = SubStream::new(Cursor::new(bytes))?;
        let header = decode_box_header(&mut reader)?;
        decode_box_payload(&mut reader, &header)
    }

    #[test]
    fn test_header_super_box() {
        init_logger();
        let mut contents = ihdr(3, 7, 7);
        contents.extend(jbox(BOX_TYPE_XML, b"<a/>"));
        contents.extend(colr());
        contents.extend(jbox(
            BOX_TYPE_CHANNEL_DEFINITION,
            &[0, 2, 0, 0, 0, 0, 0, 1, 0, 1, 0, 1, 0, 0],
        ));

        let header = decode(contents).unwrap();
        let ihdr = header.image_header_box();
        assert_eq!(ihdr.height(), 32);
        assert_eq!(ihdr.width(), 48);
        assert_eq!(ihdr.components_num(), 3);
        assert_eq!(
            ihdr.bits_per_component(),
            Some(BitDepth::Unsigned { value: 8 })
        );
        assert_eq!(header.bit_depths().len(), 3);
        assert_eq!(header.colour_specification_boxes().len(), 1);

        let channels = header.channel_definition_box().unwrap().channels();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].channel_type(), ChannelTypes::ColourImageData);
        assert_eq!(
            channels[0].association(),
            ChannelAssociation::Colour { index: 1 }
        );
        assert_eq!(channels[1].channel_index(), 1);
        assert_eq!(channels[1].channel_type(), ChannelTypes::Opacity);
        assert_eq!(channels[1].association(), ChannelAssociation::WholeImage);
    }

    #[test]
    fn test_image_header_must_come_first() {
        init_logger();
        let mut contents = colr();
        contents.extend(ihdr(1, 7, 7));
        assert!(matches!(
            decode(contents),
            Err(JP2Error::BoxUnexpected {
                box_type: BOX_TYPE_COLOUR_SPECIFICATION,
                offset: 8
            })
        ));

        assert!(matches!(
            decode(vec![]),
            Err(JP2Error::BoxMissing {
                box_type: BOX_TYPE_IMAGE_HEADER
            })
        ));
    }

    #[test]
    fn test_unsupported_compression() {
        init_logger();
        let mut contents = ihdr(1, 7, 1);
        contents.extend(colr());
        assert!(matches!(
            decode(contents),
            Err(JP2Error::UnsupportedCompression {
                compression_type: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_image_header_length_mismatch() {
        init_logger();
        let mut contents = ihdr(1, 7, 7);
        contents[3] += 1;
        contents.push(0);
        contents.extend(colr());
        assert!(matches!(
            decode(contents),
            Err(JP2Error::BoxLengthMismatch {
                box_type: BOX_TYPE_IMAGE_HEADER,
                length: 15,
                consumed: 14,
                ..
            })
        ));
    }

    #[test]
    fn test_colour_specification_required() {
        init_logger();
        assert!(matches!(
            decode(ihdr(1, 7, 7)),
            Err(JP2Error::BoxMissing {
                box_type: BOX_TYPE_COLOUR_SPECIFICATION
            })
        ));
    }

    #[test]
    fn test_bits_per_component() {
        init_logger();
        let mut contents = ihdr(2, 255, 7);
        contents.extend(jbox(BOX_TYPE_BITS_PER_COMPONENT, &[0x07, 0x8B]));
        contents.extend(colr());
        let header = decode(contents).unwrap();
        assert_eq!(
            header.bit_depths(),
            vec![
                BitDepth::Unsigned { value: 8 },
                BitDepth::Signed { value: 12 }
            ]
        );

        let mut contents = ihdr(3, 255, 7);
        contents.extend(jbox(BOX_TYPE_BITS_PER_COMPONENT, &[0x07, 0x8B]));
        contents.extend(colr());
        assert!(matches!(
            decode(contents),
            Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_BITS_PER_COMPONENT,
                ..
            })
        ));

        let mut contents = ihdr(3, 255, 7);
        contents.extend(colr());
        assert!(matches!(
            decode(contents),
            Err(JP2Error::BoxMissing {
                box_type: BOX_TYPE_BITS_PER_COMPONENT
            })
        ));
    }

    #[test]
    fn test_duplicate_channel_definition() {
        init_logger();
        let cdef = jbox(BOX_TYPE_CHANNEL_DEFINITION, &[0, 0]);
        let mut contents = ihdr(1, 7, 7);
        contents.extend(colr());
        contents.extend(cdef.clone());
        contents.extend(cdef);
        assert!(matches!(
            decode(contents),
            Err(JP2Error::DuplicateBox {
                box_type: BOX_TYPE_CHANNEL_DEFINITION,
                ..
            })
        ));
    }

    #[test]
    fn test_palette_requires_component_mapping() {
        init_logger();
        let mut contents = ihdr(1, 7, 7);
        contents.extend(colr());
        contents.extend(jbox(BOX_TYPE_PALETTE, &[0, 2, 1, 7, 10, 20]));
        assert!(matches!(
            decode(contents),
            Err(JP2Error::BoxMissing {
                box_type: BOX_TYPE_COMPONENT_MAPPING
            })
        ));
    }
}
