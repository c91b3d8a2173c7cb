use jpc::{BitReader, SubStream};
use log::{debug, warn};
use std::io;
use std::io::prelude::*;

use super::{
    BitDepth, BoxHeader, BoxType, JBox, JP2Error, BOX_TYPE_COMPONENT_MAPPING, BOX_TYPE_PALETTE,
};

const COMPONENT_MAP_TYPE_DIRECT: u8 = 0;
const COMPONENT_MAP_TYPE_PALETTE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComponentMapType {
    // Direct use.
    //
    // This channel is created directly from an actual component in the
    // codestream.
    // The index of the component mapped to this channel is specified in the
    // CMPi field for this channel.
    Direct,

    // Palette mapping.
    //
    // This channel is created by applying the palette to an actual component
    // in the codestream.
    //
    // The index of the component mapped into the palette is specified in the
    // CMPi field for this channel.
    // The column from the palette to use is specified in the PCOLi field for
    // this channel
    Palette,

    // Reserved for ISO use
    Reserved { value: u8 },
}

impl ComponentMapType {
    fn new(value: u8) -> ComponentMapType {
        match value {
            COMPONENT_MAP_TYPE_DIRECT => ComponentMapType::Direct,
            COMPONENT_MAP_TYPE_PALETTE => ComponentMapType::Palette,
            value => ComponentMapType::Reserved { value },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentMap {
    // This field specifies the index of component from the codestream that is
    // mapped to this channel (either directly or through a palette).
    component: [u8; 2],

    // This field specifies how this channel is generated from the actual
    // components in the file.
    mapping_type: [u8; 1],

    // This field specifies the index component from the palette that is used
    // to map the actual component from the codestream.
    //
    // If the value of the MTYPi field for this channel is 0, then the value of
    // this field shall be 0.
    palette: [u8; 1],
}

impl ComponentMap {
    pub fn component(&self) -> u16 {
        u16::from_be_bytes(self.component)
    }

    pub fn mapping_type(&self) -> ComponentMapType {
        ComponentMapType::new(self.mapping_type[0])
    }

    pub fn palette(&self) -> u8 {
        self.palette[0]
    }
}

/// Component Mapping Box.
///
/// The Component Mapping box defines how image channels are identified from the
/// actual components decoded from the codestream.
///
/// This box contains an array of CMP<sup>i</sup>, MTYP<sup>i</sup> and
/// PCOL<sup>i</sup> fields.
///
/// Each group of these fields represents the definition of one channel in the
/// image.
///
/// The channels are numbered in order starting with zero, and the number of
/// channels specified in the Component Mapping box is determined by the length
/// of the box.
///
/// See ISO/IEC 15444-1:2024 Section I.5.3.5.
#[derive(Debug, Default)]
pub struct ComponentMappingBox {
    length: u64,
    offset: u64,
    mapping: Vec<ComponentMap>,
}

impl ComponentMappingBox {
    pub fn component_maps(&self) -> &[ComponentMap] {
        &self.mapping
    }
}

impl JBox for ComponentMappingBox {
    fn new(header: &BoxHeader) -> Self {
        ComponentMappingBox {
            length: header.box_length(),
            offset: header.data_offset(),
            ..Default::default()
        }
    }

    // The type of the Component Mapping box shall be ‘cmap’ (0x636D 6170).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_COMPONENT_MAPPING
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
        if self.length % 4 != 0 {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_COMPONENT_MAPPING,
                offset: self.offset,
                reason: format!("component mapping of {} bytes", self.length),
            });
        }

        let channels = self.length / 4;
        self.mapping = Vec::with_capacity(channels as usize);
        for _ in 0..channels {
            let mut component_map = ComponentMap {
                component: [0; 2],
                mapping_type: [0; 1],
                palette: [0; 1],
            };
            reader.read_exact(&mut component_map.component)?;
            reader.read_exact(&mut component_map.mapping_type)?;
            reader.read_exact(&mut component_map.palette)?;

            debug!(
                "Channel {} from component {} {:?} column {}",
                self.mapping.len(),
                component_map.component(),
                component_map.mapping_type(),
                component_map.palette()
            );
            self.mapping.push(component_map);
        }

        Ok(())
    }
}

/// Palette box.
///
/// The palette specified in this box is applied to a single component to
/// convert it into multiple components.
///
/// The mapping of an actual component from the codestream through the palette
/// is specified in the Component Mapping box.
///
/// Each column has its own bit depth. Every value starts on a byte boundary.
/// Columns of 8, 16 or 32 bits fill whole bytes, values of any other width are
/// read MSB first and padded to the next byte. Only unsigned values may be
/// padded this way.
///
/// See Part 1 Section I.5.3.4 for more information.
#[derive(Debug, Default)]
pub struct PaletteBox {
    length: u64,
    offset: u64,

    /// Number of entries in the table.
    ///
    /// This value shall be in the range 1 to 1024 and is encoded as a 2-byte
    /// big endian unsigned integer.
    num_entries: [u8; 2],

    /// Number of components created by the application of the palette.
    ///
    /// For example, if the palette turns a single index component into a
    /// three-component RGB image, then the value of this field shall be 3.
    num_components: [u8; 1],

    bit_depths: Vec<u8>,

    // Entry major, num_components values per entry.
    values: Vec<i64>,
}

impl PaletteBox {
    pub fn num_entries(&self) -> u16 {
        u16::from_be_bytes(self.num_entries)
    }

    pub fn num_components(&self) -> u8 {
        self.num_components[0]
    }

    /// Bit depth of each generated component.
    pub fn bit_depths(&self) -> Vec<BitDepth> {
        self.bit_depths.iter().map(|b| BitDepth::new(*b)).collect()
    }

    /// The values of all generated components for one entry.
    pub fn entry(&self, entry: u16) -> Option<&[i64]> {
        let columns = self.num_components() as usize;
        let start = entry as usize * columns;
        self.values.get(start..start + columns)
    }

    pub fn value(&self, entry: u16, column: u8) -> Option<i64> {
        self.entry(entry)
            .and_then(|values| values.get(column as usize).copied())
    }

    /// The values of one generated component for every entry.
    pub fn column(&self, column: u8) -> Option<Vec<i64>> {
        if column >= self.num_components() {
            return None;
        }
        Some(
            self.values
                .chunks(self.num_components() as usize)
                .map(|values| values[column as usize])
                .collect(),
        )
    }
}

fn sign_extend(value: u64, bits: u8) -> i64 {
    let shift = 64 - bits as u32;
    ((value << shift) as i64) >> shift
}

impl JBox for PaletteBox {
    fn new(header: &BoxHeader) -> Self {
        PaletteBox {
            length: header.box_length(),
            offset: header.data_offset(),
            ..Default::default()
        }
    }

    // The type of the Palette box shall be ‘pclr’ (0x7063 6C72).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_PALETTE
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
        reader.read_exact(&mut self.num_entries)?;
        reader.read_exact(&mut self.num_components)?;

        if !(1..=1024).contains(&self.num_entries()) {
            warn!("Palette with {} entries", self.num_entries());
        }

        self.bit_depths = vec![0; self.num_components() as usize];
        reader.read_exact(&mut self.bit_depths)?;

        let bit_depths = self.bit_depths();
        debug!("Number of entries {}", self.num_entries());
        debug!("Bit depths {:?}", bit_depths);

        for bit_depth in &bit_depths {
            let width = bit_depth.value();
            let aligned = matches!(width, 8 | 16 | 32);
            if !aligned && (bit_depth.is_signed() || width > 63) {
                return Err(JP2Error::UnsupportedPackedWidth {
                    bit_depth: width,
                    signed: bit_depth.is_signed(),
                    offset: self.offset,
                });
            }
        }

        self.values = Vec::with_capacity(self.num_entries() as usize * bit_depths.len());
        let mut bits = BitReader::new(reader);
        for _ in 0..self.num_entries() {
            for bit_depth in &bit_depths {
                let width = bit_depth.value();
                let raw = bits.take(width)?;
                let value = if bit_depth.is_signed() {
                    sign_extend(raw, width)
                } else {
                    raw as i64
                };
                // Pad bits: 8 - (width mod 8), none on a byte boundary.
                bits.align();
                self.values.push(value);
            }
        }

        Ok(())
    }
}
