use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::io;
use std::io::prelude::*;
use std::str;
use thiserror::Error;

mod bit_reader;
mod stream;
mod tile;

pub use bit_reader::BitReader;
pub use stream::{SubStream, Window};
pub use tile::{ResolvedCodingStyle, ResolvedQuantization, Tile, TilePart};

#[derive(Debug, Error)]
pub enum CodestreamError {
    #[error("marker 0x{:02X}{:02X} error {error:?}", .marker[0], .marker[1])]
    MarkerError { marker: MarkerSymbol, error: String },

    #[error("missing marker 0x{:02X}{:02X}", .marker[0], .marker[1])]
    MarkerMissing { marker: MarkerSymbol },

    #[error("unexpected marker 0x{:02X}{:02X} at byte offset {offset}", .marker[0], .marker[1])]
    MarkerUnexpected { marker: MarkerSymbol, offset: u64 },

    #[error(
        "marker 0x{:02X}{:02X} at byte offset {offset} declares {declared} bytes but {consumed} were decoded",
        .marker[0],
        .marker[1]
    )]
    SegmentLengthMismatch {
        marker: MarkerSymbol,
        offset: u64,
        declared: u64,
        consumed: u64,
    },

    #[error(
        "marker 0x{:02X}{:02X} at byte offset {offset} declares {length} bytes but only {remaining} remain",
        .marker[0],
        .marker[1]
    )]
    SegmentOverrun {
        marker: MarkerSymbol,
        offset: u64,
        length: u64,
        remaining: u64,
    },

    // XTsiz + XTOsiz > XOsiz
    // YTsiz + YTOsiz > YOsiz
    #[error("tile size overflow: XOSiz = {image_horizontal_offset:?}, YOsiz = {image_vertical_offset:?}, XTOsiz = {tile_horizontal_offset:?}, YTOsiz = {tile_vertical_offset:?}, XTsize = {reference_tile_width:?}, YTsize = {reference_tile_height:?}")]
    TileSizeOverflow {
        image_horizontal_offset: u32,
        image_vertical_offset: u32,
        tile_horizontal_offset: u32,
        tile_vertical_offset: u32,
        reference_tile_width: u32,
        reference_tile_height: u32,
    },

    #[error("tile grid offset overflow: XOSiz = {image_horizontal_offset:?}, YOsiz = {image_vertical_offset:?}, XTOsiz = {tile_horizontal_offset:?}, YTOsiz = {tile_vertical_offset:?}")]
    TileGridOffsetOverflow {
        tile_horizontal_offset: u32,
        tile_vertical_offset: u32,
        image_horizontal_offset: u32,
        image_vertical_offset: u32,
    },

    #[error("invalid tile-part length Psot = {length} at byte offset {offset}")]
    TilePartLength { offset: u64, length: u32 },

    #[error("tile-part at byte offset {offset} declares Psot = {length} but only {remaining} bytes remain")]
    TilePartOverrun {
        offset: u64,
        length: u32,
        remaining: u64,
    },

    #[error("tile {tile_index} starts with tile-part {tile_part_index} instead of 0 at byte offset {offset}")]
    TilePartOutOfOrder {
        tile_index: u16,
        tile_part_index: u8,
        offset: u64,
    },

    #[error("duplicate tile-part {tile_part_index} of tile {tile_index} at byte offset {offset}")]
    TilePartDuplicate {
        tile_index: u16,
        tile_part_index: u8,
        offset: u64,
    },

    #[error("tile-part {tile_part_index} of tile {tile_index} exceeds the declared {no_tile_parts} tile-parts")]
    TilePartIndexOverflow {
        tile_index: u16,
        tile_part_index: u8,
        no_tile_parts: u8,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type MarkerSymbol = [u8; 2];

// Delimiting markers and marker segments
pub const MARKER_SYMBOL_SOC: MarkerSymbol = [255, 79]; // Start of code stream
pub const MARKER_SYMBOL_SOT: MarkerSymbol = [255, 144]; // Start of tile-part
pub const MARKER_SYMBOL_SOD: MarkerSymbol = [255, 147]; // Start of data
pub const MARKER_SYMBOL_EOC: MarkerSymbol = [255, 217]; // End of codestream

// Fixed information marker segments
pub const MARKER_SYMBOL_SIZ: MarkerSymbol = [255, 81]; // Image and tile size

// Functional marker segments
pub const MARKER_SYMBOL_COD: MarkerSymbol = [255, 82]; // Coding style default
pub const MARKER_SYMBOL_COC: MarkerSymbol = [255, 83]; // Coding style component
pub const MARKER_SYMBOL_RGN: MarkerSymbol = [255, 94]; // Region-of-interest
pub const MARKER_SYMBOL_QCD: MarkerSymbol = [255, 92]; // Quantization default
pub const MARKER_SYMBOL_QCC: MarkerSymbol = [255, 93]; // Quantization component
pub const MARKER_SYMBOL_POC: MarkerSymbol = [255, 95]; // Progression order change

// Pointer marker segments
pub const MARKER_SYMBOL_TLM: MarkerSymbol = [255, 85]; // Tile-part lengths
pub const MARKER_SYMBOL_PLM: MarkerSymbol = [255, 87]; // Packet length, main header
pub const MARKER_SYMBOL_PLT: MarkerSymbol = [255, 88]; // Packet length, tile-part header
pub const MARKER_SYMBOL_PPM: MarkerSymbol = [255, 96]; // Packed packet headers, main header
pub const MARKER_SYMBOL_PPT: MarkerSymbol = [255, 97]; // Packed packet headers, tile-part header

// In bit stream markers and marker segments
pub const MARKER_SYMBOL_SOP: MarkerSymbol = [255, 145]; // Start of packet
pub const MARKER_SYMBOL_EPH: MarkerSymbol = [255, 146]; // End of packet header

// Informational marker segments
pub const MARKER_SYMBOL_CRG: MarkerSymbol = [255, 99]; // Component registration
pub const MARKER_SYMBOL_COM: MarkerSymbol = [255, 100]; // Comment

fn marker_name(marker: MarkerSymbol) -> &'static str {
    match marker {
        MARKER_SYMBOL_SOC => "SOC",
        MARKER_SYMBOL_SOT => "SOT",
        MARKER_SYMBOL_SOD => "SOD",
        MARKER_SYMBOL_EOC => "EOC",
        MARKER_SYMBOL_SIZ => "SIZ",
        MARKER_SYMBOL_COD => "COD",
        MARKER_SYMBOL_COC => "COC",
        MARKER_SYMBOL_RGN => "RGN",
        MARKER_SYMBOL_QCD => "QCD",
        MARKER_SYMBOL_QCC => "QCC",
        MARKER_SYMBOL_POC => "POC",
        MARKER_SYMBOL_TLM => "TLM",
        MARKER_SYMBOL_PLM => "PLM",
        MARKER_SYMBOL_PLT => "PLT",
        MARKER_SYMBOL_PPM => "PPM",
        MARKER_SYMBOL_PPT => "PPT",
        MARKER_SYMBOL_SOP => "SOP",
        MARKER_SYMBOL_EPH => "EPH",
        MARKER_SYMBOL_CRG => "CRG",
        MARKER_SYMBOL_COM => "COM",
        _ => "unknown marker",
    }
}

#[derive(Debug, PartialEq)]
pub enum ProgressionOrder {
    // 0000 0000 Layer-resolution level-component-position progression
    LRLCPP,

    // 0000 0001 Resolution level-layer-component-position progression
    RLLCPP,

    // 0000 0010 Resolution level-position-component-layer progression
    RLPCLP,

    // 0000 0011 Position-component-resolution level-layer progression
    PCRLLP,

    // 0000 0100 Component-position-resolution level-layer progression
    CPRLLP,

    // All other values reserved
    Reserved { value: u8 },
}

impl ProgressionOrder {
    fn new(value: u8) -> ProgressionOrder {
        match value {
            0b0000_0000 => ProgressionOrder::LRLCPP,
            0b0000_0001 => ProgressionOrder::RLLCPP,
            0b0000_0010 => ProgressionOrder::RLPCLP,
            0b0000_0011 => ProgressionOrder::PCRLLP,
            0b0000_0100 => ProgressionOrder::CPRLLP,
            _ => ProgressionOrder::Reserved { value },
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum CodingBlockStyle {
    // xxxx xxx0 No selective arithmetic coding bypass
    NoSelectiveArithmeticCodingBypass,

    // xxxx xxx1 - Selective arithmetic coding bypass
    SelectiveArithmeticCodingBypass,

    // xxxx xx0x - No reset of context probabilities on coding pass boundaries
    NoResetOfContextProbabilities,

    // xxxx xx1x - Reset context probabilities on coding pass boundaries
    ResetContextProbabilities,

    // xxxx x0xx - No termination on each coding pass
    NoTerminationOnEachCodingPass,

    // xxxx x1xx - Termination on each coding pass
    TerminationOnEachCodingPass,

    // xxxx 0xxx - No vertically causal context
    NoVerticallyCausalContext,

    // xxxx 1xxx - Vertically causal context
    VerticallyCausalContext,

    // xxx0 xxxx - No predictable termination
    NoPredictableTermination,

    // xxx1 xxxx - Predictable termination
    PredictableTermination,

    // xx0x xxxx - No segmentation symbols are used
    NoSegmentationSymbolsAreUsed,

    // xx1x xxxx - Segmentation symbols are used
    SegmentationSymbolsAreUsed,
}

impl CodingBlockStyle {
    fn new(value: u8) -> Vec<CodingBlockStyle> {
        let flags = vec![
            (
                0b_0000_0001,
                CodingBlockStyle::SelectiveArithmeticCodingBypass,
                CodingBlockStyle::NoSelectiveArithmeticCodingBypass,
            ),
            (
                0b_0000_0010,
                CodingBlockStyle::ResetContextProbabilities,
                CodingBlockStyle::NoResetOfContextProbabilities,
            ),
            (
                0b_0000_0100,
                CodingBlockStyle::TerminationOnEachCodingPass,
                CodingBlockStyle::NoTerminationOnEachCodingPass,
            ),
            (
                0b_0000_1000,
                CodingBlockStyle::VerticallyCausalContext,
                CodingBlockStyle::NoVerticallyCausalContext,
            ),
            (
                0b_0001_0000,
                CodingBlockStyle::PredictableTermination,
                CodingBlockStyle::NoPredictableTermination,
            ),
            (
                0b_0010_0000,
                CodingBlockStyle::SegmentationSymbolsAreUsed,
                CodingBlockStyle::NoSegmentationSymbolsAreUsed,
            ),
        ];

        flags
            .into_iter()
            .map(|(mask, set, unset)| if value & mask != 0 { set } else { unset })
            .collect()
    }
}

// A.13 – Coding style parameter values for the Scod parameter
#[derive(Debug, PartialEq)]
pub enum CodingStyleDefault {
    // xxxx xxx0 Entropy coder, precincts with PPx = 15 and PPy = 15
    EntropyCoderWithPrecincts,

    // xxxx xxx1 Entropy coder with precincts defined below
    EntropyCoderWithPrecinctsDefined,

    // xxxx xx0x No SOP marker segments used
    NoSOP,

    // xxxx xx1x SOP marker segments may be used
    SOP,

    // xxxx x0xx No EPH marker used
    NoEPH,

    // xxxx x1xx EPH marker may be used
    EPH,
}

impl CodingStyleDefault {
    fn new(value: u8) -> Vec<CodingStyleDefault> {
        let mut coding_styles: Vec<CodingStyleDefault> = vec![];

        if value & 0b0000_0001 == 0 {
            coding_styles.push(CodingStyleDefault::EntropyCoderWithPrecincts);
        } else {
            coding_styles.push(CodingStyleDefault::EntropyCoderWithPrecinctsDefined);
        }

        if value & 0b0000_0010 == 0 {
            coding_styles.push(CodingStyleDefault::NoSOP);
        } else {
            coding_styles.push(CodingStyleDefault::SOP);
        }

        if value & 0b0000_0100 == 0 {
            coding_styles.push(CodingStyleDefault::NoEPH);
        } else {
            coding_styles.push(CodingStyleDefault::EPH);
        }

        coding_styles
    }
}

#[derive(Debug, PartialEq)]
pub enum CodingStyleComponent {
    // 0000 0000 Entropy coder, precincts with PPx = 15 and PPy = 15
    EntropyCoderWithPrecincts,

    // 0000 0001 Entropy coder with precincts defined below
    EntropyCoderWithPrecinctsDefined,

    // All other values reserved
    Reserved { value: u8 },
}

impl CodingStyleComponent {
    fn new(value: u8) -> CodingStyleComponent {
        match value {
            0b_0000_0000 => CodingStyleComponent::EntropyCoderWithPrecincts,
            0b_0000_0001 => CodingStyleComponent::EntropyCoderWithPrecinctsDefined,
            _ => CodingStyleComponent::Reserved { value },
        }
    }
}

const MULTIPLE_COMPONENT_TRANSFORMATION_NONE: u8 = 0b_0000_0000;
const MULTIPLE_COMPONENT_TRANSFORMATION_MULTIPLE: u8 = 0b_0000_0001;

#[derive(Debug, PartialEq)]
pub enum MultipleComponentTransformation {
    // No multiple component transformation specified.
    None,

    // Component transformation used on components 0, 1, 2 for coding efficiency.
    // Irreversible component transformation used with the 9-7 irreversible filter.
    // Reversible component transformation used with the 5-3 reversible filter.
    Multiple,

    // All other values reserved
    Reserved { value: u8 },
}

impl MultipleComponentTransformation {
    fn new(value: u8) -> MultipleComponentTransformation {
        match value {
            MULTIPLE_COMPONENT_TRANSFORMATION_NONE => MultipleComponentTransformation::None,
            MULTIPLE_COMPONENT_TRANSFORMATION_MULTIPLE => MultipleComponentTransformation::Multiple,
            _ => MultipleComponentTransformation::Reserved { value },
        }
    }
}

const TRANSFORMATION_FILTER_IRREVERSIBLE: [u8; 1] = [0];
const TRANSFORMATION_FILTER_REVERSIBLE: [u8; 1] = [1];

#[derive(Debug, PartialEq)]
pub enum TransformationFilter {
    // 9-7 irreversible filter
    Irreversible,
    // 5-3 reversible filter
    Reversible,

    // All other values reserved
    Reserved { value: [u8; 1] },
}

impl TransformationFilter {
    fn new(value: [u8; 1]) -> TransformationFilter {
        match value {
            TRANSFORMATION_FILTER_IRREVERSIBLE => TransformationFilter::Irreversible,
            TRANSFORMATION_FILTER_REVERSIBLE => TransformationFilter::Reversible,
            _ => TransformationFilter::Reserved { value },
        }
    }
}

// A.4.2
//
// Start of tile-part (SOT)
//
// Function: Marks the beginning of a tile-part, the index of its tile, and the
// index of its tile-part. Tile-parts from other tiles may be interleaved in
// the codestream, so the tile-parts of a given tile may not appear
// contiguously.
#[derive(Debug, Default, Clone)]
pub struct StartOfTileSegment {
    offset: u64,
    length: u16,

    // Isot: Tile index.
    //
    // This number refers to the tiles in raster order starting at the number 0
    tile_index: [u8; 2],

    // Psot: Length, in bytes, from the beginning of the first byte of this SOT
    // marker segment of the tile-part to the end of the data of that tile-part.
    //
    // Only the last tile-part in the codestream may contain a 0 for Psot.
    //
    // If the Psot is 0, this tile-part is assumed to contain all data until the
    // EOC marker.
    tile_part_length: [u8; 4],

    // TPsot: Tile-part index.
    //
    // There is a specific order required for decoding tile-parts; this index
    // denotes the order from 0.
    tile_part_index: [u8; 1],

    // TNsot: Number of tile-parts of a tile in the codestream.
    //
    // A zero value indicates that the number of tile-parts of this tile is not
    // specified in this tile-part.
    no_tile_parts: [u8; 1],
}

impl StartOfTileSegment {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn tile_index(&self) -> u16 {
        u16::from_be_bytes(self.tile_index)
    }

    pub fn tile_part_length(&self) -> u32 {
        u32::from_be_bytes(self.tile_part_length)
    }

    pub fn tile_part_index(&self) -> u8 {
        self.tile_part_index[0]
    }

    pub fn no_tile_parts(&self) -> u8 {
        self.no_tile_parts[0]
    }
}

// A.6.1
//
// Coding style default (COD)
//
// Function: Describes the coding style, number of decomposition levels,
// and layering that is the default used for compressing all components of
// an image (if in the main header) or a tile (if in the tile-part header).
//
// The parameter values can be overridden for an individual component by a
// COC marker segment in either the main or tile-part header.
#[derive(Debug, Default)]
pub struct CodingStyleMarkerSegment {
    offset: u64,

    length: u16,

    coding_style: [u8; 1],

    // Progression order
    progression_order: [u8; 1],

    // Number of layers
    no_layers: [u8; 2],

    // Multiple component transformation
    multiple_component_transformation: [u8; 1],

    coding_style_parameters: CodingStyleParameters,
}

impl CodingStyleMarkerSegment {
    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn coding_style(&self) -> u8 {
        self.coding_style[0]
    }

    pub fn coding_styles(&self) -> Vec<CodingStyleDefault> {
        CodingStyleDefault::new(self.coding_style[0])
    }

    pub fn progression_order(&self) -> ProgressionOrder {
        ProgressionOrder::new(self.progression_order[0])
    }

    pub fn no_layers(&self) -> u16 {
        u16::from_be_bytes(self.no_layers)
    }

    pub fn multiple_component_transformation(&self) -> MultipleComponentTransformation {
        MultipleComponentTransformation::new(self.multiple_component_transformation[0])
    }

    pub fn coding_style_parameters(&self) -> &CodingStyleParameters {
        &self.coding_style_parameters
    }
}

// A.6.2
//
// Coding style component (COC)
//
// Function: Describes the coding style, number of decomposition levels, and
// layering used for compressing a particular component.
#[derive(Debug, Default)]
pub struct CodingStyleComponentSegment {
    offset: u64,

    length: u16,

    // Ccoc: The index of the component to which this marker segment relates.
    // 8 bits if Csiz < 257, 16 bits otherwise.
    component_index: u16,

    // Scoc: Coding style for this component
    coding_style: [u8; 1],

    // SPcoc: Parameters for coding style designated in Scoc.
    coding_style_parameters: CodingStyleParameters,
}

impl CodingStyleComponentSegment {
    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn component_index(&self) -> u16 {
        self.component_index
    }

    pub fn component_coding_style(&self) -> CodingStyleComponent {
        CodingStyleComponent::new(self.coding_style[0])
    }

    pub fn coding_style_parameters(&self) -> &CodingStyleParameters {
        &self.coding_style_parameters
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct PrecinctSize {
    value: u8,
}

impl PrecinctSize {
    pub fn width_exponent(&self) -> u8 {
        // 4 LSBs are the precinct width exponent, PPx = value
        self.value & 0b0000_1111
    }

    pub fn height_exponent(&self) -> u8 {
        // 4 MSBs are the precinct height exponent PPy = value
        self.value >> 4
    }
}

// A.12 – Coding style default parameter values
#[derive(Debug, Default)]
pub struct CodingStyleParameters {
    // Coding style
    coding_style: [u8; 1],

    // Number of decomposition levels, N_L, Zero implies no transformation
    no_decomposition_levels: [u8; 1],

    // Code-block width exponent offset value, xcb
    code_block_width: [u8; 1],

    // Code-block height exponent offset value, ycb
    code_block_height: [u8; 1],

    // Style of the code-block coding passes
    code_block_style: [u8; 1],

    // Wavelet transformation used.
    transformation: [u8; 1],

    // If Scod or Scoc = xxxx xxx0, this parameter is not present; otherwise
    // this indicates precinct width and height.
    precinct_size: Vec<u8>,
}

impl CodingStyleParameters {
    pub fn no_decomposition_levels(&self) -> u8 {
        self.no_decomposition_levels[0]
    }

    // A.18
    //
    // Code-block width and height exponent offset value xcb = value + 2 or ycb = value + 2.
    // Offsets are checked on decode, so the size is at most 1024.
    pub fn code_block_width(&self) -> u16 {
        1 << (self.code_block_width[0] + 2)
    }

    pub fn code_block_height(&self) -> u16 {
        1 << (self.code_block_height[0] + 2)
    }

    pub fn code_block_style(&self) -> u8 {
        self.code_block_style[0]
    }

    pub fn coding_block_styles(&self) -> Vec<CodingBlockStyle> {
        CodingBlockStyle::new(self.code_block_style[0])
    }

    pub fn transformation(&self) -> TransformationFilter {
        TransformationFilter::new(self.transformation)
    }

    pub fn has_defined_precinct_size(&self) -> bool {
        self.coding_style[0] & 0b0000_0001 == 1
    }

    /// Precinct sizes from the NLLL sub-band upwards, one per resolution level.
    ///
    /// Without defined precincts this is a single entry with PPx = PPy = 15.
    pub fn precinct_sizes(&self) -> Vec<PrecinctSize> {
        if !self.has_defined_precinct_size() {
            return vec![PrecinctSize { value: 0xFF }];
        }

        self.precinct_size
            .iter()
            .map(|value| PrecinctSize { value: *value })
            .collect()
    }
}

/// Precision, signedness and sub-sampling of one component, from SIZ.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ComponentSize {
    // Ssiz: Precision (depth) in bits and sign of the component samples.
    precision: [u8; 1],

    // XRsiz: Horizontal separation of a sample with respect to the reference grid.
    horizontal_separation: [u8; 1],

    // YRsiz: Vertical separation of a sample with respect to the reference grid.
    vertical_separation: [u8; 1],
}

impl ComponentSize {
    pub fn precision(&self) -> u8 {
        // ISO/IEC 15444-1:2019 Table A.11, component bit depth is value + 1.
        (self.precision[0] & 0x7f) + 1
    }

    pub fn values_are_signed(&self) -> bool {
        (self.precision[0] & 0x80) == 0x80
    }

    pub fn horizontal_separation(&self) -> u8 {
        self.horizontal_separation[0]
    }

    pub fn vertical_separation(&self) -> u8 {
        self.vertical_separation[0]
    }
}

// A.5.1
//
// Image and tile size (SIZ)
//
// Function: Provides information about the uncompressed image such as the
// width and height of the reference grid, the width and height of the tiles,
// the number of components, component bit depth, and the separation of
// component samples with respect to the reference grid.
#[derive(Debug, Default)]
pub struct ImageAndTileSizeMarkerSegment {
    offset: u64,
    length: u16,

    // Rsiz: Denotes capabilities that a decoder needs to properly decode the
    // codestream.
    decoder_capabilities: [u8; 2],

    // XSiz: Width of the reference grid.
    reference_grid_width: [u8; 4],

    // YSiz: Height of the reference grid.
    reference_grid_height: [u8; 4],

    // XOsiz: Horizontal offset from the origin of the reference grid to the
    // left side of the image area.
    image_horizontal_offset: [u8; 4],

    // YOsiz: Vertical offset from the origin of the reference grid to the top
    // side of the image area.
    image_vertical_offset: [u8; 4],

    // XTsiz: Width of one reference tile with respect to the reference grid
    reference_tile_width: [u8; 4],

    // YTsiz: Height of one reference tile with respect to the reference grid.
    reference_tile_height: [u8; 4],

    // XTOsiz: Horizontal offset from the origin of the reference grid to the
    // left side of the first tile.
    tile_horizontal_offset: [u8; 4],

    // YTOsiz: Vertical offset from the origin of the reference grid to the
    // top side of the first tile.
    tile_vertical_offset: [u8; 4],

    // Csiz: Number of components in the image.
    no_components: [u8; 2],

    components: Vec<ComponentSize>,
}

impl ImageAndTileSizeMarkerSegment {
    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn decoder_capabilities(&self) -> u16 {
        u16::from_be_bytes(self.decoder_capabilities)
    }

    pub fn reference_grid_width(&self) -> u32 {
        u32::from_be_bytes(self.reference_grid_width)
    }
    pub fn reference_grid_height(&self) -> u32 {
        u32::from_be_bytes(self.reference_grid_height)
    }

    pub fn image_horizontal_offset(&self) -> u32 {
        u32::from_be_bytes(self.image_horizontal_offset)
    }
    pub fn image_vertical_offset(&self) -> u32 {
        u32::from_be_bytes(self.image_vertical_offset)
    }

    pub fn reference_tile_width(&self) -> u32 {
        u32::from_be_bytes(self.reference_tile_width)
    }
    pub fn reference_tile_height(&self) -> u32 {
        u32::from_be_bytes(self.reference_tile_height)
    }

    pub fn tile_horizontal_offset(&self) -> u32 {
        u32::from_be_bytes(self.tile_horizontal_offset)
    }
    pub fn tile_vertical_offset(&self) -> u32 {
        u32::from_be_bytes(self.tile_vertical_offset)
    }

    pub fn no_components(&self) -> u16 {
        u16::from_be_bytes(self.no_components)
    }

    pub fn components(&self) -> &[ComponentSize] {
        &self.components
    }

    pub fn precision(&self, i: usize) -> Option<u8> {
        self.components.get(i).map(ComponentSize::precision)
    }

    pub fn values_are_signed(&self, i: usize) -> Option<bool> {
        self.components.get(i).map(ComponentSize::values_are_signed)
    }

    pub fn horizontal_separation(&self, i: usize) -> Option<u8> {
        self.components
            .get(i)
            .map(ComponentSize::horizontal_separation)
    }

    pub fn vertical_separation(&self, i: usize) -> Option<u8> {
        self.components.get(i).map(ComponentSize::vertical_separation)
    }

    // Xsiz - XOsiz
    pub fn image_width(&self) -> u32 {
        self.reference_grid_width() - self.image_horizontal_offset()
    }

    // Ysiz - YOsiz
    pub fn image_height(&self) -> u32 {
        self.reference_grid_height() - self.image_vertical_offset()
    }

    // numXtiles = ⌈(Xsiz - XTOsiz) / XTsiz⌉
    pub fn no_tiles_x(&self) -> u32 {
        let span = (self.reference_grid_width() - self.tile_horizontal_offset()) as u64;
        let tile_width = self.reference_tile_width() as u64;
        ((span + tile_width - 1) / tile_width) as u32
    }

    // numYtiles = ⌈(Ysiz - YTOsiz) / YTsiz⌉
    pub fn no_tiles_y(&self) -> u32 {
        let span = (self.reference_grid_height() - self.tile_vertical_offset()) as u64;
        let tile_height = self.reference_tile_height() as u64;
        ((span + tile_height - 1) / tile_height) as u32
    }

    pub fn no_tiles(&self) -> u64 {
        self.no_tiles_x() as u64 * self.no_tiles_y() as u64
    }
}

#[derive(Debug, PartialEq)]
pub enum CommentRegistrationValue {
    // General use (binary values)
    Binary,

    // General use (ISO 8859-15:1999 (Latin) values)
    Latin,

    // All other values reserved
    Reserved { value: [u8; 2] },
}

impl CommentRegistrationValue {
    fn new(value: [u8; 2]) -> CommentRegistrationValue {
        match u16::from_be_bytes(value) {
            // See ISO/IEC 15444-1:2019 Table A.44
            0 => CommentRegistrationValue::Binary,
            1 => CommentRegistrationValue::Latin,
            _ => CommentRegistrationValue::Reserved { value },
        }
    }
}

// A.9.2
//
// Comment (COM)
//
// Allows unstructured data in the main and tile-part header.
#[derive(Debug, Default)]
pub struct CommentMarkerSegment {
    offset: u64,

    // RCom: Registration value of the marker segment
    registration_value: [u8; 2],

    // Ccomi: Byte of unstructured data
    comment: Vec<u8>,
}

impl CommentMarkerSegment {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn registration_value(&self) -> CommentRegistrationValue {
        CommentRegistrationValue::new(self.registration_value)
    }

    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    pub fn comment_utf8(&self) -> Result<&str, str::Utf8Error> {
        str::from_utf8(&self.comment)
    }
}

#[derive(Debug, PartialEq)]
pub enum QuantizationStyle {
    No { guard: u8 },
    ScalarDerived { guard: u8 },
    ScalarExpounded { guard: u8 },
    Reserved { value: u8 },
}

impl QuantizationStyle {
    fn new(byte: u8) -> QuantizationStyle {
        let value = byte & 0b0001_1111;

        // 000x xxxx to 111x xxxx, Number of guard bits: 0 to 7
        let guard = byte >> 5;

        match value {
            // No quantization
            0b0000_0000 => QuantizationStyle::No { guard },

            // Scalar derived (values signalled for NLLL subband only).
            0b0000_0001 => QuantizationStyle::ScalarDerived { guard },

            // Scalar expounded (values signalled for each subband). There are
            // as many step sizes signalled as there are subbands.
            0b0000_0010 => QuantizationStyle::ScalarExpounded { guard },

            _ => QuantizationStyle::Reserved { value: byte },
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum QuantizationValue {
    Reversible { value: [u8; 1] },
    Irreversible { value: [u8; 2] },
}

impl QuantizationValue {
    pub fn value(&self) -> u16 {
        match &self {
            QuantizationValue::Reversible { value } => value[0] as u16,
            QuantizationValue::Irreversible { value } => u16::from_be_bytes(*value),
        }
    }

    // 5 most significant bits
    pub fn exponent(&self) -> u8 {
        match &self {
            QuantizationValue::Reversible { value } => value[0] >> 3,
            QuantizationValue::Irreversible { value } => value[0] >> 3,
        }
    }

    // 11 least significant bits, irreversible only
    pub fn mantissa(&self) -> Option<u16> {
        match &self {
            QuantizationValue::Reversible { .. } => None,
            QuantizationValue::Irreversible { value } => {
                Some(u16::from_be_bytes([value[0] & 0b0000_0111, value[1]]))
            }
        }
    }
}

/// Quantization style and step sizes shared by QCD and QCC.
#[derive(Debug, Default)]
pub struct QuantizationParameters {
    quantization_style: [u8; 1],

    // SPqcd^i / SPqcc^i: Quantization step size value for the ith subband in
    // the defined order, 8 bits each without quantization, 16 bits otherwise.
    step_sizes: Vec<u8>,
}

impl QuantizationParameters {
    pub fn quantization_style_u8(&self) -> u8 {
        self.quantization_style[0]
    }

    pub fn quantization_style(&self) -> QuantizationStyle {
        QuantizationStyle::new(self.quantization_style[0])
    }

    pub fn no_guard_bits(&self) -> u8 {
        self.quantization_style[0] >> 5
    }

    pub fn quantization_values(&self) -> Vec<QuantizationValue> {
        match self.quantization_style() {
            QuantizationStyle::No { .. } => self
                .step_sizes
                .iter()
                .map(|value| QuantizationValue::Reversible { value: [*value] })
                .collect(),
            QuantizationStyle::ScalarDerived { .. } | QuantizationStyle::ScalarExpounded { .. } => {
                self.step_sizes
                    .chunks_exact(2)
                    .map(|value| QuantizationValue::Irreversible {
                        value: [value[0], value[1]],
                    })
                    .collect()
            }
            QuantizationStyle::Reserved { .. } => vec![],
        }
    }

    pub fn quantization_exponents(&self) -> Vec<u8> {
        self.quantization_values()
            .iter()
            .map(QuantizationValue::exponent)
            .collect()
    }
}

// A.6.4
//
// Quantization default (QCD)
//
// Function: Describes the quantization default used for compressing all
// components not defined by a QCC marker segment. The parameter values can be
// overridden for an individual component by a QCC marker segment in either the
// main or tile-part header.
#[derive(Debug, Default)]
pub struct QuantizationDefaultMarkerSegment {
    offset: u64,

    // Length of marker segment in bytes (not including the marker).
    length: u16,

    // Sqcd, SPqcd
    parameters: QuantizationParameters,
}

impl QuantizationDefaultMarkerSegment {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn quantization_parameters(&self) -> &QuantizationParameters {
        &self.parameters
    }

    pub fn quantization_style(&self) -> QuantizationStyle {
        self.parameters.quantization_style()
    }

    pub fn quantization_values(&self) -> Vec<QuantizationValue> {
        self.parameters.quantization_values()
    }
}

// A.6.5
//
// Quantization component (QCC)
//
// Function: Describes the quantization used for compressing a particular
// component
#[derive(Debug, Default)]
pub struct QuantizationComponentSegment {
    offset: u64,

    // Lqcc
    length: u16,

    // Cqcc: The index of the component to which this marker segment relates.
    component_index: u16,

    // Sqcc, SPqcc
    parameters: QuantizationParameters,
}

impl QuantizationComponentSegment {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn component_index(&self) -> u16 {
        self.component_index
    }

    pub fn quantization_parameters(&self) -> &QuantizationParameters {
        &self.parameters
    }

    pub fn quantization_style(&self) -> QuantizationStyle {
        self.parameters.quantization_style()
    }

    pub fn quantization_values(&self) -> Vec<QuantizationValue> {
        self.parameters.quantization_values()
    }
}

/// A decoded marker or marker segment.
#[derive(Debug)]
pub enum MarkerSegment {
    StartOfCodestream,
    StartOfData,
    EndOfCodestream,
    ImageAndTileSize(ImageAndTileSizeMarkerSegment),
    CodingStyleDefault(CodingStyleMarkerSegment),
    CodingStyleComponent(CodingStyleComponentSegment),
    QuantizationDefault(QuantizationDefaultMarkerSegment),
    QuantizationComponent(QuantizationComponentSegment),
    Comment(CommentMarkerSegment),
    StartOfTilePart(StartOfTileSegment),

    /// A length-prefixed segment that is not interpreted, its payload was
    /// discarded.
    Skipped {
        marker: MarkerSymbol,
        offset: u64,
        length: u16,
    },
}

impl MarkerSegment {
    pub fn marker(&self) -> MarkerSymbol {
        match self {
            MarkerSegment::StartOfCodestream => MARKER_SYMBOL_SOC,
            MarkerSegment::StartOfData => MARKER_SYMBOL_SOD,
            MarkerSegment::EndOfCodestream => MARKER_SYMBOL_EOC,
            MarkerSegment::ImageAndTileSize(_) => MARKER_SYMBOL_SIZ,
            MarkerSegment::CodingStyleDefault(_) => MARKER_SYMBOL_COD,
            MarkerSegment::CodingStyleComponent(_) => MARKER_SYMBOL_COC,
            MarkerSegment::QuantizationDefault(_) => MARKER_SYMBOL_QCD,
            MarkerSegment::QuantizationComponent(_) => MARKER_SYMBOL_QCC,
            MarkerSegment::Comment(_) => MARKER_SYMBOL_COM,
            MarkerSegment::StartOfTilePart(_) => MARKER_SYMBOL_SOT,
            MarkerSegment::Skipped { marker, .. } => *marker,
        }
    }
}

// Either 8 or 16 bits depending on Csiz value.
fn decode_component_index<R: io::Read>(reader: &mut R, no_components: u16) -> io::Result<u16> {
    if no_components < 257 {
        let mut buffer: [u8; 1] = [0; 1];
        reader.read_exact(&mut buffer)?;
        Ok(buffer[0] as u16)
    } else {
        let mut buffer: [u8; 2] = [0; 2];
        reader.read_exact(&mut buffer)?;
        Ok(u16::from_be_bytes(buffer))
    }
}

fn decode_siz<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    offset: u64,
    length: u16,
) -> Result<ImageAndTileSizeMarkerSegment, CodestreamError> {
    let mut segment = ImageAndTileSizeMarkerSegment {
        offset,
        length,
        ..Default::default()
    };

    reader.read_exact(&mut segment.decoder_capabilities)?;
    reader.read_exact(&mut segment.reference_grid_width)?;
    reader.read_exact(&mut segment.reference_grid_height)?;
    reader.read_exact(&mut segment.image_horizontal_offset)?;
    reader.read_exact(&mut segment.image_vertical_offset)?;
    reader.read_exact(&mut segment.reference_tile_width)?;
    reader.read_exact(&mut segment.reference_tile_height)?;
    reader.read_exact(&mut segment.tile_horizontal_offset)?;
    reader.read_exact(&mut segment.tile_vertical_offset)?;
    reader.read_exact(&mut segment.no_components)?;

    let no_components = segment.no_components();
    if no_components == 0 {
        return Err(CodestreamError::MarkerError {
            marker: MARKER_SYMBOL_SIZ,
            error: "number of components (Csiz) is zero".to_owned(),
        });
    }

    segment.components = Vec::with_capacity(no_components as usize);
    for _ in 0..no_components {
        let mut component = ComponentSize::default();
        reader.read_exact(&mut component.precision)?;
        reader.read_exact(&mut component.horizontal_separation)?;
        reader.read_exact(&mut component.vertical_separation)?;
        segment.components.push(component);
    }
    debug!("SIZ components {:?}", segment.components);

    if segment.reference_tile_width() == 0 || segment.reference_tile_height() == 0 {
        return Err(CodestreamError::MarkerError {
            marker: MARKER_SYMBOL_SIZ,
            error: format!(
                "empty reference tile {}x{}",
                segment.reference_tile_width(),
                segment.reference_tile_height()
            ),
        });
    }

    if segment.reference_grid_width() <= segment.image_horizontal_offset()
        || segment.reference_grid_height() <= segment.image_vertical_offset()
    {
        return Err(CodestreamError::MarkerError {
            marker: MARKER_SYMBOL_SIZ,
            error: format!(
                "empty image area: Xsiz = {}, Ysiz = {}, XOsiz = {}, YOsiz = {}",
                segment.reference_grid_width(),
                segment.reference_grid_height(),
                segment.image_horizontal_offset(),
                segment.image_vertical_offset()
            ),
        });
    }

    // The tile grid offsets (XTOsiz, YTOsiz) are constrained to be no
    // greater than the image area offsets.
    // 0 ≤ XTOsiz ≤ XOsiz
    // 0 ≤ YTOsiz ≤ YOsiz
    if segment.tile_horizontal_offset() > segment.image_horizontal_offset()
        || segment.tile_vertical_offset() > segment.image_vertical_offset()
    {
        return Err(CodestreamError::TileGridOffsetOverflow {
            tile_horizontal_offset: segment.tile_horizontal_offset(),
            image_horizontal_offset: segment.image_horizontal_offset(),
            tile_vertical_offset: segment.tile_vertical_offset(),
            image_vertical_offset: segment.image_vertical_offset(),
        });
    }

    // The tile size plus the tile offset shall be greater than the image area
    // offset, so the first tile contains at least one reference grid point
    // from the image area.
    // XTsiz + XTOsiz > XOsiz
    // YTsiz + YTOsiz > YOsiz
    if (segment.reference_tile_width() as u64 + segment.tile_horizontal_offset() as u64)
        <= segment.image_horizontal_offset() as u64
        || (segment.reference_tile_height() as u64 + segment.tile_vertical_offset() as u64)
            <= segment.image_vertical_offset() as u64
    {
        return Err(CodestreamError::TileSizeOverflow {
            reference_tile_width: segment.reference_tile_width(),
            tile_horizontal_offset: segment.tile_horizontal_offset(),
            image_horizontal_offset: segment.image_horizontal_offset(),
            reference_tile_height: segment.reference_tile_height(),
            tile_vertical_offset: segment.tile_vertical_offset(),
            image_vertical_offset: segment.image_vertical_offset(),
        });
    }

    Ok(segment)
}

fn decode_sot<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    offset: u64,
    length: u16,
) -> Result<StartOfTileSegment, CodestreamError> {
    // Lsot: fixed at 10
    if length != 10 {
        return Err(CodestreamError::MarkerError {
            marker: MARKER_SYMBOL_SOT,
            error: format!("Lsot {} at byte offset {} is not 10", length, offset),
        });
    }

    let mut segment = StartOfTileSegment {
        offset,
        length,
        ..Default::default()
    };

    // Isot
    reader.read_exact(&mut segment.tile_index)?;

    // Psot
    reader.read_exact(&mut segment.tile_part_length)?;

    // TPsot
    reader.read_exact(&mut segment.tile_part_index)?;

    // TNsot
    reader.read_exact(&mut segment.no_tile_parts)?;

    // The tile-part length counts the 12 bytes of the SOT marker segment.
    let tile_part_length = segment.tile_part_length();
    if tile_part_length != 0 && tile_part_length < 12 {
        return Err(CodestreamError::TilePartLength {
            offset,
            length: tile_part_length,
        });
    }

    debug!(
        "SOT tile {} part {} of {} length {}",
        segment.tile_index(),
        segment.tile_part_index(),
        segment.no_tile_parts(),
        tile_part_length
    );

    Ok(segment)
}

fn decode_coding_style_parameters<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    marker: MarkerSymbol,
    coding_style: u8,
    coding_style_parameters: &mut CodingStyleParameters,
) -> Result<(), CodestreamError> {
    coding_style_parameters.coding_style = [coding_style];

    reader.read_exact(&mut coding_style_parameters.no_decomposition_levels)?;
    reader.read_exact(&mut coding_style_parameters.code_block_width)?;
    reader.read_exact(&mut coding_style_parameters.code_block_height)?;

    // Table A.18, each offset is at most 8 and the two offsets sum to at most 8.
    let xcb = coding_style_parameters.code_block_width[0];
    let ycb = coding_style_parameters.code_block_height[0];
    if xcb > 8 || ycb > 8 || xcb + ycb > 8 {
        return Err(CodestreamError::MarkerError {
            marker,
            error: format!("code-block size exponent offsets {} and {}", xcb, ycb),
        });
    }

    reader.read_exact(&mut coding_style_parameters.code_block_style)?;
    reader.read_exact(&mut coding_style_parameters.transformation)?;

    if coding_style_parameters.has_defined_precinct_size() {
        // The first parameter (8 bits) corresponds to the N<sub>L</sub>LL sub-band.
        // Each successive parameter corresponds to each successive resolution level in order.
        let expected = coding_style_parameters.no_decomposition_levels() as u64 + 1;
        let available = reader.remaining();
        if available != expected {
            warn!(
                "{} precinct sizes for {} resolution levels",
                available, expected
            );
        }
        coding_style_parameters.precinct_size = vec![0; available as usize];
        reader.read_exact(&mut coding_style_parameters.precinct_size)?;
    }

    Ok(())
}

fn decode_cod<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    offset: u64,
    length: u16,
) -> Result<CodingStyleMarkerSegment, CodestreamError> {
    let mut segment = CodingStyleMarkerSegment {
        offset,
        length,
        ..Default::default()
    };

    reader.read_exact(&mut segment.coding_style)?;
    reader.read_exact(&mut segment.progression_order)?;
    reader.read_exact(&mut segment.no_layers)?;
    reader.read_exact(&mut segment.multiple_component_transformation)?;

    decode_coding_style_parameters(
        reader,
        MARKER_SYMBOL_COD,
        segment.coding_style[0],
        &mut segment.coding_style_parameters,
    )?;

    Ok(segment)
}

fn decode_coc<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    offset: u64,
    length: u16,
    no_components: u16,
) -> Result<CodingStyleComponentSegment, CodestreamError> {
    let mut segment = CodingStyleComponentSegment {
        offset,
        length,
        ..Default::default()
    };

    segment.component_index = decode_component_index(reader, no_components)?;

    reader.read_exact(&mut segment.coding_style)?;

    decode_coding_style_parameters(
        reader,
        MARKER_SYMBOL_COC,
        segment.coding_style[0],
        &mut segment.coding_style_parameters,
    )?;

    Ok(segment)
}

fn decode_quantization_parameters<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    marker: MarkerSymbol,
) -> Result<QuantizationParameters, CodestreamError> {
    let mut parameters = QuantizationParameters::default();

    reader.read_exact(&mut parameters.quantization_style)?;

    parameters.step_sizes = vec![0; reader.remaining() as usize];
    reader.read_exact(&mut parameters.step_sizes)?;

    match parameters.quantization_style() {
        QuantizationStyle::No { .. } => {}
        QuantizationStyle::ScalarDerived { .. } if parameters.step_sizes.len() != 2 => {
            return Err(CodestreamError::MarkerError {
                marker,
                error: format!(
                    "scalar derived quantization with {} step size bytes",
                    parameters.step_sizes.len()
                ),
            });
        }
        QuantizationStyle::ScalarDerived { .. } | QuantizationStyle::ScalarExpounded { .. } => {
            if parameters.step_sizes.len() % 2 != 0 {
                return Err(CodestreamError::MarkerError {
                    marker,
                    error: format!(
                        "odd number of step size bytes {}",
                        parameters.step_sizes.len()
                    ),
                });
            }
        }
        QuantizationStyle::Reserved { value } => {
            warn!("Reserved quantization style {:#010b}", value);
        }
    }

    Ok(parameters)
}

fn decode_qcd<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    offset: u64,
    length: u16,
) -> Result<QuantizationDefaultMarkerSegment, CodestreamError> {
    Ok(QuantizationDefaultMarkerSegment {
        offset,
        length,
        parameters: decode_quantization_parameters(reader, MARKER_SYMBOL_QCD)?,
    })
}

fn decode_qcc<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    offset: u64,
    length: u16,
    no_components: u16,
) -> Result<QuantizationComponentSegment, CodestreamError> {
    // Cqcc
    let component_index = decode_component_index(reader, no_components)?;

    Ok(QuantizationComponentSegment {
        offset,
        length,
        component_index,
        parameters: decode_quantization_parameters(reader, MARKER_SYMBOL_QCC)?,
    })
}

fn decode_com<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    offset: u64,
) -> Result<CommentMarkerSegment, CodestreamError> {
    let mut segment = CommentMarkerSegment {
        offset,
        ..Default::default()
    };

    reader.read_exact(&mut segment.registration_value)?;

    segment.comment = vec![0; reader.remaining() as usize];
    reader.read_exact(&mut segment.comment)?;

    Ok(segment)
}

/// Reads the next marker without consuming it, `None` when fewer than two
/// bytes remain.
fn peek_marker<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
) -> Result<Option<MarkerSymbol>, CodestreamError> {
    if reader.remaining() < 2 {
        return Ok(None);
    }

    let mut marker: MarkerSymbol = [0; 2];
    reader.mark();
    let result = reader.read_exact(&mut marker);
    reader.reset()?;
    result?;

    Ok(Some(marker))
}

fn expect_marker<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    expected: MarkerSymbol,
) -> Result<(), CodestreamError> {
    let offset = reader.absolute_position();
    match peek_marker(reader)? {
        Some(marker) if marker == expected => Ok(()),
        Some(marker) => Err(CodestreamError::MarkerUnexpected { marker, offset }),
        None => Err(CodestreamError::MarkerMissing { marker: expected }),
    }
}

fn check_component_index<I>(
    marker: MarkerSymbol,
    component_index: u16,
    no_components: u16,
    mut seen: I,
) -> Result<(), CodestreamError>
where
    I: Iterator<Item = u16>,
{
    if component_index >= no_components {
        return Err(CodestreamError::MarkerError {
            marker,
            error: format!(
                "component index {} exceeds number of components {}",
                component_index, no_components
            ),
        });
    }

    if seen.any(|index| index == component_index) {
        return Err(CodestreamError::MarkerError {
            marker,
            error: format!("duplicate segment for component {}", component_index),
        });
    }

    Ok(())
}

fn duplicate_segment(marker: MarkerSymbol, offset: u64) -> CodestreamError {
    CodestreamError::MarkerError {
        marker,
        error: format!("duplicate {} at byte offset {}", marker_name(marker), offset),
    }
}

/// Decodes the marker at the current position and, for length-prefixed
/// markers, its segment.
///
/// `no_components` is Csiz from SIZ; it fixes the width of the component
/// index in COC and QCC. Each segment is decoded inside a window of its
/// declared length and must consume it exactly. Markers that are not
/// interpreted are skipped.
pub fn decode_marker_segment<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    no_components: u16,
) -> Result<MarkerSegment, CodestreamError> {
    let offset = reader.absolute_position();
    let mut marker: MarkerSymbol = [0; 2];
    reader.read_exact(&mut marker)?;

    match marker {
        MARKER_SYMBOL_SOC => {
            info!("SOC start at byte offset {}", offset);
            return Ok(MarkerSegment::StartOfCodestream);
        }
        MARKER_SYMBOL_SOD => {
            info!("SOD start at byte offset {}", offset);
            return Ok(MarkerSegment::StartOfData);
        }
        MARKER_SYMBOL_EOC => {
            info!("EOC start at byte offset {}", offset);
            return Ok(MarkerSegment::EndOfCodestream);
        }
        // Only valid inside packet data
        MARKER_SYMBOL_EPH => {
            return Err(CodestreamError::MarkerUnexpected { marker, offset });
        }
        _ if marker[0] != 0xFF => {
            return Err(CodestreamError::MarkerError {
                marker,
                error: format!("not a marker at byte offset {}", offset),
            });
        }
        _ => {}
    }

    // Length of marker segment in bytes, including the length but not the
    // marker.
    let length = reader.read_u16()?;
    if length < 2 {
        return Err(CodestreamError::MarkerError {
            marker,
            error: format!("segment length {} at byte offset {}", length, offset),
        });
    }

    let payload_length = (length - 2) as u64;
    if payload_length > reader.remaining() {
        return Err(CodestreamError::SegmentOverrun {
            marker,
            offset,
            length: payload_length,
            remaining: reader.remaining(),
        });
    }

    info!("{} start at byte offset {}", marker_name(marker), offset);
    let segment = reader.with_window(payload_length, |reader| -> Result<_, CodestreamError> {
        let segment = match marker {
            MARKER_SYMBOL_SIZ => MarkerSegment::ImageAndTileSize(decode_siz(reader, offset, length)?),
            MARKER_SYMBOL_COD => {
                MarkerSegment::CodingStyleDefault(decode_cod(reader, offset, length)?)
            }
            MARKER_SYMBOL_COC => MarkerSegment::CodingStyleComponent(decode_coc(
                reader,
                offset,
                length,
                no_components,
            )?),
            MARKER_SYMBOL_QCD => {
                MarkerSegment::QuantizationDefault(decode_qcd(reader, offset, length)?)
            }
            MARKER_SYMBOL_QCC => MarkerSegment::QuantizationComponent(decode_qcc(
                reader,
                offset,
                length,
                no_components,
            )?),
            MARKER_SYMBOL_COM => MarkerSegment::Comment(decode_com(reader, offset)?),
            MARKER_SYMBOL_SOT => MarkerSegment::StartOfTilePart(decode_sot(reader, offset, length)?),
            _ => {
                debug!(
                    "Skipping {} 0x{:02X}{:02X} of {} bytes at byte offset {}",
                    marker_name(marker),
                    marker[0],
                    marker[1],
                    length,
                    offset
                );
                reader.skip(payload_length)?;
                MarkerSegment::Skipped {
                    marker,
                    offset,
                    length,
                }
            }
        };

        if reader.remaining() != 0 {
            return Err(CodestreamError::SegmentLengthMismatch {
                marker,
                offset,
                declared: payload_length,
                consumed: payload_length - reader.remaining(),
            });
        }

        Ok(segment)
    })?;
    info!(
        "{} end at byte offset {}",
        marker_name(marker),
        reader.absolute_position()
    );

    Ok(segment)
}

/// Main header: SIZ followed by the default coding style and quantization
/// and any per-component overrides.
#[derive(Debug)]
pub struct Header {
    image_and_tile_size_marker_segment: ImageAndTileSizeMarkerSegment,

    coding_style_marker_segment: CodingStyleMarkerSegment,

    coding_style_component_segments: Vec<CodingStyleComponentSegment>,

    quantization_default_marker_segment: QuantizationDefaultMarkerSegment,

    quantization_component_segments: Vec<QuantizationComponentSegment>,

    comment_marker_segments: Vec<CommentMarkerSegment>,
}

impl Header {
    pub fn image_and_tile_size_marker_segment(&self) -> &ImageAndTileSizeMarkerSegment {
        &self.image_and_tile_size_marker_segment
    }

    pub fn coding_style_marker_segment(&self) -> &CodingStyleMarkerSegment {
        &self.coding_style_marker_segment
    }

    pub fn coding_style_component_segments(&self) -> &[CodingStyleComponentSegment] {
        &self.coding_style_component_segments
    }

    pub fn quantization_default_marker_segment(&self) -> &QuantizationDefaultMarkerSegment {
        &self.quantization_default_marker_segment
    }

    pub fn quantization_component_segments(&self) -> &[QuantizationComponentSegment] {
        &self.quantization_component_segments
    }

    pub fn comment_marker_segments(&self) -> &[CommentMarkerSegment] {
        &self.comment_marker_segments
    }

    pub fn no_components(&self) -> u16 {
        self.image_and_tile_size_marker_segment.no_components()
    }

    /// Coding style of a component from the main header alone: its COC if
    /// present, otherwise COD.
    pub fn coding_style(&self, component: u16) -> ResolvedCodingStyle<'_> {
        match self
            .coding_style_component_segments
            .iter()
            .find(|segment| segment.component_index() == component)
        {
            Some(segment) => ResolvedCodingStyle::MainComponent(segment),
            None => ResolvedCodingStyle::MainDefault(&self.coding_style_marker_segment),
        }
    }

    /// Quantization of a component from the main header alone: its QCC if
    /// present, otherwise QCD.
    pub fn quantization(&self, component: u16) -> ResolvedQuantization<'_> {
        match self
            .quantization_component_segments
            .iter()
            .find(|segment| segment.component_index() == component)
        {
            Some(segment) => ResolvedQuantization::MainComponent(segment),
            None => ResolvedQuantization::MainDefault(&self.quantization_default_marker_segment),
        }
    }
}

fn decode_main_header<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
) -> Result<Header, CodestreamError> {
    expect_marker(reader, MARKER_SYMBOL_SOC)?;
    decode_marker_segment(reader, 0)?;

    // SIZ shall immediately follow SOC
    expect_marker(reader, MARKER_SYMBOL_SIZ)?;
    let offset = reader.absolute_position();
    let image_and_tile_size_marker_segment = match decode_marker_segment(reader, 0)? {
        MarkerSegment::ImageAndTileSize(segment) => segment,
        segment => {
            return Err(CodestreamError::MarkerUnexpected {
                marker: segment.marker(),
                offset,
            })
        }
    };

    let no_components = image_and_tile_size_marker_segment.no_components();

    let mut coding_style_marker_segment = None;
    let mut coding_style_component_segments: Vec<CodingStyleComponentSegment> = vec![];
    let mut quantization_default_marker_segment = None;
    let mut quantization_component_segments: Vec<QuantizationComponentSegment> = vec![];
    let mut comment_marker_segments = vec![];

    loop {
        let offset = reader.absolute_position();
        match peek_marker(reader)? {
            // The main header ends at the first tile-part, or at EOC for a
            // codestream without tiles.
            Some(MARKER_SYMBOL_SOT) | Some(MARKER_SYMBOL_EOC) => break,
            Some(_) => {}
            None => {
                return Err(CodestreamError::MarkerMissing {
                    marker: MARKER_SYMBOL_SOT,
                })
            }
        }

        match decode_marker_segment(reader, no_components)? {
            MarkerSegment::CodingStyleDefault(segment) => {
                if coding_style_marker_segment.is_some() {
                    return Err(duplicate_segment(MARKER_SYMBOL_COD, offset));
                }
                coding_style_marker_segment = Some(segment);
            }
            MarkerSegment::CodingStyleComponent(segment) => {
                check_component_index(
                    MARKER_SYMBOL_COC,
                    segment.component_index(),
                    no_components,
                    coding_style_component_segments
                        .iter()
                        .map(CodingStyleComponentSegment::component_index),
                )?;
                coding_style_component_segments.push(segment);
            }
            MarkerSegment::QuantizationDefault(segment) => {
                if quantization_default_marker_segment.is_some() {
                    return Err(duplicate_segment(MARKER_SYMBOL_QCD, offset));
                }
                quantization_default_marker_segment = Some(segment);
            }
            MarkerSegment::QuantizationComponent(segment) => {
                check_component_index(
                    MARKER_SYMBOL_QCC,
                    segment.component_index(),
                    no_components,
                    quantization_component_segments
                        .iter()
                        .map(QuantizationComponentSegment::component_index),
                )?;
                quantization_component_segments.push(segment);
            }
            MarkerSegment::Comment(segment) => {
                comment_marker_segments.push(segment);
            }
            MarkerSegment::Skipped { .. } => {}
            segment @ (MarkerSegment::StartOfCodestream
            | MarkerSegment::StartOfData
            | MarkerSegment::EndOfCodestream
            | MarkerSegment::ImageAndTileSize(_)
            | MarkerSegment::StartOfTilePart(_)) => {
                return Err(CodestreamError::MarkerUnexpected {
                    marker: segment.marker(),
                    offset,
                });
            }
        }
    }

    let coding_style_marker_segment =
        coding_style_marker_segment.ok_or(CodestreamError::MarkerMissing {
            marker: MARKER_SYMBOL_COD,
        })?;
    let quantization_default_marker_segment =
        quantization_default_marker_segment.ok_or(CodestreamError::MarkerMissing {
            marker: MARKER_SYMBOL_QCD,
        })?;

    Ok(Header {
        image_and_tile_size_marker_segment,
        coding_style_marker_segment,
        coding_style_component_segments,
        quantization_default_marker_segment,
        quantization_component_segments,
        comment_marker_segments,
    })
}

// Contiguous Codestream
//
// The codestream is a linear stream of bits from the first bit to the last
// bit.
//
// For convenience, it can be divided into (8 bit) bytes, starting with
// the first bit of the codestream, with the "earlier" bit in a byte viewed as
// the most significant bit of the byte when given e.g. a hexadecimal
// representation.
#[derive(Debug)]
pub struct ContiguousCodestream {
    offset: u64,
    length: u64,
    header: Header,
    tiles: BTreeMap<u16, Tile>,
    end_of_codestream: bool,
}

impl ContiguousCodestream {
    /// Decodes a codestream from the current position to EOC, or to the end
    /// of the innermost window of `reader` when EOC is absent.
    pub fn decode<R: io::Read + io::Seek>(
        reader: &mut SubStream<R>,
    ) -> Result<ContiguousCodestream, CodestreamError> {
        let offset = reader.absolute_position();
        info!("Codestream start at byte offset {}", offset);

        let header = decode_main_header(reader)?;
        let no_components = header.no_components();

        let mut codestream = ContiguousCodestream {
            offset,
            length: 0,
            header,
            tiles: BTreeMap::new(),
            end_of_codestream: false,
        };

        loop {
            let marker_offset = reader.absolute_position();
            match peek_marker(reader)? {
                Some(MARKER_SYMBOL_SOT) => {
                    let tile_part = tile::decode_tile_part(reader, no_components)?;
                    codestream.insert_tile_part(tile_part)?;
                }
                Some(MARKER_SYMBOL_EOC) => {
                    decode_marker_segment(reader, no_components)?;
                    codestream.end_of_codestream = true;
                    break;
                }
                Some(marker) => {
                    return Err(CodestreamError::MarkerUnexpected {
                        marker,
                        offset: marker_offset,
                    });
                }
                None => {
                    warn!(
                        "EOC marker missing, codestream ends at byte offset {}",
                        marker_offset
                    );
                    break;
                }
            }
        }

        codestream.length = reader.absolute_position() - offset;
        info!(
            "Codestream end at byte offset {}",
            reader.absolute_position()
        );

        Ok(codestream)
    }

    fn insert_tile_part(&mut self, tile_part: TilePart) -> Result<(), CodestreamError> {
        let tile_index = tile_part.tile_index();
        let no_tiles = self.header.image_and_tile_size_marker_segment.no_tiles();
        if tile_index as u64 >= no_tiles {
            return Err(CodestreamError::MarkerError {
                marker: MARKER_SYMBOL_SOT,
                error: format!(
                    "tile index {} at byte offset {} exceeds number of tiles {}",
                    tile_index,
                    tile_part.offset(),
                    no_tiles
                ),
            });
        }

        match self.tiles.get_mut(&tile_index) {
            Some(tile) => tile.insert(tile_part),
            None => {
                let tile = Tile::new(tile_part)?;
                self.tiles.insert(tile_index, tile);
                Ok(())
            }
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn width(&self) -> u32 {
        self.header.image_and_tile_size_marker_segment.image_width()
    }

    pub fn height(&self) -> u32 {
        self.header.image_and_tile_size_marker_segment.image_height()
    }

    pub fn no_components(&self) -> u16 {
        self.header.no_components()
    }

    pub fn precision(&self, component: usize) -> Option<u8> {
        self.header
            .image_and_tile_size_marker_segment
            .precision(component)
    }

    pub fn values_are_signed(&self, component: usize) -> Option<bool> {
        self.header
            .image_and_tile_size_marker_segment
            .values_are_signed(component)
    }

    /// Tiles in tile index order.
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn tile(&self, index: u16) -> Option<&Tile> {
        self.tiles.get(&index)
    }

    pub fn has_end_of_codestream(&self) -> bool {
        self.end_of_codestream
    }
}

pub fn decode_jpc<R: io::Read + io::Seek>(
    reader: &mut R,
) -> Result<ContiguousCodestream, CodestreamError> {
    let mut reader = SubStream::new(reader)?;
    ContiguousCodestream::decode(&mut reader)
}
