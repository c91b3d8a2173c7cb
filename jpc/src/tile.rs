use log::{debug, info};
use std::io;
use std::io::prelude::*;

use super::{
    check_component_index, decode_marker_segment, duplicate_segment, peek_marker,
    CodestreamError, CodingStyleComponentSegment, CodingStyleMarkerSegment, CodingStyleParameters,
    CommentMarkerSegment, Header, MarkerSegment, MarkerSymbol, QuantizationComponentSegment,
    QuantizationDefaultMarkerSegment, QuantizationParameters, StartOfTileSegment, SubStream,
    MARKER_SYMBOL_COC, MARKER_SYMBOL_COD, MARKER_SYMBOL_EOC, MARKER_SYMBOL_QCC,
    MARKER_SYMBOL_QCD, MARKER_SYMBOL_SOD,
};

// Length of the SOT marker segment including the marker, counted by Psot.
const START_OF_TILE_LENGTH: u64 = 12;

/// Where the coding style of a component was found, in decreasing order of
/// precedence.
#[derive(Debug)]
pub enum ResolvedCodingStyle<'a> {
    TilePartComponent(&'a CodingStyleComponentSegment),
    TilePartDefault(&'a CodingStyleMarkerSegment),
    MainComponent(&'a CodingStyleComponentSegment),
    MainDefault(&'a CodingStyleMarkerSegment),
}

impl<'a> ResolvedCodingStyle<'a> {
    pub fn coding_style_parameters(&self) -> &'a CodingStyleParameters {
        match *self {
            ResolvedCodingStyle::TilePartComponent(segment)
            | ResolvedCodingStyle::MainComponent(segment) => segment.coding_style_parameters(),
            ResolvedCodingStyle::TilePartDefault(segment)
            | ResolvedCodingStyle::MainDefault(segment) => segment.coding_style_parameters(),
        }
    }

    pub fn is_tile_part_header(&self) -> bool {
        matches!(
            self,
            ResolvedCodingStyle::TilePartComponent(_) | ResolvedCodingStyle::TilePartDefault(_)
        )
    }
}

/// Where the quantization of a component was found, in decreasing order of
/// precedence.
#[derive(Debug)]
pub enum ResolvedQuantization<'a> {
    TilePartComponent(&'a QuantizationComponentSegment),
    TilePartDefault(&'a QuantizationDefaultMarkerSegment),
    MainComponent(&'a QuantizationComponentSegment),
    MainDefault(&'a QuantizationDefaultMarkerSegment),
}

impl<'a> ResolvedQuantization<'a> {
    pub fn quantization_parameters(&self) -> &'a QuantizationParameters {
        match *self {
            ResolvedQuantization::TilePartComponent(segment)
            | ResolvedQuantization::MainComponent(segment) => segment.quantization_parameters(),
            ResolvedQuantization::TilePartDefault(segment)
            | ResolvedQuantization::MainDefault(segment) => segment.quantization_parameters(),
        }
    }

    pub fn is_tile_part_header(&self) -> bool {
        matches!(
            self,
            ResolvedQuantization::TilePartComponent(_) | ResolvedQuantization::TilePartDefault(_)
        )
    }
}

// A.4.2
//
// A tile-part: its SOT marker segment, the marker segments of its header up
// to SOD, and the compressed data that follows.
#[derive(Debug, Default)]
pub struct TilePart {
    offset: u64,
    start_of_tile: StartOfTileSegment,
    coding_style_marker_segment: Option<CodingStyleMarkerSegment>,
    coding_style_component_segments: Vec<CodingStyleComponentSegment>,
    quantization_default_marker_segment: Option<QuantizationDefaultMarkerSegment>,
    quantization_component_segments: Vec<QuantizationComponentSegment>,
    comment_marker_segments: Vec<CommentMarkerSegment>,
    data_offset: u64,
    data: Vec<u8>,
}

impl TilePart {
    /// Byte offset of the SOT marker.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn start_of_tile(&self) -> &StartOfTileSegment {
        &self.start_of_tile
    }

    pub fn tile_index(&self) -> u16 {
        self.start_of_tile.tile_index()
    }

    pub fn tile_part_index(&self) -> u8 {
        self.start_of_tile.tile_part_index()
    }

    pub fn coding_style_marker_segment(&self) -> Option<&CodingStyleMarkerSegment> {
        self.coding_style_marker_segment.as_ref()
    }

    pub fn coding_style_component_segments(&self) -> &[CodingStyleComponentSegment] {
        &self.coding_style_component_segments
    }

    pub fn quantization_default_marker_segment(&self) -> Option<&QuantizationDefaultMarkerSegment> {
        self.quantization_default_marker_segment.as_ref()
    }

    pub fn quantization_component_segments(&self) -> &[QuantizationComponentSegment] {
        &self.quantization_component_segments
    }

    pub fn comment_marker_segments(&self) -> &[CommentMarkerSegment] {
        &self.comment_marker_segments
    }

    /// Byte offset of the first byte after SOD.
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Coding style of a component: tile-part COC, tile-part COD, then the
    /// main header.
    pub fn coding_style<'a>(&'a self, header: &'a Header, component: u16) -> ResolvedCodingStyle<'a> {
        if let Some(segment) = self
            .coding_style_component_segments
            .iter()
            .find(|segment| segment.component_index() == component)
        {
            return ResolvedCodingStyle::TilePartComponent(segment);
        }

        match &self.coding_style_marker_segment {
            Some(segment) => ResolvedCodingStyle::TilePartDefault(segment),
            None => header.coding_style(component),
        }
    }

    /// Quantization of a component: tile-part QCC, tile-part QCD, then the
    /// main header.
    pub fn quantization<'a>(&'a self, header: &'a Header, component: u16) -> ResolvedQuantization<'a> {
        if let Some(segment) = self
            .quantization_component_segments
            .iter()
            .find(|segment| segment.component_index() == component)
        {
            return ResolvedQuantization::TilePartComponent(segment);
        }

        match &self.quantization_default_marker_segment {
            Some(segment) => ResolvedQuantization::TilePartDefault(segment),
            None => header.quantization(component),
        }
    }
}

/// The tile-parts of one tile, ordered by tile-part index.
#[derive(Debug)]
pub struct Tile {
    index: u16,
    parts: Vec<TilePart>,
}

impl Tile {
    pub(crate) fn new(tile_part: TilePart) -> Result<Tile, CodestreamError> {
        if tile_part.tile_part_index() != 0 {
            return Err(CodestreamError::TilePartOutOfOrder {
                tile_index: tile_part.tile_index(),
                tile_part_index: tile_part.tile_part_index(),
                offset: tile_part.offset(),
            });
        }

        let mut tile = Tile {
            index: tile_part.tile_index(),
            parts: Vec::with_capacity(1),
        };
        tile.check_tile_part_count(&tile_part)?;
        tile.parts.push(tile_part);
        Ok(tile)
    }

    pub(crate) fn insert(&mut self, tile_part: TilePart) -> Result<(), CodestreamError> {
        let tile_part_index = tile_part.tile_part_index();
        if self
            .parts
            .iter()
            .any(|part| part.tile_part_index() == tile_part_index)
        {
            return Err(CodestreamError::TilePartDuplicate {
                tile_index: self.index,
                tile_part_index,
                offset: tile_part.offset(),
            });
        }
        self.check_tile_part_count(&tile_part)?;

        let position = self
            .parts
            .partition_point(|part| part.tile_part_index() < tile_part_index);
        debug!(
            "Tile {} part {} inserted at position {}",
            self.index, tile_part_index, position
        );
        self.parts.insert(position, tile_part);
        Ok(())
    }

    fn check_tile_part_count(&self, tile_part: &TilePart) -> Result<(), CodestreamError> {
        // Any tile-part may carry TNsot, a zero means it is not known there.
        let declared = self
            .parts
            .iter()
            .map(|part| part.start_of_tile().no_tile_parts())
            .chain(Some(tile_part.start_of_tile().no_tile_parts()))
            .find(|no_tile_parts| *no_tile_parts != 0);

        match declared {
            Some(no_tile_parts) if tile_part.tile_part_index() >= no_tile_parts => {
                Err(CodestreamError::TilePartIndexOverflow {
                    tile_index: self.index,
                    tile_part_index: tile_part.tile_part_index(),
                    no_tile_parts,
                })
            }
            _ => Ok(()),
        }
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn parts(&self) -> &[TilePart] {
        &self.parts
    }

    /// TNsot as declared by any tile-part of this tile.
    pub fn tile_part_count(&self) -> Option<u8> {
        self.parts
            .iter()
            .map(|part| part.start_of_tile().no_tile_parts())
            .find(|no_tile_parts| *no_tile_parts != 0)
    }

    /// Whether every declared tile-part has been read, with no gaps.
    pub fn is_complete(&self) -> bool {
        match self.tile_part_count() {
            Some(count) => {
                self.parts.len() == count as usize
                    && self
                        .parts
                        .iter()
                        .enumerate()
                        .all(|(i, part)| part.tile_part_index() as usize == i)
            }
            None => false,
        }
    }

    /// Compressed data of all tile-parts concatenated in tile-part order.
    pub fn data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.data_len());
        for part in &self.parts {
            data.extend_from_slice(part.data());
        }
        data
    }

    pub fn data_len(&self) -> usize {
        self.parts.iter().map(|part| part.data().len()).sum()
    }

    /// Coding style of a component for this tile, the tile header being the
    /// header of its first tile-part.
    pub fn coding_style<'a>(&'a self, header: &'a Header, component: u16) -> ResolvedCodingStyle<'a> {
        match self.parts.first() {
            Some(part) => part.coding_style(header, component),
            None => header.coding_style(component),
        }
    }

    pub fn quantization<'a>(&'a self, header: &'a Header, component: u16) -> ResolvedQuantization<'a> {
        match self.parts.first() {
            Some(part) => part.quantization(header, component),
            None => header.quantization(component),
        }
    }
}

fn decode_tile_part_header<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    tile_part: &mut TilePart,
    no_components: u16,
) -> Result<(), CodestreamError> {
    loop {
        let offset = reader.absolute_position();
        if peek_marker(reader)?.is_none() {
            return Err(CodestreamError::MarkerMissing {
                marker: MARKER_SYMBOL_SOD,
            });
        }

        match decode_marker_segment(reader, no_components)? {
            MarkerSegment::StartOfData => return Ok(()),
            MarkerSegment::CodingStyleDefault(segment) => {
                if tile_part.coding_style_marker_segment.is_some() {
                    return Err(duplicate_segment(MARKER_SYMBOL_COD, offset));
                }
                tile_part.coding_style_marker_segment = Some(segment);
            }
            MarkerSegment::CodingStyleComponent(segment) => {
                check_component_index(
                    MARKER_SYMBOL_COC,
                    segment.component_index(),
                    no_components,
                    tile_part
                        .coding_style_component_segments
                        .iter()
                        .map(CodingStyleComponentSegment::component_index),
                )?;
                tile_part.coding_style_component_segments.push(segment);
            }
            MarkerSegment::QuantizationDefault(segment) => {
                if tile_part.quantization_default_marker_segment.is_some() {
                    return Err(duplicate_segment(MARKER_SYMBOL_QCD, offset));
                }
                tile_part.quantization_default_marker_segment = Some(segment);
            }
            MarkerSegment::QuantizationComponent(segment) => {
                check_component_index(
                    MARKER_SYMBOL_QCC,
                    segment.component_index(),
                    no_components,
                    tile_part
                        .quantization_component_segments
                        .iter()
                        .map(QuantizationComponentSegment::component_index),
                )?;
                tile_part.quantization_component_segments.push(segment);
            }
            MarkerSegment::Comment(segment) => {
                tile_part.comment_marker_segments.push(segment);
            }
            MarkerSegment::Skipped { .. } => {}
            segment @ (MarkerSegment::StartOfCodestream
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
}

// With Psot = 0 the tile-part runs to the end of the codestream, which ends
// in EOC when present.
fn data_length<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    until_end_of_codestream: bool,
) -> Result<u64, CodestreamError> {
    let remaining = reader.remaining();
    if !until_end_of_codestream || remaining < 2 {
        return Ok(remaining);
    }

    let mut trailer: MarkerSymbol = [0; 2];
    reader.mark();
    let result = reader
        .seek(io::SeekFrom::End(-2))
        .and_then(|_| reader.read_exact(&mut trailer));
    reader.reset()?;
    result?;

    if trailer == MARKER_SYMBOL_EOC {
        Ok(remaining - 2)
    } else {
        debug!("No EOC after the last tile-part, data runs to the end");
        Ok(remaining)
    }
}

/// Decodes the tile-part starting at the SOT marker at the current position.
pub(crate) fn decode_tile_part<R: io::Read + io::Seek>(
    reader: &mut SubStream<R>,
    no_components: u16,
) -> Result<TilePart, CodestreamError> {
    let offset = reader.absolute_position();
    let start_of_tile = match decode_marker_segment(reader, no_components)? {
        MarkerSegment::StartOfTilePart(segment) => segment,
        segment => {
            return Err(CodestreamError::MarkerUnexpected {
                marker: segment.marker(),
                offset,
            })
        }
    };

    let tile_part_length = start_of_tile.tile_part_length();
    let window_length = if tile_part_length == 0 {
        reader.remaining()
    } else {
        let window_length = tile_part_length as u64 - START_OF_TILE_LENGTH;
        if window_length > reader.remaining() {
            return Err(CodestreamError::TilePartOverrun {
                offset,
                length: tile_part_length,
                remaining: reader.remaining(),
            });
        }
        window_length
    };

    info!(
        "Tile {} part {} start at byte offset {}",
        start_of_tile.tile_index(),
        start_of_tile.tile_part_index(),
        offset
    );

    let tile_part = reader.with_window(window_length, |reader| -> Result<_, CodestreamError> {
        let mut tile_part = TilePart {
            offset,
            start_of_tile,
            ..Default::default()
        };

        decode_tile_part_header(reader, &mut tile_part, no_components)?;

        let data_length = data_length(reader, tile_part_length == 0)?;
        tile_part.data_offset = reader.absolute_position();
        tile_part.data = vec![0; data_length as usize];
        reader.read_exact(&mut tile_part.data)?;

        Ok(tile_part)
    })?;

    info!(
        "Tile {} part {} finish at byte offset {}",
        tile_part.tile_index(),
        tile_part.tile_part_index(),
        reader.absolute_position()
    );

    Ok(tile_part)
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

    fn sot(tile_index: u16, psot: u32, tile_part_index: u8, no_tile_parts: u8) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0x90, 0x00, 0x0A];
        bytes.extend_from_slice(&tile_index.to_be_bytes());
        bytes.extend_from_slice(&psot.to_be_bytes());
        bytes.push(tile_part_index);
        bytes.push(no_tile_parts);
        bytes
    }

    fn tile_part_bytes(tile_index: u16, tile_part_index: u8, no_tile_parts: u8, data: &[u8]) -> Vec<u8> {
        let psot = 12 + 2 + data.len() as u32;
        let mut bytes = sot(tile_index, psot, tile_part_index, no_tile_parts);
        bytes.extend_from_slice(&MARKER_SYMBOL_SOD);
        bytes.extend_from_slice(data);
        bytes
    }

    fn decode(bytes: Vec<u8>) -> Result<TilePart, CodestreamError> {
        let mut reader = SubStream::new(Cursor::new(bytes)).unwrap();
        decode_tile_part(&mut reader, 1)
    }

    #[test]
    fn test_decode_tile_part() {
        init_logger();
        let mut bytes = tile_part_bytes(0, 0, 1, &[1, 2, 3, 4]);
        bytes.extend_from_slice(&MARKER_SYMBOL_EOC);
        let mut reader = SubStream::new(Cursor::new(bytes)).unwrap();

        let tile_part = decode_tile_part(&mut reader, 1).unwrap();
        assert_eq!(tile_part.offset(), 0);
        assert_eq!(tile_part.data_offset(), 14);
        assert_eq!(tile_part.data(), &[1, 2, 3, 4]);
        assert_eq!(reader.remaining(), 2);
        assert_eq!(reader.depth(), 0);
    }

    #[test]
    fn test_psot_zero_excludes_eoc() {
        init_logger();
        let mut bytes = sot(0, 0, 0, 1);
        bytes.extend_from_slice(&MARKER_SYMBOL_SOD);
        bytes.extend_from_slice(&[9, 8, 7]);
        bytes.extend_from_slice(&MARKER_SYMBOL_EOC);
        let mut reader = SubStream::new(Cursor::new(bytes)).unwrap();

        let tile_part = decode_tile_part(&mut reader, 1).unwrap();
        assert_eq!(tile_part.data(), &[9, 8, 7]);
        assert_eq!(reader.remaining(), 2);
    }

    #[test]
    fn test_psot_zero_without_eoc_keeps_all_bytes() {
        init_logger();
        let mut bytes = sot(0, 0, 0, 1);
        bytes.extend_from_slice(&MARKER_SYMBOL_SOD);
        bytes.extend_from_slice(&[9, 8, 7]);

        let tile_part = decode(bytes).unwrap();
        assert_eq!(tile_part.data(), &[9, 8, 7]);
    }

    #[test]
    fn test_tile_part_overrun() {
        init_logger();
        let mut bytes = tile_part_bytes(0, 0, 1, &[1, 2, 3, 4]);
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            decode(bytes),
            Err(CodestreamError::TilePartOverrun {
                length: 18,
                remaining: 5,
                ..
            })
        ));
    }

    #[test]
    fn test_short_psot() {
        init_logger();
        assert!(matches!(
            decode(sot(0, 11, 0, 1)),
            Err(CodestreamError::TilePartLength { length: 11, .. })
        ));
    }

    #[test]
    fn test_missing_sod() {
        init_logger();
        let mut bytes = sot(0, 12 + 6, 0, 1);
        bytes.extend_from_slice(&[0xFF, 0x64, 0x00, 0x04, 0x00, 0x00]);
        bytes.extend_from_slice(&MARKER_SYMBOL_SOD);
        assert!(matches!(
            decode(bytes),
            Err(CodestreamError::MarkerMissing {
                marker: MARKER_SYMBOL_SOD
            })
        ));
    }

    #[test]
    fn test_tile_part_header_segments() {
        init_logger();
        // QCD, COC for component 0, COM
        let header = [
            0xFF, 0x5C, 0x00, 0x04, 0x40, 0x48, 0xFF, 0x53, 0x00, 0x09, 0x00, 0x00, 0x05, 0x02,
            0x02, 0x00, 0x01, 0xFF, 0x64, 0x00, 0x05, 0x00, 0x00, 0x2A,
        ];
        let psot = 12 + header.len() as u32 + 2 + 1;
        let mut bytes = sot(0, psot, 0, 0);
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&MARKER_SYMBOL_SOD);
        bytes.push(0xAB);

        let tile_part = decode(bytes).unwrap();
        assert!(tile_part.coding_style_marker_segment().is_none());
        assert!(tile_part.quantization_default_marker_segment().is_some());
        assert_eq!(tile_part.coding_style_component_segments().len(), 1);
        assert_eq!(tile_part.comment_marker_segments()[0].comment(), &[0x2A]);
        assert_eq!(tile_part.data(), &[0xAB]);
    }

    #[test]
    fn test_tile_insert_orders_parts() {
        init_logger();
        let first = decode(tile_part_bytes(3, 0, 3, &[0])).unwrap();
        let third = decode(tile_part_bytes(3, 2, 0, &[2])).unwrap();
        let second = decode(tile_part_bytes(3, 1, 0, &[1])).unwrap();

        let mut tile = Tile::new(first).unwrap();
        tile.insert(third).unwrap();
        assert!(!tile.is_complete());
        tile.insert(second).unwrap();

        assert_eq!(tile.index(), 3);
        assert_eq!(tile.tile_part_count(), Some(3));
        assert!(tile.is_complete());
        assert_eq!(tile.data(), vec![0, 1, 2]);
        assert_eq!(tile.data_len(), 3);
    }

    #[test]
    fn test_tile_rejects_bad_parts() {
        init_logger();
        let second = decode(tile_part_bytes(0, 1, 2, &[1])).unwrap();
        assert!(matches!(
            Tile::new(second),
            Err(CodestreamError::TilePartOutOfOrder {
                tile_index: 0,
                tile_part_index: 1,
                ..
            })
        ));

        let mut tile = Tile::new(decode(tile_part_bytes(0, 0, 2, &[0])).unwrap()).unwrap();
        assert!(matches!(
            tile.insert(decode(tile_part_bytes(0, 0, 2, &[0])).unwrap()),
            Err(CodestreamError::TilePartDuplicate { .. })
        ));
        assert!(matches!(
            tile.insert(decode(tile_part_bytes(0, 2, 2, &[2])).unwrap()),
            Err(CodestreamError::TilePartIndexOverflow {
                tile_part_index: 2,
                no_tile_parts: 2,
                ..
            })
        ));
    }
}
