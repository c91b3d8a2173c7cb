use std::io::Cursor;

use jpc::{
    decode_jpc, CodestreamError, CommentRegistrationValue, MultipleComponentTransformation,
    ProgressionOrder, QuantizationStyle, ResolvedCodingStyle, ResolvedQuantization,
    TransformationFilter, MARKER_SYMBOL_COD, MARKER_SYMBOL_COM, MARKER_SYMBOL_EOC,
    MARKER_SYMBOL_QCD, MARKER_SYMBOL_SIZ, MARKER_SYMBOL_SOC, MARKER_SYMBOL_SOD, MARKER_SYMBOL_SOT,
    MARKER_SYMBOL_TLM,
};

fn init_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

fn segment(marker: [u8; 2], payload: &[u8]) -> Vec<u8> {
    let mut bytes = marker.to_vec();
    bytes.extend_from_slice(&(payload.len() as u16 + 2).to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

// 16x8 reference grid split in two 8x8 tiles, three unsigned 8 bit components.
fn main_header() -> Vec<u8> {
    let mut siz = vec![0, 0];
    for value in [16u32, 8, 0, 0, 8, 8, 0, 0] {
        siz.extend_from_slice(&value.to_be_bytes());
    }
    siz.extend_from_slice(&3u16.to_be_bytes());
    for _ in 0..3 {
        siz.extend_from_slice(&[7, 1, 1]);
    }

    let mut bytes = MARKER_SYMBOL_SOC.to_vec();
    bytes.extend(segment(MARKER_SYMBOL_SIZ, &siz));
    bytes.extend(segment(MARKER_SYMBOL_COD, &[0, 0, 0, 1, 1, 5, 4, 4, 0, 1]));
    bytes.extend(segment(MARKER_SYMBOL_QCD, &[0x40, 0x48, 0x50]));
    bytes.extend(segment(MARKER_SYMBOL_COM, b"\x00\x01made by hand"));
    bytes
}

fn tile_part(
    tile_index: u16,
    tile_part_index: u8,
    no_tile_parts: u8,
    header: &[u8],
    data: &[u8],
    psot_zero: bool,
) -> Vec<u8> {
    let psot = if psot_zero {
        0
    } else {
        12 + header.len() as u32 + 2 + data.len() as u32
    };

    let mut payload = tile_index.to_be_bytes().to_vec();
    payload.extend_from_slice(&psot.to_be_bytes());
    payload.push(tile_part_index);
    payload.push(no_tile_parts);

    let mut bytes = segment(MARKER_SYMBOL_SOT, &payload);
    bytes.extend_from_slice(header);
    bytes.extend_from_slice(&MARKER_SYMBOL_SOD);
    bytes.extend_from_slice(data);
    bytes
}

#[test]
fn test_interleaved_tile_parts() {
    init_logger();
    let tile_cod = segment(MARKER_SYMBOL_COD, &[0, 1, 0, 2, 0, 3, 4, 4, 0, 0]);

    let mut bytes = main_header();
    let header_length = bytes.len() as u64;
    bytes.extend(tile_part(1, 0, 1, &[], &[0x10, 0x11], false));
    bytes.extend(tile_part(0, 0, 2, &tile_cod, &[0x00, 0x01, 0x02], false));
    bytes.extend(tile_part(0, 1, 0, &[], &[0x03], false));
    bytes.extend_from_slice(&MARKER_SYMBOL_EOC);
    let total_length = bytes.len() as u64;

    let codestream = decode_jpc(&mut Cursor::new(bytes)).unwrap();
    assert_eq!(codestream.offset(), 0);
    assert_eq!(codestream.length(), total_length);
    assert!(codestream.has_end_of_codestream());
    assert_eq!(codestream.width(), 16);
    assert_eq!(codestream.height(), 8);
    assert_eq!(codestream.no_components(), 3);
    assert_eq!(codestream.precision(0), Some(8));
    assert_eq!(codestream.values_are_signed(2), Some(false));

    let header = codestream.header();
    let siz = header.image_and_tile_size_marker_segment();
    assert_eq!(siz.offset(), 2);
    assert_eq!(siz.length(), 47);
    assert_eq!(siz.no_tiles_x(), 2);
    assert_eq!(siz.no_tiles_y(), 1);

    // COD
    let cod = header.coding_style_marker_segment();
    assert_eq!(cod.progression_order(), ProgressionOrder::LRLCPP);
    assert_eq!(cod.no_layers(), 1);
    assert_eq!(
        cod.multiple_component_transformation(),
        MultipleComponentTransformation::Multiple
    );
    assert_eq!(cod.coding_style_parameters().no_decomposition_levels(), 5);
    assert_eq!(
        cod.coding_style_parameters().transformation(),
        TransformationFilter::Reversible
    );

    // QCD
    let qcd = header.quantization_default_marker_segment();
    assert_eq!(qcd.quantization_style(), QuantizationStyle::No { guard: 2 });
    assert_eq!(
        qcd.quantization_parameters().quantization_exponents(),
        vec![9, 10]
    );

    // COM
    let comment = &header.comment_marker_segments()[0];
    assert_eq!(comment.registration_value(), CommentRegistrationValue::Latin);
    assert_eq!(comment.comment_utf8().unwrap(), "made by hand");

    let indices: Vec<u16> = codestream.tiles().map(|tile| tile.index()).collect();
    assert_eq!(indices, vec![0, 1]);

    let tile = codestream.tile(0).unwrap();
    assert_eq!(tile.tile_part_count(), Some(2));
    assert!(tile.is_complete());
    assert_eq!(tile.data(), vec![0x00, 0x01, 0x02, 0x03]);
    assert!(tile.parts()[0].offset() > header_length);

    let resolved = tile.coding_style(header, 1);
    assert!(matches!(resolved, ResolvedCodingStyle::TilePartDefault(_)));
    assert_eq!(resolved.coding_style_parameters().no_decomposition_levels(), 3);
    assert!(matches!(
        tile.quantization(header, 1),
        ResolvedQuantization::MainDefault(_)
    ));

    let tile = codestream.tile(1).unwrap();
    assert_eq!(tile.data(), vec![0x10, 0x11]);
    assert!(matches!(
        tile.coding_style(header, 0),
        ResolvedCodingStyle::MainDefault(_)
    ));
}

#[test]
fn test_last_tile_part_runs_to_eoc() {
    init_logger();
    let mut bytes = main_header();
    bytes.extend(tile_part(0, 0, 1, &[], &[0xAA], false));
    bytes.extend(tile_part(1, 0, 1, &[], &[0xBB, 0xCC, 0xDD], true));
    bytes.extend_from_slice(&MARKER_SYMBOL_EOC);

    let codestream = decode_jpc(&mut Cursor::new(bytes)).unwrap();
    assert!(codestream.has_end_of_codestream());
    assert_eq!(codestream.tile(1).unwrap().data(), vec![0xBB, 0xCC, 0xDD]);
}

#[test]
fn test_missing_eoc_is_tolerated() {
    init_logger();
    let mut bytes = main_header();
    bytes.extend(tile_part(0, 0, 1, &[], &[0xAA], false));
    let total_length = bytes.len() as u64;

    let codestream = decode_jpc(&mut Cursor::new(bytes)).unwrap();
    assert!(!codestream.has_end_of_codestream());
    assert_eq!(codestream.length(), total_length);
    assert_eq!(codestream.tiles().count(), 1);
}

#[test]
fn test_pointer_segments_are_skipped() {
    init_logger();
    let mut bytes = main_header();
    bytes.extend(segment(MARKER_SYMBOL_TLM, &[0, 0x50, 0, 0, 0, 0x20]));
    bytes.extend(tile_part(0, 0, 1, &[], &[0xAA], false));
    bytes.extend_from_slice(&MARKER_SYMBOL_EOC);

    let codestream = decode_jpc(&mut Cursor::new(bytes)).unwrap();
    assert_eq!(codestream.tile(0).unwrap().data(), vec![0xAA]);
}

#[test]
fn test_header_segment_between_tile_parts() {
    init_logger();
    let mut bytes = main_header();
    bytes.extend(tile_part(0, 0, 1, &[], &[0xAA], false));
    let offset = bytes.len() as u64;
    bytes.extend(segment(MARKER_SYMBOL_QCD, &[0x40, 0x48]));
    bytes.extend_from_slice(&MARKER_SYMBOL_EOC);

    match decode_jpc(&mut Cursor::new(bytes)) {
        Err(CodestreamError::MarkerUnexpected { marker, offset: at }) => {
            assert_eq!(marker, MARKER_SYMBOL_QCD);
            assert_eq!(at, offset);
        }
        result => panic!("unexpected {:?}", result),
    }
}

#[test]
fn test_tile_index_out_of_range() {
    init_logger();
    let mut bytes = main_header();
    bytes.extend(tile_part(2, 0, 1, &[], &[0xAA], false));
    bytes.extend_from_slice(&MARKER_SYMBOL_EOC);

    assert!(matches!(
        decode_jpc(&mut Cursor::new(bytes)),
        Err(CodestreamError::MarkerError {
            marker: MARKER_SYMBOL_SOT,
            ..
        })
    ));
}

#[test]
fn test_tile_part_out_of_order() {
    init_logger();
    let mut bytes = main_header();
    bytes.extend(tile_part(0, 1, 2, &[], &[0xAA], false));
    bytes.extend(tile_part(0, 0, 2, &[], &[0xBB], false));
    bytes.extend_from_slice(&MARKER_SYMBOL_EOC);

    assert!(matches!(
        decode_jpc(&mut Cursor::new(bytes)),
        Err(CodestreamError::TilePartOutOfOrder {
            tile_index: 0,
            tile_part_index: 1,
            ..
        })
    ));
}

#[test]
fn test_truncated_main_header() {
    init_logger();
    let bytes = main_header();

    assert!(matches!(
        decode_jpc(&mut Cursor::new(bytes)),
        Err(CodestreamError::MarkerMissing {
            marker: MARKER_SYMBOL_SOT
        })
    ));
}
