use std::io::Cursor;

use jp2::{
    decode_jp2, BoxType, ColourSpecificationMethods, ComponentMapType, EnumeratedColourSpaces,
    JBox as _, JP2Decoder, JP2Error, BOX_TYPE_COLOUR_SPECIFICATION, BOX_TYPE_COMPONENT_MAPPING,
    BOX_TYPE_CONTIGUOUS_CODESTREAM, BOX_TYPE_FILE_TYPE, BOX_TYPE_HEADER, BOX_TYPE_IMAGE_HEADER,
    BOX_TYPE_PALETTE, BOX_TYPE_SIGNATURE, BOX_TYPE_UUID, BOX_TYPE_XML, SIGNATURE_MAGIC,
};
use jpc::{
    CodestreamError, MARKER_SYMBOL_COD, MARKER_SYMBOL_EOC, MARKER_SYMBOL_QCD, MARKER_SYMBOL_SIZ,
    MARKER_SYMBOL_SOC, MARKER_SYMBOL_SOD, MARKER_SYMBOL_SOT,
};

fn init_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

fn jbox(box_type: BoxType, payload: &[u8]) -> Vec<u8> {
    let mut bytes = (payload.len() as u32 + 8).to_be_bytes().to_vec();
    bytes.extend_from_slice(&box_type);
    bytes.extend_from_slice(payload);
    bytes
}

fn segment(marker: [u8; 2], payload: &[u8]) -> Vec<u8> {
    let mut bytes = marker.to_vec();
    bytes.extend_from_slice(&(payload.len() as u16 + 2).to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

// Single 8x8 tile, one unsigned 8 bit component.
fn codestream() -> Vec<u8> {
    let mut siz = vec![0, 0];
    for value in [8u32, 8, 0, 0, 8, 8, 0, 0] {
        siz.extend_from_slice(&value.to_be_bytes());
    }
    siz.extend_from_slice(&[0, 1, 7, 1, 1]);

    let mut bytes = MARKER_SYMBOL_SOC.to_vec();
    bytes.extend(segment(MARKER_SYMBOL_SIZ, &siz));
    bytes.extend(segment(MARKER_SYMBOL_COD, &[0, 0, 0, 1, 0, 5, 4, 4, 0, 1]));
    bytes.extend(segment(MARKER_SYMBOL_QCD, &[0x40, 0x48]));

    let data = [0xC0, 0xFF, 0xEE];
    let mut sot = 0u16.to_be_bytes().to_vec();
    sot.extend_from_slice(&(14 + data.len() as u32).to_be_bytes());
    sot.extend_from_slice(&[0, 1]);
    bytes.extend(segment(MARKER_SYMBOL_SOT, &sot));
    bytes.extend_from_slice(&MARKER_SYMBOL_SOD);
    bytes.extend_from_slice(&data);
    bytes.extend_from_slice(&MARKER_SYMBOL_EOC);
    bytes
}

fn signature() -> Vec<u8> {
    jbox(BOX_TYPE_SIGNATURE, &SIGNATURE_MAGIC)
}

fn file_type() -> Vec<u8> {
    jbox(BOX_TYPE_FILE_TYPE, b"jp2 \0\0\0\0jp2 ")
}

fn image_header(components_num: u16) -> Vec<u8> {
    let mut payload = 8u32.to_be_bytes().to_vec();
    payload.extend_from_slice(&8u32.to_be_bytes());
    payload.extend_from_slice(&components_num.to_be_bytes());
    payload.extend_from_slice(&[7, 7, 0, 0]);
    jbox(BOX_TYPE_IMAGE_HEADER, &payload)
}

fn header() -> Vec<u8> {
    let mut contents = image_header(1);
    contents.extend(jbox(BOX_TYPE_COLOUR_SPECIFICATION, &[1, 0, 0, 0, 0, 0, 17]));
    jbox(BOX_TYPE_HEADER, &contents)
}

#[test]
fn test_decode_jp2() {
    init_logger();
    let mut bytes = signature();
    bytes.extend(file_type());
    bytes.extend(jbox(BOX_TYPE_XML, b"<jp2/>"));
    bytes.extend(header());
    bytes.extend(jbox(BOX_TYPE_UUID, &[0xAB; 20]));
    let codestream_offset = bytes.len() as u64 + 8;
    bytes.extend(jbox(BOX_TYPE_CONTIGUOUS_CODESTREAM, &codestream()));
    let total_length = bytes.len() as u64;

    let jp2 = decode_jp2(&mut Cursor::new(bytes)).unwrap();
    assert_eq!(jp2.length(), total_length);
    assert_eq!(jp2.width(), 8);
    assert_eq!(jp2.height(), 8);
    assert_eq!(jp2.file_type_box().brand(), "jp2 ");

    let header = jp2.header_box();
    assert_eq!(header.image_header_box().components_num(), 1);
    let colr = &header.colour_specification_boxes()[0];
    assert_eq!(
        colr.method(),
        ColourSpecificationMethods::EnumeratedColourSpace
    );
    assert_eq!(
        colr.enumerated_colour_space(),
        Some(EnumeratedColourSpaces::Greyscale)
    );

    let skipped: Vec<BoxType> = jp2.skipped_boxes().iter().map(|b| b.box_type()).collect();
    assert_eq!(skipped, vec![BOX_TYPE_XML, BOX_TYPE_UUID]);

    let jp2c = jp2.contiguous_codestream_box().unwrap();
    assert_eq!(jp2c.offset(), codestream_offset);
    let codestream = jp2.codestream().unwrap();
    assert_eq!(codestream.offset(), codestream_offset);
    assert!(codestream.has_end_of_codestream());
    assert_eq!(codestream.width(), 8);
    assert_eq!(codestream.tile(0).unwrap().data(), vec![0xC0, 0xFF, 0xEE]);
}

#[test]
fn test_incremental_decoding() {
    init_logger();
    let mut bytes = signature();
    bytes.extend(file_type());
    bytes.extend(header());
    bytes.extend(jbox(BOX_TYPE_CONTIGUOUS_CODESTREAM, &codestream()));

    let mut decoder = JP2Decoder::new(Cursor::new(bytes)).unwrap();
    let header = decoder.read_header().unwrap();
    assert_eq!(header.image_header_box().width(), 8);
    assert!(header.resolution_box().is_none());
    assert_eq!(decoder.height(), Some(8));

    let jp2c = decoder.read_codestream().unwrap();
    assert_eq!(jp2c.codestream().unwrap().no_components(), 1);

    let jp2 = decoder.into_jp2_file().unwrap();
    assert!(jp2.codestream().is_some());
}

#[test]
fn test_codestream_box_lengths() {
    init_logger();

    // LBox 0 runs to the end of the file.
    let mut bytes = signature();
    bytes.extend(file_type());
    bytes.extend(header());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&BOX_TYPE_CONTIGUOUS_CODESTREAM);
    bytes.extend(codestream());
    let jp2 = decode_jp2(&mut Cursor::new(bytes)).unwrap();
    assert!(jp2.codestream().unwrap().has_end_of_codestream());

    // XLBox
    let codestream = codestream();
    let mut bytes = signature();
    bytes.extend(file_type());
    bytes.extend(header());
    bytes.extend_from_slice(&[0, 0, 0, 1]);
    bytes.extend_from_slice(&BOX_TYPE_CONTIGUOUS_CODESTREAM);
    bytes.extend_from_slice(&(codestream.len() as u64 + 16).to_be_bytes());
    let codestream_offset = bytes.len() as u64;
    bytes.extend(codestream);
    let jp2 = decode_jp2(&mut Cursor::new(bytes)).unwrap();
    assert_eq!(jp2.codestream().unwrap().offset(), codestream_offset);
}

#[test]
fn test_trailing_bytes_in_codestream_box() {
    init_logger();
    let mut payload = codestream();
    payload.extend_from_slice(&[0, 0]);

    let mut bytes = signature();
    bytes.extend(file_type());
    bytes.extend(header());
    bytes.extend(jbox(BOX_TYPE_CONTIGUOUS_CODESTREAM, &payload));

    match decode_jp2(&mut Cursor::new(bytes)) {
        Err(JP2Error::BoxLengthMismatch {
            box_type,
            length,
            consumed,
            ..
        }) => {
            assert_eq!(box_type, BOX_TYPE_CONTIGUOUS_CODESTREAM);
            assert_eq!(length, consumed + 2);
        }
        result => panic!("unexpected {:?}", result),
    }
}

#[test]
fn test_duplicate_signature() {
    init_logger();
    let mut bytes = signature();
    bytes.extend(signature());
    bytes.extend(file_type());

    assert!(matches!(
        decode_jp2(&mut Cursor::new(bytes)),
        Err(JP2Error::DuplicateSignature { offset: 12 })
    ));
}

#[test]
fn test_missing_file_type() {
    init_logger();
    let mut bytes = signature();
    bytes.extend(header());

    assert!(matches!(
        decode_jp2(&mut Cursor::new(bytes)),
        Err(JP2Error::MissingFileType {
            box_type: BOX_TYPE_HEADER,
            offset: 12
        })
    ));
}

#[test]
fn test_codestream_before_header() {
    init_logger();
    let mut bytes = signature();
    bytes.extend(file_type());
    bytes.extend(jbox(BOX_TYPE_CONTIGUOUS_CODESTREAM, &codestream()));
    bytes.extend(header());

    assert!(matches!(
        decode_jp2(&mut Cursor::new(bytes)),
        Err(JP2Error::CodestreamBeforeHeader { offset: 32 })
    ));
}

#[test]
fn test_duplicate_header() {
    init_logger();
    let mut bytes = signature();
    bytes.extend(file_type());
    bytes.extend(header());
    bytes.extend(header());

    assert!(matches!(
        decode_jp2(&mut Cursor::new(bytes)),
        Err(JP2Error::DuplicateBox {
            box_type: BOX_TYPE_HEADER,
            ..
        })
    ));
}

#[test]
fn test_missing_codestream() {
    init_logger();
    let mut bytes = signature();
    bytes.extend(file_type());
    bytes.extend(header());
    bytes.extend(jbox(BOX_TYPE_XML, b"<jp2/>"));

    let mut decoder = JP2Decoder::new(Cursor::new(bytes)).unwrap();
    assert!(matches!(
        decoder.read_codestream(),
        Err(JP2Error::BoxMissing {
            box_type: BOX_TYPE_CONTIGUOUS_CODESTREAM
        })
    ));
    assert!(matches!(decoder.read_codestream(), Err(JP2Error::Aborted)));
}

#[test]
fn test_codestream_errors_are_wrapped() {
    init_logger();
    let mut bytes = signature();
    bytes.extend(file_type());
    bytes.extend(header());
    bytes.extend(jbox(BOX_TYPE_CONTIGUOUS_CODESTREAM, &MARKER_SYMBOL_SIZ));

    assert!(matches!(
        decode_jp2(&mut Cursor::new(bytes)),
        Err(JP2Error::Codestream(CodestreamError::MarkerUnexpected {
            marker: MARKER_SYMBOL_SIZ,
            ..
        }))
    ));
}

#[test]
fn test_palette_image() {
    init_logger();
    let mut contents = image_header(1);
    contents.extend(jbox(BOX_TYPE_COLOUR_SPECIFICATION, &[1, 0, 0, 0, 0, 0, 16]));
    // Two entries, one 12 bit and one 8 bit column.
    contents.extend(jbox(
        BOX_TYPE_PALETTE,
        &[0, 2, 2, 11, 7, 0xAB, 0xC0, 0x01, 0x12, 0x30, 0x02],
    ));
    contents.extend(jbox(BOX_TYPE_COMPONENT_MAPPING, &[0, 0, 1, 0, 0, 0, 1, 1]));

    let mut bytes = signature();
    bytes.extend(file_type());
    bytes.extend(jbox(BOX_TYPE_HEADER, &contents));
    bytes.extend(jbox(BOX_TYPE_CONTIGUOUS_CODESTREAM, &codestream()));

    let jp2 = decode_jp2(&mut Cursor::new(bytes)).unwrap();
    let header = jp2.header_box();

    let pclr = header.palette_box().unwrap();
    assert_eq!(pclr.entry(0), Some(&[0xABC, 0x01][..]));
    assert_eq!(pclr.entry(1), Some(&[0x123, 0x02][..]));

    let maps = header.component_mapping_box().unwrap().component_maps();
    assert_eq!(maps.len(), 2);
    assert!(maps
        .iter()
        .all(|map| map.mapping_type() == ComponentMapType::Palette));
    assert_eq!(maps[1].palette(), 1);
}
