use jpc::SubStream;
use log::debug;
use std::io;
use std::io::prelude::*;

use super::{
    decode_box_header, decode_box_payload, skip_box, BoxHeader, BoxType, BoxTypes, JBox,
    JP2Error, BOX_TYPE_CAPTURE_RESOLUTION, BOX_TYPE_RESOLUTION,
};

// I.5.3.7
//
// Resolution box (superbox)
//
// This box specifies the capture and default display grid resolutions of this
// image.
#[derive(Debug, Default)]
pub struct ResolutionSuperBox {
    length: u64,
    offset: u64,

    // Capture Resolution box.
    //
    // This box specifies the grid resolution at which this image was captured.
    capture_resolution_box: Option<GridResolutionBox>,

    // Default Display Resolution box.
    //
    // This box specifies the default grid resolution at which this image
    // should be displayed.
    default_display_resolution_box: Option<GridResolutionBox>,
}

impl ResolutionSuperBox {
    pub fn capture_resolution_box(&self) -> Option<&GridResolutionBox> {
        self.capture_resolution_box.as_ref()
    }

    pub fn default_display_resolution_box(&self) -> Option<&GridResolutionBox> {
        self.default_display_resolution_box.as_ref()
    }
}

impl JBox for ResolutionSuperBox {
    fn new(header: &BoxHeader) -> Self {
        ResolutionSuperBox {
            length: header.box_length(),
            offset: header.data_offset(),
            ..Default::default()
        }
    }

    // The type of a Resolution box shall be ‘res\040’ (0x7265 7320).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_RESOLUTION
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
        while reader.remaining() > 0 {
            let header = decode_box_header(reader)?;

            let slot = match BoxTypes::new(header.box_type()) {
                BoxTypes::CaptureResolution => &mut self.capture_resolution_box,
                BoxTypes::DefaultDisplayResolution => &mut self.default_display_resolution_box,
                _ => {
                    skip_box(reader, &header)?;
                    continue;
                }
            };

            if slot.is_some() {
                return Err(JP2Error::DuplicateBox {
                    box_type: header.box_type(),
                    offset: header.offset(),
                });
            }
            *slot = Some(decode_box_payload(reader, &header)?);
        }

        // If this box exists, it shall contain either a Capture Resolution box,
        // or a Default Display Resolution box, or both.
        if self.capture_resolution_box.is_none() && self.default_display_resolution_box.is_none() {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_RESOLUTION,
                offset: self.offset,
                reason: "no capture or default display resolution".to_string(),
            });
        }

        Ok(())
    }
}

// I.5.3.7.1 and I.5.3.7.2
//
// Capture Resolution box and Default Display Resolution box
//
// The capture box specifies the grid resolution at which the source was
// digitized to create the image samples specified by the codestream. The
// default display box specifies a desired display grid resolution.
//
// Both share a layout: VR?N, VR?D, HR?N, HR?D as 2-byte big endian unsigned
// integers followed by VR?E and HR?E as twos-complement 1-byte signed integers.
#[derive(Debug, Default)]
pub struct GridResolutionBox {
    length: u64,
    offset: u64,
    box_type: BoxType,
    vertical_grid_resolution_numerator: [u8; 2],
    vertical_grid_resolution_denominator: [u8; 2],
    horizontal_grid_resolution_numerator: [u8; 2],
    horizontal_grid_resolution_denominator: [u8; 2],
    vertical_grid_resolution_exponent: [u8; 1],
    horizontal_grid_resolution_exponent: [u8; 1],
}

impl GridResolutionBox {
    pub fn is_capture(&self) -> bool {
        self.box_type == BOX_TYPE_CAPTURE_RESOLUTION
    }

    pub fn vertical_grid_resolution_numerator(&self) -> u16 {
        u16::from_be_bytes(self.vertical_grid_resolution_numerator)
    }
    pub fn vertical_grid_resolution_denominator(&self) -> u16 {
        u16::from_be_bytes(self.vertical_grid_resolution_denominator)
    }
    pub fn horizontal_grid_resolution_numerator(&self) -> u16 {
        u16::from_be_bytes(self.horizontal_grid_resolution_numerator)
    }
    pub fn horizontal_grid_resolution_denominator(&self) -> u16 {
        u16::from_be_bytes(self.horizontal_grid_resolution_denominator)
    }
    pub fn vertical_grid_resolution_exponent(&self) -> i8 {
        self.vertical_grid_resolution_exponent[0] as i8
    }
    pub fn horizontal_grid_resolution_exponent(&self) -> i8 {
        self.horizontal_grid_resolution_exponent[0] as i8
    }

    // VR = (VRN / VRD) * 10^VRE
    // In reference grid points per meter, None for a zero denominator.
    pub fn vertical_resolution(&self) -> Option<f64> {
        resolution(
            self.vertical_grid_resolution_numerator(),
            self.vertical_grid_resolution_denominator(),
            self.vertical_grid_resolution_exponent(),
        )
    }

    // HR = (HRN / HRD) * 10^HRE
    pub fn horizontal_resolution(&self) -> Option<f64> {
        resolution(
            self.horizontal_grid_resolution_numerator(),
            self.horizontal_grid_resolution_denominator(),
            self.horizontal_grid_resolution_exponent(),
        )
    }
}

fn resolution(numerator: u16, denominator: u16, exponent: i8) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    Some(numerator as f64 / denominator as f64 * 10_f64.powi(exponent as i32))
}

impl JBox for GridResolutionBox {
    fn new(header: &BoxHeader) -> Self {
        GridResolutionBox {
            length: header.box_length(),
            offset: header.data_offset(),
            box_type: header.box_type(),
            ..Default::default()
        }
    }

    // ‘resc’ (0x7265 7363) or ‘resd’ (0x7265 7364).
    fn identifier(&self) -> BoxType {
        self.box_type
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
        reader.read_exact(&mut self.vertical_grid_resolution_numerator)?;
        reader.read_exact(&mut self.vertical_grid_resolution_denominator)?;
        reader.read_exact(&mut self.horizontal_grid_resolution_numerator)?;
        reader.read_exact(&mut self.horizontal_grid_resolution_denominator)?;
        reader.read_exact(&mut self.vertical_grid_resolution_exponent)?;
        reader.read_exact(&mut self.horizontal_grid_resolution_exponent)?;

        debug!(
            "Vertical resolution {:?} horizontal resolution {:?}",
            self.vertical_resolution(),
            self.horizontal_resolution()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{BOX_TYPE_DEFAULT_DISPLAY_RESOLUTION, BOX_TYPE_XML};

    fn jbox(box_type: BoxType, payload: &[u8]) -> Vec<u8> {
        let mut bytes = (payload.len() as u32 + 8).to_be_bytes().to_vec();
        bytes.extend_from_slice(&box_type);
        bytes.extend_from_slice(payload);
        bytes
    }

    fn decode(contents: &[u8]) -> Result<ResolutionSuperBox, JP2Error> {
        let mut reader = SubStream::new(Cursor::new(jbox(BOX_TYPE_RESOLUTION, contents)))?;
        let header = decode_box_header(&mut reader)?;
        decode_box_payload(&mut reader, &header)
    }

    #[test]
    fn test_resolution_super_box() {
        // 7200 / 254 * 10^2 grid points per meter, 300 per inch.
        let mut contents = jbox(BOX_TYPE_XML, b"<a/>");
        contents.extend(jbox(
            BOX_TYPE_DEFAULT_DISPLAY_RESOLUTION,
            &[0x1C, 0x20, 0, 254, 0, 1, 0, 0, 2, 0xFF],
        ));

        let res = decode(&contents).unwrap();
        assert!(res.capture_resolution_box().is_none());

        let resd = res.default_display_resolution_box().unwrap();
        assert!(!resd.is_capture());
        assert_eq!(resd.vertical_grid_resolution_numerator(), 7200);
        assert_eq!(resd.horizontal_grid_resolution_exponent(), -1);
        let vertical = resd.vertical_resolution().unwrap();
        assert!((vertical - 720000.0 / 254.0).abs() < 1e-6);
        assert_eq!(resd.horizontal_resolution(), None);
    }

    #[test]
    fn test_resolution_super_box_rules() {
        assert!(matches!(
            decode(&jbox(BOX_TYPE_XML, b"<a/>")),
            Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_RESOLUTION,
                ..
            })
        ));

        let resc = jbox(BOX_TYPE_CAPTURE_RESOLUTION, &[0, 1, 0, 1, 0, 1, 0, 1, 0, 0]);
        let mut contents = resc.clone();
        contents.extend(resc);
        assert!(matches!(
            decode(&contents),
            Err(JP2Error::DuplicateBox {
                box_type: BOX_TYPE_CAPTURE_RESOLUTION,
                offset: 26
            })
        ));
    }
}
