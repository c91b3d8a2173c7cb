use jpc::SubStream;
use log::{debug, warn};
use std::fmt;
use std::io;
use std::io::prelude::*;

use super::{BoxHeader, BoxType, JBox, JP2Error, BOX_TYPE_COLOUR_SPECIFICATION};

type Method = [u8; 1];

const METHOD_ENUMERATED_COLOUR_SPACE: Method = [1];
const METHOD_ENUMERATED_RESTRICTED_ICC_PROFILE: Method = [2];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColourSpecificationMethods {
    EnumeratedColourSpace,
    RestrictedICCProfile,
    Reserved { value: u8 },
}

impl fmt::Display for ColourSpecificationMethods {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ColourSpecificationMethods::EnumeratedColourSpace => {
                write!(f, "{}", METHOD_ENUMERATED_COLOUR_SPACE[0])
            }
            ColourSpecificationMethods::RestrictedICCProfile => {
                write!(f, "{}", METHOD_ENUMERATED_RESTRICTED_ICC_PROFILE[0])
            }
            ColourSpecificationMethods::Reserved { value } => write!(f, "{}", value),
        }
    }
}

impl ColourSpecificationMethods {
    fn new(value: Method) -> ColourSpecificationMethods {
        match value {
            METHOD_ENUMERATED_COLOUR_SPACE => ColourSpecificationMethods::EnumeratedColourSpace,
            METHOD_ENUMERATED_RESTRICTED_ICC_PROFILE => {
                ColourSpecificationMethods::RestrictedICCProfile
            }
            value => ColourSpecificationMethods::Reserved { value: value[0] },
        }
    }
}

type EnumeratedColourSpace = [u8; 4];

const ENUMERATED_COLOUR_SPACE_SRGB: EnumeratedColourSpace = [0, 0, 0, 16];
const ENUMERATED_COLOUR_SPACE_GREYSCALE: EnumeratedColourSpace = [0, 0, 0, 17];
const ENUMERATED_COLOUR_SPACE_SYCC: EnumeratedColourSpace = [0, 0, 0, 18];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnumeratedColourSpaces {
    #[allow(non_camel_case_types)]
    sRGB,
    Greyscale,
    #[allow(non_camel_case_types)]
    sYCC,
    Reserved { value: u32 },
}

impl EnumeratedColourSpaces {
    fn new(value: EnumeratedColourSpace) -> EnumeratedColourSpaces {
        match value {
            ENUMERATED_COLOUR_SPACE_SRGB => EnumeratedColourSpaces::sRGB,
            ENUMERATED_COLOUR_SPACE_GREYSCALE => EnumeratedColourSpaces::Greyscale,
            ENUMERATED_COLOUR_SPACE_SYCC => EnumeratedColourSpaces::sYCC,
            value => EnumeratedColourSpaces::Reserved {
                value: u32::from_be_bytes(value),
            },
        }
    }
}

// I.5.3.3
//
// Colour Specification box
//
// Each Colour Specification box defines one method by which an application can
// interpret the colourspace of the decompressed image data. This colour
// specification is to be applied to the image data after it has been
// decompressed and after any reverse decorrelating component transform has been
// applied to the image data.
//
// A JP2 file may contain multiple Colour Specification boxes, but must contain
// at least one, specifying different methods for achieving “equivalent” results.
// A conforming JP2 reader shall ignore all Colour Specification boxes after the
// first.
#[derive(Debug, Default)]
pub struct ColourSpecificationBox {
    length: u64,
    offset: u64,
    method: Method,
    precedence: [u8; 1],
    colourspace_approximation: [u8; 1],
    enumerated_colour_space: Option<EnumeratedColourSpace>,

    // PROFILE for method 2, the unread fields of a reserved method otherwise.
    data: Vec<u8>,
}

impl ColourSpecificationBox {
    // Specification method.
    //
    // This field specifies the method used by this Colour Specification box to
    // define the colourspace of the decompressed image.
    //
    // The value of this field shall be 1 or 2.
    pub fn method(&self) -> ColourSpecificationMethods {
        ColourSpecificationMethods::new(self.method)
    }

    // Precedence.
    //
    // This field is reserved for ISO use and the value shall be set to zero;
    // however, conforming readers shall ignore the value of this field.
    //
    // This field is specified as a signed 1 byte integer
    pub fn precedence(&self) -> i8 {
        self.precedence[0] as i8
    }

    // Colourspace approximation.
    //
    // This field specifies the extent to which this colour specification method
    // approximates the “correct” definition of the colourspace.
    //
    // The value of this field shall be set to zero; however, conforming readers
    // shall ignore the value of this field.
    pub fn colourspace_approximation(&self) -> u8 {
        self.colourspace_approximation[0]
    }

    /// Enumerated colourspace.
    ///
    /// Only present when the method is
    /// [EnumeratedColourSpace](ColourSpecificationMethods::EnumeratedColourSpace).
    pub fn enumerated_colour_space(&self) -> Option<EnumeratedColourSpaces> {
        self.enumerated_colour_space.map(EnumeratedColourSpaces::new)
    }

    /// The restricted ICC profile bytes, not interpreted.
    pub fn restricted_icc_profile(&self) -> Option<&[u8]> {
        match self.method() {
            ColourSpecificationMethods::RestrictedICCProfile => Some(&self.data),
            _ => None,
        }
    }

    /// Fields following APPROX for a reserved method.
    pub fn reserved_data(&self) -> Option<&[u8]> {
        match self.method() {
            ColourSpecificationMethods::Reserved { .. } => Some(&self.data),
            _ => None,
        }
    }
}

impl JBox for ColourSpecificationBox {
    fn new(header: &BoxHeader) -> Self {
        ColourSpecificationBox {
            length: header.box_length(),
            offset: header.data_offset(),
            ..Default::default()
        }
    }

    // The type of a Colour Specification box shall be ‘colr’ (0x636F 6C72).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_COLOUR_SPECIFICATION
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
        reader.read_exact(&mut self.method)?;
        reader.read_exact(&mut self.precedence)?;
        reader.read_exact(&mut self.colourspace_approximation)?;

        if self.precedence() != 0 {
            warn!("Precedence {:?} unexpected", self.precedence());
        }
        if self.colourspace_approximation() != 0 {
            warn!(
                "Colourspace approximation {:?} unexpected",
                self.colourspace_approximation()
            );
        }

        debug!("Method {}", self.method());
        debug!("Precedence {:?}", self.precedence());
        debug!(
            "Colourspace approximation {:?}",
            self.colourspace_approximation()
        );

        match self.method() {
            // 1 - Enumerated Colourspace.
            //
            // If the value of the METH field is 1, then the EnumCS shall exist
            // in this box immediately following the APPROX field, and the
            // EnumCS field shall be the last field in this box
            ColourSpecificationMethods::EnumeratedColourSpace => {
                let mut enumerated_colour_space: EnumeratedColourSpace = [0; 4];
                reader.read_exact(&mut enumerated_colour_space)?;
                self.enumerated_colour_space = Some(enumerated_colour_space);
                debug!("Enumerated colour space {:?}", self.enumerated_colour_space());
            }

            // 2 - Restricted ICC profile.
            //
            // If the value of METH is 2, then the PROFILE field shall
            // immediately follow the APPROX field and the PROFILE field shall
            // be the last field in the box.
            ColourSpecificationMethods::RestrictedICCProfile => {
                self.data = vec![0; reader.remaining() as usize];
                reader.read_exact(&mut self.data)?;
                debug!("Restricted ICC profile of {} bytes", self.data.len());
            }

            // Reserved for other ISO use. If the value of METH is not 1 or 2,
            // there may be fields in this box following the APPROX field, and a
            // conforming JP2 reader shall ignore the entire Colour
            // Specification box.
            ColourSpecificationMethods::Reserved { value } => {
                self.data = vec![0; reader.remaining() as usize];
                reader.read_exact(&mut self.data)?;
                debug!("Reserved method {}", value);
            }
        }

        Ok(())
    }
}
