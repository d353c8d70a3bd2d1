/// JPEG marker codes (ITU T.81 Table B.1), sans the leading 0xFF.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Marker {
    /// Start of Frame; the parameter is the process number (0-15 except 4, 8 and 12).
    SOF(u8),
    /// Reserved for JPEG extensions
    JPG,
    /// Define Huffman table(s)
    DHT,
    /// Define arithmetic coding conditioning(s)
    DAC,
    /// Restart with modulo 8 count `m`
    RST(u8),
    /// Start of image
    SOI,
    /// End of image
    EOI,
    /// Start of scan
    SOS,
    /// Define quantization table(s)
    DQT,
    /// Define number of lines
    DNL,
    /// Define restart interval
    DRI,
    /// Define hierarchical progression
    DHP,
    /// Expand reference component(s)
    EXP,
    /// Application segment (0-15)
    APP(u8),
    /// Reserved for JPEG extensions (0-13)
    JPGn(u8),
    /// Comment
    COM,
    /// For temporary private use in arithmetic coding
    TEM,
    /// Reserved (0x02-0xBF)
    RES(u8),
}

/// How a marker is laid out in the byte stream.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SegmentKind {
    /// Just the two marker bytes.
    Standalone,
    /// Marker, big-endian length (counting itself), then payload.
    LengthPrefixed,
    /// Length-prefixed scan header followed by entropy-coded data.
    ScanStart,
    /// Terminates the image.
    EndOfImage,
}

impl Marker {
    /// Returns `None` for 0x00 (stuffed byte) and 0xFF (fill byte).
    pub fn from_u8(code: u8) -> Option<Marker> {
        use self::Marker::*;
        match code {
            0x00 | 0xFF => None,
            0x01 => Some(TEM),
            0x02..=0xBF => Some(RES(code)),
            0xC4 => Some(DHT),
            0xC8 => Some(JPG),
            0xCC => Some(DAC),
            0xC0..=0xCF => Some(SOF(code - 0xC0)),
            0xD0..=0xD7 => Some(RST(code - 0xD0)),
            0xD8 => Some(SOI),
            0xD9 => Some(EOI),
            0xDA => Some(SOS),
            0xDB => Some(DQT),
            0xDC => Some(DNL),
            0xDD => Some(DRI),
            0xDE => Some(DHP),
            0xDF => Some(EXP),
            0xE0..=0xEF => Some(APP(code - 0xE0)),
            0xF0..=0xFD => Some(JPGn(code - 0xF0)),
            0xFE => Some(COM),
        }
    }

    pub fn to_u8(self) -> u8 {
        use self::Marker::*;
        match self {
            SOF(n) => 0xC0 + n,
            JPG => 0xC8,
            DHT => 0xC4,
            DAC => 0xCC,
            RST(n) => 0xD0 + n,
            SOI => 0xD8,
            EOI => 0xD9,
            SOS => 0xDA,
            DQT => 0xDB,
            DNL => 0xDC,
            DRI => 0xDD,
            DHP => 0xDE,
            EXP => 0xDF,
            APP(n) => 0xE0 + n,
            JPGn(n) => 0xF0 + n,
            COM => 0xFE,
            TEM => 0x01,
            RES(code) => code,
        }
    }

    /// The dispatch table from marker to framing.
    pub fn kind(self) -> SegmentKind {
        use self::Marker::*;
        match self {
            SOI | RST(..) | TEM => SegmentKind::Standalone,
            SOS => SegmentKind::ScanStart,
            EOI => SegmentKind::EndOfImage,
            _ => SegmentKind::LengthPrefixed,
        }
    }

    pub fn is_start_of_frame(self) -> bool {
        matches!(self, Marker::SOF(_))
    }

    /// Markers a decoder cannot do without. These are never trimmed.
    pub fn is_structural(self) -> bool {
        use self::Marker::*;
        matches!(
            self,
            SOI | SOF(_) | DHT | DAC | DQT | DRI | DNL | DHP | EXP | SOS | RST(_) | EOI
        )
    }

    /// Metadata blocks that `--remove-optional-metadata` drops.
    ///
    /// APP14 is spared: its Adobe transform flag decides how the DCT filter
    /// converts the components.
    pub fn is_optional_metadata(self) -> bool {
        match self {
            Marker::APP(14) => false,
            Marker::APP(_) | Marker::COM => true,
            _ => false,
        }
    }
}
