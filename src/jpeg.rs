mod marker;


use std::collections::BTreeSet;
use std::io::{self, Write};
use std::ops::Range;

use from_to_repr::FromToRepr;
use log::{debug, warn};

use crate::error::{Error, Result};

pub use self::marker::{Marker, SegmentKind};


#[derive(Clone, Copy, Debug, Eq, FromToRepr, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum ColorSpace {
    Grayscale = 1,
    Rgb = 3,
    Cmyk = 4,
}

#[derive(Clone, Copy, Debug, Eq, FromToRepr, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum DensityUnit {
    NoUnit = 0,
    DotsPerInch = 1,
    DotsPerCentimeter = 2,
}

#[derive(Clone, Copy, Debug, Eq, FromToRepr, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum AdobeTransform {
    /// RGB or CMYK, depending on the component count
    Unknown = 0,
    YCbCr = 1,
    Ycck = 2,
}


/// One marker segment: the marker (with any preceding fill bytes), the
/// optional length field and the payload.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Block {
    pub marker: Marker,
    pub span: Range<usize>,
    pub length: Option<u16>,
    pub payload: Range<usize>,
}
impl Block {
    fn standalone(marker: Marker, span: Range<usize>) -> Self {
        let end = span.end;
        Self {
            marker,
            span,
            length: None,
            payload: end..end,
        }
    }

    pub fn len(&self) -> usize {
        self.span.len()
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Component {
    pub id: u8,
    pub horizontal_sampling: u8,
    pub vertical_sampling: u8,
    pub quantization_table: u8,
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FrameInfo {
    pub process: Marker,
    pub precision: u8,
    pub height: u16,
    pub width: u16,
    pub component_count: u8,
    pub components: Vec<Component>,
}
impl FrameInfo {
    fn parse(process: Marker, payload: &[u8], payload_offset: usize) -> Result<Self> {
        if payload.len() < 6 {
            return Err(Error::malformed(
                payload_offset,
                format!("Start of Frame payload has {} bytes, expected at least 6", payload.len()),
            ));
        }
        let precision = payload[0];
        let height = u16::from_be_bytes([payload[1], payload[2]]);
        let width = u16::from_be_bytes([payload[3], payload[4]]);
        let component_count = payload[5];

        let needed = 6 + 3 * usize::from(component_count);
        if payload.len() < needed {
            return Err(Error::malformed(
                payload_offset,
                format!(
                    "Start of Frame declares {} components ({} bytes), obtained {} bytes",
                    component_count, needed, payload.len(),
                ),
            ));
        }
        if width == 0 || height == 0 {
            return Err(Error::malformed(
                payload_offset + 1,
                format!("frame dimensions {}x{} must be nonzero", width, height),
            ));
        }

        let components = payload[6..needed]
            .chunks_exact(3)
            .map(|c| Component {
                id: c[0],
                horizontal_sampling: c[1] >> 4,
                vertical_sampling: c[1] & 0x0F,
                quantization_table: c[2],
            })
            .collect();

        Ok(Self {
            process,
            precision,
            height,
            width,
            component_count,
            components,
        })
    }

    pub fn color_space(&self) -> Result<ColorSpace> {
        ColorSpace::try_from(self.component_count)
            .map_err(|_| Error::UnsupportedColorModel { components: self.component_count })
    }
}


/// The pixel density from a JFIF APP0 block.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Density {
    pub unit: u8,
    pub x: u16,
    pub y: u16,
}
impl Density {
    fn parse_jfif(payload: &[u8]) -> Option<Self> {
        // "JFIF\0", major, minor, unit, x density, y density, thumbnail size
        if !payload.starts_with(b"JFIF\0") || payload.len() < 12 {
            return None;
        }
        Some(Self {
            unit: payload[7],
            x: u16::from_be_bytes([payload[8], payload[9]]),
            y: u16::from_be_bytes([payload[10], payload[11]]),
        })
    }

    pub fn density_unit(&self) -> Option<DensityUnit> {
        DensityUnit::try_from(self.unit).ok()
    }

    /// Horizontal and vertical dots per inch, if the block carries an
    /// absolute unit and nonzero densities.
    pub fn dots_per_inch(&self) -> Option<(f64, f64)> {
        if self.x == 0 || self.y == 0 {
            return None;
        }
        let (x, y) = (f64::from(self.x), f64::from(self.y));
        match self.density_unit()? {
            DensityUnit::NoUnit => None,
            DensityUnit::DotsPerInch => Some((x, y)),
            DensityUnit::DotsPerCentimeter => Some((x * 2.54, y * 2.54)),
        }
    }
}


/// The contents of an Adobe APP14 block.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AdobeInfo {
    pub version: u16,
    pub transform: u8,
}
impl AdobeInfo {
    fn parse(payload: &[u8]) -> Option<Self> {
        if !payload.starts_with(b"Adobe") || payload.len() < 12 {
            return None;
        }
        Some(Self {
            // flags0 and flags1 sit in between
            version: u16::from_be_bytes([payload[5], payload[6]]),
            transform: payload[11],
        })
    }

    pub fn color_transform(&self) -> Option<AdobeTransform> {
        AdobeTransform::try_from(self.transform).ok()
    }
}


/// A JPEG file split into its marker segments.
///
/// `leading_blocks` runs from Start of Image up to and including the first
/// Start of Scan header. Everything after that header up to End of Image is
/// kept as a single opaque span, as are any bytes following End of Image.
#[derive(Clone, Debug)]
pub struct Image<'a> {
    data: &'a [u8],
    pub leading_blocks: Vec<Block>,
    pub scan_data: Range<usize>,
    pub end_block: Block,
    pub trailing: Range<usize>,
    pub frame: FrameInfo,
    pub density: Option<Density>,
    pub adobe: Option<AdobeInfo>,
}
impl<'a> Image<'a> {
    pub fn scan(data: &'a [u8]) -> Result<Self> {
        if data.get(0..2) != Some(&[0xFF, 0xD8][..]) {
            return Err(Error::malformed(
                0,
                format!("invalid Start of Image -- expected 0xFF 0xD8, obtained {}", describe_bytes(data, 0, 2)),
            ));
        }

        let mut leading_blocks = vec![Block::standalone(Marker::SOI, 0..2)];
        let mut frame = None;
        let mut density = None;
        let mut adobe = None;
        let mut pos = 2;

        loop {
            let (marker, code_end) = read_marker(data, pos)?;
            let block = match marker.kind() {
                SegmentKind::Standalone => Block::standalone(marker, pos..code_end),
                SegmentKind::EndOfImage => {
                    return Err(Error::malformed(pos, "End of Image before Start of Scan"));
                },
                SegmentKind::LengthPrefixed | SegmentKind::ScanStart => {
                    read_length_prefixed(data, pos, marker, code_end)?
                },
            };
            debug!("{:?} at offset {} ({} bytes)", marker, pos, block.len());

            let payload = &data[block.payload.clone()];
            match marker {
                _ if marker.is_start_of_frame() => {
                    if frame.is_some() {
                        return Err(Error::malformed(pos, format!("second Start of Frame ({:?})", marker)));
                    }
                    frame = Some(FrameInfo::parse(marker, payload, block.payload.start)?);
                },
                Marker::APP(0) if density.is_none() => {
                    density = Density::parse_jfif(payload);
                },
                Marker::APP(14) if adobe.is_none() => {
                    adobe = AdobeInfo::parse(payload);
                },
                Marker::SOS if frame.is_none() => {
                    return Err(Error::malformed(pos, "no Start of Frame before Start of Scan"));
                },
                _ => {},
            }

            pos = block.span.end;
            leading_blocks.push(block);
            if marker.kind() == SegmentKind::ScanStart {
                break;
            }
        }

        let frame = match frame {
            Some(f) => f,
            None => return Err(Error::malformed(pos, "no Start of Frame before Start of Scan")),
        };
        let end_block = find_end_of_image(data, pos)?;
        let scan_data = pos..end_block.span.start;
        let trailing = end_block.span.end..data.len();
        if !trailing.is_empty() {
            debug!("{} bytes after End of Image", trailing.len());
        }

        Ok(Self {
            data,
            leading_blocks,
            scan_data,
            end_block,
            trailing,
            frame,
            density,
            adobe,
        })
    }

    /// The byte ranges that make up the file, in order.
    pub fn spans(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.leading_blocks.iter()
            .map(|b| b.span.clone())
            .chain([self.scan_data.clone(), self.end_block.span.clone(), self.trailing.clone()])
    }

    /// The spans left after removing the leading blocks whose marker is in
    /// `exclude`. Structurally required markers are always kept.
    fn kept_spans<'s>(&'s self, exclude: &'s BTreeSet<Marker>) -> impl Iterator<Item = Range<usize>> + 's {
        let kept_blocks = self.leading_blocks.iter()
            .filter(move |block| {
                if !exclude.contains(&block.marker) {
                    return true;
                }
                if block.marker.is_structural() {
                    warn!("not removing required {:?} block at offset {}", block.marker, block.span.start);
                    return true;
                }
                debug!("removing {:?} block at offset {} ({} bytes)", block.marker, block.span.start, block.len());
                false
            })
            .map(|block| block.span.clone());
        kept_blocks
            .chain([self.scan_data.clone(), self.end_block.span.clone(), self.trailing.clone()])
    }

    /// Copies the image without the blocks in `exclude`.
    pub fn trim(&self, exclude: &BTreeSet<Marker>) -> Vec<u8> {
        let mut output = Vec::with_capacity(self.data.len());
        for span in self.kept_spans(exclude) {
            output.extend_from_slice(&self.data[span]);
        }
        output
    }

    /// Streams the image without the blocks in `exclude` to `writer`.
    pub fn write<W: Write>(&self, exclude: &BTreeSet<Marker>, mut writer: W) -> std::result::Result<(), io::Error> {
        for span in self.kept_spans(exclude) {
            writer.write_all(&self.data[span])?;
        }
        Ok(())
    }
}


fn describe_bytes(data: &[u8], offset: usize, count: usize) -> String {
    let end = data.len().min(offset + count);
    let described: Vec<String> = data.get(offset..end)
        .unwrap_or(&[])
        .iter()
        .map(|b| format!("0x{:02X}", b))
        .collect();
    if described.is_empty() {
        "end of data".to_owned()
    } else {
        described.join(" ")
    }
}

/// Reads the marker at `pos`, skipping fill bytes. Returns the marker and the
/// offset just past its code byte.
fn read_marker(data: &[u8], pos: usize) -> Result<(Marker, usize)> {
    match data.get(pos) {
        Some(0xFF) => {},
        Some(other) => return Err(Error::malformed(
            pos,
            format!("expected marker prefix 0xFF, obtained 0x{:02X}", other),
        )),
        None => return Err(Error::malformed(pos, "data ended while expecting a marker")),
    }

    let mut code_pos = pos + 1;
    while data.get(code_pos) == Some(&0xFF) {
        code_pos += 1;
    }
    let code = match data.get(code_pos) {
        Some(&c) => c,
        None => return Err(Error::malformed(code_pos, "data ended inside a marker")),
    };
    let marker = Marker::from_u8(code)
        .ok_or_else(|| Error::malformed(code_pos, format!("expected a marker code, obtained 0x{:02X}", code)))?;
    Ok((marker, code_pos + 1))
}

fn read_length_prefixed(data: &[u8], start: usize, marker: Marker, code_end: usize) -> Result<Block> {
    let length = match data.get(code_end..code_end + 2) {
        Some(bytes) => u16::from_be_bytes([bytes[0], bytes[1]]),
        None => return Err(Error::malformed(code_end, format!("data ended inside the length of {:?}", marker))),
    };
    if length < 2 {
        return Err(Error::malformed(
            code_end,
            format!("invalid {:?} length {}; must be at least 2 to accommodate the length bytes", marker, length),
        ));
    }
    let end = code_end + usize::from(length);
    if end > data.len() {
        return Err(Error::malformed(
            code_end,
            format!("{:?} length {} runs past the end of the data ({} bytes)", marker, length, data.len()),
        ));
    }
    Ok(Block {
        marker,
        span: start..end,
        length: Some(length),
        payload: code_end + 2..end,
    })
}

/// Walks the entropy-coded data starting at `pos` until the End of Image
/// marker. Stuffed 0xFF 0x00, restart markers and fill bytes are data;
/// length-prefixed segments between scans are skipped whole.
fn find_end_of_image(data: &[u8], mut pos: usize) -> Result<Block> {
    loop {
        let prefix = match data[pos..].iter().position(|&b| b == 0xFF) {
            Some(i) => pos + i,
            None => return Err(Error::malformed(data.len(), "no End of Image marker found")),
        };
        let mut code_pos = prefix + 1;
        while data.get(code_pos) == Some(&0xFF) {
            code_pos += 1;
        }
        let code = match data.get(code_pos) {
            Some(&c) => c,
            None => return Err(Error::malformed(data.len(), "no End of Image marker found")),
        };

        match Marker::from_u8(code) {
            None => pos = code_pos + 1,
            Some(Marker::EOI) => return Ok(Block::standalone(Marker::EOI, prefix..code_pos + 1)),
            Some(marker) if marker.kind() == SegmentKind::Standalone => pos = code_pos + 1,
            Some(marker) => {
                let block = read_length_prefixed(data, prefix, marker, code_pos + 1)?;
                debug!("{:?} at offset {} inside scan data", marker, prefix);
                pos = block.span.end;
            },
        }
    }
}
