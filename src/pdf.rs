use std::{collections::BTreeMap, io::{self, Cursor, Seek, Write}};

use log::{debug, warn};

use crate::error;
use crate::jpeg::{ColorSpace, FrameInfo};


pub type PdfObjectId = u64;

// PDF document structure:
// 1 = catalog
// 2 = pages
// 3 = page (resources inline)
// 4 = image
// 5 = page contents
pub const CATALOG_ID: PdfObjectId = 1;
pub const PAGES_ID: PdfObjectId = 2;
pub const PAGE_ID: PdfObjectId = 3;
pub const IMAGE_ID: PdfObjectId = 4;
pub const CONTENTS_ID: PdfObjectId = 5;

/// Largest page side, in points, that readers accept as a real number.
pub const MAX_PAGE_SIZE_PT: f64 = 32_767.0;


/// How the image is placed on the page and stored in the stream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AssembleOptions {
    pub dpi_x: f64,
    pub dpi_y: f64,
    /// Add a `/Decode` array flipping every component (CMYK only).
    pub invert_cmyk: bool,
    pub ascii85: bool,
}
impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            dpi_x: 72.0,
            dpi_y: 72.0,
            invert_cmyk: false,
            ascii85: false,
        }
    }
}


/// Wraps `image_bytes` into a single-page PDF showing it at the size given
/// by `frame` and the options' resolution.
pub fn assemble(image_bytes: &[u8], frame: &FrameInfo, options: &AssembleOptions) -> error::Result<Vec<u8>> {
    let image = ImageXObject::from_jpeg(image_bytes, frame, options)?;

    let (width_pt, height_pt) = page_size(frame, options.dpi_x, options.dpi_y);
    debug!("page size {} x {} pt", format_number(width_pt), format_number(height_pt));

    let catalog = ObjectData::Catalog(Catalog {
        root_page_id: PAGES_ID,
    });
    let pages = ObjectData::Pages(Pages {
        page_ids: vec![PAGE_ID],
    });
    let page = ObjectData::Page(Page {
        parent_id: PAGES_ID,
        resources: PageResources {
            image_xobject_ids: vec![IMAGE_ID],
        },
        contents_id: CONTENTS_ID,
        width_pt,
        height_pt,
    });
    let contents = ObjectData::PageContents(PageContents {
        commands: format!(
            "q {} 0 0 {} 0 0 cm /Im0 Do Q",
            format_number(width_pt), format_number(height_pt),
        ),
    });

    let mut pdf = Document::default();
    pdf.objects.insert(CATALOG_ID, catalog);
    pdf.objects.insert(PAGES_ID, pages);
    pdf.objects.insert(PAGE_ID, page);
    pdf.objects.insert(IMAGE_ID, ObjectData::ImageXObject(image));
    pdf.objects.insert(CONTENTS_ID, contents);

    Ok(pdf.to_bytes()?)
}


/// The page width and height in points for the given resolution.
pub fn page_size(frame: &FrameInfo, dpi_x: f64, dpi_y: f64) -> (f64, f64) {
    // default user space unit: 1/72 inch (Adobe point)
    let width_pt = f64::from(frame.width) * 72.0 / dpi_x;
    let height_pt = f64::from(frame.height) * 72.0 / dpi_y;
    (width_pt, height_pt)
}

/// Whether a page side survives `format_number` as a usable, nonzero size.
pub fn is_valid_page_size(size_pt: f64) -> bool {
    size_pt <= MAX_PAGE_SIZE_PT && (size_pt * 10_000.0).round() >= 1.0
}

/// Formats a number for a content stream or array: integers without a
/// fractional part, everything else with at most four decimals.
pub fn format_number(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    if rounded == 0.0 {
        // no "-0"
        "0".to_owned()
    } else if rounded.fract() == 0.0 {
        format!("{:.0}", rounded)
    } else {
        let fixed = format!("{:.4}", rounded);
        fixed.trim_end_matches('0').trim_end_matches('.').to_owned()
    }
}


#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    pub objects: BTreeMap<PdfObjectId, ObjectData>,
}
impl Document {
    pub fn to_bytes(&self) -> Result<Vec<u8>, io::Error> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    pub fn write<W: Seek + Write>(&self, mut writer: W) -> Result<(), io::Error> {
        let root_obj_id = self.objects.iter()
            .filter(|(_id, data)| matches!(data, ObjectData::Catalog(_)))
            .map(|(id, _data)| *id)
            .nth(0)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no catalog object found"))?;
        if self.objects.contains_key(&0) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "object number 0 is reserved"));
        }
        let max_obj_id = self.objects.keys()
            .copied()
            .max()
            .unwrap_or(0);

        let pdf_start_pos = writer.stream_position()?;

        write!(writer, "%PDF-1.5\n")?;
        // binary detection comment line
        writer.write_all(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n'])?;

        // output each object
        let mut xref_offsets = BTreeMap::new();
        for (&id, data) in &self.objects {
            let object_start_pos = writer.stream_position()?;
            xref_offsets.insert(id, object_start_pos - pdf_start_pos);
            write!(writer, "{} 0 obj\n", id)?;
            data.write_to_pdf(&mut writer)?;
            write!(writer, "endobj\n")?;
        }

        // free objects form a linked list starting at object 0
        let free_ids: Vec<PdfObjectId> = (1..=max_obj_id)
            .filter(|id| !xref_offsets.contains_key(id))
            .collect();
        let next_free = |id: PdfObjectId| free_ids.iter()
            .copied()
            .find(|&free_id| free_id > id)
            .unwrap_or(0);

        let xref_pos = writer.stream_position()?;
        write!(writer, "xref\n")?;
        write!(writer, "0 {}\n", max_obj_id + 1)?;
        write!(writer, "{:010} 65535 f\r\n", next_free(0))?;
        for id in 1..=max_obj_id {
            match xref_offsets.get(&id) {
                Some(xref_offset) => write!(writer, "{:010} 00000 n\r\n", xref_offset)?,
                None => write!(writer, "{:010} 00000 f\r\n", next_free(id))?,
            }
        }

        write!(writer, "trailer\n")?;
        write!(writer, "<< /Size {}", max_obj_id + 1)?;
        write!(writer, " /Root {} 0 R", root_obj_id)?;
        write!(writer, " >>\n")?;
        write!(writer, "startxref\n")?;
        write!(writer, "{}\n", xref_pos - pdf_start_pos)?;
        write!(writer, "%%EOF\n")?;

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ObjectData {
    Catalog(Catalog),
    Pages(Pages),
    Page(Page),
    PageContents(PageContents),
    ImageXObject(ImageXObject),
}
impl ObjectData {
    pub fn write_to_pdf<W: Write>(&self, writer: W) -> Result<(), io::Error> {
        match self {
            Self::Catalog(obj) => obj.write_to_pdf(writer),
            Self::Page(obj) => obj.write_to_pdf(writer),
            Self::Pages(obj) => obj.write_to_pdf(writer),
            Self::PageContents(obj) => obj.write_to_pdf(writer),
            Self::ImageXObject(obj) => obj.write_to_pdf(writer),
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Catalog {
    pub root_page_id: PdfObjectId,
}
impl Catalog {
    pub fn write_to_pdf<W: Write>(&self, mut writer: W) -> Result<(), io::Error> {
        write!(writer, "<< /Type /Catalog")?;
        write!(writer, " /Pages {} 0 R", self.root_page_id)?;
        write!(writer, " >>\n")
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Pages {
    pub page_ids: Vec<PdfObjectId>,
}
impl Pages {
    pub fn write_to_pdf<W: Write>(&self, mut writer: W) -> Result<(), io::Error> {
        write!(writer, "<< /Type /Pages")?;
        write!(writer, " /Kids [")?;
        for &page_id in &self.page_ids {
            write!(writer, " {} 0 R", page_id)?;
        }
        write!(writer, " ]")?;
        write!(writer, " /Count {}", self.page_ids.len())?;
        write!(writer, " >>\n")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub parent_id: PdfObjectId,
    pub resources: PageResources,
    pub contents_id: PdfObjectId,
    pub width_pt: f64,
    pub height_pt: f64,
}
impl Page {
    pub fn write_to_pdf<W: Write>(&self, mut writer: W) -> Result<(), io::Error> {
        write!(writer, "<< /Type /Page")?;
        write!(writer, " /Parent {} 0 R", self.parent_id)?;
        write!(writer, " /Resources ")?;
        self.resources.write_to_pdf(&mut writer)?;
        write!(
            writer, " /MediaBox [0 0 {} {}]",
            format_number(self.width_pt), format_number(self.height_pt),
        )?;
        write!(writer, " /Contents {} 0 R", self.contents_id)?;
        write!(writer, " >>\n")
    }
}

/// Written inline into the page dictionary.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PageResources {
    pub image_xobject_ids: Vec<PdfObjectId>,
}
impl PageResources {
    pub fn write_to_pdf<W: Write>(&self, mut writer: W) -> Result<(), io::Error> {
        write!(writer, "<< /ProcSet [/PDF /ImageB /ImageC]")?;
        write!(writer, " /XObject <<")?;
        for (image_index, image_xobject_id) in self.image_xobject_ids.iter().copied().enumerate() {
            write!(writer, " /Im{} {} 0 R", image_index, image_xobject_id)?;
        }
        write!(writer, " >>")?;
        write!(writer, " >>")
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PageContents {
    pub commands: String,
}
impl PageContents {
    pub fn write_to_pdf<W: Write>(&self, mut writer: W) -> Result<(), io::Error> {
        write!(writer, "<< /Length {} >>\n", self.commands.len())?;
        write!(writer, "stream\n")?;
        write!(writer, "{}", self.commands)?;
        write!(writer, "\nendstream\n")
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ImageXObject {
    pub width: u64,
    pub height: u64,
    pub color_space: &'static str,
    pub bits_per_component: u8,
    pub decode: Vec<u8>,
    pub data_filters: Vec<String>,
    pub data: Vec<u8>,
}
impl ImageXObject {
    pub fn from_jpeg(jpeg_data: &[u8], frame: &FrameInfo, options: &AssembleOptions) -> error::Result<Self> {
        let color_space = match frame.color_space()? {
            ColorSpace::Grayscale => "/DeviceGray",
            ColorSpace::Rgb => "/DeviceRGB",
            ColorSpace::Cmyk => "/DeviceCMYK",
        };
        if frame.precision != 8 {
            warn!("JPEG bit depth {} passed through; many readers only decode 8 bits per component", frame.precision);
        }

        let decode = if options.invert_cmyk && frame.color_space()? == ColorSpace::Cmyk {
            [1, 0].repeat(4)
        } else {
            Vec::new()
        };

        let (data_filters, data) = if options.ascii85 {
            (vec!["/ASCII85Decode".to_owned(), "/DCTDecode".to_owned()], ascii85_armor(jpeg_data))
        } else {
            (vec!["/DCTDecode".to_owned()], jpeg_data.to_vec())
        };

        Ok(Self {
            width: frame.width.into(),
            height: frame.height.into(),
            color_space,
            bits_per_component: frame.precision,
            decode,
            data_filters,
            data,
        })
    }

    pub fn write_to_pdf<W: Write>(&self, mut writer: W) -> Result<(), io::Error> {
        write!(writer, "<< /Type /XObject /Subtype /Image")?;
        write!(writer, " /Width {}", self.width)?;
        write!(writer, " /Height {}", self.height)?;
        write!(writer, " /ColorSpace {}", self.color_space)?;
        write!(writer, " /BitsPerComponent {}", self.bits_per_component)?;
        if self.decode.len() > 0 {
            write!(writer, " /Decode [")?;
            for value in &self.decode {
                write!(writer, " {}", value)?;
            }
            write!(writer, " ]")?;
        }
        if self.data_filters.len() > 0 {
            write!(writer, " /Filter [")?;
            for filter in &self.data_filters {
                write!(writer, " {}", filter)?;
            }
            write!(writer, " ]")?;
        }
        write!(writer, " /Length {}", self.data.len())?;
        write!(writer, " >>\nstream\n")?;
        writer.write_all(&self.data)?;
        write!(writer, "\nendstream\n")
    }
}

/// ASCII85-encodes `data` as stream content: no leading `<~`, terminated by
/// the `~>` end-of-data marker.
fn ascii85_armor(data: &[u8]) -> Vec<u8> {
    let encoded = ascii85::encode(data);
    let mut armored = encoded.strip_prefix("<~").unwrap_or(&encoded).to_owned();
    if !armored.ends_with("~>") {
        armored.push_str("~>");
    }
    armored.into_bytes()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::jpeg::Marker;

    fn frame(width: u16, height: u16, component_count: u8) -> FrameInfo {
        FrameInfo {
            process: Marker::SOF(0),
            precision: 8,
            height,
            width,
            component_count,
            components: Vec::new(),
        }
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).rposition(|w| w == needle)
    }

    /// Returns (offset, generation, in-use) for every xref entry.
    fn xref_entries(pdf: &[u8]) -> Vec<(u64, u32, bool)> {
        let startxref = rfind(pdf, b"startxref\n").unwrap() + b"startxref\n".len();
        let text = std::str::from_utf8(&pdf[startxref..]).unwrap();
        let xref_pos: usize = text.lines().next().unwrap().parse().unwrap();
        assert!(pdf[xref_pos..].starts_with(b"xref\n0 "));

        let header_end = xref_pos + find(&pdf[xref_pos..], b"\n0 ").unwrap() + 1;
        let count_line_end = header_end + find(&pdf[header_end..], b"\n").unwrap();
        let count_line = std::str::from_utf8(&pdf[header_end..count_line_end]).unwrap();
        let count: usize = count_line.split(' ').nth(1).unwrap().parse().unwrap();

        let mut entries = Vec::new();
        let mut pos = count_line_end + 1;
        for _ in 0..count {
            let entry = std::str::from_utf8(&pdf[pos..pos + 20]).unwrap();
            assert!(entry.ends_with("\r\n"), "{:?}", entry);
            let offset = entry[0..10].parse().unwrap();
            let generation = entry[11..16].parse().unwrap();
            let in_use = match &entry[17..18] {
                "n" => true,
                "f" => false,
                other => panic!("bad xref entry type {:?}", other),
            };
            entries.push((offset, generation, in_use));
            pos += 20;
        }
        entries
    }

    #[test]
    fn formats_numbers() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(7.2), "7.2");
        assert_eq!(format_number(1.0 / 3.0), "0.3333");
        assert_eq!(format_number(2.99999), "3");
        assert_eq!(format_number(-0.00001), "0");
        assert_eq!(format_number(1e20), "100000000000000000000");
    }

    #[test]
    fn page_size_bounds() {
        assert!(is_valid_page_size(10.0));
        assert!(is_valid_page_size(0.0001));
        assert!(is_valid_page_size(MAX_PAGE_SIZE_PT));
        assert!(!is_valid_page_size(0.00004));
        assert!(!is_valid_page_size(0.0));
        assert!(!is_valid_page_size(MAX_PAGE_SIZE_PT + 1.0));
        assert!(!is_valid_page_size(f64::INFINITY));
        assert!(!is_valid_page_size(f64::NAN));
    }

    #[test]
    fn xref_points_at_object_definitions() {
        let jpeg = b"\xFF\xD8 not really compressed data \xFF\xD9";
        let pdf = assemble(jpeg, &frame(10, 10, 3), &AssembleOptions::default()).unwrap();
        let entries = xref_entries(&pdf);
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[0], (0, 65535, false));
        for (id, &(offset, generation, in_use)) in entries.iter().enumerate().skip(1) {
            assert!(in_use);
            assert_eq!(generation, 0);
            let header = format!("{} 0 obj\n", id);
            let offset = usize::try_from(offset).unwrap();
            assert!(pdf[offset..].starts_with(header.as_bytes()), "object {} not at {}", id, offset);
        }
        assert!(pdf.ends_with(b"%%EOF\n"));
        assert!(find(&pdf, b"trailer\n<< /Size 6 /Root 1 0 R >>").is_some());
    }

    #[test]
    fn embeds_image_bytes_verbatim() {
        let jpeg: Vec<u8> = (0..=255u8).chain([0xFF, 0xD9]).collect();
        let pdf = assemble(&jpeg, &frame(3, 4, 1), &AssembleOptions::default()).unwrap();

        let dict_start = find(&pdf, b"/Subtype /Image").unwrap();
        let dict = std::str::from_utf8(&pdf[dict_start..dict_start + find(&pdf[dict_start..], b">>").unwrap()]).unwrap();
        assert!(dict.contains(&format!("/Length {}", jpeg.len())), "{}", dict);
        assert!(dict.contains("/Filter [ /DCTDecode ]"), "{}", dict);
        assert!(dict.contains("/ColorSpace /DeviceGray"), "{}", dict);

        let stream_start = dict_start + find(&pdf[dict_start..], b"stream\n").unwrap() + b"stream\n".len();
        assert_eq!(&pdf[stream_start..stream_start + jpeg.len()], &jpeg[..]);
        assert!(pdf[stream_start + jpeg.len()..].starts_with(b"\nendstream\n"));
    }

    #[test]
    fn maps_component_counts() {
        for (components, expected) in [(1, "/DeviceGray"), (3, "/DeviceRGB"), (4, "/DeviceCMYK")] {
            let image = ImageXObject::from_jpeg(b"", &frame(1, 1, components), &AssembleOptions::default()).unwrap();
            assert_eq!(image.color_space, expected);
        }
        for components in [0, 2, 5] {
            let result = assemble(b"", &frame(1, 1, components), &AssembleOptions::default());
            assert!(matches!(result, Err(Error::UnsupportedColorModel { components: c }) if c == components));
        }
    }

    #[test]
    fn scales_page_by_dpi() {
        let options = AssembleOptions { dpi_x: 144.0, dpi_y: 300.0, ..AssembleOptions::default() };
        let pdf = assemble(b"", &frame(10, 100, 3), &options).unwrap();
        assert!(find(&pdf, b"/MediaBox [0 0 5 24]").is_some());
        assert!(find(&pdf, b"q 5 0 0 24 0 0 cm /Im0 Do Q").is_some());
    }

    #[test]
    fn content_stream_length_is_exact() {
        let pdf = assemble(b"", &frame(10, 10, 3), &AssembleOptions::default()).unwrap();
        let commands = b"q 10 0 0 10 0 0 cm /Im0 Do Q";
        let expected = format!("<< /Length {} >>\nstream\nq 10 0 0 10 0 0 cm /Im0 Do Q\nendstream\n", commands.len());
        assert!(find(&pdf, expected.as_bytes()).is_some());
    }

    #[test]
    fn inverts_cmyk_on_request() {
        let options = AssembleOptions { invert_cmyk: true, ..AssembleOptions::default() };
        let cmyk = ImageXObject::from_jpeg(b"", &frame(1, 1, 4), &options).unwrap();
        assert_eq!(cmyk.decode, vec![1, 0, 1, 0, 1, 0, 1, 0]);
        let mut written = Vec::new();
        cmyk.write_to_pdf(&mut written).unwrap();
        assert!(find(&written, b"/Decode [ 1 0 1 0 1 0 1 0 ]").is_some());

        let rgb = ImageXObject::from_jpeg(b"", &frame(1, 1, 3), &options).unwrap();
        assert!(rgb.decode.is_empty());
    }

    #[test]
    fn ascii85_wraps_the_stream() {
        let options = AssembleOptions { ascii85: true, ..AssembleOptions::default() };
        let jpeg = [0xFF, 0xD8, 0x00, 0x80, 0xFF, 0xD9];
        let image = ImageXObject::from_jpeg(&jpeg, &frame(1, 1, 3), &options).unwrap();
        assert_eq!(image.data_filters, vec!["/ASCII85Decode".to_owned(), "/DCTDecode".to_owned()]);
        assert!(image.data.ends_with(b"~>"));
        assert!(!image.data.starts_with(b"<~"));
        assert!(image.data.iter().all(|b| b.is_ascii() && !b.is_ascii_control()));
    }

    #[test]
    fn free_objects_are_listed() {
        let mut pdf = Document::default();
        pdf.objects.insert(1, ObjectData::Catalog(Catalog { root_page_id: 3 }));
        pdf.objects.insert(3, ObjectData::Pages(Pages { page_ids: Vec::new() }));
        let bytes = pdf.to_bytes().unwrap();
        let entries = xref_entries(&bytes);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0], (2, 65535, false));
        assert_eq!(entries[2], (0, 0, false));
        assert!(entries[1].2 && entries[3].2);
    }

    #[test]
    fn refuses_document_without_catalog() {
        let mut pdf = Document::default();
        pdf.objects.insert(1, ObjectData::Pages(Pages { page_ids: Vec::new() }));
        let err = pdf.to_bytes().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
