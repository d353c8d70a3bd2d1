#![allow(dead_code)]

//! Synthesises structurally valid JPEG files. Nothing here is decodable
//! pixel data; the converter never looks inside the scan.

pub const SCAN_DATA: &[u8] = &[0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56, 0xFF, 0x00, 0xD9];

pub fn segment(code: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, code];
    let length = u16::try_from(payload.len() + 2).expect("payload too long");
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn jfif(unit: u8, x: u16, y: u16) -> Vec<u8> {
    let mut payload = b"JFIF\0\x01\x01".to_vec();
    payload.push(unit);
    payload.extend_from_slice(&x.to_be_bytes());
    payload.extend_from_slice(&y.to_be_bytes());
    payload.extend_from_slice(&[0, 0]);
    segment(0xE0, &payload)
}

pub fn exif() -> Vec<u8> {
    segment(0xE1, b"Exif\0\0MM\0\x2A\0\0\0\x08\0\0")
}

pub fn adobe(transform: u8) -> Vec<u8> {
    let mut payload = b"Adobe".to_vec();
    payload.extend_from_slice(&[0x00, 0x64, 0x00, 0x00, 0x00, 0x00, transform]);
    segment(0xEE, &payload)
}

/// SOI, `leading`, tables, SOF0, SOS, scan data, EOI.
pub fn jpeg(width: u16, height: u16, components: u8, leading: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    for block in leading {
        out.extend_from_slice(block);
    }
    out.extend_from_slice(&segment(0xDB, &[0u8; 65]));

    let mut frame = vec![8];
    frame.extend_from_slice(&height.to_be_bytes());
    frame.extend_from_slice(&width.to_be_bytes());
    frame.push(components);
    for id in 1..=components {
        frame.extend_from_slice(&[id, 0x11, 0]);
    }
    out.extend_from_slice(&segment(0xC0, &frame));

    out.extend_from_slice(&segment(0xC4, &[0x00, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x00]));

    let mut scan = vec![components];
    for id in 1..=components {
        scan.extend_from_slice(&[id, 0x00]);
    }
    scan.extend_from_slice(&[0, 63, 0]);
    out.extend_from_slice(&segment(0xDA, &scan));

    out.extend_from_slice(SCAN_DATA);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// The dictionary text and the stream body of the image XObject.
pub fn image_stream(pdf: &[u8]) -> (String, &[u8]) {
    let dict_start = find(pdf, b"/Subtype /Image").expect("no image XObject");
    let dict_end = dict_start + find(&pdf[dict_start..], b">>\nstream\n").expect("no stream");
    let dict = String::from_utf8(pdf[dict_start..dict_end].to_vec()).expect("dictionary is ASCII");
    let length: usize = dict.split("/Length ").nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .expect("no /Length");
    let body_start = dict_end + b">>\nstream\n".len();
    (dict, &pdf[body_start..body_start + length])
}
