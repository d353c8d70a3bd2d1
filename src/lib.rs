//! Wraps a JPEG file into a single-page PDF without re-encoding it.
//!
//! The JPEG is split into its marker segments (optionally dropping metadata
//! blocks) and embedded as a `/DCTDecode` image stream on a page sized to
//! the image.

pub mod config;
pub mod error;
pub mod jpeg;
pub mod pdf;


use log::{info, warn};

pub use crate::config::{CmykPolarity, Config};
pub use crate::error::{Error, Result};

use crate::jpeg::{ColorSpace, Image};
use crate::pdf::AssembleOptions;


/// Converts the JPEG in `jpeg_data` into the bytes of a PDF document.
pub fn convert(jpeg_data: &[u8], config: &Config) -> Result<Vec<u8>> {
    config.validate()?;

    // crunch the JPEG
    let jpeg = Image::scan(jpeg_data)?;
    let color_space = jpeg.frame.color_space()?;

    let image_bytes = jpeg.trim(&config.excluded_markers());
    if image_bytes.len() != jpeg_data.len() {
        info!("removed {} bytes of metadata", jpeg_data.len() - image_bytes.len());
    }

    let (dpi_x, dpi_y) = resolution(&jpeg, config);
    let (width_pt, height_pt) = pdf::page_size(&jpeg.frame, dpi_x, dpi_y);
    if !pdf::is_valid_page_size(width_pt) || !pdf::is_valid_page_size(height_pt) {
        return Err(Error::invalid_config(format!(
            "{}x{} pixels at {}x{} dpi give a {}x{} pt page; each side must be between 0.0001 and {} pt",
            jpeg.frame.width, jpeg.frame.height, dpi_x, dpi_y, width_pt, height_pt, pdf::MAX_PAGE_SIZE_PT,
        )));
    }
    let options = AssembleOptions {
        dpi_x,
        dpi_y,
        invert_cmyk: color_space == ColorSpace::Cmyk && invert_cmyk(&jpeg, config.cmyk_polarity),
        ascii85: config.ascii85,
    };

    let pdf = pdf::assemble(&image_bytes, &jpeg.frame, &options)?;
    info!(
        "{}x{} {:?} image at {}x{} dpi, {} bytes of PDF",
        jpeg.frame.width, jpeg.frame.height, color_space,
        pdf::format_number(dpi_x), pdf::format_number(dpi_y), pdf.len(),
    );
    Ok(pdf)
}

fn resolution(jpeg: &Image<'_>, config: &Config) -> (f64, f64) {
    if !config.use_jfif_density {
        return (config.dpi, config.dpi);
    }
    match jpeg.density {
        None => {
            warn!("no JFIF density block; using {} dpi", config.dpi);
            (config.dpi, config.dpi)
        },
        Some(density) => match density.dots_per_inch() {
            Some(dpi) => dpi,
            None => {
                warn!(
                    "JFIF density {}x{} with unit {} gives no physical size; using {} dpi",
                    density.x, density.y, density.unit, config.dpi,
                );
                (config.dpi, config.dpi)
            },
        },
    }
}

fn invert_cmyk(jpeg: &Image<'_>, polarity: CmykPolarity) -> bool {
    match polarity {
        CmykPolarity::Normal => false,
        CmykPolarity::Inverted => true,
        CmykPolarity::Auto => match jpeg.adobe {
            Some(adobe) => {
                warn!(
                    "Adobe CMYK JPEG (APP14 version {}, transform {:?}): inverted color assumed",
                    adobe.version, adobe.color_transform(),
                );
                true
            },
            None => false,
        },
    }
}
