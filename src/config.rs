use std::collections::BTreeSet;

use clap::ValueEnum;

use crate::error::{Error, Result};
use crate::jpeg::Marker;


/// How four-component image data is to be interpreted.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, ValueEnum)]
pub enum CmykPolarity {
    /// Inverted when the image carries an Adobe APP14 block, normal otherwise.
    #[default]
    #[value(name = "auto")] Auto,
    #[value(name = "normal")] Normal,
    #[value(name = "inverted")] Inverted,
}


/// Options for a single conversion.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Pixels per inch; the page is `pixels * 72 / dpi` points wide.
    pub dpi: f64,

    pub strip_metadata: bool,

    /// Prefer the density recorded in a JFIF block over `dpi`.
    pub use_jfif_density: bool,

    pub cmyk_polarity: CmykPolarity,

    /// Armor the image stream in ASCII85.
    pub ascii85: bool,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            dpi: 72.0,
            strip_metadata: false,
            use_jfif_density: false,
            cmyk_polarity: CmykPolarity::default(),
            ascii85: false,
        }
    }
}
impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.dpi.is_finite() || self.dpi <= 0.0 {
            return Err(Error::invalid_config(format!("dpi must be a positive number, obtained {}", self.dpi)));
        }
        Ok(())
    }

    /// The markers whose blocks are removed before embedding.
    pub fn excluded_markers(&self) -> BTreeSet<Marker> {
        if !self.strip_metadata {
            return BTreeSet::new();
        }
        (0x01..=0xFEu8)
            .filter_map(Marker::from_u8)
            .filter(|m| m.is_optional_metadata())
            .collect()
    }
}
