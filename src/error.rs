use std::io;

use thiserror::Error;


#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed JPEG at byte offset {offset}: {message}")]
    MalformedInput {
        offset: usize,
        message: String,
    },

    #[error("unsupported color model with {components} components (only 1=Grayscale, 3=RGB, 4=CMYK)")]
    UnsupportedColorModel {
        components: u8,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
impl Error {
    pub fn malformed(offset: usize, message: impl Into<String>) -> Self {
        Self::MalformedInput {
            offset,
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
