//! Decompression of partition objects.
//!
//! Partition objects arrive block-compressed; the codec is opaque to the
//! pipeline and only needs to turn a byte stream into a text stream.

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Turns a raw object stream into its decoded stream.
pub trait Decompressor: Send + Sync {
    fn name(&self) -> &str;

    fn decode(&self, input: Box<dyn Read>) -> Box<dyn Read>;
}

/// Objects that are stored uncompressed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Decompressor for Passthrough {
    fn name(&self) -> &str {
        "none"
    }

    fn decode(&self, input: Box<dyn Read>) -> Box<dyn Read> {
        input
    }
}

/// Gzip-compressed objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gzip;

impl Decompressor for Gzip {
    fn name(&self) -> &str {
        "gzip"
    }

    fn decode(&self, input: Box<dyn Read>) -> Box<dyn Read> {
        Box::new(GzDecoder::new(input))
    }
}

/// Configured codec for partition objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

impl Compression {
    pub fn decompressor(self) -> Box<dyn Decompressor> {
        match self {
            Compression::None => Box::new(Passthrough),
            Compression::Gzip => Box::new(Gzip),
        }
    }
}
