//! Image type detection from leading magic bytes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Bytes read from the start of a file; enough for every signature below
pub const SNIFF_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Webp,
    Tiff,
    Heic,
    Avif,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 8] = [
        Self::Png,
        Self::Jpeg,
        Self::Gif,
        Self::Bmp,
        Self::Webp,
        Self::Tiff,
        Self::Heic,
        Self::Avif,
    ];

    pub fn canonical_extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Webp => "webp",
            Self::Tiff => "tif",
            Self::Heic => "heic",
            Self::Avif => "avif",
        }
    }

    /// Extensions that legitimately name this format
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Png => &["png"],
            Self::Jpeg => &["jpg", "jpeg", "jpe", "jfif"],
            Self::Gif => &["gif"],
            Self::Bmp => &["bmp", "dib"],
            Self::Webp => &["webp"],
            Self::Tiff => &["tif", "tiff"],
            Self::Heic => &["heic", "heif"],
            Self::Avif => &["avif"],
        }
    }

    /// Format an extension claims to be (case-insensitive, leading dot allowed)
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.extensions().contains(&ext.as_str()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::Gif => "GIF",
            Self::Bmp => "BMP",
            Self::Webp => "WEBP",
            Self::Tiff => "TIFF",
            Self::Heic => "HEIC",
            Self::Avif => "AVIF",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// (offset, bytes) pairs that must all match
struct Magic {
    format: ImageFormat,
    parts: &'static [(usize, &'static [u8])],
}

const MAGIC_TABLE: &[Magic] = &[
    Magic {
        format: ImageFormat::Png,
        parts: &[(0, b"\x89PNG\r\n\x1a\n")],
    },
    Magic {
        format: ImageFormat::Jpeg,
        parts: &[(0, b"\xFF\xD8\xFF")],
    },
    Magic {
        format: ImageFormat::Gif,
        parts: &[(0, b"GIF87a")],
    },
    Magic {
        format: ImageFormat::Gif,
        parts: &[(0, b"GIF89a")],
    },
    Magic {
        format: ImageFormat::Bmp,
        parts: &[(0, b"BM")],
    },
    Magic {
        format: ImageFormat::Webp,
        parts: &[(0, b"RIFF"), (8, b"WEBP")],
    },
    Magic {
        format: ImageFormat::Tiff,
        parts: &[(0, b"II*\0")],
    },
    Magic {
        format: ImageFormat::Tiff,
        parts: &[(0, b"MM\0*")],
    },
    Magic {
        format: ImageFormat::Avif,
        parts: &[(4, b"ftypavif")],
    },
    Magic {
        format: ImageFormat::Avif,
        parts: &[(4, b"ftypavis")],
    },
    Magic {
        format: ImageFormat::Heic,
        parts: &[(4, b"ftypheic")],
    },
    Magic {
        format: ImageFormat::Heic,
        parts: &[(4, b"ftypheix")],
    },
    Magic {
        format: ImageFormat::Heic,
        parts: &[(4, b"ftyphevc")],
    },
];

/// Identify an image from its first bytes
pub fn sniff(prefix: &[u8]) -> Option<ImageFormat> {
    MAGIC_TABLE
        .iter()
        .find(|magic| {
            magic.parts.iter().all(|(offset, bytes)| {
                prefix
                    .get(*offset..offset + bytes.len())
                    .is_some_and(|window| window == *bytes)
            })
        })
        .map(|magic| magic.format)
}

/// Read up to `SNIFF_LEN` bytes from the start of `path`. Never writes.
pub fn read_prefix(path: &Path) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut buf)?;
    Ok(buf)
}
