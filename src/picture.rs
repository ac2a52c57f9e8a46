//! Loading of `<img>` resources for embedding.

use crate::error::ImageError;
use crate::model::Media;
use base64::Engine;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Display width every embedded picture is scaled to.
pub const DISPLAY_WIDTH_EMU: u64 = 6 * EMU_PER_INCH;
pub const EMU_PER_INCH: u64 = 914_400;

/// Source of image bytes for an `src` attribute.
pub trait ImageLoader: Send + Sync {
    fn load(&self, src: &str) -> Result<Vec<u8>, ImageError>;
}

/// Resolves `data:` URIs and filesystem paths. Relative paths are taken
/// against `base_dir` when set. Network URLs are not fetched.
#[derive(Debug, Clone, Default)]
pub struct FsImageLoader {
    base_dir: Option<PathBuf>,
}

impl FsImageLoader {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }

    fn resolve(&self, src: &str) -> PathBuf {
        let src = src.strip_prefix("file://").unwrap_or(src);
        let path = Path::new(src);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ImageLoader for FsImageLoader {
    fn load(&self, src: &str) -> Result<Vec<u8>, ImageError> {
        let src = src.trim();
        if let Some(rest) = src.strip_prefix("data:") {
            return decode_data_uri(rest);
        }
        let lower = src.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("//") {
            return Err(ImageError::Unsupported(src.to_string()));
        }
        let path = self.resolve(src);
        std::fs::read(&path).map_err(|source| ImageError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

fn decode_data_uri(rest: &str) -> Result<Vec<u8>, ImageError> {
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImageError::DataUri("missing ','".to_string()))?;
    if !meta.ends_with(";base64") {
        return Err(ImageError::DataUri("only base64 payloads are supported".to_string()));
    }
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| ImageError::DataUri(e.to_string()))
}

/// A decoded picture ready to be placed: its media part and display size.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbedImage {
    pub media: Media,
    pub width_emu: u64,
    pub height_emu: u64,
}

/// Checks the bytes are an embeddable PNG or JPEG and computes the display
/// size at [`DISPLAY_WIDTH_EMU`], keeping the aspect ratio.
pub fn probe(bytes: Vec<u8>) -> Result<ProbedImage, ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes.as_slice()))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode(image::ImageError::IoError(e)))?;
    let extension = match reader.format() {
        Some(ImageFormat::Png) => "png",
        Some(ImageFormat::Jpeg) => "jpeg",
        _ => return Err(ImageError::UnknownFormat),
    };
    let (w, h) = reader.into_dimensions()?;
    if w == 0 || h == 0 {
        return Err(ImageError::UnknownFormat);
    }
    let height_emu = DISPLAY_WIDTH_EMU * u64::from(h) / u64::from(w);
    Ok(ProbedImage {
        media: Media { bytes, extension },
        width_emu: DISPLAY_WIDTH_EMU,
        height_emu,
    })
}
