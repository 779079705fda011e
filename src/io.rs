use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::{DynamicImage, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{EditorError, Result};
use crate::layer::ImageSource;

/// Raster formats the editor can write.  Anything `image` can decode
/// (including WebP) is accepted as input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Tga,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Bmp => "bmp",
            ExportFormat::Tga => "tga",
        }
    }

    pub fn supports_quality(&self) -> bool {
        matches!(self, ExportFormat::Jpeg)
    }

    pub fn all() -> &'static [ExportFormat] {
        &[ExportFormat::Png, ExportFormat::Jpeg, ExportFormat::Bmp, ExportFormat::Tga]
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(ExportFormat::Png),
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg),
            "bmp" => Some(ExportFormat::Bmp),
            "tga" => Some(ExportFormat::Tga),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).and_then(Self::from_extension)
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| {
            format!(
                "unsupported export format '{s}' (expected one of: {})",
                ExportFormat::all().iter().map(|f| f.extension()).collect::<Vec<_>>().join(", ")
            )
        })
    }
}

// ============================================================================
// DECODING
// ============================================================================

/// Turn a path or `file://` URI into a filesystem path.
pub fn uri_to_path(uri: &str) -> PathBuf {
    let stripped = uri.strip_prefix("file://").unwrap_or(uri);
    PathBuf::from(stripped.replace("%20", " "))
}

/// Decode any image source to straight-alpha RGBA8.  Blocking; the editor
/// calls this from the rayon pool.
pub fn decode_source(source: &ImageSource) -> Result<RgbaImage> {
    match source {
        ImageSource::Uri(uri) => {
            let path = uri_to_path(uri);
            if !path.exists() {
                return Err(EditorError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} not found", path.display()),
                )));
            }
            Ok(image::open(&path)?.to_rgba8())
        }
        ImageSource::Encoded(bytes) => Ok(image::load_from_memory(bytes)?.to_rgba8()),
        ImageSource::Raster(img) => Ok(img.as_ref().clone()),
    }
}

// ============================================================================
// ENCODING
// ============================================================================

/// Encode `image` into `writer`.  `quality` (1-100) only affects JPEG.
pub fn encode_into<W: Write>(
    image: &RgbaImage,
    writer: &mut W,
    format: ExportFormat,
    quality: u8,
) -> Result<()> {
    match format {
        ExportFormat::Png => {
            let encoder = PngEncoder::new(writer);
            encoder.write_image(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)?;
        }
        ExportFormat::Jpeg => {
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        ExportFormat::Bmp => {
            let mut encoder = BmpEncoder::new(writer);
            encoder.encode(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)?;
        }
        ExportFormat::Tga => {
            let encoder = TgaEncoder::new(writer);
            encoder.encode(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)?;
        }
    }
    Ok(())
}

/// Encode to an in-memory buffer.
pub fn encode(image: &RgbaImage, format: ExportFormat, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_into(image, &mut out, format, quality)?;
    Ok(out)
}

/// Encode and write to `path`, creating parent directories as needed.
pub fn export_to_path(image: &RgbaImage, path: &Path, format: ExportFormat, quality: u8) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    encode_into(image, &mut writer, format, quality)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::Arc;

    fn checker() -> RgbaImage {
        RgbaImage::from_fn(4, 3, |x, y| {
            if (x + y) % 2 == 0 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 255, 128]) }
        })
    }

    #[test]
    fn formats_parse_from_names_and_paths() {
        assert_eq!("JPEG".parse::<ExportFormat>(), Ok(ExportFormat::Jpeg));
        assert_eq!(ExportFormat::from_path(Path::new("out/a.TGA")), Some(ExportFormat::Tga));
        assert!("webp".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn uri_paths_are_stripped() {
        assert_eq!(uri_to_path("file:///tmp/my%20pic.png"), PathBuf::from("/tmp/my pic.png"));
        assert_eq!(uri_to_path("relative.png"), PathBuf::from("relative.png"));
    }

    #[test]
    fn png_bytes_decode_back_losslessly() {
        let img = checker();
        let bytes = encode(&img, ExportFormat::Png, 90).unwrap();
        let decoded = decode_source(&ImageSource::Encoded(Arc::new(bytes))).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn jpeg_drops_alpha() {
        let bytes = encode(&checker(), ExportFormat::Jpeg, 80).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn export_writes_file_and_uri_decodes_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.png");
        export_to_path(&checker(), &path, ExportFormat::Png, 90).unwrap();

        let uri = format!("file://{}", path.display());
        assert_eq!(decode_source(&ImageSource::Uri(uri)).unwrap(), checker());
    }

    #[test]
    fn missing_and_corrupt_sources_fail() {
        assert!(decode_source(&ImageSource::Uri("/definitely/not/here.png".into())).is_err());
        let garbage = ImageSource::Encoded(Arc::new(vec![1, 2, 3, 4]));
        assert!(matches!(decode_source(&garbage), Err(EditorError::Image(_))));
    }
}
