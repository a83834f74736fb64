//! Decoding source drawings and encoding the composite as PNG.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbaImage};

use crate::canvas::{LayerId, SourceImage};
use crate::error::{EditorError, Result};

/// Decode any format the `image` crate understands into a layer source.
pub fn decode_source(layer: LayerId, bytes: &[u8]) -> Result<SourceImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| EditorError::LoadFailure {
            layer,
            reason: e.to_string(),
        })?
        .to_rgba8();
    log::info!("{}: decoded {}x{}", layer, img.width(), img.height());
    SourceImage::new(layer, img)
}

/// Read and decode a source image from disk.
pub fn load_source(layer: LayerId, path: &Path) -> Result<SourceImage> {
    let bytes = std::fs::read(path).map_err(|e| EditorError::LoadFailure {
        layer,
        reason: format!("{}: {}", path.display(), e),
    })?;
    decode_source(layer, &bytes)
}

fn write_png_to<W: Write>(image: &RgbaImage, writer: W) -> Result<()> {
    PngEncoder::new(writer)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ColorType::Rgba8,
        )
        .map_err(|e| EditorError::Export(e.to_string()))
}

/// Encode an RGBA image as an in-memory PNG byte stream.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    write_png_to(image, &mut bytes)?;
    Ok(bytes)
}

/// Encode and write a PNG file.
pub fn write_png(image: &RgbaImage, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_png_to(image, &mut writer)?;
    writer.flush()?;
    Ok(())
}
