use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageError, RgbaImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{LayerError, Result};

/// Decode any supported lossless bitmap to RGBA (missing alpha becomes opaque).
pub fn load_image(path: &Path) -> Result<RgbaImage> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|source| LayerError::Load {
            path: path.to_path_buf(),
            source,
        })
}

/// Encode `image` as PNG at `path`, creating parent directories as needed.
pub fn write_png(image: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let encode = || -> std::result::Result<(), ImageError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        PngEncoder::new(&mut writer).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ColorType::Rgba8,
        )?;
        writer.flush()?;
        Ok(())
    };

    encode().map_err(|source| LayerError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty-printed JSON file.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// `<dir>/<name>.png`
pub fn layer_png_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.png", name))
}
