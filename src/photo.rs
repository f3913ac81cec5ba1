use anyhow::{anyhow, Context, Result};
use image::DynamicImage;

/// The decoded working image plus the metadata the caption layer consumes.
///
/// HEIC conversion, EXIF parsing and geocoding all happen upstream; by the
/// time a `StagePhoto` exists the bytes are in a format `image` can decode
/// and the date/place fields are plain display strings.
#[derive(Debug, Clone)]
pub struct StagePhoto {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub image: DynamicImage,
    pub width: u32,
    pub height: u32,
    pub exif_date: Option<String>,
    pub exif_place: Option<String>,
}

impl StagePhoto {
    pub fn from_bytes(
        bytes: Vec<u8>,
        mime_hint: Option<&str>,
        exif_date: Option<String>,
        exif_place: Option<String>,
    ) -> Result<Self> {
        let mime = resolve_image_mime(mime_hint.unwrap_or("auto"), &bytes)?;
        let image = image::load_from_memory(&bytes)
            .with_context(|| format!("failed to decode image ({})", mime))?;
        let width = image.width();
        let height = image.height();
        if width == 0 || height == 0 {
            return Err(anyhow!("image has zero dimensions"));
        }
        Ok(Self {
            bytes,
            mime,
            image,
            width,
            height,
            exif_date,
            exif_place,
        })
    }
}

fn resolve_image_mime(input: &str, bytes: &[u8]) -> Result<String> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(anyhow!("mime hint is empty"));
    }
    let lower = raw.to_lowercase();

    match lower.as_str() {
        "auto" | "image" | "image/*" => return sniff_image_mime(bytes),
        "png" => return Ok("image/png".to_string()),
        "jpg" | "jpeg" => return Ok("image/jpeg".to_string()),
        "gif" => return Ok("image/gif".to_string()),
        "webp" => return Ok("image/webp".to_string()),
        "bmp" => return Ok("image/bmp".to_string()),
        "tiff" | "tif" => return Ok("image/tiff".to_string()),
        _ => {}
    }

    if lower.starts_with("image/") {
        return Ok(lower);
    }

    Err(anyhow!(
        "unsupported mime hint '{}' (expected auto, image/*, or an image type)",
        raw
    ))
}

fn sniff_image_mime(bytes: &[u8]) -> Result<String> {
    let Some(kind) = infer::get(bytes) else {
        return Err(anyhow!("unable to detect image type from bytes"));
    };
    let detected = kind.mime_type();
    if !detected.starts_with("image/") {
        return Err(anyhow!("expected image data, detected '{}'", detected));
    }
    Ok(detected.to_string())
}
