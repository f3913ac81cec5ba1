use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use resvg::render;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::warn;
use usvg::{fontdb, Options, Tree};

use super::font::{
    ascent_px, font_px_for, line_height_px, measure_block, measure_line_px, CaptionFont,
    LINE_GAP_SCALE, SMALL_LINE_SCALE,
};
use super::sanitize::caption_lines;
use super::Caption;
use crate::photo::StagePhoto;

/// Font context for the export pass. Metrics double as the embedded face
/// data for rasterization; without them resvg falls back to whatever the
/// system database offers.
pub(crate) struct ExportFont<'a> {
    pub family: Option<&'a str>,
    pub metrics: Option<&'a CaptionFont>,
}

/// Composites the base image and all captions at native resolution and
/// encodes the result. Captions draw in array order, so later captions
/// sit on top.
pub(crate) fn render_export(
    photo: &StagePhoto,
    captions: &[Caption],
    font: &ExportFont<'_>,
    output_mime: &str,
    jpeg_quality: u8,
) -> Result<Vec<u8>> {
    let svg = compose_svg(photo, captions, font)?;
    rasterize(
        &svg,
        output_mime,
        font.metrics.map(|metrics| metrics.data()),
        jpeg_quality,
    )
}

fn compose_svg(
    photo: &StagePhoto,
    captions: &[Caption],
    font: &ExportFont<'_>,
) -> Result<String> {
    let width = photo.width;
    let height = photo.height;
    let data_uri = base_image_uri(photo)?;

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = width,
        h = height
    ));

    let family_attr = font
        .family
        .map(|family| format!(r#" font-family="{}""#, escape_xml(family)))
        .unwrap_or_default();

    for caption in captions {
        let lines = caption_lines(&caption.text);
        if lines.title.is_empty() && lines.small.is_none() {
            continue;
        }
        // Export measures against the full-resolution canvas; preview
        // pixel values are never reused here.
        let font_px = font_px_for(caption.size_pct, width as f32, height as f32);
        let block = measure_block(
            &lines.title,
            lines.small.as_deref(),
            font_px,
            font.metrics,
        );
        let (fx, fy) = caption.anchor.fractions();
        let left = caption.x * width as f32 - fx * block.width;
        let top = caption.y * height as f32 - fy * block.height;

        let title_width = measure_line_px(&lines.title, font_px, font.metrics);
        let title_x = left + (block.width - title_width) * 0.5;
        let title_baseline = top + ascent_px(font_px, font.metrics);
        push_line(
            &mut svg,
            &lines.title,
            title_x,
            title_baseline,
            font_px,
            caption,
            &family_attr,
        );

        if let Some(small) = lines.small.as_deref() {
            let small_px = font_px * SMALL_LINE_SCALE;
            let small_width = measure_line_px(small, small_px, font.metrics);
            let small_x = left + (block.width - small_width) * 0.5;
            let small_baseline = top
                + line_height_px(font_px, font.metrics)
                + font_px * LINE_GAP_SCALE
                + ascent_px(small_px, font.metrics);
            push_line(
                &mut svg,
                small,
                small_x,
                small_baseline,
                small_px,
                caption,
                &family_attr,
            );
        }
    }

    svg.push_str("</svg>");
    Ok(svg)
}

/// The rasterizer only decodes a few embedded raster formats; anything
/// else (bmp, tiff, ...) is re-encoded to png so the base image always
/// draws instead of leaving a blank canvas.
fn base_image_uri(photo: &StagePhoto) -> Result<String> {
    let passthrough = matches!(
        photo.mime.as_str(),
        "image/png" | "image/jpeg" | "image/jpg" | "image/gif" | "image/webp"
    );
    if passthrough {
        return Ok(format!(
            "data:{};base64,{}",
            photo.mime,
            BASE64.encode(&photo.bytes)
        ));
    }
    let mut png = Vec::new();
    photo
        .image
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .with_context(|| format!("failed to re-encode base image ({})", photo.mime))?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(&png)))
}

/// Stroke pass first, fill pass on top, so the outline never covers the
/// glyph interiors. Stroke width is 8% of the line's font size.
fn push_line(
    svg: &mut String,
    text: &str,
    x: f32,
    baseline: f32,
    font_px: f32,
    caption: &Caption,
    family_attr: &str,
) {
    let escaped = escape_xml(text);
    if let Some(stroke) = caption.stroke.as_deref() {
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-size="{size}"{family} font-weight="{weight}" fill="none" stroke="{stroke}" stroke-width="{sw}" stroke-linejoin="round">{text}</text>"#,
            x = x,
            y = baseline,
            size = font_px,
            family = family_attr,
            weight = caption.weight,
            stroke = escape_xml(stroke),
            sw = font_px * 0.08,
            text = escaped
        ));
    }
    svg.push_str(&format!(
        r#"<text x="{x}" y="{y}" font-size="{size}"{family} font-weight="{weight}" fill="{color}">{text}</text>"#,
        x = x,
        y = baseline,
        size = font_px,
        family = family_attr,
        weight = caption.weight,
        color = escape_xml(&caption.color),
        text = escaped
    ));
}

fn rasterize(
    svg: &str,
    output_mime: &str,
    font_data: Option<&[u8]>,
    jpeg_quality: u8,
) -> Result<Vec<u8>> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    if let Some(data) = font_data {
        db.load_font_data(data.to_vec());
    }
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse export SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty export size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);

    let format = image_format_from_mime(output_mime)
        .ok_or_else(|| anyhow!("unsupported export mime '{}'", output_mime))?;
    let rgba = image::RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from export surface"))?;

    match encode_image(&image::DynamicImage::ImageRgba8(rgba), format, jpeg_quality) {
        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
        outcome => {
            match &outcome {
                Err(err) => warn!("primary export encode failed, rebuilding from png: {err}"),
                Ok(_) => warn!("primary export encode produced no data, rebuilding from png"),
            }
            let png = pixmap
                .encode_png()
                .with_context(|| "failed to re-encode export surface")?;
            let decoded = image::load_from_memory(&png)
                .with_context(|| "failed to decode re-encoded export")?;
            encode_image(&decoded, format, jpeg_quality)
        }
    }
}

fn encode_image(
    image: &image::DynamicImage,
    format: image::ImageFormat,
    jpeg_quality: u8,
) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut cursor = Cursor::new(&mut bytes);
    if format == image::ImageFormat::Jpeg {
        let encoder = JpegEncoder::new_with_quality(&mut cursor, jpeg_quality);
        image
            .to_rgb8()
            .write_with_encoder(encoder)
            .with_context(|| "failed to encode export image")?;
    } else {
        image
            .write_to(&mut cursor, format)
            .with_context(|| "failed to encode export image")?;
    }
    Ok(bytes)
}

pub(crate) fn image_format_from_mime(mime: &str) -> Option<image::ImageFormat> {
    match mime {
        "image/png" => Some(image::ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(image::ImageFormat::Jpeg),
        "image/gif" => Some(image::ImageFormat::Gif),
        "image/webp" => Some(image::ImageFormat::WebP),
        "image/bmp" => Some(image::ImageFormat::Bmp),
        "image/tiff" => Some(image::ImageFormat::Tiff),
        _ => None,
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::Anchor;
    use crate::photo::tests::png_bytes;

    fn photo() -> StagePhoto {
        StagePhoto::from_bytes(png_bytes(64, 48, [200, 30, 30]), None, None, None)
            .expect("load photo")
    }

    fn caption(text: &str) -> Caption {
        Caption {
            id: "test".to_string(),
            text: text.to_string(),
            x: 0.5,
            y: 0.9,
            anchor: Anchor::Bc,
            size_pct: 8.0,
            color: "#ffffff".to_string(),
            stroke: Some("#111111".to_string()),
            weight: 700,
        }
    }

    #[test]
    fn exports_png_bytes() {
        let font = ExportFont {
            family: None,
            metrics: None,
        };
        let bytes = render_export(&photo(), &[caption("Hello")], &font, "image/png", 95)
            .expect("export");
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn exports_jpeg_bytes() {
        let font = ExportFont {
            family: None,
            metrics: None,
        };
        let bytes = render_export(&photo(), &[caption("Hello")], &font, "image/jpeg", 90)
            .expect("export");
        assert!(bytes.starts_with(&[0xFF, 0xD8]));
    }

    #[test]
    fn unsupported_mime_is_an_error() {
        let font = ExportFont {
            family: None,
            metrics: None,
        };
        assert!(render_export(&photo(), &[], &font, "image/heic", 95).is_err());
    }

    #[test]
    fn svg_scene_carries_stroke_and_fill_passes() {
        let font = ExportFont {
            family: Some("TestSans"),
            metrics: None,
        };
        let svg = compose_svg(&photo(), &[caption("Hi<small>sub</small>")], &font)
            .expect("compose svg");
        assert!(svg.contains("stroke=\"#111111\""));
        assert!(svg.contains("fill=\"#ffffff\""));
        assert!(svg.contains("font-family=\"TestSans\""));
        // Stroke pass precedes the fill pass for the same line.
        let stroke_at = svg.find("stroke=\"#111111\"").expect("stroke pass");
        let fill_at = svg.find("fill=\"#ffffff\"").expect("fill pass");
        assert!(stroke_at < fill_at);
    }

    #[test]
    fn empty_captions_are_skipped() {
        let font = ExportFont {
            family: None,
            metrics: None,
        };
        let svg = compose_svg(&photo(), &[caption("<small></small>")], &font)
            .expect("compose svg");
        assert!(!svg.contains("<text"));
    }

    #[test]
    fn bmp_base_image_survives_export() {
        let buffer = image::RgbImage::from_pixel(64, 64, image::Rgb([200, 200, 200]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(buffer)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Bmp)
            .expect("encode bmp");
        let photo = StagePhoto::from_bytes(bytes, None, None, None).expect("load photo");
        assert_eq!(photo.mime, "image/bmp");
        let font = ExportFont {
            family: None,
            metrics: None,
        };

        let svg = compose_svg(&photo, &[], &font).expect("compose svg");
        assert!(svg.contains("data:image/png;base64,"));

        let exported = render_export(&photo, &[], &font, "image/png", 95).expect("export");
        let decoded = image::load_from_memory(&exported).expect("decode export");
        let pixel = decoded.to_rgb8().get_pixel(32, 32).0;
        assert!(
            pixel.iter().all(|channel| *channel >= 180),
            "base image missing from export: {:?}",
            pixel
        );
    }
}
