use image::DynamicImage;

use super::RectNorm;
use crate::settings::Settings;

const MAX_SAMPLE_SIDE: u32 = 512;

/// Busyness and brightness of a queried rectangle.
#[derive(Debug, Clone, Copy)]
pub struct RegionScore {
    /// Combined local contrast measure in [0,1]; higher means busier.
    pub detail: f32,
    /// Mean relative luminance in [0,1].
    pub mean: f32,
}

/// A downsampled luminance plane of the working image. Built once per
/// photo; every placement attempt queries it instead of touching the
/// full-resolution pixels.
pub struct RegionAnalyzer {
    luma: Vec<f32>,
    width: u32,
    height: u32,
}

impl RegionAnalyzer {
    pub fn new(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let longer = width.max(height).max(1);
        let rgba = if longer > MAX_SAMPLE_SIDE {
            let scale = MAX_SAMPLE_SIDE as f32 / longer as f32;
            let new_w = ((width as f32 * scale).round() as u32).max(1);
            let new_h = ((height as f32 * scale).round() as u32).max(1);
            image::imageops::resize(&rgba, new_w, new_h, image::imageops::FilterType::Triangle)
        } else {
            rgba
        };
        let (width, height) = rgba.dimensions();

        let mut luma = Vec::with_capacity((width * height) as usize);
        for pixel in rgba.pixels() {
            let [r, g, b, a] = pixel.0;
            let alpha = a as f32 / 255.0;
            let r = r as f32 * alpha + 255.0 * (1.0 - alpha);
            let g = g as f32 * alpha + 255.0 * (1.0 - alpha);
            let b = b as f32 * alpha + 255.0 * (1.0 - alpha);
            luma.push((0.2126 * r + 0.7152 * g + 0.0722 * b) / 255.0);
        }

        Self {
            luma,
            width,
            height,
        }
    }

    /// Scores a normalized rectangle. Zero-area or out-of-range rectangles
    /// come back as `{detail: 1, mean: 0.5}` so the search steers away
    /// from them.
    pub fn score(&self, rect: &RectNorm) -> RegionScore {
        let unknown = RegionScore {
            detail: 1.0,
            mean: 0.5,
        };
        let w = self.width as f32;
        let h = self.height as f32;
        let x0 = (rect.x * w).floor().clamp(0.0, w) as u32;
        let y0 = (rect.y * h).floor().clamp(0.0, h) as u32;
        let x1 = ((rect.x + rect.w) * w).ceil().clamp(0.0, w) as u32;
        let y1 = ((rect.y + rect.h) * h).ceil().clamp(0.0, h) as u32;
        if x1 <= x0 || y1 <= y0 {
            return unknown;
        }

        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut delta = 0.0f64;
        let mut prev: Option<f32> = None;
        let mut count = 0u32;
        for y in y0..y1 {
            for x in x0..x1 {
                let value = self.luma[(y * self.width + x) as usize];
                sum += value as f64;
                sum_sq += (value as f64) * (value as f64);
                if let Some(prev) = prev {
                    delta += (value - prev).abs() as f64;
                }
                prev = Some(value);
                count += 1;
            }
        }

        let count_f = count as f64;
        let mean = sum / count_f;
        let variance = (sum_sq / count_f - mean * mean).max(0.0);
        let mean_abs_delta = if count > 1 {
            delta / (count_f - 1.0)
        } else {
            0.0
        };
        RegionScore {
            detail: ((variance.sqrt() + mean_abs_delta) as f32).min(1.0),
            mean: mean as f32,
        }
    }
}

/// Three-bucket contrast rule: bright regions get dark text on a light
/// stroke, dark regions the opposite, everything else the accent color on
/// a dark stroke.
pub fn contrast_colors(mean: f32, settings: &Settings) -> (String, Option<String>) {
    if mean > 0.6 {
        (
            settings.dark_text.clone(),
            Some(settings.light_stroke.clone()),
        )
    } else if mean < 0.25 {
        (
            settings.light_text.clone(),
            Some(settings.dark_stroke.clone()),
        )
    } else {
        (
            settings.accent_text.clone(),
            Some(settings.dark_stroke.clone()),
        )
    }
}
