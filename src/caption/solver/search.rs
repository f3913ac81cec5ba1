use super::region::{contrast_colors, RegionAnalyzer};
use super::{BestPlacement, RectNorm, SearchRequest, SolverTuning};
use crate::caption::font::{font_px_for, measure_block, CaptionFont};
use crate::caption::Anchor;
use crate::settings::Settings;

const SEARCH_ANCHORS: [Anchor; 7] = [
    Anchor::Tc,
    Anchor::Bc,
    Anchor::Tl,
    Anchor::Tr,
    Anchor::Bl,
    Anchor::Br,
    Anchor::Cc,
];
const GRID_STEPS: u32 = 5;
const SIZE_STEP: f32 = 0.5;

struct Candidate {
    x: f32,
    y: f32,
    anchor: Anchor,
    size_pct: f32,
    cost: f32,
    mean: f32,
}

/// Grid search over sizes × anchors × a 5×5 position grid, scored by the
/// region detail plus an edge penalty and an anchor-preference bias. Exits
/// early once a candidate scores below the configured threshold; returns
/// `None` when no candidate fits inside the margins at any tested size.
pub(crate) fn find_best(
    analyzer: &RegionAnalyzer,
    req: &SearchRequest<'_>,
    font: Option<&CaptionFont>,
    tuning: &SolverTuning,
    settings: &Settings,
) -> Option<BestPlacement> {
    let longer = req.stage_w.max(req.stage_h);
    let margin = req.margin_pct / 100.0 * longer;
    let span_w = req.stage_w - margin * 2.0;
    let span_h = req.stage_h - margin * 2.0;
    if span_w <= 0.0 || span_h <= 0.0 {
        return None;
    }

    let mut best: Option<Candidate> = None;
    let mut size = req.max_pct;
    while size >= req.min_pct - 1e-4 {
        let font_px = font_px_for(size, req.stage_w, req.stage_h);
        let block = measure_block(req.title, req.small, font_px, font);
        if block.width <= span_w && block.height <= span_h {
            for anchor in SEARCH_ANCHORS {
                let (fx, fy) = anchor.fractions();
                for gy in 0..GRID_STEPS {
                    for gx in 0..GRID_STEPS {
                        let ax = margin + span_w * gx as f32 / (GRID_STEPS - 1) as f32;
                        let ay = margin + span_h * gy as f32 / (GRID_STEPS - 1) as f32;
                        let left = ax - fx * block.width;
                        let top = ay - fy * block.height;
                        if left < margin - 1e-3
                            || top < margin - 1e-3
                            || left + block.width > req.stage_w - margin + 1e-3
                            || top + block.height > req.stage_h - margin + 1e-3
                        {
                            continue;
                        }

                        let rect = RectNorm {
                            x: left / req.stage_w,
                            y: top / req.stage_h,
                            w: block.width / req.stage_w,
                            h: block.height / req.stage_h,
                        };
                        let score = analyzer.score(&rect);
                        let clearance = edge_clearance(
                            left,
                            top,
                            block.width,
                            block.height,
                            req.stage_w,
                            req.stage_h,
                            longer,
                        );
                        let mut cost = score.detail + tuning.edge_weight * (1.0 - clearance);
                        if anchor != req.preferred_anchor {
                            cost += tuning.anchor_bias;
                        }

                        let candidate = Candidate {
                            x: ax / req.stage_w,
                            y: ay / req.stage_h,
                            anchor,
                            size_pct: size,
                            cost,
                            mean: score.mean,
                        };
                        if cost < tuning.early_exit_cost {
                            return Some(finish(candidate, settings));
                        }
                        let improved = best
                            .as_ref()
                            .map(|current| cost < current.cost)
                            .unwrap_or(true);
                        if improved {
                            best = Some(candidate);
                        }
                    }
                }
            }
        }
        size -= SIZE_STEP;
    }

    best.map(|candidate| finish(candidate, settings))
}

fn finish(candidate: Candidate, settings: &Settings) -> BestPlacement {
    let (color, stroke) = contrast_colors(candidate.mean, settings);
    BestPlacement {
        x: candidate.x,
        y: candidate.y,
        anchor: candidate.anchor,
        size_pct: candidate.size_pct,
        color,
        stroke,
        cost: candidate.cost,
    }
}

/// How far the box sits from the nearest image edge, normalized so that a
/// quarter of the longer side (or more) counts as fully clear.
fn edge_clearance(
    left: f32,
    top: f32,
    width: f32,
    height: f32,
    stage_w: f32,
    stage_h: f32,
    longer: f32,
) -> f32 {
    let nearest = left
        .min(top)
        .min(stage_w - (left + width))
        .min(stage_h - (top + height))
        .max(0.0);
    (nearest / (longer * 0.25)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn uniform(width: u32, height: u32, value: u8) -> RegionAnalyzer {
        RegionAnalyzer::new(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([value, value, value]),
        )))
    }

    fn request<'a>(title: &'a str, stage_w: f32, stage_h: f32) -> SearchRequest<'a> {
        SearchRequest {
            title,
            small: None,
            preferred_anchor: Anchor::Bc,
            min_pct: 3.0,
            max_pct: 9.0,
            margin_pct: 1.5,
            stage_w,
            stage_h,
        }
    }

    #[test]
    fn uniform_image_places_near_minimum_cost() {
        let analyzer = uniform(1000, 1000, 128);
        let settings = Settings::default();
        let tuning = SolverTuning::from(&settings);
        let best = find_best(&analyzer, &request("Hello", 1000.0, 1000.0), None, &tuning, &settings)
            .expect("placement");
        // Zero detail everywhere, so only edge and anchor penalties remain
        // and the early exit fires.
        assert!(best.cost < settings.early_exit_cost, "cost = {}", best.cost);
        assert!(best.size_pct <= 9.0);
        assert!(best.x >= 0.0 && best.x <= 1.0);
        assert!(best.y >= 0.0 && best.y <= 1.0);
    }

    #[test]
    fn mid_gray_image_gets_the_accent_color() {
        let analyzer = uniform(1000, 1000, 128);
        let settings = Settings::default();
        let tuning = SolverTuning::from(&settings);
        let best = find_best(&analyzer, &request("Hello", 1000.0, 1000.0), None, &tuning, &settings)
            .expect("placement");
        assert_eq!(best.color, settings.accent_text);
        assert_eq!(best.stroke.as_deref(), Some(settings.dark_stroke.as_str()));
    }

    #[test]
    fn dark_image_gets_light_text() {
        let analyzer = uniform(800, 600, 5);
        let settings = Settings::default();
        let tuning = SolverTuning::from(&settings);
        let best = find_best(&analyzer, &request("Hello", 800.0, 600.0), None, &tuning, &settings)
            .expect("placement");
        assert_eq!(best.color, settings.light_text);
    }

    #[test]
    fn too_small_stage_returns_none() {
        let analyzer = uniform(24, 24, 128);
        let settings = Settings::default();
        let tuning = SolverTuning::from(&settings);
        let result = find_best(
            &analyzer,
            &request("An overly long caption", 24.0, 24.0),
            None,
            &tuning,
            &settings,
        );
        assert!(result.is_none());
    }

    #[test]
    fn busy_half_is_avoided() {
        // Left half noisy checkerboard, right half flat gray.
        let mut buffer = RgbImage::new(400, 400);
        for (x, y, pixel) in buffer.enumerate_pixels_mut() {
            let value = if x < 200 {
                if (x + y) % 2 == 0 { 0 } else { 255 }
            } else {
                128
            };
            *pixel = Rgb([value, value, value]);
        }
        let analyzer = RegionAnalyzer::new(&DynamicImage::ImageRgb8(buffer));
        let settings = Settings::default();
        let tuning = SolverTuning::from(&settings);
        let best = find_best(&analyzer, &request("Hi", 400.0, 400.0), None, &tuning, &settings)
            .expect("placement");
        assert!(best.x > 0.5, "expected flat right half, got x = {}", best.x);
    }
}
