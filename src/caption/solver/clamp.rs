use super::{Placement, PlacementRequest};
use crate::caption::font::{font_px_for, measure_block, CaptionFont};

const MAX_ATTEMPTS: u32 = 12;
const SHRINK_PER_ATTEMPT: f32 = 0.9;
const FALLBACK_SHRINK: f32 = 0.7;

/// Deterministic clamp: respects the caller's preferred position, shifting
/// the box inside the margins and shrinking only when it cannot fit at
/// all. Total — it always returns a placement within the attempt bound.
pub(crate) fn place(req: &PlacementRequest<'_>, font: Option<&CaptionFont>) -> Placement {
    let longer = req.stage_w.max(req.stage_h);
    let margin = req.margin_pct / 100.0 * longer;
    let (fx, fy) = req.anchor.fractions();
    let mut size_pct = req.size_pct;

    for _ in 0..MAX_ATTEMPTS {
        let font_px = font_px_for(size_pct, req.stage_w, req.stage_h);
        let block = measure_block(req.title, req.small, font_px, font);
        let fits = block.width <= req.stage_w - margin * 2.0
            && block.height <= req.stage_h - margin * 2.0;
        if fits {
            let left = (req.x * req.stage_w - fx * block.width)
                .clamp(margin, req.stage_w - margin - block.width);
            let top = (req.y * req.stage_h - fy * block.height)
                .clamp(margin, req.stage_h - margin - block.height);
            return Placement {
                x: (left + fx * block.width) / req.stage_w,
                y: (top + fy * block.height) / req.stage_h,
                anchor: req.anchor,
                size_pct,
            };
        }
        size_pct *= SHRINK_PER_ATTEMPT;
    }

    // Nothing fit even after shrinking; pin the preferred point inside the
    // margins so the caller still gets a usable placement.
    let margin_x = (margin / req.stage_w).min(0.5);
    let margin_y = (margin / req.stage_h).min(0.5);
    Placement {
        x: req.x.clamp(margin_x, 1.0 - margin_x),
        y: req.y.clamp(margin_y, 1.0 - margin_y),
        anchor: req.anchor,
        size_pct: req.size_pct * FALLBACK_SHRINK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::Anchor;

    fn request<'a>(title: &'a str, x: f32, y: f32, anchor: Anchor, size_pct: f32) -> PlacementRequest<'a> {
        PlacementRequest {
            title,
            small: None,
            x,
            y,
            anchor,
            size_pct,
            margin_pct: 1.5,
            stage_w: 1000.0,
            stage_h: 800.0,
        }
    }

    #[test]
    fn hello_at_bottom_center_respects_margins() {
        let placement = place(&request("Hello", 0.5, 0.95, Anchor::Bc, 10.0), None);
        assert!(placement.y <= 0.985, "y = {}", placement.y);
        assert!(placement.x >= 0.015 && placement.x <= 0.985, "x = {}", placement.x);
        assert!(placement.size_pct > 0.0);
    }

    #[test]
    fn overflowing_position_is_shifted_not_shrunk() {
        let placement = place(&request("Hello", 0.5, 1.0, Anchor::Bc, 10.0), None);
        // Bottom margin is 15px on an 800px stage; the anchor point ends up
        // at the clamped box bottom.
        assert!(placement.y <= 785.0 / 800.0 + 1e-4);
        assert_eq!(placement.size_pct, 10.0);
    }

    #[test]
    fn clamp_invariant_holds_across_anchors_and_positions() {
        let anchors = [
            Anchor::Tl,
            Anchor::Tc,
            Anchor::Tr,
            Anchor::Cl,
            Anchor::Cc,
            Anchor::Cr,
            Anchor::Bl,
            Anchor::Bc,
            Anchor::Br,
        ];
        for anchor in anchors {
            for &(x, y) in &[(0.0, 0.0), (0.5, 0.5), (1.0, 1.0), (-0.2, 1.3)] {
                let placement = place(&request("Caption text", x, y, anchor, 6.0), None);
                assert!(
                    placement.x >= 0.015 - 1e-4 && placement.x <= 0.985 + 1e-4,
                    "x out of margins for {:?}: {}",
                    anchor,
                    placement.x
                );
                assert!(
                    placement.y >= 0.015 - 1e-4 && placement.y <= 0.985 + 1e-4,
                    "y out of margins for {:?}: {}",
                    anchor,
                    placement.y
                );
            }
        }
    }

    #[test]
    fn shrinks_until_wide_text_fits() {
        let long_title = "A very long caption that cannot fit at the requested size";
        let placement = place(&request(long_title, 0.5, 0.5, Anchor::Cc, 12.0), None);
        assert!(placement.size_pct < 12.0);
        assert!(placement.x >= 0.015 && placement.x <= 0.985);
    }

    #[test]
    fn terminates_with_the_fallback_shrink_when_nothing_fits() {
        let giant = "x".repeat(4000);
        let req = PlacementRequest {
            title: &giant,
            small: None,
            x: 0.9,
            y: 0.1,
            anchor: Anchor::Cc,
            size_pct: 20.0,
            margin_pct: 1.5,
            stage_w: 200.0,
            stage_h: 200.0,
        };
        let placement = place(&req, None);
        assert!((placement.size_pct - 20.0 * 0.7).abs() < 1e-4);
        assert!(placement.x >= 0.015 && placement.x <= 0.985);
        assert!(placement.y >= 0.015 && placement.y <= 0.985);
    }
}
