use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::actions::EditAction;
use crate::caption::font::{font_px_for, measure_block, resolve_caption_font, CaptionFont};
use crate::caption::history::CaptionHistory;
use crate::caption::render::{render_export, ExportFont};
use crate::caption::sanitize::{caption_lines, sanitize};
use crate::caption::solver::{
    clamp, contrast_colors, search, Placement, PlacementRequest, RegionAnalyzer, SearchRequest,
    SolverTuning,
};
use crate::caption::{new_caption_id, Anchor, Caption};
use crate::photo::StagePhoto;
use crate::settings::Settings;

/// Live overlay geometry for one caption on a preview stage, in stage
/// pixels. Serialized as-is for whatever renders the on-screen layer.
#[derive(Debug, Clone, Serialize)]
pub struct CaptionOverlay {
    pub id: String,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    pub font_px: f32,
    pub color: String,
    pub stroke: Option<String>,
    pub weight: u16,
}

struct DragState {
    id: String,
}

/// Owns one photo's captioning session: the caption array, its history,
/// the resolved font and the region analyzer. Dropped (with its history)
/// when a new photo replaces the working image.
pub struct CaptionEditor {
    photo: StagePhoto,
    settings: Settings,
    font: Option<CaptionFont>,
    font_family: Option<String>,
    analyzer: RegionAnalyzer,
    history: CaptionHistory,
    captions: Vec<Caption>,
    drag: Option<DragState>,
}

impl CaptionEditor {
    pub fn new(photo: StagePhoto, settings: Settings) -> Self {
        let font_path = settings.font_path.as_deref().map(std::path::Path::new);
        let (font, font_family) = match resolve_caption_font(
            font_path,
            settings.font_family.as_deref(),
            settings.default_weight,
        ) {
            Ok(resolved) => {
                debug!("caption font resolved: {}", resolved.family);
                (Some(resolved.metrics), Some(resolved.family))
            }
            Err(err) => {
                warn!("no caption font resolved, using width estimates: {err}");
                (None, None)
            }
        };
        let analyzer = RegionAnalyzer::new(&photo.image);
        Self {
            photo,
            settings,
            font,
            font_family,
            analyzer,
            history: CaptionHistory::new(),
            captions: Vec::new(),
            drag: None,
        }
    }

    pub fn captions(&self) -> &[Caption] {
        &self.captions
    }

    pub fn photo(&self) -> &StagePhoto {
        &self.photo
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Interprets one edit action and commits the resulting caption array
    /// to history.
    pub fn apply(&mut self, action: EditAction) -> Result<()> {
        match action {
            EditAction::SetCaption {
                text,
                x,
                y,
                anchor,
                size_pct,
                color,
                stroke,
                weight,
            } => self.set_caption(text, x, y, anchor, size_pct, color, stroke, weight),
            EditAction::MoveCaption { dx, dy, anchor } => self.move_caption(dx, dy, anchor),
            EditAction::StyleCaption {
                size_pct,
                color,
                stroke,
                weight,
            } => self.style_caption(size_pct, color, stroke, weight),
            EditAction::SuggestPosition { anchor } => self.suggest_position(anchor),
        }
    }

    fn set_caption(
        &mut self,
        text: String,
        x: Option<f32>,
        y: Option<f32>,
        anchor: Option<Anchor>,
        size_pct: Option<f32>,
        color: Option<String>,
        stroke: Option<String>,
        weight: Option<u16>,
    ) -> Result<()> {
        let mut text = sanitize(&text);
        if !text.contains("<small>") {
            if let Some(extra) = self.exif_line() {
                text.push_str(&extra);
            }
        }
        let lines = caption_lines(&text);
        if lines.title.is_empty() && lines.small.is_none() {
            return Err(anyhow!("caption text is empty after sanitizing"));
        }
        info!("set caption: {:?}", lines.title);

        if let Some(size_pct) = size_pct {
            if size_pct <= 0.0 {
                return Err(anyhow!("size_pct must be positive"));
            }
        }
        let weight = weight.unwrap_or(self.settings.default_weight);
        let size_pct = size_pct.unwrap_or(self.settings.default_size_pct);
        let stage_w = self.photo.width as f32;
        let stage_h = self.photo.height as f32;

        let (placement, auto_colors) = if let (Some(x), Some(y)) = (x, y) {
            // An explicit position is intent; clamp it, never override it.
            let request = PlacementRequest {
                title: &lines.title,
                small: lines.small.as_deref(),
                x,
                y,
                anchor: anchor.unwrap_or(Anchor::Bc),
                size_pct,
                margin_pct: self.settings.margin_pct,
                stage_w,
                stage_h,
            };
            (clamp::place(&request, self.font.as_ref()), None)
        } else {
            let request = SearchRequest {
                title: &lines.title,
                small: lines.small.as_deref(),
                preferred_anchor: anchor.unwrap_or(Anchor::Bc),
                min_pct: self.settings.min_size_pct,
                max_pct: self.settings.max_size_pct.max(size_pct),
                margin_pct: self.settings.margin_pct,
                stage_w,
                stage_h,
            };
            let tuning = SolverTuning::from(&self.settings);
            match search::find_best(
                &self.analyzer,
                &request,
                self.font.as_ref(),
                &tuning,
                &self.settings,
            ) {
                Some(best) => (
                    Placement {
                        x: best.x,
                        y: best.y,
                        anchor: best.anchor,
                        size_pct: best.size_pct,
                    },
                    Some((best.color, best.stroke)),
                ),
                None => {
                    warn!("no open region for caption, clamping to the bottom center");
                    let request = PlacementRequest {
                        title: &lines.title,
                        small: lines.small.as_deref(),
                        x: 0.5,
                        y: 0.9,
                        anchor: anchor.unwrap_or(Anchor::Bc),
                        size_pct,
                        margin_pct: self.settings.margin_pct,
                        stage_w,
                        stage_h,
                    };
                    (clamp::place(&request, self.font.as_ref()), None)
                }
            }
        };

        let (auto_color, auto_stroke) = match auto_colors {
            Some(colors) => colors,
            None => {
                let rect = self.caption_rect(
                    &lines.title,
                    lines.small.as_deref(),
                    placement.x,
                    placement.y,
                    placement.anchor,
                    placement.size_pct,
                );
                let score = self.analyzer.score(&rect);
                contrast_colors(score.mean, &self.settings)
            }
        };

        let caption = Caption {
            id: new_caption_id(&text),
            text,
            x: placement.x,
            y: placement.y,
            anchor: placement.anchor,
            size_pct: placement.size_pct,
            color: color.unwrap_or(auto_color),
            stroke: stroke.map(Some).unwrap_or(auto_stroke),
            weight,
        };
        self.captions.push(caption);
        self.history.commit(self.captions.clone());
        Ok(())
    }

    fn move_caption(&mut self, dx: f32, dy: f32, anchor: Option<Anchor>) -> Result<()> {
        let settings_margin = self.settings.margin_pct;
        let (stage_w, stage_h) = (self.photo.width as f32, self.photo.height as f32);
        let font = self.font.clone();
        let Some(caption) = self.captions.last_mut() else {
            return Err(anyhow!("no caption to move"));
        };
        info!("move caption by ({}, {})", dx, dy);
        caption.x += dx;
        caption.y += dy;
        if let Some(anchor) = anchor {
            // The stored point is kept; the clamp re-interprets it through
            // the new anchor.
            caption.anchor = anchor;
        }
        let lines = caption_lines(&caption.text);
        let request = PlacementRequest {
            title: &lines.title,
            small: lines.small.as_deref(),
            x: caption.x,
            y: caption.y,
            anchor: caption.anchor,
            size_pct: caption.size_pct,
            margin_pct: settings_margin,
            stage_w,
            stage_h,
        };
        let placement = clamp::place(&request, font.as_ref());
        caption.x = placement.x;
        caption.y = placement.y;
        caption.size_pct = placement.size_pct;
        self.history.commit(self.captions.clone());
        Ok(())
    }

    fn style_caption(
        &mut self,
        size_pct: Option<f32>,
        color: Option<String>,
        stroke: Option<String>,
        weight: Option<u16>,
    ) -> Result<()> {
        let settings_margin = self.settings.margin_pct;
        let (stage_w, stage_h) = (self.photo.width as f32, self.photo.height as f32);
        let font = self.font.clone();
        let Some(caption) = self.captions.last_mut() else {
            return Err(anyhow!("no caption to style"));
        };
        info!("style caption");
        if let Some(color) = color {
            caption.color = color;
        }
        if let Some(stroke) = stroke {
            caption.stroke = Some(stroke);
        }
        if let Some(weight) = weight {
            caption.weight = weight;
        }
        if let Some(size_pct) = size_pct {
            if size_pct <= 0.0 {
                return Err(anyhow!("size_pct must be positive"));
            }
            caption.size_pct = size_pct;
            // A new size can push the box past the margins; re-clamp.
            let lines = caption_lines(&caption.text);
            let request = PlacementRequest {
                title: &lines.title,
                small: lines.small.as_deref(),
                x: caption.x,
                y: caption.y,
                anchor: caption.anchor,
                size_pct,
                margin_pct: settings_margin,
                stage_w,
                stage_h,
            };
            let placement = clamp::place(&request, font.as_ref());
            caption.x = placement.x;
            caption.y = placement.y;
            caption.size_pct = placement.size_pct;
        }
        self.history.commit(self.captions.clone());
        Ok(())
    }

    fn suggest_position(&mut self, anchor: Option<Anchor>) -> Result<()> {
        let (stage_w, stage_h) = (self.photo.width as f32, self.photo.height as f32);
        let tuning = SolverTuning::from(&self.settings);
        let Some(caption) = self.captions.last_mut() else {
            return Err(anyhow!("no caption to reposition"));
        };
        let lines = caption_lines(&caption.text);
        let request = SearchRequest {
            title: &lines.title,
            small: lines.small.as_deref(),
            preferred_anchor: anchor.unwrap_or(caption.anchor),
            min_pct: self.settings.min_size_pct,
            max_pct: self.settings.max_size_pct,
            margin_pct: self.settings.margin_pct,
            stage_w,
            stage_h,
        };
        let best = search::find_best(
            &self.analyzer,
            &request,
            self.font.as_ref(),
            &tuning,
            &self.settings,
        )
        .ok_or_else(|| anyhow!("no placement found; try a smaller caption"))?;
        info!("suggested position at ({:.3}, {:.3})", best.x, best.y);
        caption.x = best.x;
        caption.y = best.y;
        caption.anchor = best.anchor;
        caption.size_pct = best.size_pct;
        caption.color = best.color;
        caption.stroke = best.stroke;
        self.history.commit(self.captions.clone());
        Ok(())
    }

    /// Starts a drag. Pointer moves update the live array without touching
    /// history; the single commit happens on release.
    pub fn begin_drag(&mut self, id: &str) -> Result<()> {
        if !self.captions.iter().any(|caption| caption.id == id) {
            return Err(anyhow!("unknown caption id: {}", id));
        }
        self.drag = Some(DragState { id: id.to_string() });
        Ok(())
    }

    pub fn drag_to(&mut self, x: f32, y: f32) {
        let Some(drag) = self.drag.as_ref() else {
            return;
        };
        if let Some(caption) = self
            .captions
            .iter_mut()
            .find(|caption| caption.id == drag.id)
        {
            caption.x = x.clamp(0.0, 1.0);
            caption.y = y.clamp(0.0, 1.0);
        }
    }

    /// Ends the drag: re-clamps the dragged caption into the margins and
    /// commits exactly once.
    pub fn end_drag(&mut self) -> Result<()> {
        let Some(drag) = self.drag.take() else {
            return Err(anyhow!("no drag in progress"));
        };
        let settings_margin = self.settings.margin_pct;
        let (stage_w, stage_h) = (self.photo.width as f32, self.photo.height as f32);
        let font = self.font.clone();
        let Some(caption) = self
            .captions
            .iter_mut()
            .find(|caption| caption.id == drag.id)
        else {
            return Err(anyhow!("dragged caption disappeared"));
        };
        let lines = caption_lines(&caption.text);
        let request = PlacementRequest {
            title: &lines.title,
            small: lines.small.as_deref(),
            x: caption.x,
            y: caption.y,
            anchor: caption.anchor,
            size_pct: caption.size_pct,
            margin_pct: settings_margin,
            stage_w,
            stage_h,
        };
        let placement = clamp::place(&request, font.as_ref());
        caption.x = placement.x;
        caption.y = placement.y;
        caption.size_pct = placement.size_pct;
        self.history.commit(self.captions.clone());
        Ok(())
    }

    /// Steps the cursor back and restores that snapshot. Returns false at
    /// the oldest state.
    pub fn undo(&mut self) -> bool {
        if let Some(snapshot) = self.history.undo() {
            self.captions = snapshot.to_vec();
            return true;
        }
        false
    }

    pub fn redo(&mut self) -> bool {
        if let Some(snapshot) = self.history.redo() {
            self.captions = snapshot.to_vec();
            return true;
        }
        false
    }

    /// Geometry for the live DOM overlay, measured against the given
    /// preview stage (not the export canvas).
    pub fn overlay_geometry(&self, stage_w: f32, stage_h: f32) -> Vec<CaptionOverlay> {
        self.captions
            .iter()
            .map(|caption| {
                let lines = caption_lines(&caption.text);
                let font_px = font_px_for(caption.size_pct, stage_w, stage_h);
                let block = measure_block(
                    &lines.title,
                    lines.small.as_deref(),
                    font_px,
                    self.font.as_ref(),
                );
                let (fx, fy) = caption.anchor.fractions();
                CaptionOverlay {
                    id: caption.id.clone(),
                    left: caption.x * stage_w - fx * block.width,
                    top: caption.y * stage_h - fy * block.height,
                    width: block.width,
                    height: block.height,
                    font_px,
                    color: caption.color.clone(),
                    stroke: caption.stroke.clone(),
                    weight: caption.weight,
                }
            })
            .collect()
    }

    /// Composites the export image at native resolution. Only runs on an
    /// explicit request; nothing is written anywhere by this crate.
    pub fn export(&self, output_mime: &str) -> Result<Vec<u8>> {
        let font = ExportFont {
            family: self.font_family.as_deref(),
            metrics: self.font.as_ref(),
        };
        render_export(
            &self.photo,
            &self.captions,
            &font,
            output_mime,
            self.settings.jpeg_quality,
        )
        .with_context(|| "failed to composite export image")
    }

    fn exif_line(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(date) = self.photo.exif_date.as_deref() {
            if !date.trim().is_empty() {
                parts.push(date.trim());
            }
        }
        if let Some(place) = self.photo.exif_place.as_deref() {
            if !place.trim().is_empty() {
                parts.push(place.trim());
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(format!("<br><small>{}</small>", parts.join(" · ")))
    }

    fn caption_rect(
        &self,
        title: &str,
        small: Option<&str>,
        x: f32,
        y: f32,
        anchor: Anchor,
        size_pct: f32,
    ) -> crate::caption::solver::RectNorm {
        let stage_w = self.photo.width as f32;
        let stage_h = self.photo.height as f32;
        let font_px = font_px_for(size_pct, stage_w, stage_h);
        let block = measure_block(title, small, font_px, self.font.as_ref());
        let (fx, fy) = anchor.fractions();
        crate::caption::solver::RectNorm {
            x: (x * stage_w - fx * block.width) / stage_w,
            y: (y * stage_h - fy * block.height) / stage_h,
            w: block.width / stage_w,
            h: block.height / stage_h,
        }
    }
}
