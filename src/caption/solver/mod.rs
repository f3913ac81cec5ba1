use serde::Serialize;

use super::Anchor;

pub(crate) mod clamp;
pub(crate) mod region;
pub(crate) mod search;

pub use region::{contrast_colors, RegionAnalyzer, RegionScore};

/// Ephemeral input to the deterministic clamp. Positions are normalized,
/// dimensions are stage pixels; nothing here is persisted.
#[derive(Debug, Clone)]
pub struct PlacementRequest<'a> {
    pub title: &'a str,
    pub small: Option<&'a str>,
    pub x: f32,
    pub y: f32,
    pub anchor: Anchor,
    pub size_pct: f32,
    pub margin_pct: f32,
    pub stage_w: f32,
    pub stage_h: f32,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub anchor: Anchor,
    pub size_pct: f32,
}

/// Input to the grid search, which is free to pick any anchor/position.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub title: &'a str,
    pub small: Option<&'a str>,
    pub preferred_anchor: Anchor,
    pub min_pct: f32,
    pub max_pct: f32,
    pub margin_pct: f32,
    pub stage_w: f32,
    pub stage_h: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BestPlacement {
    pub x: f32,
    pub y: f32,
    pub anchor: Anchor,
    pub size_pct: f32,
    pub color: String,
    pub stroke: Option<String>,
    pub cost: f32,
}

/// Normalized rectangle in [0,1] image coordinates.
#[derive(Debug, Clone, Copy)]
pub struct RectNorm {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// Grid-search weights. Empirically chosen, so they live in settings
/// rather than as constants.
#[derive(Debug, Clone, Copy)]
pub struct SolverTuning {
    pub edge_weight: f32,
    pub anchor_bias: f32,
    pub early_exit_cost: f32,
}

impl From<&crate::settings::Settings> for SolverTuning {
    fn from(settings: &crate::settings::Settings) -> Self {
        Self {
            edge_weight: settings.edge_weight,
            anchor_bias: settings.anchor_bias,
            early_exit_cost: settings.early_exit_cost,
        }
    }
}
