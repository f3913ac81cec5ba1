use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod font;
pub mod history;
pub(crate) mod render;
pub mod sanitize;
pub mod solver;

/// Which point of the text block a caption's `(x, y)` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    Tl,
    Tc,
    Tr,
    Cl,
    Cc,
    Cr,
    Bl,
    Bc,
    Br,
}

impl Anchor {
    /// Fraction of the block's width/height that sits left of / above the
    /// anchor point.
    pub fn fractions(self) -> (f32, f32) {
        match self {
            Anchor::Tl => (0.0, 0.0),
            Anchor::Tc => (0.5, 0.0),
            Anchor::Tr => (1.0, 0.0),
            Anchor::Cl => (0.0, 0.5),
            Anchor::Cc => (0.5, 0.5),
            Anchor::Cr => (1.0, 0.5),
            Anchor::Bl => (0.0, 1.0),
            Anchor::Bc => (0.5, 1.0),
            Anchor::Br => (1.0, 1.0),
        }
    }
}

/// One text overlay. `x`/`y` are normalized to the image dimensions and
/// interpreted through `anchor`; `size_pct` is a percentage of the image's
/// longer side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caption {
    pub id: String,
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub anchor: Anchor,
    pub size_pct: f32,
    pub color: String,
    pub stroke: Option<String>,
    pub weight: u16,
}

pub(crate) fn new_caption_id(text: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or(0);
    let seed = format!("{}:{}", nanos, text);
    format!("{:x}", md5::compute(seed.as_bytes()))
}
