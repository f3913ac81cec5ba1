use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::caption::Anchor;

/// An edit instruction from the chat/LLM collaborator or from direct
/// manipulation. The wire framing is `{"type": "...", "value": {...}}`;
/// unknown types are a parse error, not a silent no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EditAction {
    SetCaption {
        text: String,
        #[serde(default)]
        x: Option<f32>,
        #[serde(default)]
        y: Option<f32>,
        #[serde(default)]
        anchor: Option<Anchor>,
        #[serde(default)]
        size_pct: Option<f32>,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        stroke: Option<String>,
        #[serde(default)]
        weight: Option<u16>,
    },
    MoveCaption {
        #[serde(default)]
        dx: f32,
        #[serde(default)]
        dy: f32,
        #[serde(default)]
        anchor: Option<Anchor>,
    },
    StyleCaption {
        #[serde(default)]
        size_pct: Option<f32>,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        stroke: Option<String>,
        #[serde(default)]
        weight: Option<u16>,
    },
    SuggestPosition {
        #[serde(default)]
        anchor: Option<Anchor>,
    },
}

impl EditAction {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).with_context(|| "failed to parse edit action")
    }
}
