pub mod actions;
pub mod caption;
pub mod editor;
pub mod logging;
pub mod photo;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_util;

pub use actions::EditAction;
pub use caption::history::CaptionHistory;
pub use caption::{Anchor, Caption};
pub use editor::{CaptionEditor, CaptionOverlay};
pub use photo::StagePhoto;
