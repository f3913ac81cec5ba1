use super::Caption;

/// Linear undo/redo over caption-array snapshots. The cursor always points
/// at a valid snapshot, and a commit discards any redo tail before
/// appending.
#[derive(Debug, Clone)]
pub struct CaptionHistory {
    snapshots: Vec<Vec<Caption>>,
    cursor: usize,
}

impl Default for CaptionHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptionHistory {
    /// Starts with one empty snapshot, matching a freshly loaded photo.
    pub fn new() -> Self {
        Self {
            snapshots: vec![Vec::new()],
            cursor: 0,
        }
    }

    pub fn commit(&mut self, captions: Vec<Caption>) {
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push(captions);
        self.cursor = self.snapshots.len() - 1;
    }

    /// Moves the cursor back one snapshot; `None` when already at the
    /// oldest state.
    pub fn undo(&mut self) -> Option<&[Caption]> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(&self.snapshots[self.cursor])
    }

    /// Moves the cursor forward one snapshot; `None` when already at the
    /// newest state.
    pub fn redo(&mut self) -> Option<&[Caption]> {
        if self.cursor + 1 >= self.snapshots.len() {
            return None;
        }
        self.cursor += 1;
        Some(&self.snapshots[self.cursor])
    }

    pub fn current(&self) -> &[Caption] {
        &self.snapshots[self.cursor]
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
