use serde::Serialize;

use crate::codec::EncodedImage;

/// Produced images for one original, with a cursor for undo/redo.
///
/// Backed by a single `Vec` and an index so the cursor invariant
/// (`index < entries.len()` whenever entries exist) is easy to check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditHistory {
    entries: Vec<EncodedImage>,
    index: Option<usize>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// `-1` when empty, mirroring how UIs usually display the cursor.
    pub fn position(&self) -> i64 {
        self.index.map(|idx| idx as i64).unwrap_or(-1)
    }

    pub fn entries(&self) -> &[EncodedImage] {
        &self.entries
    }

    pub fn current(&self) -> Option<&EncodedImage> {
        self.index.and_then(|idx| self.entries.get(idx))
    }

    /// Drops everything after the cursor, appends, and moves the cursor to the end.
    pub fn push(&mut self, image: EncodedImage) -> &EncodedImage {
        let keep = self.index.map(|idx| idx + 1).unwrap_or(0);
        self.entries.truncate(keep);
        self.entries.push(image);
        let last = self.entries.len() - 1;
        self.index = Some(last);
        &self.entries[last]
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.index, Some(idx) if idx > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.index, Some(idx) if idx + 1 < self.entries.len())
    }

    pub fn undo(&mut self) -> bool {
        match self.index {
            Some(idx) if idx > 0 => {
                self.index = Some(idx - 1);
                true
            }
            _ => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.index {
            Some(idx) if idx + 1 < self.entries.len() => {
                self.index = Some(idx + 1);
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index = None;
    }
}

#[cfg(test)]
mod tests {
    use super::EditHistory;
    use crate::codec::{encode, EncodedImage};

    fn image(tag: &str) -> EncodedImage {
        encode(tag.as_bytes(), "image/png")
    }

    #[test]
    fn empty_history_has_no_cursor() {
        let history = EditHistory::new();
        assert_eq!(history.position(), -1);
        assert!(history.current().is_none());
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn push_after_undo_discards_future_entries() {
        let mut history = EditHistory::new();
        history.push(image("b"));
        history.push(image("c"));
        assert_eq!(history.position(), 1);

        assert!(history.undo());
        assert_eq!(history.current(), Some(&image("b")));

        history.push(image("d"));
        assert_eq!(history.entries(), &[image("b"), image("d")]);
        assert_eq!(history.position(), 1);
        assert!(!history.can_redo());
    }

    #[test]
    fn undo_redo_are_symmetric_and_bounded() {
        let mut history = EditHistory::new();
        for tag in ["a", "b", "c"] {
            history.push(image(tag));
        }
        let before = history.clone();
        assert!(history.undo());
        assert!(history.redo());
        assert_eq!(history, before);

        assert!(!history.redo());
        assert_eq!(history, before);

        assert!(history.undo());
        assert!(history.undo());
        assert_eq!(history.position(), 0);
        let at_start = history.clone();
        assert!(!history.undo());
        assert_eq!(history, at_start);
    }

    #[test]
    fn clear_resets_cursor() {
        let mut history = EditHistory::new();
        history.push(image("a"));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.index(), None);
    }
}
