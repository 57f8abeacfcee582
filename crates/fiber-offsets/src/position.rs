//! Position tracking within one method body.

use crate::event::Label;

/// Remembers the byte offset of the most recent resolved position mark.
///
/// Marks the previous pass did not resolve are skipped and leave the current
/// position as it was.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionTracker {
    current: Option<u32>,
}

impl PositionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes a position mark.
    pub fn mark(&mut self, label: &Label) {
        if let Some(offset) = label.offset {
            self.current = Some(offset);
        }
    }

    /// Offset of the last resolved mark, if any has been seen.
    #[must_use]
    pub fn current(&self) -> Option<u32> {
        self.current
    }
}

/// Strictly increasing, duplicate-free list of offsets.
///
/// The previous pass can attach one mark to several consecutive instructions,
/// so the same offset is usually offered more than once. Accepting only
/// offsets greater than the last one both removes those repeats and keeps the
/// list ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetList {
    offsets: Vec<u32>,
}

impl OffsetList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `offset` if it is past the last appended offset.
    ///
    /// Returns whether the offset was appended.
    pub fn push(&mut self, offset: u32) -> bool {
        if self.last().is_some_and(|last| offset <= last) {
            return false;
        }
        self.offsets.push(offset);
        true
    }

    #[must_use]
    pub fn last(&self) -> Option<u32> {
        self.offsets.last().copied()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.offsets
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Freezes the list.
    #[must_use]
    pub fn into_vec(self) -> Vec<u32> {
        self.offsets
    }
}
