//! Playback queue with cursor, shuffle and repeat handling
//!
//! Pure data structure: mutations here never touch lanes or the network.
//! The engine peeks a target index, runs the transition, and commits the
//! cursor with [`PlayQueue::set_current`] once the new track actually
//! starts, so a failed transition leaves the cursor untouched. Mutations
//! that restructure the queue itself (remove, clear, shuffle) update the
//! cursor atomically to keep the index invariant.

use crate::types::{QueueSnapshot, RepeatMode, Track, TrackId};
use rand::seq::SliceRandom;

/// Result of removing a queue entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Index was out of range, nothing changed
    OutOfRange,

    /// A non-current entry was removed, playback is unaffected
    Removed,

    /// The currently-selected entry was removed
    ///
    /// `restart_at` is the nearest valid index to start next, or `None`
    /// when the queue became empty and playback must stop.
    CurrentRemoved { restart_at: Option<usize> },
}

/// Next step when the active track finishes on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoAdvance {
    /// Repeat-one: replay the current index
    Replay,

    /// Advance to this index (repeat-all wraps to 0)
    Next(usize),

    /// Queue end with repeat-off: stop
    Exhausted,
}

/// Ordered playback queue with a current-position cursor
///
/// Invariant: the cursor is always `None` (empty/none-selected) or a valid
/// index into `tracks`.
#[derive(Debug, Clone)]
pub struct PlayQueue {
    tracks: Vec<Track>,
    current: Option<usize>,

    /// Pre-shuffle ordering, kept while shuffled so un-shuffling restores
    /// the exact prior order
    original_order: Option<Vec<Track>>,

    repeat: RepeatMode,
    shuffled: bool,
}

impl Default for PlayQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayQueue {
    /// Create a new empty queue
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            current: None,
            original_order: None,
            repeat: RepeatMode::Off,
            shuffled: false,
        }
    }

    /// Replace the queue wholesale and select a starting index.
    ///
    /// An out-of-range start is clamped to the last track. Shuffle state
    /// is reset; the new ordering is the caller's.
    pub fn replace(&mut self, tracks: Vec<Track>, start_index: usize) {
        self.current = if tracks.is_empty() {
            None
        } else {
            Some(start_index.min(tracks.len() - 1))
        };
        self.tracks = tracks;
        self.original_order = None;
        self.shuffled = false;
    }

    /// Restore queue contents and cursor from a persisted snapshot.
    pub fn restore(&mut self, snapshot: QueueSnapshot) {
        let len = snapshot.tracks.len();
        self.tracks = snapshot.tracks;
        self.current = snapshot
            .current_index
            .filter(|_| len > 0)
            .map(|idx| idx.min(len - 1));
        self.original_order = None;
        self.shuffled = false;
    }

    /// Remove everything and deselect.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current = None;
        self.original_order = None;
        self.shuffled = false;
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current.and_then(|idx| self.tracks.get(idx))
    }

    pub fn track_at(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.repeat = mode;
    }

    /// Cycle Off -> All -> One and return the new mode.
    pub fn toggle_repeat(&mut self) -> RepeatMode {
        self.repeat = self.repeat.cycled();
        self.repeat
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffled
    }

    /// Commit the cursor to `index`. Returns false (no-op) when out of range.
    pub fn set_current(&mut self, index: usize) -> bool {
        if index < self.tracks.len() {
            self.current = Some(index);
            true
        } else {
            false
        }
    }

    /// Append a track to the end of the queue.
    pub fn append(&mut self, track: Track) {
        if let Some(original) = self.original_order.as_mut() {
            original.push(track.clone());
        }
        self.tracks.push(track);
    }

    /// Insert a track immediately after the cursor.
    ///
    /// De-duplicates: when the next slot already holds the same track id
    /// nothing is inserted. Returns whether an insert happened.
    pub fn insert_next(&mut self, track: Track) -> bool {
        let insert_at = self.current.map_or(0, |idx| idx + 1);
        if self
            .tracks
            .get(insert_at)
            .is_some_and(|next| next.id == track.id)
        {
            return false;
        }

        let current_id = self.current_track().map(|cur| cur.id.clone());
        if let Some(original) = self.original_order.as_mut() {
            // Keep the restore ordering consistent: place it after the
            // current track's original position
            let original_at = current_id
                .and_then(|id| original.iter().position(|t| t.id == id))
                .map_or(0, |idx| idx + 1);
            original.insert(original_at.min(original.len()), track.clone());
        }
        self.tracks.insert(insert_at, track);
        true
    }

    /// Remove the entry at `index`, shifting the cursor per policy:
    /// removing before the cursor shifts it left by one; removing the
    /// cursor itself selects the nearest valid index (or empties the
    /// selection when the queue is drained).
    pub fn remove(&mut self, index: usize) -> RemoveOutcome {
        if index >= self.tracks.len() {
            return RemoveOutcome::OutOfRange;
        }

        let removed = self.tracks.remove(index);
        if let Some(original) = self.original_order.as_mut() {
            if let Some(pos) = original.iter().position(|t| t.id == removed.id) {
                original.remove(pos);
            }
        }

        match self.current {
            Some(current) if index == current => {
                let restart_at = if self.tracks.is_empty() {
                    None
                } else {
                    Some(current.min(self.tracks.len() - 1))
                };
                self.current = restart_at;
                RemoveOutcome::CurrentRemoved { restart_at }
            }
            Some(current) if index < current => {
                self.current = Some(current - 1);
                RemoveOutcome::Removed
            }
            _ => RemoveOutcome::Removed,
        }
    }

    /// Move the entry at `from` so it ends up at index `to`.
    ///
    /// The cursor follows a moved current track; a move straddling the
    /// cursor shifts it by one toward the vacated side. Returns false
    /// (no-op) when either index is out of range.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        let len = self.tracks.len();
        if from >= len || to >= len {
            return false;
        }
        if from == to {
            return true;
        }

        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);

        self.current = self.current.map(|current| {
            if current == from {
                to
            } else if from < current && to >= current {
                current - 1
            } else if from > current && to <= current {
                current + 1
            } else {
                current
            }
        });
        true
    }

    /// Toggle shuffle and return the new state.
    ///
    /// Shuffling pins the current track at position 0 and randomizes the
    /// remainder; the prior ordering is saved. Un-shuffling restores that
    /// exact order and re-locates the cursor onto the same track.
    pub fn toggle_shuffle(&mut self) -> bool {
        if self.shuffled {
            self.restore_original_order();
        } else {
            self.shuffle();
        }
        self.shuffled
    }

    fn shuffle(&mut self) {
        if self.tracks.len() < 2 {
            self.shuffled = !self.tracks.is_empty();
            self.original_order = Some(self.tracks.clone());
            return;
        }

        self.original_order = Some(self.tracks.clone());

        let mut rng = rand::thread_rng();
        if let Some(current) = self.current {
            self.tracks.swap(0, current);
            self.tracks[1..].shuffle(&mut rng);
            self.current = Some(0);
        } else {
            self.tracks.shuffle(&mut rng);
        }
        self.shuffled = true;
    }

    fn restore_original_order(&mut self) {
        let Some(original) = self.original_order.take() else {
            self.shuffled = false;
            return;
        };

        let current_id = self.current_track().map(|t| t.id.clone());

        // Tracks appended or removed while shuffled were mirrored into the
        // saved order, so the restore is a straight swap
        self.tracks = original;
        self.current = current_id.and_then(|id| self.index_of(&id));
        self.shuffled = false;
    }

    /// Current position of a track id, `None` when absent.
    pub(crate) fn index_of(&self, id: &TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| &t.id == id)
    }

    /// Target index for a user-driven skip, without committing the cursor.
    ///
    /// Repeat-all wraps past the end; repeat-one does not trap manual
    /// skips. `None` means queue end (or empty queue) and playback stops.
    pub fn peek_next_manual(&self) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        match self.current {
            None => Some(0),
            Some(current) if current + 1 < len => Some(current + 1),
            Some(_) if self.repeat == RepeatMode::All => Some(0),
            Some(_) => None,
        }
    }

    /// Target index for a user-driven previous, without committing.
    ///
    /// `None` at the first track; the engine restarts from zero instead.
    pub fn peek_previous(&self) -> Option<usize> {
        match self.current {
            Some(current) if current > 0 => Some(current - 1),
            _ => None,
        }
    }

    /// Next step when the active track ends on its own.
    pub fn peek_auto_advance(&self) -> AutoAdvance {
        let len = self.tracks.len();
        let Some(current) = self.current else {
            return AutoAdvance::Exhausted;
        };

        match self.repeat {
            RepeatMode::One => AutoAdvance::Replay,
            _ if current + 1 < len => AutoAdvance::Next(current + 1),
            RepeatMode::All if len > 0 => AutoAdvance::Next(0),
            _ => AutoAdvance::Exhausted,
        }
    }

    /// Bounded snapshot for session restore.
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot::bounded(&self.tracks, self.current)
    }
}
