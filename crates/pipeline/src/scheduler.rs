//! Ordered playback scheduling
//!
//! Jobs finish in any order; the scheduler releases entries strictly by
//! sequence number and never more than one at a time. A failed sentence
//! either gets skipped or is replaced by a placeholder before it gets here.

use std::collections::{BTreeMap, BTreeSet};

use avatar_core::{PlaybackEntry, SequenceNumber};

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing playing
    Idle,
    /// Entry with this sequence number is playing
    Playing(SequenceNumber),
}

/// Result of submitting an entry
#[derive(Debug)]
pub enum Submission {
    /// Entry (this one or an earlier held one) should start playing now
    Start(PlaybackEntry),
    /// Entry is waiting for earlier sentences
    Held,
    /// Entry is stale or a duplicate; caller owns its files again
    Rejected(PlaybackEntry),
}

/// Reorder buffer keyed by sequence number
#[derive(Debug)]
pub struct PlaybackScheduler {
    state: SchedulerState,
    /// Smallest sequence number not yet played or skipped
    next: SequenceNumber,
    ready: BTreeMap<SequenceNumber, PlaybackEntry>,
    failed: BTreeSet<SequenceNumber>,
    played: u64,
    skipped: u64,
}

impl PlaybackScheduler {
    pub fn new(first: SequenceNumber) -> Self {
        Self {
            state: SchedulerState::Idle,
            next: first,
            ready: BTreeMap::new(),
            failed: BTreeSet::new(),
            played: 0,
            skipped: 0,
        }
    }

    /// Add a completed entry
    pub fn submit(&mut self, entry: PlaybackEntry) -> Submission {
        let seq = entry.seq();
        if !self.is_open(seq) {
            tracing::debug!(seq = %seq, next = %self.next, "Rejecting stale or duplicate entry");
            return Submission::Rejected(entry);
        }

        self.ready.insert(seq, entry);
        match self.advance() {
            Some(entry) => Submission::Start(entry),
            None => Submission::Held,
        }
    }

    /// Mark a sentence as failed so playback skips it
    pub fn fail(&mut self, seq: SequenceNumber) -> Option<PlaybackEntry> {
        if !self.is_open(seq) {
            tracing::debug!(seq = %seq, "Ignoring failure for resolved sentence");
            return None;
        }

        self.failed.insert(seq);
        self.advance()
    }

    /// Current entry finished; returns the next one to play, if ready
    pub fn on_playback_finished(&mut self) -> Option<PlaybackEntry> {
        match self.state {
            SchedulerState::Idle => {
                tracing::warn!("Playback finished while scheduler idle");
                None
            }
            SchedulerState::Playing(_) => {
                self.state = SchedulerState::Idle;
                self.advance()
            }
        }
    }

    /// Forget everything held and expect `next` as the following sequence
    /// number. Returns the dropped entries so their files can be removed.
    pub fn reset(&mut self, next: SequenceNumber) -> Vec<PlaybackEntry> {
        self.state = SchedulerState::Idle;
        self.failed.clear();
        // Never move backwards; old numbers stay stale
        self.next = self.next.max(next);
        std::mem::take(&mut self.ready).into_values().collect()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SchedulerState::Idle
    }

    /// Next sequence number playback is waiting for
    pub fn next_expected(&self) -> SequenceNumber {
        self.next
    }

    /// Entries held back waiting for an earlier sentence
    pub fn held(&self) -> usize {
        self.ready.len()
    }

    pub fn played(&self) -> u64 {
        self.played
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn is_open(&self, seq: SequenceNumber) -> bool {
        seq >= self.next && !self.ready.contains_key(&seq) && !self.failed.contains(&seq)
    }

    fn advance(&mut self) -> Option<PlaybackEntry> {
        if !self.is_idle() {
            return None;
        }

        loop {
            if self.failed.remove(&self.next) {
                tracing::debug!(seq = %self.next, "Skipping failed sentence");
                self.skipped += 1;
                self.next = self.next.next();
                continue;
            }

            let entry = self.ready.remove(&self.next)?;
            self.state = SchedulerState::Playing(self.next);
            self.next = self.next.next();
            self.played += 1;
            return Some(entry);
        }
    }
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new(SequenceNumber::FIRST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_core::{
        AudioAsset, DisplayTarget, MouthCue, MouthShape, ReplyId, Sentence, VisemeTimeline,
    };
    use std::time::Duration;

    fn entry(seq: u64) -> PlaybackEntry {
        let sentence = Sentence::new(SequenceNumber::new(seq), &format!("Sentence {seq}.")).unwrap();
        PlaybackEntry::new(
            sentence,
            DisplayTarget::new(ReplyId::new(1)),
            AudioAsset::new(format!("temp_{seq}.wav"), Duration::from_millis(500)),
            VisemeTimeline::new(vec![MouthCue::new(0.0, 0.5, MouthShape::B)]),
        )
    }

    fn started(submission: Submission) -> u64 {
        match submission {
            Submission::Start(entry) => entry.seq().get(),
            other => panic!("expected start, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_order_completion() {
        let mut scheduler = PlaybackScheduler::default();

        assert!(matches!(scheduler.submit(entry(3)), Submission::Held));
        assert!(matches!(scheduler.submit(entry(2)), Submission::Held));
        assert_eq!(started(scheduler.submit(entry(1))), 1);
        assert_eq!(scheduler.state(), SchedulerState::Playing(SequenceNumber::new(1)));
        assert_eq!(scheduler.held(), 2);

        assert_eq!(scheduler.on_playback_finished().unwrap().seq().get(), 2);
        assert_eq!(scheduler.on_playback_finished().unwrap().seq().get(), 3);
        assert!(scheduler.on_playback_finished().is_none());
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.played(), 3);
    }

    #[test]
    fn test_single_playback_at_a_time() {
        let mut scheduler = PlaybackScheduler::default();

        assert_eq!(started(scheduler.submit(entry(1))), 1);
        // Next in line is ready but 1 is still playing
        assert!(matches!(scheduler.submit(entry(2)), Submission::Held));
        assert_eq!(scheduler.on_playback_finished().unwrap().seq().get(), 2);
    }

    #[test]
    fn test_failure_skips_to_next() {
        let mut scheduler = PlaybackScheduler::default();

        assert!(matches!(scheduler.submit(entry(2)), Submission::Held));
        assert_eq!(scheduler.fail(SequenceNumber::new(1)).unwrap().seq().get(), 2);
        assert_eq!(scheduler.skipped(), 1);

        // Failure of a later sentence while playing: skipped once 2 finishes
        assert!(scheduler.fail(SequenceNumber::new(3)).is_none());
        assert!(matches!(scheduler.submit(entry(4)), Submission::Held));
        assert_eq!(scheduler.on_playback_finished().unwrap().seq().get(), 4);
        assert_eq!(scheduler.skipped(), 2);
    }

    #[test]
    fn test_stale_and_duplicate_rejected() {
        let mut scheduler = PlaybackScheduler::default();

        assert_eq!(started(scheduler.submit(entry(1))), 1);
        assert!(matches!(scheduler.submit(entry(1)), Submission::Rejected(_)));

        assert!(matches!(scheduler.submit(entry(3)), Submission::Held));
        assert!(matches!(scheduler.submit(entry(3)), Submission::Rejected(_)));
        assert!(scheduler.fail(SequenceNumber::new(3)).is_none());
        assert_eq!(scheduler.held(), 1);
    }

    #[test]
    fn test_reset_drops_held_entries() {
        let mut scheduler = PlaybackScheduler::default();

        started(scheduler.submit(entry(1)));
        scheduler.submit(entry(3));
        scheduler.fail(SequenceNumber::new(4));

        let dropped = scheduler.reset(SequenceNumber::new(6));
        assert_eq!(dropped.len(), 1);
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.next_expected(), SequenceNumber::new(6));

        // Results from before the reset are stale
        assert!(matches!(scheduler.submit(entry(2)), Submission::Rejected(_)));
        assert!(matches!(scheduler.submit(entry(5)), Submission::Rejected(_)));
        assert_eq!(started(scheduler.submit(entry(6))), 6);
    }

    #[test]
    fn test_reset_never_moves_backwards() {
        let mut scheduler = PlaybackScheduler::default();
        started(scheduler.submit(entry(1)));
        scheduler.on_playback_finished();

        scheduler.reset(SequenceNumber::new(1));
        assert_eq!(scheduler.next_expected(), SequenceNumber::new(2));
    }

    #[test]
    fn test_finished_while_idle_is_ignored() {
        let mut scheduler = PlaybackScheduler::default();
        assert!(scheduler.on_playback_finished().is_none());
        assert!(scheduler.is_idle());
    }
}
