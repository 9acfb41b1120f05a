//! Bounded, hash-chained timeline of wire events
//!
//! The timeline assigns the global `seq` that clients use as their resume
//! cursor. Older entries fall off the front once `max_events` is reached;
//! the hash of the last evicted entry becomes the chain anchor.

use crate::error::{RepositoryError, Result};
use crate::records::WorldEvent;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use tracing::debug;
use wsync_envelope::{EventPayload, FallbackReason, ResumeDecision};

/// Smallest accepted retention window
pub const MIN_RETAINED_EVENTS: usize = 10;

/// Default retention window
pub const DEFAULT_RETAINED_EVENTS: usize = 2000;

/// One retained event with its chain links
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub event: EventPayload,
    #[serde(with = "hex_digest")]
    pub prev_hash: [u8; 32],
    #[serde(with = "hex_digest")]
    pub hash: [u8; 32],
}

/// Page of events after a cursor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayPage {
    pub events: Vec<EventPayload>,
    pub cursor: u64,
    pub next_cursor: u64,
    pub has_more: bool,
    pub latest_seq: u64,
}

/// Resume decision plus the cursor replay starts after
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeEvaluation {
    pub decision: ResumeDecision,
    /// Set only when resumed
    pub cursor: Option<u64>,
}

impl ResumeEvaluation {
    fn fresh(reason: FallbackReason) -> Self {
        Self {
            decision: ResumeDecision::fresh(reason),
            cursor: None,
        }
    }
}

#[derive(Debug, Default)]
struct TimelineState {
    entries: VecDeque<TimelineEntry>,
    latest_seq: u64,
    anchor: [u8; 32],
}

/// Append-only event timeline shared by every session of a server
#[derive(Debug)]
pub struct EventTimeline {
    inner: Mutex<TimelineState>,
    max_events: usize,
}

impl Default for EventTimeline {
    fn default() -> Self {
        Self::new(DEFAULT_RETAINED_EVENTS)
    }
}

impl EventTimeline {
    /// Timeline retaining at most `max_events` (never fewer than 10)
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            inner: Mutex::new(TimelineState::default()),
            max_events: max_events.max(MIN_RETAINED_EVENTS),
        }
    }

    /// Retention window
    #[must_use]
    pub fn max_events(&self) -> usize {
        self.max_events
    }

    /// Append a stored world event under the next global seq
    pub fn append(&self, event: &WorldEvent) -> EventPayload {
        let mut guard = self.inner.lock();
        let seq = guard.latest_seq + 1;
        let payload = event.to_payload(seq);
        let prev_hash = guard
            .entries
            .back()
            .map_or(guard.anchor, |entry| entry.hash);
        let hash = compute_hash(&payload, &prev_hash);
        guard.entries.push_back(TimelineEntry {
            event: payload.clone(),
            prev_hash,
            hash,
        });
        guard.latest_seq = seq;
        while guard.entries.len() > self.max_events {
            if let Some(evicted) = guard.entries.pop_front() {
                guard.anchor = evicted.hash;
            }
        }
        debug!(seq, name = %payload.name, project_id = %payload.project_id, "timeline append");
        payload
    }

    /// Highest seq ever assigned
    #[must_use]
    pub fn latest_seq(&self) -> u64 {
        self.inner.lock().latest_seq
    }

    /// Oldest retained seq, or 0 when empty
    #[must_use]
    pub fn oldest_seq(&self) -> u64 {
        self.inner
            .lock()
            .entries
            .front()
            .map_or(0, |entry| entry.event.seq)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Every retained event with `seq > after`
    #[must_use]
    pub fn read_since(&self, after: u64) -> Vec<EventPayload> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|entry| entry.event.seq > after)
            .map(|entry| entry.event.clone())
            .collect()
    }

    /// At most `limit` events after `cursor`
    ///
    /// `has_more` is set when the page is full and the timeline holds
    /// events beyond `next_cursor`.
    #[must_use]
    pub fn replay_from_cursor(&self, cursor: u64, limit: usize) -> ReplayPage {
        let guard = self.inner.lock();
        let events: Vec<EventPayload> = guard
            .entries
            .iter()
            .filter(|entry| entry.event.seq > cursor)
            .take(limit)
            .map(|entry| entry.event.clone())
            .collect();
        let next_cursor = events.last().map_or(cursor, |e| e.seq);
        let has_more = limit > 0 && events.len() == limit && guard.latest_seq > next_cursor;
        ReplayPage {
            events,
            cursor,
            next_cursor,
            has_more,
            latest_seq: guard.latest_seq,
        }
    }

    /// Decide whether a client cursor can be resumed
    ///
    /// Fallbacks, in order: missing or negative cursor, empty timeline,
    /// cursor ahead of the timeline, cursor behind the retained window,
    /// more than `replay_limit` events to replay.
    #[must_use]
    pub fn evaluate_resume(&self, last_seq: Option<i64>, replay_limit: usize) -> ResumeEvaluation {
        let Some(cursor) = last_seq.and_then(|seq| u64::try_from(seq).ok()) else {
            return ResumeEvaluation::fresh(FallbackReason::CursorUnknown);
        };
        let latest = self.latest_seq();
        if latest == 0 {
            return ResumeEvaluation::fresh(FallbackReason::ServerRestarted);
        }
        if cursor > latest {
            return ResumeEvaluation::fresh(FallbackReason::CursorUnknown);
        }
        if cursor < self.oldest_seq().saturating_sub(1) {
            return ResumeEvaluation::fresh(FallbackReason::CursorStale);
        }
        if self.replay_from_cursor(cursor, replay_limit).has_more {
            return ResumeEvaluation::fresh(FallbackReason::CursorStale);
        }
        ResumeEvaluation {
            decision: ResumeDecision::resumed(cursor + 1),
            cursor: Some(cursor),
        }
    }

    /// Walk the retained chain and recompute every hash
    pub fn verify_integrity(&self) -> Result<()> {
        let guard = self.inner.lock();
        let mut prev = guard.anchor;
        for entry in &guard.entries {
            if entry.prev_hash != prev || entry.hash != compute_hash(&entry.event, &prev) {
                return Err(RepositoryError::Integrity {
                    seq: entry.event.seq,
                });
            }
            prev = entry.hash;
        }
        Ok(())
    }

    /// Retained entries, oldest first
    #[must_use]
    pub fn entries(&self) -> Vec<TimelineEntry> {
        self.inner.lock().entries.iter().cloned().collect()
    }

    #[cfg(test)]
    fn tamper(&self, seq: u64, name: &str) {
        let mut guard = self.inner.lock();
        if let Some(entry) = guard.entries.iter_mut().find(|e| e.event.seq == seq) {
            entry.event.name = name.to_string();
        }
    }
}

fn compute_hash(event: &EventPayload, prev_hash: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(event.seq.to_le_bytes());
    for field in [
        Some(event.name.as_str()),
        Some(event.project_id.as_str()),
        event.task_id.as_deref(),
        event.decision_id.as_deref(),
        event.artifact_id.as_deref(),
        event.agent_id.as_deref(),
    ] {
        hasher.update(field.unwrap_or_default().as_bytes());
        hasher.update([0]);
    }
    for participant in &event.participants {
        hasher.update(participant.as_bytes());
        hasher.update([0]);
    }
    hasher.update(Value::Object(event.meta.clone()).to_string().as_bytes());
    hasher.update(prev_hash);
    hasher.finalize().into()
}

mod hex_digest {
    use serde::Serializer;

    pub(super) fn serialize<S: Serializer>(digest: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::Map;
    use wsync_envelope::ResumeStatus;

    fn world_event(name: &str) -> WorldEvent {
        WorldEvent {
            id: format!("proj_a:{name}"),
            project_id: "proj_a".to_string(),
            seq: 1,
            name: name.to_string(),
            task_id: None,
            decision_id: None,
            artifact_id: None,
            agent_id: None,
            participants: Vec::new(),
            meta: Map::new(),
            ts: Utc::now(),
        }
    }

    fn filled(count: u64, max_events: usize) -> EventTimeline {
        let timeline = EventTimeline::new(max_events);
        for i in 0..count {
            timeline.append(&world_event(&format!("e{i}")));
        }
        timeline
    }

    #[test]
    fn seq_is_global_and_gap_free() {
        let timeline = filled(5, 100);
        let seqs: Vec<u64> = timeline.read_since(0).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn retention_has_a_floor() {
        assert_eq!(EventTimeline::new(3).max_events(), MIN_RETAINED_EVENTS);
    }

    #[test]
    fn eviction_keeps_chain_verifiable() {
        let timeline = filled(25, 10);
        assert_eq!(timeline.len(), 10);
        assert_eq!(timeline.oldest_seq(), 16);
        assert!(timeline.verify_integrity().is_ok());
    }

    #[test]
    fn tampering_is_detected() {
        let timeline = filled(4, 100);
        timeline.tamper(3, "forged");
        assert_eq!(
            timeline.verify_integrity(),
            Err(RepositoryError::Integrity { seq: 3 })
        );
    }

    #[test]
    fn replay_page_reports_more() {
        let timeline = filled(6, 100);
        let page = timeline.replay_from_cursor(1, 3);
        let seqs: Vec<u64> = page.events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
        assert_eq!(page.next_cursor, 4);
        assert!(page.has_more);

        let tail = timeline.replay_from_cursor(4, 3);
        assert_eq!(tail.events.len(), 2);
        assert!(!tail.has_more);
    }

    #[test]
    fn resume_fallbacks() {
        let empty = EventTimeline::default();
        assert_eq!(
            empty.evaluate_resume(Some(0), 200).decision.reason,
            Some(FallbackReason::ServerRestarted)
        );

        let timeline = filled(30, 10);
        let unknown = [None, Some(-1), Some(31)];
        for cursor in unknown {
            assert_eq!(
                timeline.evaluate_resume(cursor, 200).decision.reason,
                Some(FallbackReason::CursorUnknown)
            );
        }
        assert_eq!(
            timeline.evaluate_resume(Some(5), 200).decision.reason,
            Some(FallbackReason::CursorStale)
        );
        assert_eq!(
            timeline.evaluate_resume(Some(21), 3).decision.reason,
            Some(FallbackReason::CursorStale)
        );
    }

    #[test]
    fn resume_from_window_edge() {
        let timeline = filled(30, 10);
        let evaluation = timeline.evaluate_resume(Some(20), 200);
        assert_eq!(evaluation.decision.status, ResumeStatus::Resumed);
        assert_eq!(evaluation.decision.replay_from_seq, Some(21));
        assert_eq!(evaluation.cursor, Some(20));

        let caught_up = timeline.evaluate_resume(Some(30), 200);
        assert_eq!(caught_up.decision.replay_from_seq, Some(31));
    }
}
