//! Read-only cursor over a [`Recording`], with a folded snapshot view.

use serde_json::Value;

use crate::pattern::matches;
use crate::signal::Signal;
use crate::traits::Recording;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub index: usize,
    pub total: usize,
}

impl Position {
    pub fn at_start(&self) -> bool {
        self.index == 0
    }

    pub fn at_end(&self) -> bool {
        self.index >= self.total
    }
}

/// A minimal folded view of "everything that happened up to the cursor".
/// Real harnesses derive richer snapshots; this is the baseline every
/// player guarantees.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub running: bool,
    pub text: String,
    pub last_signal: Option<String>,
}

fn fold(signals: &[Signal]) -> Snapshot {
    let mut snap = Snapshot::default();
    for s in signals {
        snap.last_signal = Some(s.name.clone());
        if s.name == "harness:start" {
            snap.running = true;
        } else if s.name == "harness:end" {
            snap.running = false;
        }
        if s.is_delta() {
            let text = s
                .payload
                .get("delta")
                .and_then(Value::as_str)
                .or_else(|| s.payload.get("content").and_then(Value::as_str))
                .or_else(|| s.payload.as_str());
            if let Some(text) = text {
                snap.text.push_str(text);
            }
        }
    }
    snap
}

/// Cursor over a recording's signal sequence. `index` is the number of
/// signals folded "so far" (0 = before the first signal).
pub struct Player {
    recording: Recording,
    index: usize,
}

impl Player {
    pub fn new(recording: Recording) -> Self {
        Self { recording, index: 0 }
    }

    pub fn position(&self) -> Position {
        Position {
            index: self.index,
            total: self.recording.signals.len(),
        }
    }

    pub fn current(&self) -> Option<&Signal> {
        self.index.checked_sub(1).and_then(|i| self.recording.signals.get(i))
    }

    pub fn step(&mut self) -> Option<&Signal> {
        if self.index >= self.recording.signals.len() {
            return None;
        }
        self.index += 1;
        self.current()
    }

    pub fn back(&mut self) -> Option<&Signal> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        self.current()
    }

    pub fn goto(&mut self, index: usize) {
        self.index = index.min(self.recording.signals.len());
    }

    pub fn rewind(&mut self) {
        self.index = 0;
    }

    pub fn fast_forward(&mut self) {
        self.index = self.recording.signals.len();
    }

    pub fn goto_checkpoint(&mut self, name: &str) -> bool {
        if let Some(cp) = self.recording.checkpoints.iter().find(|c| c.name == name) {
            self.index = cp.index;
            true
        } else {
            false
        }
    }

    pub fn peek(&self, index: usize) -> Option<&Signal> {
        self.recording.signals.get(index)
    }

    pub fn peek_range(&self, from: usize, to: usize) -> &[Signal] {
        let to = to.min(self.recording.signals.len());
        self.recording.signals.get(from..to).unwrap_or(&[])
    }

    pub fn find_all(&self, pattern: &str) -> Vec<(usize, &Signal)> {
        self.recording
            .signals
            .iter()
            .enumerate()
            .filter(|(_, s)| matches(pattern, &s.name))
            .collect()
    }

    pub fn goto_next(&mut self, pattern: &str) -> Option<&Signal> {
        let start = self.index;
        let found = self
            .recording
            .signals
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, s)| matches(pattern, &s.name))
            .map(|(i, _)| i);
        if let Some(i) = found {
            self.index = i + 1;
            self.current()
        } else {
            None
        }
    }

    pub fn goto_previous(&mut self, pattern: &str) -> Option<&Signal> {
        let end = self.index.saturating_sub(1);
        let found = self.recording.signals[..end]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, s)| matches(pattern, &s.name))
            .map(|(i, _)| i);
        if let Some(i) = found {
            self.index = i + 1;
            self.current()
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        fold(&self.recording.signals[..self.index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RecordingMetadata;
    use chrono::Utc;
    use serde_json::json;

    fn recording(names: &[&str]) -> Recording {
        Recording {
            metadata: RecordingMetadata {
                id: "r1".into(),
                name: None,
                tags: vec![],
                harness_type: None,
                created_at: Utc::now(),
                signal_count: names.len(),
                duration_ms: None,
                finalized: true,
            },
            signals: names
                .iter()
                .enumerate()
                .map(|(i, n)| Signal::new(*n, json!({}), i as u64))
                .collect(),
            checkpoints: vec![],
        }
    }

    #[test]
    fn step_and_back_move_the_cursor() {
        let mut p = Player::new(recording(&["a", "b", "c"]));
        assert!(p.position().at_start());
        p.step();
        p.step();
        assert_eq!(p.position().index, 2);
        p.back();
        assert_eq!(p.position().index, 1);
    }

    #[test]
    fn goto_clamps_to_bounds() {
        let mut p = Player::new(recording(&["a", "b"]));
        p.goto(100);
        assert_eq!(p.position().index, 2);
        assert!(p.position().at_end());
    }

    #[test]
    fn find_all_uses_pattern_matcher() {
        let p = Player::new(recording(&["node:start", "node:complete", "agent:activated"]));
        let hits = p.find_all("node:*");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn snapshot_tracks_running_state() {
        let mut p = Player::new(recording(&["harness:start", "node:start", "harness:end"]));
        p.fast_forward();
        assert!(!p.snapshot().running);
        p.rewind();
        p.step();
        assert!(p.snapshot().running);
    }
}
