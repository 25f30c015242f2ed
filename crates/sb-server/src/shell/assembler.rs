//! Output assembly for interactive shell streams
//!
//! Turns raw channel bytes into forwardable chunks: permissive decoding,
//! carriage-return coalescing for progress ticks, flush throttling, and
//! completion-phrase detection on completed lines only. Pure state machine,
//! driven by the channel poll loop.

use bytes::BytesMut;
use std::time::{Duration, Instant};

/// Events produced while feeding bytes into the assembler
#[derive(Debug, PartialEq, Eq)]
pub enum AssemblerEvent {
    /// Buffered output ready to forward to observers
    Flush(String),
    /// The completion phrase appeared on a completed line.
    /// Any pending output was flushed in a preceding event.
    CompletionDetected {
        /// The matching line, CR-stripped
        line: String,
    },
}

/// Line-structured, throttled view over one command's output stream
pub struct OutputAssembler {
    completion_phrase: String,
    flush_interval: Duration,
    /// Raw bytes of the current incomplete line, for phrase detection
    partial_line: BytesMut,
    /// Decoded output waiting to be forwarded
    pending: String,
    last_flush: Instant,
}

impl OutputAssembler {
    /// Create an assembler for one command execution
    pub fn new(completion_phrase: impl Into<String>, flush_interval: Duration, now: Instant) -> Self {
        Self {
            completion_phrase: completion_phrase.into(),
            flush_interval,
            partial_line: BytesMut::new(),
            pending: String::new(),
            last_flush: now,
        }
    }

    /// Feed a chunk of raw channel bytes.
    ///
    /// Returns the events to act on, in order. A `CompletionDetected` event
    /// is always last; the caller must stop feeding afterwards.
    pub fn push(&mut self, data: &[u8], now: Instant) -> Vec<AssemblerEvent> {
        let mut events = Vec::new();

        // Invalid bytes are replaced, never dropped, so noise on the wire
        // cannot stall the stream.
        let decoded = String::from_utf8_lossy(data);

        if decoded.contains('\r') && !decoded.contains('\n') {
            // In-place progress update: keep only the latest state, collapsing
            // a flurry of ticks into one chunk.
            let latest = decoded
                .split('\r')
                .rev()
                .find(|segment| !segment.is_empty())
                .unwrap_or("");
            self.pending = latest.to_string();
        } else {
            self.pending.push_str(&decoded);
        }

        if now.duration_since(self.last_flush) >= self.flush_interval {
            if let Some(chunk) = self.take_pending(now) {
                events.push(AssemblerEvent::Flush(chunk));
            }
        }

        // Phrase detection runs over completed lines only; a phrase split
        // across chunks still matches once its line is assembled.
        self.partial_line.extend_from_slice(data);
        if self.partial_line.contains(&b'\n') {
            let buffered = self.partial_line.split();
            let mut segments: Vec<&[u8]> = buffered[..].split(|&b| b == b'\n').collect();
            // Last fragment has no newline yet; keep it for the next chunk
            if let Some(fragment) = segments.pop() {
                self.partial_line.extend_from_slice(fragment);
            }

            for raw in segments {
                let line = String::from_utf8_lossy(raw).replace('\r', "");
                if line.contains(&self.completion_phrase) {
                    if let Some(chunk) = self.take_pending(now) {
                        events.push(AssemblerEvent::Flush(chunk));
                    }
                    events.push(AssemblerEvent::CompletionDetected { line });
                    return events;
                }
            }
        }

        events
    }

    /// Called when a poll interval passed with no data: flush the pending
    /// buffer if the throttle window has elapsed.
    pub fn idle(&mut self, now: Instant) -> Option<String> {
        if now.duration_since(self.last_flush) >= self.flush_interval {
            self.take_pending(now)
        } else {
            None
        }
    }

    /// Unconditionally take whatever is buffered (EOF and cancellation paths)
    pub fn flush_remaining(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    fn take_pending(&mut self, now: Instant) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            self.last_flush = now;
            Some(std::mem::take(&mut self.pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(100);

    fn after(start: Instant, ms: u64) -> Instant {
        start + Duration::from_millis(ms)
    }

    #[test]
    fn test_progress_ticks_coalesce_to_latest_state() {
        let start = Instant::now();
        let mut asm = OutputAssembler::new("done", INTERVAL, start);

        // Two in-place updates within one throttle window: only the latest
        // survives.
        assert!(asm.push(b"progress 10%\r", start).is_empty());
        assert!(asm.push(b"progress 55%\r", after(start, 50)).is_empty());

        let flushed = asm.idle(after(start, 150)).unwrap();
        assert_eq!(flushed, "progress 55%");
    }

    #[test]
    fn test_scenario_two_flushes_then_completion() {
        let start = Instant::now();
        let mut asm = OutputAssembler::new("done", INTERVAL, start);

        let events = asm.push(b"progress 10%\r", after(start, 150));
        assert_eq!(events, vec![AssemblerEvent::Flush("progress 10%".into())]);

        let events = asm.push(b"progress 55%\r", after(start, 300));
        assert_eq!(events, vec![AssemblerEvent::Flush("progress 55%".into())]);

        let events = asm.push(b"progress 100%\ndone\n", after(start, 450));
        assert_eq!(
            events,
            vec![
                AssemblerEvent::Flush("progress 100%\ndone\n".into()),
                AssemblerEvent::CompletionDetected {
                    line: "done".into()
                },
            ]
        );
    }

    #[test]
    fn test_phrase_never_fires_mid_line() {
        let start = Instant::now();
        let mut asm = OutputAssembler::new("[SUCC] unload", INTERVAL, start);

        // Phrase fully present but its line has no newline yet
        let events = asm.push(b"[SUCC] unload", start);
        assert!(!events
            .iter()
            .any(|e| matches!(e, AssemblerEvent::CompletionDetected { .. })));

        // Completing the line triggers detection
        let events = asm.push(b" finished\n", after(start, 200));
        assert!(matches!(
            events.last(),
            Some(AssemblerEvent::CompletionDetected { line }) if line == "[SUCC] unload finished"
        ));
    }

    #[test]
    fn test_phrase_split_across_chunks_matches_on_assembled_line() {
        let start = Instant::now();
        let mut asm = OutputAssembler::new("Process ok", INTERVAL, start);

        assert!(!asm
            .push(b"Proc", start)
            .iter()
            .any(|e| matches!(e, AssemblerEvent::CompletionDetected { .. })));
        let events = asm.push(b"ess ok\n", after(start, 10));
        assert!(matches!(
            events.last(),
            Some(AssemblerEvent::CompletionDetected { .. })
        ));
    }

    #[test]
    fn test_pending_flushed_before_completion_event() {
        let start = Instant::now();
        let mut asm = OutputAssembler::new("done", INTERVAL, start);

        // Everything arrives in one chunk, before the throttle window elapses
        let events = asm.push(b"output line\ndone\n", after(start, 10));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], AssemblerEvent::Flush("output line\ndone\n".into()));
        assert!(matches!(events[1], AssemblerEvent::CompletionDetected { .. }));
    }

    #[test]
    fn test_invalid_bytes_are_replaced_not_dropped() {
        let start = Instant::now();
        let mut asm = OutputAssembler::new("done", INTERVAL, start);

        asm.push(b"bad \xff\xfe bytes\n", start);
        let flushed = asm.idle(after(start, 200)).unwrap();
        assert!(flushed.contains("bad "));
        assert!(flushed.contains('\u{FFFD}'));
    }

    #[test]
    fn test_idle_respects_throttle_window() {
        let start = Instant::now();
        let mut asm = OutputAssembler::new("done", INTERVAL, start);

        asm.push(b"partial", start);
        assert!(asm.idle(after(start, 50)).is_none());
        assert_eq!(asm.idle(after(start, 120)).unwrap(), "partial");
    }
}
