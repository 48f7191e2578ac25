//! Recording sessions: dedup buffer plus the capture thread that feeds it
//!
//! Capture sources push raw items through a [`CaptureSink`]. A dedicated
//! thread owns the [`DedupBuffer`] for the lifetime of the session, so the
//! buffer never has more than one writer. Progress goes out on a bounded
//! feedback channel with `try_send`; a slow listener loses updates, the
//! capture path never waits. A live hook pushes with [`CaptureSink::push`]
//! and sees `Full` when the buffer thread falls behind; a reader source
//! uses [`CaptureSink::send`] and waits for room instead.

use crate::error::{RecorderError, RecorderResult};
use crate::events::{ActionItem, EventType};
pub use crossbeam_channel::{Receiver, Sender};
use crossbeam_channel::{bounded, RecvTimeoutError, SendError, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Emit a feedback signal every N accepted items
    pub summary_every: usize,
    /// Raw events queued between capture source and buffer thread
    pub channel_capacity: usize,
    /// Feedback signals queued for the UI side
    pub feedback_capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            summary_every: 50,
            channel_capacity: 10_000,
            feedback_capacity: 64,
        }
    }
}

/// Progress notification, sent every `summary_every` accepted items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub accepted: usize,
    pub dropped: usize,
    pub last_event: EventType,
}

// ============================================================================
// Dedup Buffer
// ============================================================================

/// Noise filter for mouse moves and key auto-repeat.
///
/// Clicks are never duplicates. Moves are compared against the previous
/// accepted item only when that item is also a move: both sub-pixel
/// (|dx| <= 1 and |dy| <= 1) is jitter, identical coordinates and deltas is a
/// repeat. Keys are duplicates when type and code match the previous item.
pub fn is_duplicate(new: &ActionItem, last: Option<&ActionItem>) -> bool {
    if new.event_type.is_click() {
        return false;
    }
    let Some(last) = last else {
        return false;
    };

    match new.event_type {
        EventType::MouseMove if last.event_type.is_mouse_move() => {
            let sub_pixel =
                |i: &ActionItem| i.delta_x.unsigned_abs() <= 1 && i.delta_y.unsigned_abs() <= 1;
            if sub_pixel(new) && sub_pixel(last) {
                return true;
            }
            new.coordinates == last.coordinates
                && new.delta_x == last.delta_x
                && new.delta_y == last.delta_y
        }
        EventType::KeyDown | EventType::KeyUp => {
            new.event_type == last.event_type && new.key_code == last.key_code
        }
        _ => false,
    }
}

/// In-memory ordered buffer for one recording session
#[derive(Debug)]
pub struct DedupBuffer {
    config: RecorderConfig,
    items: Vec<ActionItem>,
    active: bool,
    dropped: usize,
    feedback: Option<Sender<Feedback>>,
}

impl DedupBuffer {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            items: Vec::new(),
            active: false,
            dropped: 0,
            feedback: None,
        }
    }

    pub fn with_feedback(mut self, tx: Sender<Feedback>) -> Self {
        self.feedback = Some(tx);
        self
    }

    pub fn start_session(&mut self) {
        self.items.clear();
        self.dropped = 0;
        self.active = true;
    }

    /// Returns whether the item was kept
    pub fn on_raw_event(&mut self, item: ActionItem) -> bool {
        if !self.active {
            debug!("event outside session ignored");
            return false;
        }
        if is_duplicate(&item, self.items.last()) {
            self.dropped += 1;
            return false;
        }

        let event_type = item.event_type;
        self.items.push(item);

        let every = self.config.summary_every;
        if every > 0 && self.items.len() % every == 0 {
            if let Some(tx) = &self.feedback {
                let _ = tx.try_send(Feedback {
                    accepted: self.items.len(),
                    dropped: self.dropped,
                    last_event: event_type,
                });
            }
        }
        true
    }

    /// Hands over the buffer and leaves it empty
    pub fn stop_session(&mut self) -> Vec<ActionItem> {
        self.active = false;
        std::mem::take(&mut self.items)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

// ============================================================================
// Capture Thread
// ============================================================================

/// Why an item did not reach the buffer thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("capture queue is full")]
    Full,
    #[error("recording session has stopped")]
    Closed,
}

/// Write end for the one capture source of a session. Not `Clone`.
#[derive(Debug)]
pub struct CaptureSink {
    tx: Sender<ActionItem>,
}

impl CaptureSink {
    /// Push one item in occurrence order without waiting
    pub fn push(&self, item: ActionItem) -> Result<(), PushError> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => PushError::Full,
            TrySendError::Disconnected(_) => PushError::Closed,
        })
    }

    /// Queue one item, waiting while the queue is full.
    /// Only fails once the session has stopped.
    pub fn send(&self, item: ActionItem) -> Result<(), PushError> {
        self.tx.send(item).map_err(|SendError(_)| PushError::Closed)
    }
}

/// Items collected by a finished session
#[derive(Debug, Clone)]
pub struct Recording {
    pub name: String,
    pub items: Vec<ActionItem>,
    pub dropped: usize,
}

/// Recording handle - owns the session thread
pub struct RecordingHandle {
    name: String,
    stop: Arc<AtomicBool>,
    feedback_rx: Receiver<Feedback>,
    thread: Option<thread::JoinHandle<(Vec<ActionItem>, usize)>>,
}

impl RecordingHandle {
    /// Stop the session and collect the buffer. Items already queued are drained first.
    pub fn stop(mut self) -> RecorderResult<Recording> {
        self.stop.store(true, Ordering::SeqCst);
        let thread = self.thread.take().ok_or(RecorderError::NotRecording)?;
        let (items, dropped) = thread
            .join()
            .map_err(|_| RecorderError::CaptureThreadPanicked)?;
        info!(name = %self.name, items = items.len(), dropped, "recording stopped");
        Ok(Recording {
            name: self.name.clone(),
            items,
            dropped,
        })
    }

    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::Relaxed)
            && self.thread.as_ref().map_or(false, |t| !t.is_finished())
    }

    /// Feedback signals for the UI side
    pub fn feedback(&self) -> &Receiver<Feedback> {
        &self.feedback_rx
    }

    pub fn try_feedback(&self) -> Option<Feedback> {
        self.feedback_rx.try_recv().ok()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// The recorder
pub struct Recorder {
    config: RecorderConfig,
}

impl Recorder {
    pub fn new() -> Self {
        Self::with_config(RecorderConfig::default())
    }

    pub fn with_config(config: RecorderConfig) -> Self {
        Self { config }
    }

    pub fn start(&self, name: impl Into<String>) -> RecorderResult<(CaptureSink, RecordingHandle)> {
        let name = name.into();
        let (tx, rx) = bounded::<ActionItem>(self.config.channel_capacity);
        let (feedback_tx, feedback_rx) = bounded::<Feedback>(self.config.feedback_capacity);
        let stop = Arc::new(AtomicBool::new(false));

        let mut buffer = DedupBuffer::new(self.config.clone()).with_feedback(feedback_tx);
        buffer.start_session();

        let stop1 = stop.clone();
        let thread = thread::Builder::new()
            .name(format!("capture-{}", name))
            .spawn(move || run_buffer(buffer, rx, stop1))
            .map_err(RecorderError::Spawn)?;

        info!(name = %name, "recording started");
        Ok((
            CaptureSink { tx },
            RecordingHandle {
                name,
                stop,
                feedback_rx,
                thread: Some(thread),
            },
        ))
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

fn run_buffer(
    mut buffer: DedupBuffer,
    rx: Receiver<ActionItem>,
    stop: Arc<AtomicBool>,
) -> (Vec<ActionItem>, usize) {
    while !stop.load(Ordering::Relaxed) {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(item) => {
                buffer.on_raw_event(item);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("capture source closed");
                break;
            }
        }
    }

    // Final drain
    while let Ok(item) = rx.try_recv() {
        buffer.on_raw_event(item);
    }
    if buffer.is_empty() {
        warn!("recording stopped with no items");
    }
    let dropped = buffer.dropped();
    (buffer.stop_session(), dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actionreel_core::MouseButton;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn ts(ms: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + ChronoDuration::milliseconds(ms)
    }

    fn session() -> DedupBuffer {
        let mut b = DedupBuffer::new(RecorderConfig::default());
        b.start_session();
        b
    }

    #[test]
    fn sub_pixel_moves_collapse() {
        let mut b = session();
        let m = ActionItem::mouse_move(10, 10, ts(0)).with_delta(1, 0);
        assert!(b.on_raw_event(m.clone()));
        assert!(!b.on_raw_event(m));
        assert_eq!(b.stop_session().len(), 1);
    }

    #[test]
    fn exact_repeat_move_dropped_but_real_motion_kept() {
        let mut b = session();
        b.on_raw_event(ActionItem::mouse_move(100, 100, ts(0)).with_delta(5, 5));
        assert!(!b.on_raw_event(ActionItem::mouse_move(100, 100, ts(8)).with_delta(5, 5)));
        assert!(b.on_raw_event(ActionItem::mouse_move(105, 105, ts(16)).with_delta(5, 5)));
        assert_eq!(b.len(), 2);
        assert_eq!(b.dropped(), 1);
    }

    #[test]
    fn small_move_after_key_is_kept() {
        let mut b = session();
        b.on_raw_event(ActionItem::key(0x41, true, ts(0)));
        assert!(b.on_raw_event(ActionItem::mouse_move(1, 1, ts(5)).with_delta(1, 1)));
    }

    #[test]
    fn clicks_are_never_dropped() {
        let mut b = session();
        for _ in 0..7 {
            assert!(b.on_raw_event(ActionItem::button(MouseButton::Left, true, ts(0)).at(5, 5)));
        }
        assert_eq!(b.stop_session().len(), 7);
    }

    #[test]
    fn key_auto_repeat_collapses() {
        let mut b = session();
        for i in 0..10 {
            b.on_raw_event(ActionItem::key(0x41, true, ts(i * 30)));
        }
        b.on_raw_event(ActionItem::key(0x41, false, ts(400)));
        b.on_raw_event(ActionItem::key(0x41, true, ts(500)));
        let items = b.stop_session();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].event_type, EventType::KeyUp);
    }

    #[test]
    fn events_outside_session_ignored() {
        let mut b = DedupBuffer::new(RecorderConfig::default());
        assert!(!b.on_raw_event(ActionItem::key(0x41, true, ts(0))));
        b.start_session();
        b.on_raw_event(ActionItem::key(0x41, true, ts(0)));
        assert_eq!(b.stop_session().len(), 1);
        assert!(b.is_empty());
        assert!(!b.is_active());
    }

    #[test]
    fn feedback_every_nth_accepted_item() {
        let (tx, rx) = bounded(8);
        let config = RecorderConfig {
            summary_every: 3,
            ..Default::default()
        };
        let mut b = DedupBuffer::new(config).with_feedback(tx);
        b.start_session();
        for i in 0..7 {
            b.on_raw_event(ActionItem::button(MouseButton::Left, i % 2 == 0, ts(i)));
        }
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].accepted, 3);
        assert_eq!(got[1].accepted, 6);
    }

    #[test]
    fn full_feedback_channel_does_not_block() {
        let (tx, _rx) = bounded(1);
        let config = RecorderConfig {
            summary_every: 1,
            ..Default::default()
        };
        let mut b = DedupBuffer::new(config).with_feedback(tx);
        b.start_session();
        for i in 0..100 {
            b.on_raw_event(ActionItem::button(MouseButton::Right, true, ts(i)));
        }
        assert_eq!(b.len(), 100);
    }

    #[test]
    fn capture_thread_collects_pushed_items() {
        let recorder = Recorder::new();
        let (sink, handle) = recorder.start("session").unwrap();
        sink.push(ActionItem::mouse_move(10, 10, ts(0)).with_delta(4, 4)).unwrap();
        sink.push(ActionItem::mouse_move(10, 10, ts(1)).with_delta(4, 4)).unwrap();
        sink.push(ActionItem::button(MouseButton::Left, true, ts(2)).at(10, 10)).unwrap();
        drop(sink);

        let recording = handle.stop().unwrap();
        assert_eq!(recording.name, "session");
        assert_eq!(recording.items.len(), 2);
        assert_eq!(recording.dropped, 1);
    }

    #[test]
    fn send_waits_instead_of_dropping() {
        let config = RecorderConfig {
            channel_capacity: 4,
            ..Default::default()
        };
        let (sink, handle) = Recorder::with_config(config).start("burst").unwrap();
        for i in 0..500 {
            sink.send(ActionItem::button(MouseButton::Left, true, ts(i)).at(1, 1))
                .unwrap();
        }
        drop(sink);

        let recording = handle.stop().unwrap();
        assert_eq!(recording.items.len(), 500);
        assert_eq!(recording.dropped, 0);
    }

    #[test]
    fn stopped_session_reports_closed_not_full() {
        let config = RecorderConfig {
            channel_capacity: 1,
            ..Default::default()
        };
        let (sink, handle) = Recorder::with_config(config).start("closed").unwrap();
        handle.stop().unwrap();

        let click = ActionItem::button(MouseButton::Left, true, ts(0));
        assert_eq!(sink.push(click.clone()), Err(PushError::Closed));
        assert_eq!(sink.send(click), Err(PushError::Closed));
    }

    #[test]
    fn extreme_deltas_do_not_overflow() {
        let a = ActionItem::mouse_move(0, 0, ts(0)).with_delta(i32::MIN, i32::MIN);
        let b = ActionItem::mouse_move(5, 5, ts(1)).with_delta(i32::MIN, 0);
        assert!(!is_duplicate(&b, Some(&a)));
        assert!(is_duplicate(&a, Some(&a)));
    }
}
