//! Timed replay of an action group through an [`InputSynth`]
//!
//! Items are dispatched in order, each one scheduled at the previous
//! dispatch plus the recorded gap between the two timestamps. Every wait
//! (inter-item gaps, interpolation steps, key holds) is a cancellation
//! point, so a long recorded pause can still be interrupted promptly.

use crate::error::{RecorderError, RecorderResult};
use crate::events::{ActionGroup, ActionItem, ActionModifier, EventType, Point};
use actionreel_core::{InputSynth, Primitive, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Jumps past `large_jump_px` on either axis get at least this many steps
const LARGE_JUMP_STEPS: u32 = 60;
const LARGE_JUMP_DELAY_MS: u64 = 8;

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Break pointer jumps into intermediate moves
    pub use_interpolation: bool,
    pub movement_steps: u32,
    pub movement_delay_ms: u64,
    /// Scales pointer travel while interpolating
    pub sensitivity_multiplier: f64,
    /// Every interpolated move gets large-jump fidelity
    pub ultra_smooth_mode: bool,
    pub large_jump_px: i32,
    /// Tap mode: key downs without their own hold are released after this
    /// many ms. 0 leaves releases to the recorded key ups.
    pub key_hold_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            use_interpolation: true,
            movement_steps: 40,
            movement_delay_ms: 5,
            sensitivity_multiplier: 1.0,
            ultra_smooth_mode: false,
            large_jump_px: 50,
            key_hold_ms: 0,
        }
    }
}

impl ReplayConfig {
    /// Defaults overridden by a group's modifiers. A modifier's name is the
    /// option and its description the value; higher priority wins.
    pub fn from_modifiers(modifiers: &[ActionModifier]) -> Self {
        let mut config = Self::default();
        config.apply_modifiers(modifiers);
        config
    }

    pub fn apply_modifiers(&mut self, modifiers: &[ActionModifier]) {
        let mut ordered: Vec<&ActionModifier> = modifiers.iter().collect();
        ordered.sort_by_key(|m| m.priority);
        for m in ordered {
            match self.set(&m.name, &m.description) {
                Ok(()) => debug!(option = %m.name, value = %m.description, "replay option from modifier"),
                Err(reason) => warn!(modifier = %m.name, %reason, "ignoring modifier"),
            }
        }
    }

    /// Set one option by name. Names are matched ignoring case, `_`, `-` and spaces.
    pub fn set(&mut self, name: &str, value: &str) -> std::result::Result<(), String> {
        let key: String = name
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let value = value.trim();
        let bad = || format!("invalid value {:?} for {}", value, name);

        match key.as_str() {
            "useinterpolation" => self.use_interpolation = parse_bool(value).ok_or_else(bad)?,
            "movementsteps" => self.movement_steps = value.parse().map_err(|_| bad())?,
            "movementdelayms" | "movementdelay" => {
                self.movement_delay_ms = value.parse().map_err(|_| bad())?
            }
            "sensitivitymultiplier" | "sensitivity" => {
                let v: f64 = value.parse().map_err(|_| bad())?;
                self.set_sensitivity(v).map_err(|_| bad())?
            }
            "ultrasmoothmode" | "ultrasmooth" => {
                self.ultra_smooth_mode = parse_bool(value).ok_or_else(bad)?
            }
            "largejumppx" => self.large_jump_px = value.parse().map_err(|_| bad())?,
            "keyholdms" => self.key_hold_ms = value.parse().map_err(|_| bad())?,
            _ => return Err(format!("unknown replay option {:?}", name)),
        }
        Ok(())
    }

    /// Must be finite and positive
    pub fn set_sensitivity(&mut self, value: f64) -> std::result::Result<(), String> {
        if !value.is_finite() || value <= 0.0 {
            return Err(format!("sensitivity must be a positive number, got {}", value));
        }
        self.sensitivity_multiplier = value;
        Ok(())
    }

    /// Intermediate pointer positions from `from` to `to`, ending on the
    /// (sensitivity-scaled) target, plus the pause between them.
    /// Positions past the `i32` range are clamped to it.
    pub fn interpolate(&self, from: Point, to: Point) -> (Vec<Point>, Duration) {
        let raw_dx = i64::from(to.x) - i64::from(from.x);
        let raw_dy = i64::from(to.y) - i64::from(from.y);
        let scale = |d: i64| d as f64 * self.sensitivity_multiplier;
        let (dx, dy) = (scale(raw_dx), scale(raw_dy));
        let at = |eased: f64| Point::new(offset(from.x, dx * eased), offset(from.y, dy * eased));
        let end = at(1.0);

        let travel = (i64::from(end.x) - i64::from(from.x))
            .unsigned_abs()
            .max((i64::from(end.y) - i64::from(from.y)).unsigned_abs());
        if travel == 0 {
            return (vec![end], Duration::ZERO);
        }

        // At least a pixel per step, before the large-jump minimum
        let mut steps = u64::from(self.movement_steps).min(travel);
        let mut delay = self.movement_delay_ms;
        let large = i64::from(self.large_jump_px);
        if self.ultra_smooth_mode || raw_dx.abs() > large || raw_dy.abs() > large {
            steps = steps.max(u64::from(LARGE_JUMP_STEPS));
            delay = delay.max(LARGE_JUMP_DELAY_MS);
        }

        if steps <= 1 {
            return (vec![end], Duration::ZERO);
        }

        let points = (1..=steps)
            .map(|i| {
                let t = i as f64 / steps as f64;
                at(1.0 - (1.0 - t) * (1.0 - t))
            })
            .collect();
        (points, Duration::from_millis(delay))
    }
}

/// `origin + d` rounded and clamped into screen coordinate range
fn offset(origin: i32, d: f64) -> i32 {
    let v = i64::from(origin).saturating_add(d.round() as i64);
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ReplayState {
    pub fn is_finished(&self) -> bool {
        matches!(self, ReplayState::Completed | ReplayState::Cancelled | ReplayState::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub state: ReplayState,
    pub dispatched: usize,
    pub skipped: usize,
    pub moves: usize,
    pub clicks: usize,
    pub keys: usize,
    /// Out-of-order timestamps replayed with no wait
    pub clamped_delays: usize,
}

// ============================================================================
// Replayer
// ============================================================================

enum Step {
    Done,
    Skipped,
    /// Cancelled part way through the item
    Cancelled,
}

/// Replays one group at a time through a synth
pub struct Replayer {
    synth: Arc<dyn InputSynth>,
    config: ReplayConfig,
    state: Option<watch::Sender<ReplayState>>,
}

impl Replayer {
    pub fn new(synth: Arc<dyn InputSynth>) -> Self {
        Self {
            synth,
            config: ReplayConfig::default(),
            state: None,
        }
    }

    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish state transitions on a watch channel
    pub fn with_state(mut self, tx: watch::Sender<ReplayState>) -> Self {
        self.state = Some(tx);
        self
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Replay every item of the group. Effects already dispatched are not
    /// undone on cancellation or failure.
    pub async fn play(&self, group: &ActionGroup, cancel: &CancellationToken) -> ReplayReport {
        let mut report = ReplayReport::default();
        self.transition(&mut report, ReplayState::Running);
        info!(group = %group.name, items = group.items.len(), "replay started");

        let mut pointer: Option<Point> = None;
        let mut last_dispatch = Instant::now();
        let mut prev: Option<&ActionItem> = None;

        for (idx, item) in group.items.iter().enumerate() {
            let delay = match prev {
                Some(p) => (item.timestamp - p.timestamp).to_std().unwrap_or_else(|_| {
                    warn!(index = idx, "timestamp earlier than previous item, not waiting");
                    report.clamped_delays += 1;
                    Duration::ZERO
                }),
                None => Duration::ZERO,
            };
            prev = Some(item);

            if !wait_until(last_dispatch + delay, cancel).await {
                return self.finish(group, report, ReplayState::Cancelled);
            }
            last_dispatch = Instant::now();

            match self.dispatch(item, &mut pointer, cancel, &mut report).await {
                Ok(Step::Done) => report.dispatched += 1,
                Ok(Step::Skipped) => report.skipped += 1,
                Ok(Step::Cancelled) => {
                    report.dispatched += 1;
                    return self.finish(group, report, ReplayState::Cancelled);
                }
                Err(e) if e.is_fatal() => {
                    error!(index = idx, error = %e, "input synthesis unavailable");
                    return self.finish(group, report, ReplayState::Failed);
                }
                Err(e) => {
                    warn!(index = idx, error = %e, "action failed, continuing");
                    report.skipped += 1;
                }
            }
        }

        self.finish(group, report, ReplayState::Completed)
    }

    async fn dispatch(
        &self,
        item: &ActionItem,
        pointer: &mut Option<Point>,
        cancel: &CancellationToken,
        report: &mut ReplayReport,
    ) -> Result<Step> {
        match item.event_type {
            EventType::MouseMove => {
                let Some(target) = item.coordinates else {
                    debug!("mouse move without coordinates");
                    return Ok(Step::Skipped);
                };
                let step = self.glide(pointer, target, cancel).await?;
                report.moves += 1;
                Ok(step)
            }
            EventType::KeyDown | EventType::KeyUp if item.key_code == 0 => {
                debug!("key event without a key code");
                Ok(Step::Skipped)
            }
            EventType::KeyDown => {
                let code = item.key_code;
                self.send(Primitive::PressKey { code })?;
                report.keys += 1;

                let hold = if item.duration_ms > 0 {
                    item.duration_ms
                } else {
                    self.config.key_hold_ms
                };
                if hold > 0 {
                    let held = wait_until(Instant::now() + Duration::from_millis(hold), cancel).await;
                    // Never leave a key stuck down
                    self.send(Primitive::ReleaseKey { code })?;
                    if !held {
                        return Ok(Step::Cancelled);
                    }
                }
                Ok(Step::Done)
            }
            EventType::KeyUp => {
                self.send(Primitive::ReleaseKey { code: item.key_code })?;
                report.keys += 1;
                Ok(Step::Done)
            }
            other => match other.as_button() {
                Some((button, down)) => {
                    if let Some(p) = item.coordinates {
                        self.send(Primitive::MovePointer { x: p.x, y: p.y })?;
                        *pointer = Some(p);
                    }
                    self.send(if down {
                        Primitive::PressButton { button }
                    } else {
                        Primitive::ReleaseButton { button }
                    })?;
                    report.clicks += 1;
                    Ok(Step::Done)
                }
                None => {
                    warn!(code = other.code(), "unrecognized event type, skipping");
                    Ok(Step::Skipped)
                }
            },
        }
    }

    /// Move the pointer, interpolating from the last known position
    async fn glide(
        &self,
        pointer: &mut Option<Point>,
        target: Point,
        cancel: &CancellationToken,
    ) -> Result<Step> {
        let from = match *pointer {
            Some(from) if self.config.use_interpolation => from,
            _ => {
                self.send(Primitive::MovePointer { x: target.x, y: target.y })?;
                *pointer = Some(target);
                return Ok(Step::Done);
            }
        };

        let (points, pause) = self.config.interpolate(from, target);
        let mut sent = from;
        for (i, p) in points.iter().enumerate() {
            if i > 0 && !pause.is_zero() && !wait_until(Instant::now() + pause, cancel).await {
                *pointer = Some(sent);
                return Ok(Step::Cancelled);
            }
            if *p != sent || i + 1 == points.len() {
                self.send(Primitive::MovePointer { x: p.x, y: p.y })?;
                sent = *p;
            }
        }
        *pointer = Some(sent);
        Ok(Step::Done)
    }

    fn send(&self, p: Primitive) -> Result<()> {
        p.apply(self.synth.as_ref())
    }

    fn transition(&self, report: &mut ReplayReport, state: ReplayState) {
        report.state = state;
        if let Some(tx) = &self.state {
            tx.send_replace(state);
        }
    }

    fn finish(&self, group: &ActionGroup, mut report: ReplayReport, state: ReplayState) -> ReplayReport {
        self.transition(&mut report, state);
        info!(
            group = %group.name,
            state = ?state,
            dispatched = report.dispatched,
            skipped = report.skipped,
            "replay finished"
        );
        report
    }
}

/// Sleep until `deadline`; false if cancelled first
async fn wait_until(deadline: Instant, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if deadline <= Instant::now() {
        return true;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep_until(deadline) => true,
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Runs replays as background tasks, at most one per group
pub struct ReplayController {
    synth: Arc<dyn InputSynth>,
    active: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl ReplayController {
    pub fn new(synth: Arc<dyn InputSynth>) -> Self {
        Self {
            synth,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawn a replay on the current tokio runtime. A group that is already
    /// replaying is rejected.
    pub fn start(&self, group: ActionGroup, config: ReplayConfig) -> RecorderResult<ReplayHandle> {
        let cancel = CancellationToken::new();
        {
            let mut active = self.active.lock();
            if active.contains_key(&group.id) {
                return Err(RecorderError::ReplayActive(group.name.clone()));
            }
            active.insert(group.id, cancel.clone());
        }

        let (state_tx, state_rx) = watch::channel(ReplayState::Idle);
        let replayer = Replayer::new(self.synth.clone())
            .with_config(config)
            .with_state(state_tx);
        let slot = ActiveSlot {
            active: self.active.clone(),
            id: group.id,
        };
        let id = group.id;
        let name = group.name.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let _slot = slot;
            replayer.play(&group, &token).await
        });

        Ok(ReplayHandle {
            id,
            name,
            cancel,
            state: state_rx,
            task,
        })
    }

    pub fn is_active(&self, id: &Uuid) -> bool {
        self.active.lock().contains_key(id)
    }

    /// Request cancellation of a running replay
    pub fn cancel(&self, id: &Uuid) -> bool {
        match self.active.lock().get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for token in self.active.lock().values() {
            token.cancel();
        }
    }
}

/// Frees the group's single-flight slot when the replay task ends
struct ActiveSlot {
    active: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
    id: Uuid,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.active.lock().remove(&self.id);
    }
}

pub struct ReplayHandle {
    id: Uuid,
    name: String,
    cancel: CancellationToken,
    state: watch::Receiver<ReplayState>,
    task: JoinHandle<ReplayReport>,
}

impl ReplayHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this replay, e.g. for a signal handler
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> ReplayState {
        *self.state.borrow()
    }

    pub async fn join(self) -> RecorderResult<ReplayReport> {
        self.task
            .await
            .map_err(|e| RecorderError::ReplayTask(e.to_string()))
    }
}
