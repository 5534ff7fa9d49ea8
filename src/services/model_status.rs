//! Model lifecycle polling.
//!
//! A baseline loop polls `/api/model/status` on a fixed cadence and is the only
//! source of truth. `toggle` may paint an optimistic state first; the next
//! confirmed poll always replaces it. Every fetch carries a sequence number and
//! results older than the last applied one are dropped, so a slow baseline
//! response cannot overwrite a newer follow-up result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::services::backend::{Backend, ClientError, StatusResponse};
use crate::services::config::ClientConfig;
use crate::services::events::{ClientEvent, EventSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Stopped,
    Loading,
    Ready,
}

impl Lifecycle {
    fn label(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Loading => "Loading",
            Self::Ready => "Ready",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub lifecycle: Lifecycle,
    pub vram_free_mb: Option<f64>,
    pub vram_total_mb: Option<f64>,
    /// Set when the backend reports `error`; overlays `lifecycle`.
    pub error: Option<String>,
}

impl ModelStatus {
    pub fn new(lifecycle: Lifecycle) -> Self {
        Self {
            lifecycle,
            vram_free_mb: None,
            vram_total_mb: None,
            error: None,
        }
    }

    pub fn stopped() -> Self {
        Self::new(Lifecycle::Stopped)
    }

    pub fn loading() -> Self {
        Self::new(Lifecycle::Loading)
    }

    /// Interpret a status body. `previous` is the last confirmed lifecycle and
    /// is kept underneath an `error` report. Missing or unknown states read as
    /// stopped.
    pub fn from_response(response: &StatusResponse, previous: Lifecycle) -> Self {
        let raw = response
            .status
            .as_deref()
            .unwrap_or("stopped")
            .trim()
            .to_ascii_lowercase();

        let (lifecycle, error) = match raw.as_str() {
            "loading" | "starting" => (Lifecycle::Loading, None),
            "ready" | "running" => (Lifecycle::Ready, None),
            "error" => (
                previous,
                Some(
                    response
                        .error
                        .clone()
                        .filter(|e| !e.trim().is_empty())
                        .unwrap_or_else(|| "Unknown error".to_string()),
                ),
            ),
            _ => (Lifecycle::Stopped, None),
        };

        Self {
            lifecycle,
            vram_free_mb: response.vram_free_mb,
            vram_total_mb: response.vram_total_mb,
            error,
        }
    }
}

/// What the indicator currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayStatus {
    /// Taken from a real poll.
    Confirmed(ModelStatus),
    /// Painted ahead of confirmation; replaced by the next real poll.
    Optimistic(ModelStatus),
}

impl DisplayStatus {
    pub fn status(&self) -> &ModelStatus {
        match self {
            Self::Confirmed(status) | Self::Optimistic(status) => status,
        }
    }

    pub fn is_optimistic(&self) -> bool {
        matches!(self, Self::Optimistic(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelAction {
    Start,
    Starting,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VramUsage {
    pub used_mb: f64,
    pub total_mb: f64,
    pub percent: f64,
    pub text: String,
}

impl VramUsage {
    /// `None` unless both figures are known and the total is non-zero.
    pub fn from_figures(free_mb: Option<f64>, total_mb: Option<f64>) -> Option<Self> {
        let (free, total) = (free_mb?, total_mb?);
        if !(total > 0.0) || free < 0.0 {
            return None;
        }
        let used = (total - free).max(0.0);
        Some(Self {
            used_mb: used,
            total_mb: total,
            percent: (used / total) * 100.0,
            text: format!("{:.1} / {:.0} GB", used / 1024.0, total / 1024.0),
        })
    }
}

/// Presentation of a [`DisplayStatus`]: indicator label, action button, VRAM bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub lifecycle: Lifecycle,
    pub label: String,
    pub error: Option<String>,
    pub optimistic: bool,
    pub action: ModelAction,
    pub action_label: String,
    pub action_enabled: bool,
    pub vram: Option<VramUsage>,
}

impl StatusView {
    pub fn from_display(display: &DisplayStatus) -> Self {
        let status = display.status();
        let (action, action_label, action_enabled) = match status.lifecycle {
            Lifecycle::Stopped => (ModelAction::Start, "Start Engine", true),
            Lifecycle::Loading => (ModelAction::Starting, "Ignition...", false),
            Lifecycle::Ready => (ModelAction::Stop, "Stop Engine", true),
        };
        let label = if status.error.is_some() {
            "Error"
        } else {
            status.lifecycle.label()
        };

        Self {
            lifecycle: status.lifecycle,
            label: label.to_string(),
            error: status.error.clone(),
            optimistic: display.is_optimistic(),
            action,
            action_label: action_label.to_string(),
            action_enabled,
            vram: VramUsage::from_figures(status.vram_free_mb, status.vram_total_mb),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    /// A start request was sent after painting `loading`.
    Starting,
    /// A stop request was sent.
    Stopping,
    /// The model is loading; nothing to do.
    Busy,
    /// The start request never reached the backend; the indicator was reverted.
    StartFailed(ClientError),
}

struct PollerState {
    last_applied_seq: u64,
    last_confirmed: Lifecycle,
}

struct PollerInner<B, S> {
    backend: Arc<B>,
    sink: Arc<S>,
    poll_interval: Duration,
    fast_poll_interval: Duration,
    fast_poll_max_attempts: usize,
    next_seq: AtomicU64,
    // NOTE: std::sync::Mutex everywhere below; none of these locks is held across .await.
    state: Mutex<PollerState>,
    display: watch::Sender<DisplayStatus>,
    baseline: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
    follow_up: Mutex<Option<JoinHandle<()>>>,
}

pub struct ModelStatusPoller<B, S> {
    inner: Arc<PollerInner<B, S>>,
}

impl<B, S> Clone for ModelStatusPoller<B, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: Backend, S: EventSink> ModelStatusPoller<B, S> {
    pub fn new(backend: Arc<B>, sink: Arc<S>, config: &ClientConfig) -> Self {
        let (display, _) = watch::channel(DisplayStatus::Confirmed(ModelStatus::stopped()));
        Self {
            inner: Arc::new(PollerInner {
                backend,
                sink,
                poll_interval: config.poll_interval,
                fast_poll_interval: config.fast_poll_interval,
                fast_poll_max_attempts: config.fast_poll_max_attempts.max(1),
                next_seq: AtomicU64::new(0),
                state: Mutex::new(PollerState {
                    last_applied_seq: 0,
                    last_confirmed: Lifecycle::Stopped,
                }),
                display,
                baseline: Mutex::new(None),
                follow_up: Mutex::new(None),
            }),
        }
    }

    pub fn current(&self) -> DisplayStatus {
        self.inner.display.borrow().clone()
    }

    fn issue_seq(&self) -> u64 {
        self.inner.next_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply `display` if `seq` is newer than everything applied so far.
    fn apply(&self, seq: u64, display: DisplayStatus) -> bool {
        let Ok(mut state) = self.inner.state.lock() else {
            log::warn!("Model status state lock poisoned");
            return false;
        };
        if seq <= state.last_applied_seq {
            log::debug!(
                "Dropping stale status #{} (already at #{})",
                seq,
                state.last_applied_seq
            );
            return false;
        }
        state.last_applied_seq = seq;
        if let DisplayStatus::Confirmed(status) = &display {
            if status.lifecycle != state.last_confirmed {
                log::info!(
                    "Model {:?} -> {:?}",
                    state.last_confirmed,
                    status.lifecycle
                );
            }
            state.last_confirmed = status.lifecycle;
        }

        // Emitted under the lock so listeners observe applies in sequence order.
        self.inner.sink.emit(ClientEvent::ModelStatus {
            view: StatusView::from_display(&display),
        });
        self.inner.display.send_replace(display);
        true
    }

    fn last_confirmed(&self) -> Lifecycle {
        self.inner
            .state
            .lock()
            .map(|s| s.last_confirmed)
            .unwrap_or(Lifecycle::Stopped)
    }

    fn render_optimistic(&self, status: ModelStatus) {
        let seq = self.issue_seq();
        self.apply(seq, DisplayStatus::Optimistic(status));
    }

    /// Fetch and display the backend status. An unreachable backend reads as
    /// stopped.
    pub async fn poll(&self) -> ModelStatus {
        let seq = self.issue_seq();
        let status = match self.inner.backend.model_status().await {
            Ok(response) => ModelStatus::from_response(&response, self.last_confirmed()),
            Err(err) => {
                log::debug!("Status poll failed, assuming stopped: {}", err);
                ModelStatus::stopped()
            }
        };
        self.apply(seq, DisplayStatus::Confirmed(status.clone()));
        status
    }

    /// Start the model when stopped, stop it when ready.
    ///
    /// The decision is made on a fresh poll rather than on what is displayed.
    pub async fn toggle(&self) -> ToggleOutcome {
        let current = self.poll().await;

        let outcome = match current.lifecycle {
            Lifecycle::Loading => return ToggleOutcome::Busy,
            Lifecycle::Stopped => {
                self.render_optimistic(ModelStatus::loading());
                match self.inner.backend.start_model().await {
                    Ok(()) => ToggleOutcome::Starting,
                    Err(err) => {
                        log::warn!("Failed to start model: {}", err);
                        self.render_optimistic(ModelStatus::stopped());
                        ToggleOutcome::StartFailed(err)
                    }
                }
            }
            Lifecycle::Ready => {
                if let Err(err) = self.inner.backend.stop_model().await {
                    log::warn!("Failed to stop model: {}", err);
                }
                ToggleOutcome::Stopping
            }
        };

        self.spawn_follow_up();
        outcome
    }

    /// Poll on the fast cadence until the model leaves `loading`, bounded by
    /// the configured attempt count.
    pub async fn settle(&self) -> ModelStatus {
        let mut last = self.current().status().clone();
        for _ in 0..self.inner.fast_poll_max_attempts {
            tokio::time::sleep(self.inner.fast_poll_interval).await;
            last = self.poll().await;
            if last.lifecycle != Lifecycle::Loading {
                break;
            }
        }
        last
    }

    fn spawn_follow_up(&self) {
        let poller = self.clone();
        let handle = tokio::spawn(async move {
            poller.settle().await;
        });
        let previous = match self.inner.follow_up.lock() {
            Ok(mut slot) => slot.replace(handle),
            Err(_) => {
                log::warn!("Follow-up poll slot lock poisoned");
                None
            }
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Start the baseline polling loop. The first poll runs immediately.
    pub fn start(&self) {
        let Ok(mut baseline) = self.inner.baseline.lock() else {
            log::warn!("Baseline poll slot lock poisoned");
            return;
        };
        if baseline.as_ref().is_some_and(|(_, handle)| !handle.is_finished()) {
            return;
        }

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let poller = self.clone();
        let period = self.inner.poll_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        poller.poll().await;
                    }
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            log::debug!("Baseline status polling stopped");
        });
        *baseline = Some((cancel_tx, handle));
    }

    /// Stop the baseline loop and any pending follow-up polls.
    pub fn stop(&self) {
        let baseline = self.inner.baseline.lock().ok().and_then(|mut b| b.take());
        if let Some((cancel_tx, handle)) = baseline {
            let _ = cancel_tx.send(true);
            handle.abort();
        }
        let follow_up = self.inner.follow_up.lock().ok().and_then(|mut f| f.take());
        if let Some(handle) = follow_up {
            handle.abort();
        }
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.inner
            .baseline
            .lock()
            .map(|b| b.as_ref().is_some_and(|(_, handle)| !handle.is_finished()))
            .unwrap_or(false)
    }
}
