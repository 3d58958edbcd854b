// THEORY:
// The `AnimationDriver` walks the kernel window across the grid so a viewer can
// watch the convolution happen one window at a time. It is a two-state machine:
// - **Idle**: no ticker exists.
// - **Animating**: exactly one ticker task exists, owned through a
//   `TickerHandle` that aborts the task when dropped.
//
// Key architectural principles:
// 1.  **Pure Stepping**: `next_anchor` is a plain function of the current
//     anchor and grid shape. Timers only decide *when* to step, so the walk
//     itself is tested without any clock.
// 2.  **Owned Cancellation**: stopping, restarting, or dropping the driver
//     drops the handle, which aborts the task. No orphaned ticker can keep
//     mutating a grid nobody is watching.
// 3.  **Redraw Signal**: after each step the driver publishes a `Frame` on a
//     `watch` channel. The engine lock is released first, so a renderer woken by
//     the frame can read the finished state straight away. Grid observers are
//     held for the duration of the lock and hear about the step once, after
//     the unlock, so a callback may lock the engine itself.
// 4.  **Result Refresh**: the overlay and the Result Grid are independent
//     operations on the engine. With `refresh_results` set (the default), each
//     step also convolves at the window centre so the cached sum matches the
//     labels on screen.

use crate::core_modules::convolution::{Anchor, GridConvolutionManager};
use crate::core_modules::kernel::{KERNEL_SIZE, Kernel};
use crate::error::{GridError, GridResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// An engine shared between the host and the ticker task.
pub type SharedEngine = Arc<Mutex<GridConvolutionManager>>;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// Time between steps, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Also convolve at the window centre on every step.
    #[serde(default = "default_refresh_results")]
    pub refresh_results: bool,
}

fn default_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_refresh_results() -> bool {
    true
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_TICK_INTERVAL_MS,
            refresh_results: true,
        }
    }
}

impl AnimationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationState {
    Idle,
    Animating,
}

/// What the renderer should show after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frame {
    /// Top-left cell of the highlighted window.
    pub anchor: Anchor,
    /// Steps taken since the driver was created.
    pub tick: u64,
}

/// The row-major successor of `anchor` among windows that fit on a
/// `rows x cols` grid; wraps to the origin after the last one.
pub fn next_anchor(anchor: Anchor, rows: usize, cols: usize) -> Anchor {
    if anchor.col.saturating_add(KERNEL_SIZE) < cols {
        Anchor::new(anchor.row, anchor.col + 1)
    } else if anchor.row.saturating_add(KERNEL_SIZE) < rows {
        Anchor::new(anchor.row + 1, 0)
    } else {
        Anchor::ORIGIN
    }
}

/// Owns the ticker task; dropping it aborts the task.
struct TickerHandle(JoinHandle<()>);

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn lock(engine: &Mutex<GridConvolutionManager>) -> MutexGuard<'_, GridConvolutionManager> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs `f` with the engine locked. Grid observers are notified at most once,
/// after the lock is released.
pub fn with_engine_locked<T>(
    engine: &Mutex<GridConvolutionManager>,
    f: impl FnOnce(&mut GridConvolutionManager) -> T,
) -> T {
    let (out, pending) = {
        let mut guard = lock(engine);
        guard.hold_notifications();
        let out = f(&mut guard);
        (out, guard.release_notifications())
    };
    if let Some(pending) = pending {
        pending.deliver();
    }
    out
}

/// One animation step: move the window, relabel, optionally refresh the
/// cached sum, then publish the frame.
fn advance(
    engine: &Mutex<GridConvolutionManager>,
    kernel: &Kernel,
    refresh_results: bool,
    frames: &watch::Sender<Frame>,
) -> GridResult<Frame> {
    let next = with_engine_locked(engine, |engine| -> GridResult<Anchor> {
        let (rows, cols) = (engine.grid().rows(), engine.grid().cols());
        let next = next_anchor(engine.kernel_position(), rows, cols);
        engine.update_kernel(next.row, next.col, kernel);
        engine.set_kernel_position(next.row, next.col);
        if refresh_results {
            let center = next.window_center();
            if engine.grid().in_bounds(center.row, center.col) {
                engine.compute_convolution(center.row, center.col, Some(kernel))?;
            }
        }
        Ok(next)
    })?;

    frames.send_modify(|frame| {
        frame.anchor = next;
        frame.tick += 1;
    });
    let frame = *frames.borrow();
    debug!(row = next.row, col = next.col, tick = frame.tick, "kernel advanced");
    Ok(frame)
}

pub struct AnimationDriver {
    engine: SharedEngine,
    kernel: Kernel,
    config: AnimationConfig,
    ticker: Option<TickerHandle>,
    frames: watch::Sender<Frame>,
}

impl AnimationDriver {
    pub fn new(engine: SharedEngine, kernel: Kernel, config: AnimationConfig) -> Self {
        let anchor = lock(&engine).kernel_position();
        let (frames, _) = watch::channel(Frame { anchor, tick: 0 });
        Self {
            engine,
            kernel,
            config,
            ticker: None,
            frames,
        }
    }

    pub fn engine(&self) -> SharedEngine {
        Arc::clone(&self.engine)
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn config(&self) -> &AnimationConfig {
        &self.config
    }

    pub fn state(&self) -> AnimationState {
        if self.ticker.is_some() {
            AnimationState::Animating
        } else {
            AnimationState::Idle
        }
    }

    /// Receives a new `Frame` after every step.
    pub fn frames(&self) -> watch::Receiver<Frame> {
        self.frames.subscribe()
    }

    /// Swaps the kernel. A running animation restarts with the new weights.
    pub fn set_kernel(&mut self, kernel: Kernel) -> GridResult<()> {
        self.kernel = kernel;
        if self.ticker.is_some() {
            self.ticker = None;
            self.spawn_ticker()?;
        }
        Ok(())
    }

    /// Idle → Animating: clears overlays once and starts ticking. Does nothing
    /// if already animating. Needs a running tokio runtime.
    pub fn start(&mut self) -> GridResult<()> {
        if self.ticker.is_some() {
            return Ok(());
        }
        tokio::runtime::Handle::try_current().map_err(|e| GridError::Runtime(e.to_string()))?;
        with_engine_locked(&self.engine, GridConvolutionManager::reset_grids);
        self.spawn_ticker()?;
        info!(interval_ms = self.config.interval_ms, "kernel animation started");
        Ok(())
    }

    /// Animating → Idle: cancels the ticker. The last overlay and anchor stay.
    pub fn stop(&mut self) {
        if self.ticker.take().is_some() {
            info!("kernel animation stopped");
        }
    }

    pub fn toggle(&mut self) -> GridResult<AnimationState> {
        match self.state() {
            AnimationState::Idle => self.start()?,
            AnimationState::Animating => self.stop(),
        }
        Ok(self.state())
    }

    /// Takes one step immediately, without the timer.
    pub fn step_once(&self) -> GridResult<Frame> {
        advance(&self.engine, &self.kernel, self.config.refresh_results, &self.frames)
    }

    fn spawn_ticker(&mut self) -> GridResult<()> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|e| GridError::Runtime(e.to_string()))?;
        let engine = Arc::clone(&self.engine);
        let frames = self.frames.clone();
        let kernel = self.kernel;
        let refresh_results = self.config.refresh_results;
        let period = self.config.interval();

        let task = handle.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(err) = advance(&engine, &kernel, refresh_results, &frames) {
                    warn!(%err, "kernel animation step failed");
                }
            }
        });
        self.ticker = Some(TickerHandle(task));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::cell::CellValue;
    use crate::core_modules::grid_manager::{GridConfig, GridManager};

    fn shared_engine(rows: usize, cols: usize) -> SharedEngine {
        let grid = GridManager::filled(GridConfig::new(rows, cols, 10), CellValue::Scalar(2.0)).unwrap();
        Arc::new(Mutex::new(GridConvolutionManager::new(grid)))
    }

    #[test]
    fn steps_along_the_row_then_down() {
        assert_eq!(next_anchor(Anchor::new(0, 0), 5, 5), Anchor::new(0, 1));
        assert_eq!(next_anchor(Anchor::new(0, 2), 5, 5), Anchor::new(1, 0));
        assert_eq!(next_anchor(Anchor::new(2, 2), 5, 5), Anchor::ORIGIN);
    }

    #[test]
    fn visits_every_window_once_then_wraps() {
        for (rows, cols) in [(3, 3), (4, 6), (8, 8), (5, 3)] {
            let expected = (rows - 2) * (cols - 2);
            let mut seen = vec![Anchor::ORIGIN];
            let mut anchor = next_anchor(Anchor::ORIGIN, rows, cols);
            while anchor != Anchor::ORIGIN {
                assert!(!seen.contains(&anchor), "{anchor:?} visited twice");
                assert!(anchor.row + KERNEL_SIZE <= rows && anchor.col + KERNEL_SIZE <= cols);
                seen.push(anchor);
                anchor = next_anchor(anchor, rows, cols);
                assert!(seen.len() <= expected, "walk on {rows}x{cols} never wrapped");
            }
            assert_eq!(seen.len(), expected);
        }
    }

    #[test]
    fn grids_smaller_than_the_kernel_stay_at_origin() {
        assert_eq!(next_anchor(Anchor::ORIGIN, 2, 2), Anchor::ORIGIN);
    }

    #[test]
    fn step_once_moves_labels_and_refreshes_centre() {
        let engine = shared_engine(4, 4);
        let driver = AnimationDriver::new(Arc::clone(&engine), Kernel::box_sum(), AnimationConfig::default());
        let frame = driver.step_once().unwrap();
        assert_eq!(frame, Frame { anchor: Anchor::new(0, 1), tick: 1 });

        let engine = engine.lock().unwrap();
        assert_eq!(engine.kernel_position(), Anchor::new(0, 1));
        assert!(engine.grid().overlay(0, 0).is_none());
        assert_eq!(engine.grid().overlay(2, 3).map(|o| o.text.as_str()), Some("1×2"));
        assert_eq!(engine.result_at(1, 2), Some(&CellValue::Scalar(18.0)));
    }

    #[test]
    fn step_once_without_refresh_leaves_results_alone() {
        let engine = shared_engine(4, 4);
        let config = AnimationConfig {
            refresh_results: false,
            ..AnimationConfig::default()
        };
        let driver = AnimationDriver::new(Arc::clone(&engine), Kernel::box_sum(), config);
        driver.step_once().unwrap();
        assert!(engine.lock().unwrap().results().iter().all(Option::is_none));
    }

    #[test]
    fn start_outside_a_runtime_is_an_error() {
        let mut driver = AnimationDriver::new(shared_engine(4, 4), Kernel::IDENTITY, AnimationConfig::default());
        assert!(matches!(driver.start(), Err(GridError::Runtime(_))));
        assert_eq!(driver.state(), AnimationState::Idle);
    }

    #[test]
    fn config_fills_defaults_from_partial_json() {
        let config: AnimationConfig = serde_json::from_str(r#"{"interval_ms": 500}"#).unwrap();
        assert_eq!(config.interval(), Duration::from_millis(500));
        assert!(config.refresh_results);
    }

    #[test]
    fn huge_anchor_wraps_to_origin() {
        assert_eq!(next_anchor(Anchor::new(usize::MAX, usize::MAX), 5, 5), Anchor::ORIGIN);
        assert_eq!(next_anchor(Anchor::new(0, usize::MAX), 5, 5), Anchor::new(1, 0));

        let engine = shared_engine(4, 4);
        engine.lock().unwrap().set_kernel_position(usize::MAX, 0);
        let driver = AnimationDriver::new(Arc::clone(&engine), Kernel::box_sum(), AnimationConfig::default());
        assert_eq!(driver.step_once().unwrap().anchor, Anchor::new(usize::MAX, 1));
        assert!(!engine.lock().unwrap().grid().has_overlays());

        engine.lock().unwrap().set_kernel_position(usize::MAX, usize::MAX);
        assert_eq!(driver.step_once().unwrap().anchor, Anchor::ORIGIN);
        assert_eq!(engine.lock().unwrap().result_at(1, 1), Some(&CellValue::Scalar(18.0)));
    }

    #[test]
    fn observers_can_lock_the_engine_during_a_step() {
        let engine = shared_engine(4, 4);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (in_cb, record) = (Arc::downgrade(&engine), Arc::clone(&seen));
        let _sub = engine.lock().unwrap().grid().add_observer(move || {
            let Some(engine) = in_cb.upgrade() else { return };
            let anchor = engine.try_lock().ok().map(|e| e.kernel_position());
            record.lock().unwrap().push(anchor);
        });

        let driver = AnimationDriver::new(Arc::clone(&engine), Kernel::box_sum(), AnimationConfig::default());
        driver.step_once().unwrap();
        driver.step_once().unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(Anchor::new(0, 1)), Some(Anchor::new(1, 0))]
        );
    }
}
