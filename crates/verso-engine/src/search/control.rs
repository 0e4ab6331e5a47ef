//! Cooperative search control: abort flag, panic clock and toggles.
//!
//! The engine is single-threaded; an external timer or signal handler may
//! share the force-return flag and set it asynchronously. Every searcher
//! polls [`Control::should_abort`] at node boundaries and unwinds with the
//! abort sentinel when it fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Fraction of the move budget after which a new iterative-deepening
/// iteration is not worth starting.
const MIDGAME_ABORT_FRACTION: f64 = 0.4;

/// Cooperative cancellation and time state for one move computation.
pub struct Control {
    force_return: Arc<AtomicBool>,
    abort_checks: bool,
    midgame_abort_checks: bool,
    panic_abort: bool,
    clock_active: bool,
    start: Instant,
    panic_value: Duration,
}

impl Control {
    pub fn new() -> Control {
        Control {
            force_return: Arc::new(AtomicBool::new(false)),
            abort_checks: true,
            midgame_abort_checks: true,
            panic_abort: false,
            clock_active: false,
            start: Instant::now(),
            panic_value: Duration::ZERO,
        }
    }

    /// The shared force-return flag; hand a clone to an external watchdog.
    pub fn force_return_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.force_return)
    }

    pub fn set_force_return(&self) {
        self.force_return.store(true, Ordering::Release);
    }

    pub fn clear_force_return(&self) {
        self.force_return.store(false, Ordering::Release);
    }

    pub fn is_force_return(&self) -> bool {
        self.force_return.load(Ordering::Acquire)
    }

    /// Start the clock for one move. `time` and `increment` are the
    /// remaining game clock and per-move increment in seconds; zero time
    /// disables the clock entirely.
    pub fn start_move(&mut self, time: f64, increment: f64, discs: i32) {
        self.start = Instant::now();
        self.panic_abort = false;
        if time <= 0.0 {
            self.clock_active = false;
            self.panic_value = Duration::ZERO;
            return;
        }
        let moves_remaining = (((65 - discs) / 2).max(2)) as f64;
        let nominal = time / moves_remaining + increment;
        // Allow a panic overdraw of a few nominal moves, but never more
        // than half the remaining clock.
        let panic_secs = (4.0 * nominal).min(time / 2.0).max(0.05);
        self.panic_value = Duration::from_secs_f64(panic_secs);
        self.clock_active = true;
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Enable/disable the panic clock (pondering disables it).
    pub fn toggle_abort_check(&mut self, enable: bool) {
        self.abort_checks = enable;
    }

    /// Enable/disable the between-iterations midgame abort.
    pub fn toggle_midgame_abort_check(&mut self, enable: bool) {
        self.midgame_abort_checks = enable;
    }

    pub fn clear_panic_abort(&mut self) {
        self.panic_abort = false;
    }

    pub fn is_panic_abort(&self) -> bool {
        self.panic_abort
    }

    /// Latch the panic flag if the move budget has been overdrawn.
    pub fn check_panic_abort(&mut self) {
        if self.abort_checks
            && self.clock_active
            && !self.panic_abort
            && self.elapsed() >= self.panic_value
        {
            self.panic_abort = true;
        }
    }

    /// Should a new iterative-deepening iteration be skipped?
    pub fn is_midgame_abort(&self) -> bool {
        self.midgame_abort_checks
            && self.clock_active
            && self.elapsed().as_secs_f64()
                >= MIDGAME_ABORT_FRACTION * self.panic_value.as_secs_f64()
    }

    /// Cooperative abort poll, called at node boundaries. The clock is
    /// only consulted every 2048 nodes.
    pub fn should_abort(&mut self, nodes: u64) -> bool {
        if self.is_force_return() || self.panic_abort {
            return true;
        }
        if nodes & 2047 != 0 {
            return false;
        }
        self.check_panic_abort();
        self.panic_abort
    }
}

impl Default for Control {
    fn default() -> Control {
        Control::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Control;
    use std::sync::atomic::Ordering;

    #[test]
    fn force_return_flag_is_shared() {
        let control = Control::new();
        let flag = control.force_return_flag();
        assert!(!control.is_force_return());
        flag.store(true, Ordering::Release);
        assert!(control.is_force_return());
        control.clear_force_return();
        assert!(!control.is_force_return());
    }

    #[test]
    fn untimed_moves_never_panic() {
        let mut control = Control::new();
        control.start_move(0.0, 0.0, 4);
        control.check_panic_abort();
        assert!(!control.is_panic_abort());
        assert!(!control.should_abort(2048));
    }

    #[test]
    fn force_return_wins_over_node_mask() {
        let mut control = Control::new();
        control.set_force_return();
        // Node counts that skip the clock check still see the flag.
        assert!(control.should_abort(1));
    }

    #[test]
    fn pondering_disables_panic() {
        let mut control = Control::new();
        control.start_move(0.000001, 0.0, 40);
        control.toggle_abort_check(false);
        std::thread::sleep(std::time::Duration::from_millis(60));
        control.check_panic_abort();
        assert!(!control.is_panic_abort());
        control.toggle_abort_check(true);
        control.check_panic_abort();
        assert!(control.is_panic_abort());
    }
}
