use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag that ends the render loop. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    AwaitingFirstFrame,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameStatus {
    Rendered { elapsed_ms: f64 },
    Stopped,
}

/// Tracks the timestamp of the previous frame.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    previous: Option<f64>,
    stop: StopSignal,
}

impl FrameClock {
    pub fn new(stop: StopSignal) -> Self {
        Self {
            previous: None,
            stop,
        }
    }

    /// Milliseconds since the previous frame, or `None` once stopped. The
    /// first frame only records its timestamp and reports zero.
    pub fn tick(&mut self, now_ms: f64) -> Option<f64> {
        if self.stop.is_stopped() {
            return None;
        }
        let previous = self.previous.replace(now_ms).unwrap_or(now_ms);
        Some((now_ms - previous).max(0.0))
    }

    pub fn previous(&self) -> Option<f64> {
        self.previous
    }

    pub fn phase(&self) -> FramePhase {
        if self.stop.is_stopped() {
            FramePhase::Stopped
        } else if self.previous.is_none() {
            FramePhase::AwaitingFirstFrame
        } else {
            FramePhase::Running
        }
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_sets_baseline() {
        let mut clock = FrameClock::new(StopSignal::new());
        assert_eq!(clock.phase(), FramePhase::AwaitingFirstFrame);
        assert_eq!(clock.tick(1000.0), Some(0.0));
        assert_eq!(clock.phase(), FramePhase::Running);
        assert_eq!(clock.tick(1016.0), Some(16.0));
        assert_eq!(clock.previous(), Some(1016.0));
    }

    #[test]
    fn backwards_timestamps_do_not_go_negative() {
        let mut clock = FrameClock::new(StopSignal::new());
        clock.tick(500.0);
        assert_eq!(clock.tick(400.0), Some(0.0));
        assert_eq!(clock.previous(), Some(400.0));
    }

    #[test]
    fn stop_is_seen_through_clones() {
        let stop = StopSignal::new();
        let mut clock = FrameClock::new(stop.clone());
        clock.tick(0.0);
        stop.stop();
        assert_eq!(clock.phase(), FramePhase::Stopped);
        assert_eq!(clock.tick(16.0), None);
        assert_eq!(clock.previous(), Some(0.0));
    }
}
