use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Cadence d'événements par fenêtre glissante. Zéro allocation après init.
///
/// Used for both the redraw rate and the classifier trigger rate.
///
/// # Example
/// ```
/// use kw_render::rate::RateMeter;
/// let mut meter = RateMeter::new(30);
/// meter.tick();
/// assert!(meter.per_second() >= 0.0);
/// ```
pub struct RateMeter {
    /// Timestamps of the last `window` events.
    timestamps: VecDeque<Instant>,
    window: usize,
    rate: f64,
    /// Interval between the two most recent events.
    pub last_interval: Duration,
}

impl RateMeter {
    /// Create a meter averaging over the last `window` events.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(window + 1),
            window: window.max(2),
            rate: 0.0,
            last_interval: Duration::ZERO,
        }
    }

    /// Record one event now.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Record one event at `now`.
    pub fn tick_at(&mut self, now: Instant) {
        if let Some(&last) = self.timestamps.back() {
            self.last_interval = now.saturating_duration_since(last);
        }
        self.timestamps.push_back(now);
        if self.timestamps.len() > self.window {
            self.timestamps.pop_front();
        }
        if let Some(&first) = self.timestamps.front() {
            let secs = now.saturating_duration_since(first).as_secs_f64();
            if secs > 0.0 {
                self.rate = (self.timestamps.len() - 1) as f64 / secs;
            }
        }
    }

    /// Mean events per second over the window (0 until two events were seen).
    #[must_use]
    pub fn per_second(&self) -> f64 {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_ticks_give_their_rate() {
        let start = Instant::now();
        let mut meter = RateMeter::new(10);
        for i in 0..25 {
            meter.tick_at(start + Duration::from_millis(i * 80));
        }
        assert!((meter.per_second() - 12.5).abs() < 1e-6);
        assert_eq!(meter.last_interval, Duration::from_millis(80));
    }

    #[test]
    fn single_tick_has_no_rate() {
        let mut meter = RateMeter::new(10);
        meter.tick();
        assert!(meter.per_second().abs() < f64::EPSILON);
    }
}
