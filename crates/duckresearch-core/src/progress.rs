use crate::events::StatusEvent;

/// Errors never drag visible progress below this floor.
pub const ERROR_PROGRESS_FLOOR: f64 = 0.70;

/// Folds a stream of status events into a monotonically non-decreasing
/// completion fraction.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    current: f64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event and return the fraction to display.
    pub fn observe(&mut self, event: &StatusEvent) -> f64 {
        let target = if event.stage.is_error() {
            ERROR_PROGRESS_FLOOR.max(self.current)
        } else {
            event.target().unwrap_or(self.current)
        };

        let target = if target.is_finite() {
            target.clamp(0.0, 1.0)
        } else {
            self.current
        };
        if target > self.current {
            self.current = target;
        }
        self.current
    }

    pub fn fraction(&self) -> f64 {
        self.current
    }
}
