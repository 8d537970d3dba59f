use std::time::{Duration, Instant};

/// Wall-clock timer for a single node evaluation.
#[derive(Debug)]
pub struct Timer {
    start: Option<Instant>,
}

impl Timer {
    /// Start a timer when `enabled`, otherwise return an inert one.
    pub fn start(enabled: bool) -> Self {
        Self {
            start: enabled.then(Instant::now),
        }
    }

    /// Elapsed time, or `None` for an inert timer.
    pub fn stop(self) -> Option<Duration> {
        self.start.map(|start| start.elapsed())
    }
}

/// Render a duration as `"{ms}ms {us}us {ns}ns"` plus its numeric parts.
pub fn format_duration(duration: Duration) -> (String, [u64; 3]) {
    let total_ns = duration.as_nanos();
    let ms = (total_ns / 1_000_000) as u64;
    let us = ((total_ns / 1_000) % 1_000) as u64;
    let ns = (total_ns % 1_000) as u64;
    (format!("{ms}ms {us}us {ns}ns"), [ms, us, ns])
}
