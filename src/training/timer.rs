use std::time::{Duration, Instant};

use log::info;

pub struct Timer {
    start: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn passed(&self) -> Duration {
        Instant::now() - self.start
    }

    pub fn restart(&mut self) -> Duration {
        let passed = self.passed();
        self.start = Instant::now();
        passed
    }

    /// Logs `msg` with `{t}` replaced by the elapsed time, if at least `threshold` passed.
    pub fn log_if_greater(&self, threshold: Duration, msg: &str) {
        let passed = self.passed();
        if passed < threshold {
            return;
        }
        info!("{}", msg.replace("{t}", &format!("{passed:.1?}")));
    }
}
