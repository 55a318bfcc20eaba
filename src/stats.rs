use chrono::{DateTime, Local};

/// Counters and wall-clock bounds of one finished dispatcher session.
#[derive(Clone, Debug)]
pub struct SessionStats {
    pub queries_sent: u64,
    pub queries_completed: u64,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
}

impl SessionStats {
    /// Session length in seconds, at microsecond resolution.
    pub fn duration_seconds(&self) -> f64 {
        let micros = (self.end_time - self.start_time)
            .num_microseconds()
            .unwrap_or(i64::MAX);
        micros as f64 / 1_000_000.0
    }

    pub fn qps(&self) -> f64 {
        let duration = self.duration_seconds();
        if duration <= 0.0 {
            return 0.0;
        }
        self.queries_completed as f64 / duration
    }

    pub fn percent_completed(&self) -> f64 {
        if self.queries_sent == 0 {
            return 0.0;
        }
        self.queries_completed as f64 / self.queries_sent as f64 * 100.0
    }

    pub fn percent_lost(&self) -> f64 {
        if self.queries_sent == 0 {
            return 0.0;
        }
        100.0 - self.percent_completed()
    }
}
