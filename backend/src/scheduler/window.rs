//! Meeting access window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessState {
    TooEarly,
    Open,
    Closed,
}

/// Interval during which meeting tokens may be issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessWindow {
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
}

impl AccessWindow {
    pub fn state_at(&self, now: DateTime<Utc>) -> AccessState {
        if now < self.opens_at {
            AccessState::TooEarly
        } else if now > self.closes_at {
            AccessState::Closed
        } else {
            AccessState::Open
        }
    }
}

pub fn access_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    before: Duration,
    after: Duration,
) -> AccessWindow {
    AccessWindow {
        opens_at: start - before,
        closes_at: end + after,
    }
}
