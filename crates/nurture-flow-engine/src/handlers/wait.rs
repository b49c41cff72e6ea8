//! Wait: the only long-lived suspension point.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::executor::StepOutcome;
use crate::types::WaitConfig;

/// Suspend until `now + duration`.
pub(crate) fn run(cfg: &WaitConfig, now: DateTime<Utc>) -> StepOutcome {
    let delay = ChronoDuration::from_std(cfg.duration()).unwrap_or(ChronoDuration::MAX);
    StepOutcome::Suspend(now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC))
}
