use chrono::{DateTime, Utc};

use super::models::TrialWindow;

/// Piece of a range tagged with whether the shop trial covers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialSlice {
    pub begins_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub trial: bool,
}

impl TrialSlice {
    fn new(begins_at: DateTime<Utc>, ends_at: DateTime<Utc>, trial: bool) -> Self {
        Self {
            begins_at,
            ends_at,
            trial,
        }
    }
}

/// key: billing-trial-split -> cut a range at the trial boundaries
///
/// Returns one to three slices covering `[begins_at, ends_at)` exactly. The
/// trial is in effect over `[starts_at, expires_at)`; an instant equal to the
/// expiry is already outside it.
pub fn split_for_trial(
    begins_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    trial: TrialWindow,
) -> Vec<TrialSlice> {
    let whole = |flag| vec![TrialSlice::new(begins_at, ends_at, flag)];

    let (Some(starts_at), Some(expires_at)) = (trial.starts_at, trial.expires_at) else {
        return whole(false);
    };
    if expires_at <= starts_at || expires_at <= begins_at || starts_at >= ends_at {
        return whole(false);
    }

    if starts_at <= begins_at {
        if expires_at < ends_at {
            vec![
                TrialSlice::new(begins_at, expires_at, true),
                TrialSlice::new(expires_at, ends_at, false),
            ]
        } else {
            whole(true)
        }
    } else if expires_at >= ends_at {
        vec![
            TrialSlice::new(begins_at, starts_at, false),
            TrialSlice::new(starts_at, ends_at, true),
        ]
    } else {
        vec![
            TrialSlice::new(begins_at, starts_at, false),
            TrialSlice::new(starts_at, expires_at, true),
            TrialSlice::new(expires_at, ends_at, false),
        ]
    }
}
