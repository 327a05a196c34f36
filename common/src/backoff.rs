// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Module providing utilities for retrying operations with exponential backoff.

use std::time::Duration;

pub use ::backoff::Error as BackoffError;
pub use ::backoff::future::{retry, retry_notify};
pub use ::backoff::{ExponentialBackoff, Notify, backoff::Backoff};

/// Return a backoff policy for delivering shares to holders.
///
/// Holders may take arbitrarily long to come up, so this never gives up.
pub fn distribution_policy() -> ::backoff::ExponentialBackoff {
    const INITIAL_INTERVAL: Duration = Duration::from_millis(250);
    const MAX_INTERVAL: Duration = Duration::from_secs(30);
    policy_with_max(INITIAL_INTERVAL, MAX_INTERVAL, None)
}

/// Return a backoff policy for the storage service reading shares back from
/// holders. Like [distribution_policy], this never gives up.
pub fn quorum_policy() -> ::backoff::ExponentialBackoff {
    const INITIAL_INTERVAL: Duration = Duration::from_millis(250);
    const MAX_INTERVAL: Duration = Duration::from_secs(10);
    policy_with_max(INITIAL_INTERVAL, MAX_INTERVAL, None)
}

/// Return a backoff policy for the end-to-end liveness check, which must
/// succeed within `max_elapsed_time`.
pub fn liveness_policy(
    max_elapsed_time: Duration,
) -> ::backoff::ExponentialBackoff {
    const INITIAL_INTERVAL: Duration = Duration::from_millis(100);
    const MAX_INTERVAL: Duration = Duration::from_secs(5);
    policy_with_max(INITIAL_INTERVAL, MAX_INTERVAL, Some(max_elapsed_time))
}

fn policy_with_max(
    initial_interval: Duration,
    max_interval: Duration,
    max_elapsed_time: Option<Duration>,
) -> ::backoff::ExponentialBackoff {
    let current_interval = initial_interval;
    ::backoff::ExponentialBackoff {
        current_interval,
        initial_interval,
        multiplier: 2.0,
        max_interval,
        max_elapsed_time,
        ..::backoff::ExponentialBackoff::default()
    }
}
