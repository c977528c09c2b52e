//! The token-bucket state machine.
//!
//! Pure functions turning `(state, now, request)` into `(new state,
//! outcome)`. Callers provide atomicity: the local bucket runs these inside
//! its state cell's critical section, the grid executor inside the grid's
//! per-key locking.

use crate::bucket::state::{BandwidthState, BucketState};
use crate::limits::{Bandwidth, LimitsConfig, Refill};

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reservation {
    /// Tokens were debited; the caller must wait this many nanoseconds
    /// before treating the consumption as complete.
    Wait(u64),
    /// The request cannot be granted within the deadline (or at all);
    /// nothing was debited.
    Rejected,
}

/// Advance every bandwidth to `now`.
///
/// Elapsed time at or below zero (a backwards time source reading, seen as
/// a wrapped delta above `i64::MAX`) leaves the state untouched.
pub(crate) fn refill(state: &mut BucketState, config: &LimitsConfig, now: u64) {
    for (part, bandwidth) in state.parts_mut().iter_mut().zip(config.bandwidths()) {
        refill_part(part, bandwidth, now);
    }
}

fn refill_part(part: &mut BandwidthState, bandwidth: &Bandwidth, now: u64) {
    let elapsed = now.wrapping_sub(part.last_refill_nanos);
    if elapsed == 0 || elapsed > i64::MAX as u64 {
        return;
    }

    let period = bandwidth.refill_period_nanos() as u128;
    let rate = bandwidth.refill_tokens() as u128;
    match bandwidth.shape() {
        Refill::Smooth => {
            // Integer arithmetic with the remainder carried in the refill
            // mark: the mark advances only by the nanoseconds that produced
            // whole tokens, so nothing is lost to rounding over time.
            let added = (elapsed as u128 * rate) / period;
            if added == 0 {
                return;
            }
            let advance = (added * period / rate) as u64;
            part.last_refill_nanos = part.last_refill_nanos.wrapping_add(advance);
            part.tokens = add_capped(part.tokens, added, bandwidth.capacity());
        }
        Refill::Intervally => {
            let periods = elapsed / bandwidth.refill_period_nanos();
            if periods == 0 {
                return;
            }
            part.last_refill_nanos = part
                .last_refill_nanos
                .wrapping_add(periods * bandwidth.refill_period_nanos());
            part.tokens = add_capped(part.tokens, periods as u128 * rate, bandwidth.capacity());
        }
    }
}

fn add_capped(tokens: i64, added: u128, capacity: i64) -> i64 {
    (tokens as i128 + added as i128).min(capacity as i128) as i64
}

/// Refill, then debit `tokens` from every bandwidth if all of them can
/// cover the request. On failure nothing is debited; the refill persists.
pub(crate) fn try_consume(
    state: &mut BucketState,
    config: &LimitsConfig,
    now: u64,
    tokens: i64,
) -> bool {
    refill(state, config, now);
    if state.available_tokens() < tokens {
        return false;
    }
    debit(state, tokens);
    true
}

/// Refill, then drain up to `limit` tokens, bounded by the most
/// restrictive bandwidth. Returns the amount consumed (possibly zero).
pub(crate) fn consume_as_much_as_possible(
    state: &mut BucketState,
    config: &LimitsConfig,
    now: u64,
    limit: i64,
) -> i64 {
    refill(state, config, now);
    let consumable = state.available_tokens().min(limit).max(0);
    if consumable > 0 {
        debit(state, consumable);
    }
    consumable
}

/// Refill, then reserve `tokens`: debit every bandwidth (balances may go
/// negative) and report the nanoseconds until the reservation matures.
///
/// Rejected without debit when the request exceeds the smallest capacity
/// or the wait exceeds `max_wait_nanos`.
pub(crate) fn reserve(
    state: &mut BucketState,
    config: &LimitsConfig,
    now: u64,
    tokens: i64,
    max_wait_nanos: u64,
) -> Reservation {
    refill(state, config, now);
    if tokens > config.min_capacity() {
        return Reservation::Rejected;
    }

    let mut wait: u64 = 0;
    for (part, bandwidth) in state.parts().iter().zip(config.bandwidths()) {
        wait = wait.max(nanos_to_wait(part, bandwidth, now, tokens));
    }
    if wait > max_wait_nanos {
        return Reservation::Rejected;
    }

    debit(state, tokens);
    Reservation::Wait(wait)
}

/// Refill, then add `tokens` to every bandwidth, capped at each capacity.
pub(crate) fn add_tokens(state: &mut BucketState, config: &LimitsConfig, now: u64, tokens: i64) {
    refill(state, config, now);
    for (part, bandwidth) in state.parts_mut().iter_mut().zip(config.bandwidths()) {
        part.tokens = add_capped(part.tokens, tokens as u128, bandwidth.capacity());
    }
}

fn debit(state: &mut BucketState, tokens: i64) {
    for part in state.parts_mut() {
        part.tokens -= tokens;
    }
}

/// The inverse of the refill formula: the minimal nanoseconds until this
/// bandwidth can cover `tokens`, measured from `now` on a freshly refilled
/// part.
fn nanos_to_wait(part: &BandwidthState, bandwidth: &Bandwidth, now: u64, tokens: i64) -> u64 {
    if part.tokens >= tokens {
        return 0;
    }
    let deficit = (tokens as i128 - part.tokens as i128) as u128;
    let period = bandwidth.refill_period_nanos() as u128;
    let rate = bandwidth.refill_tokens() as u128;
    // Nanoseconds already elapsed since the refill mark count toward the
    // next tokens.
    let elapsed = now.wrapping_sub(part.last_refill_nanos) as u128;

    let from_mark = match bandwidth.shape() {
        Refill::Smooth => (deficit * period).div_ceil(rate),
        Refill::Intervally => deficit.div_ceil(rate) * period,
    };
    u64::try_from(from_mark.saturating_sub(elapsed)).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::limits::Bandwidth;

    const SECOND: u64 = 1_000_000_000;

    fn config_of(bandwidths: Vec<Bandwidth>) -> LimitsConfig {
        LimitsConfig::new(bandwidths).unwrap()
    }

    fn drained(config: &LimitsConfig, now: u64) -> BucketState {
        let mut state = BucketState::initial(config, now);
        for part in state.parts_mut() {
            part.tokens = 0;
        }
        state
    }

    #[test]
    fn test_smooth_refill_whole_tokens_only() {
        // 10 tokens per 10 seconds: one token per second.
        let config =
            config_of(vec![Bandwidth::simple(10, Duration::from_secs(10)).unwrap()]);
        let mut state = drained(&config, 0);

        refill(&mut state, &config, SECOND / 2);
        assert_eq!(state.parts()[0].tokens, 0);
        assert_eq!(state.parts()[0].last_refill_nanos, 0);

        refill(&mut state, &config, SECOND);
        assert_eq!(state.parts()[0].tokens, 1);
        assert_eq!(state.parts()[0].last_refill_nanos, SECOND);
    }

    #[test]
    fn test_smooth_refill_no_drift_across_tiny_steps() {
        // One token per second, observed in 1ms steps: after 5 seconds of
        // tiny refills exactly 5 tokens must have accrued.
        let config =
            config_of(vec![Bandwidth::simple(100, Duration::from_secs(100)).unwrap()]);
        let mut state = drained(&config, 0);

        let step = SECOND / 1000;
        for i in 1..=5000u64 {
            refill(&mut state, &config, i * step);
        }
        assert_eq!(state.parts()[0].tokens, 5);
    }

    #[test]
    fn test_smooth_refill_caps_at_capacity() {
        let config = config_of(vec![Bandwidth::simple(10, Duration::from_secs(1)).unwrap()]);
        let mut state = drained(&config, 0);

        refill(&mut state, &config, 100 * SECOND);
        assert_eq!(state.parts()[0].tokens, 10);
    }

    #[test]
    fn test_intervally_refill_bursts_at_boundaries() {
        let config = config_of(vec![Bandwidth::new(100, Duration::from_secs(10), 30)
            .unwrap()
            .intervally()]);
        let mut state = drained(&config, 0);

        refill(&mut state, &config, 9 * SECOND);
        assert_eq!(state.parts()[0].tokens, 0);

        refill(&mut state, &config, 10 * SECOND);
        assert_eq!(state.parts()[0].tokens, 30);
        assert_eq!(state.parts()[0].last_refill_nanos, 10 * SECOND);

        refill(&mut state, &config, 35 * SECOND);
        assert_eq!(state.parts()[0].tokens, 90);
        assert_eq!(state.parts()[0].last_refill_nanos, 30 * SECOND);
    }

    #[test]
    fn test_backwards_time_is_zero_elapsed() {
        let config = config_of(vec![Bandwidth::simple(10, Duration::from_secs(1)).unwrap()]);
        let mut state = drained(&config, 5 * SECOND);

        refill(&mut state, &config, 2 * SECOND);
        assert_eq!(state.parts()[0].tokens, 0);
        assert_eq!(state.parts()[0].last_refill_nanos, 5 * SECOND);
    }

    #[test]
    fn test_refill_across_clock_wrap() {
        // The same half-second-before-wrap schedule must behave like one
        // starting at zero.
        let config = config_of(vec![Bandwidth::simple(10, Duration::from_secs(1)).unwrap()]);
        let start = u64::MAX - SECOND / 2;
        let mut state = drained(&config, start);

        refill(&mut state, &config, start.wrapping_add(SECOND));
        assert_eq!(state.parts()[0].tokens, 10);
    }

    #[test]
    fn test_try_consume_all_or_nothing() {
        let config = config_of(vec![
            Bandwidth::simple(10, Duration::from_secs(1)).unwrap(),
            Bandwidth::simple(5, Duration::from_secs(1)).unwrap(),
        ]);
        let mut state = BucketState::initial(&config, 0);

        assert!(!try_consume(&mut state, &config, 0, 6));
        // Failure debits nothing on any bandwidth.
        assert_eq!(state.parts()[0].tokens, 10);
        assert_eq!(state.parts()[1].tokens, 5);

        assert!(try_consume(&mut state, &config, 0, 5));
        assert_eq!(state.parts()[0].tokens, 5);
        assert_eq!(state.parts()[1].tokens, 0);
    }

    #[test]
    fn test_consume_as_much_as_possible_bounded_by_strictest() {
        let config = config_of(vec![
            Bandwidth::simple(10, Duration::from_secs(1)).unwrap(),
            Bandwidth::simple(4, Duration::from_secs(1)).unwrap(),
        ]);
        let mut state = BucketState::initial(&config, 0);

        assert_eq!(consume_as_much_as_possible(&mut state, &config, 0, 100), 4);
        assert_eq!(state.parts()[0].tokens, 6);
        assert_eq!(state.parts()[1].tokens, 0);
        assert_eq!(consume_as_much_as_possible(&mut state, &config, 0, 100), 0);
    }

    #[test]
    fn test_reserve_wait_matches_deficit() {
        // 10 tokens per 10 seconds, drained: 3 tokens are 3 seconds away,
        // and a second reservation queues behind the first.
        let config =
            config_of(vec![Bandwidth::simple(10, Duration::from_secs(10)).unwrap()]);
        let mut state = drained(&config, 0);

        assert_eq!(
            reserve(&mut state, &config, 0, 3, u64::MAX),
            Reservation::Wait(3 * SECOND)
        );
        assert_eq!(state.parts()[0].tokens, -3);

        assert_eq!(
            reserve(&mut state, &config, 0, 3, u64::MAX),
            Reservation::Wait(6 * SECOND)
        );
        assert_eq!(state.parts()[0].tokens, -6);
    }

    #[test]
    fn test_reserve_counts_partial_progress() {
        let config =
            config_of(vec![Bandwidth::simple(10, Duration::from_secs(10)).unwrap()]);
        let mut state = drained(&config, 0);

        // Half a second into the first token: only half a second remains.
        assert_eq!(
            reserve(&mut state, &config, SECOND / 2, 1, u64::MAX),
            Reservation::Wait(SECOND / 2)
        );
    }

    #[test]
    fn test_reserve_rejects_beyond_deadline() {
        let config =
            config_of(vec![Bandwidth::simple(10, Duration::from_secs(10)).unwrap()]);
        let mut state = drained(&config, 0);

        assert_eq!(
            reserve(&mut state, &config, 0, 3, 2 * SECOND),
            Reservation::Rejected
        );
        assert_eq!(state.parts()[0].tokens, 0);
    }

    #[test]
    fn test_reserve_rejects_beyond_capacity() {
        let config = config_of(vec![
            Bandwidth::simple(100, Duration::from_secs(1)).unwrap(),
            Bandwidth::simple(10, Duration::from_secs(1)).unwrap(),
        ]);
        let mut state = BucketState::initial(&config, 0);

        assert_eq!(
            reserve(&mut state, &config, 0, 11, u64::MAX),
            Reservation::Rejected
        );
        assert_eq!(state.parts()[0].tokens, 100);
        assert_eq!(state.parts()[1].tokens, 10);
    }

    #[test]
    fn test_reserve_intervally_waits_for_boundary() {
        let config = config_of(vec![Bandwidth::new(100, Duration::from_secs(10), 30)
            .unwrap()
            .intervally()]);
        let mut state = drained(&config, 0);

        // One token still needs a full period burst; 40 tokens need two.
        assert_eq!(
            reserve(&mut state, &config, 3 * SECOND, 1, u64::MAX),
            Reservation::Wait(7 * SECOND)
        );
        assert_eq!(
            reserve(&mut state, &config, 3 * SECOND, 40, u64::MAX),
            Reservation::Wait(17 * SECOND)
        );
    }

    #[test]
    fn test_reserve_wait_is_max_across_bandwidths() {
        let config = config_of(vec![
            Bandwidth::simple(10, Duration::from_secs(10)).unwrap(),
            Bandwidth::simple(10, Duration::from_secs(100)).unwrap(),
        ]);
        let mut state = drained(&config, 0);

        // The slower bandwidth dominates: 2 tokens at 1 per 10s.
        assert_eq!(
            reserve(&mut state, &config, 0, 2, u64::MAX),
            Reservation::Wait(20 * SECOND)
        );
    }

    #[test]
    fn test_add_tokens_caps_at_capacity() {
        let config = config_of(vec![
            Bandwidth::simple(10, Duration::from_secs(1)).unwrap(),
            Bandwidth::simple(50, Duration::from_secs(1)).unwrap(),
        ]);
        let mut state = drained(&config, 0);
        state.parts_mut()[1].tokens = 45;

        add_tokens(&mut state, &config, 0, 8);
        assert_eq!(state.parts()[0].tokens, 8);
        assert_eq!(state.parts()[1].tokens, 50);
    }

    #[test]
    fn test_add_tokens_pays_down_reservation_debt() {
        let config =
            config_of(vec![Bandwidth::simple(10, Duration::from_secs(10)).unwrap()]);
        let mut state = drained(&config, 0);
        reserve(&mut state, &config, 0, 5, u64::MAX);
        assert_eq!(state.parts()[0].tokens, -5);

        add_tokens(&mut state, &config, 0, 3);
        assert_eq!(state.parts()[0].tokens, -2);
    }

    #[test]
    fn test_no_gift_over_window() {
        // Total consumption over any window never exceeds the initial
        // tokens plus what the window refilled.
        let config =
            config_of(vec![Bandwidth::simple(10, Duration::from_secs(10)).unwrap()]);
        let mut state = BucketState::initial(&config, 0);

        let mut consumed = 0i64;
        for tick in 0..100u64 {
            let now = tick * SECOND / 2;
            if try_consume(&mut state, &config, now, 1) {
                consumed += 1;
            }
        }
        // 49.5 elapsed seconds at 1 token/s plus the 10 initial tokens.
        assert!(consumed <= 10 + 49);
    }
}
