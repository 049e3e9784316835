use crate::clock::Nanos;
use crate::config::Bandwidth;

/// Token balance of a single bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandwidthState {
    tokens: i64,
    last_refill_nanos: u64,
    // refill accrued in token·nanos that has not yet added up to a whole token
    rounding_error: u64,
}

impl BandwidthState {
    fn new(bandwidth: &Bandwidth, now: u64) -> Self {
        let tokens = i64::try_from(bandwidth.initial_tokens()).unwrap_or(i64::MAX);
        Self {
            tokens: tokens.min(bandwidth.capacity_tokens()),
            last_refill_nanos: now,
            rounding_error: 0,
        }
    }

    /// Current balance; negative while a reservation is being repaid.
    pub fn tokens(&self) -> i64 {
        self.tokens
    }

    pub fn last_refill_nanos(&self) -> u64 {
        self.last_refill_nanos
    }

    fn refill(&mut self, bandwidth: &Bandwidth, now: u64) {
        let elapsed = now.saturating_sub(self.last_refill_nanos);
        self.last_refill_nanos = self.last_refill_nanos.max(now);

        let capacity = bandwidth.capacity_tokens();
        if self.tokens >= capacity {
            self.fill_to(capacity);
            return;
        }
        if elapsed == 0 || bandwidth.refill_tokens() == 0 {
            return;
        }

        let period = u128::from(bandwidth.refill_period_nanos());
        let accrued = u128::from(elapsed) * u128::from(bandwidth.refill_tokens())
            + u128::from(self.rounding_error);
        let whole_tokens = accrued / period;
        // positive since tokens < capacity
        let room = (i128::from(capacity) - i128::from(self.tokens)) as u128;
        if whole_tokens >= room {
            self.fill_to(capacity);
        } else {
            // whole_tokens < room, so the sum stays below capacity even when
            // whole_tokens alone does not fit an i64
            let tokens = i128::from(self.tokens) + whole_tokens as i128;
            self.tokens = i64::try_from(tokens).unwrap_or(capacity);
            self.rounding_error = (accrued % period) as u64;
        }
    }

    fn fill_to(&mut self, capacity: i64) {
        self.tokens = capacity;
        self.rounding_error = 0;
    }

    fn add_tokens(&mut self, bandwidth: &Bandwidth, tokens: i64) {
        let capacity = bandwidth.capacity_tokens();
        let tokens = self.tokens.saturating_add(tokens);
        if tokens >= capacity {
            self.fill_to(capacity);
        } else {
            self.tokens = tokens;
        }
    }

    fn delay_nanos_until_available(&self, bandwidth: &Bandwidth, tokens: i64) -> Nanos {
        if self.tokens >= tokens {
            return Nanos::ZERO;
        }
        if bandwidth.refill_tokens() == 0 {
            return Nanos::INFINITE;
        }
        let deficit = (i128::from(tokens) - i128::from(self.tokens)) as u128;
        let period = u128::from(bandwidth.refill_period_nanos());
        match deficit.checked_mul(period) {
            Some(needed) => {
                let needed = needed.saturating_sub(u128::from(self.rounding_error));
                Nanos::from_u128_saturating(needed.div_ceil(u128::from(bandwidth.refill_tokens())))
            }
            None => Nanos::INFINITE,
        }
    }
}

/// The token ledger: one [`BandwidthState`] per configured bandwidth.
///
/// Every operation takes the bandwidths it applies to, paired positionally
/// with the slots, so the ledger itself stores no configuration. Mutating
/// operations apply to all slots alike so that the scarcest bandwidth always
/// governs what can be consumed.
#[derive(Debug, PartialEq, Eq)]
pub struct BucketState {
    bandwidths: Vec<BandwidthState>,
}

impl Clone for BucketState {
    fn clone(&self) -> Self {
        Self {
            bandwidths: self.bandwidths.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.copy_from(source);
    }
}

impl BucketState {
    /// A ledger seeded with each bandwidth's initial tokens at `now`.
    pub fn new(bandwidths: &[Bandwidth], now: u64) -> Self {
        Self {
            bandwidths: bandwidths
                .iter()
                .map(|bandwidth| BandwidthState::new(bandwidth, now))
                .collect(),
        }
    }

    pub fn bandwidths(&self) -> &[BandwidthState] {
        &self.bandwidths
    }

    /// Overwrites this ledger with `other`, reusing the slot storage.
    pub fn copy_from(&mut self, other: &BucketState) {
        if self.bandwidths.len() == other.bandwidths.len() {
            self.bandwidths.copy_from_slice(&other.bandwidths);
        } else {
            self.bandwidths.clear();
            self.bandwidths.extend_from_slice(&other.bandwidths);
        }
    }

    /// Applies the refill accrued between each slot's last refill and `now`.
    pub fn refill_all(&mut self, bandwidths: &[Bandwidth], now: u64) {
        for (state, bandwidth) in self.bandwidths.iter_mut().zip(bandwidths) {
            state.refill(bandwidth, now);
        }
    }

    /// The smallest balance across all bandwidths. Negative while in debt.
    pub fn available_tokens(&self) -> i64 {
        self.bandwidths
            .iter()
            .map(BandwidthState::tokens)
            .min()
            .unwrap_or(0)
    }

    /// Subtracts `tokens` from every bandwidth, possibly going into debt.
    pub fn consume(&mut self, tokens: i64) {
        for state in &mut self.bandwidths {
            state.tokens = state.tokens.saturating_sub(tokens);
        }
    }

    /// Adds `tokens` to every bandwidth, capped at each capacity.
    pub fn add_tokens(&mut self, bandwidths: &[Bandwidth], tokens: i64) {
        for (state, bandwidth) in self.bandwidths.iter_mut().zip(bandwidths) {
            state.add_tokens(bandwidth, tokens);
        }
    }

    /// How long until every bandwidth holds at least `tokens`.
    ///
    /// A request above a capacity is measured against the balance, not the
    /// capacity, so it waits out the deficit like any other. [`Nanos::INFINITE`]
    /// only when a bandwidth short of `tokens` never refills.
    pub fn delay_nanos_until_available(&self, bandwidths: &[Bandwidth], tokens: i64) -> Nanos {
        self.bandwidths
            .iter()
            .zip(bandwidths)
            .map(|(state, bandwidth)| state.delay_nanos_until_available(bandwidth, tokens))
            .max()
            .unwrap_or(Nanos::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;
    use std::time::Duration;

    use nonzero_ext::nonzero;

    use super::*;

    const SECOND: u64 = 1_000_000_000;
    const MILLI: u64 = 1_000_000;

    fn ten_per_second() -> Bandwidth {
        Bandwidth::per_second(nonzero!(10u64))
    }

    #[test]
    fn starts_with_initial_tokens() {
        let bandwidths = [
            ten_per_second(),
            Bandwidth::per_second(nonzero!(1u64))
                .with_capacity(nonzero!(100u64))
                .with_initial_tokens(7),
        ];
        let state = BucketState::new(&bandwidths, 42);
        assert_eq!(10, state.bandwidths()[0].tokens());
        assert_eq!(7, state.bandwidths()[1].tokens());
        assert_eq!(42, state.bandwidths()[1].last_refill_nanos());
        assert_eq!(7, state.available_tokens());
    }

    #[test]
    fn refill_caps_at_capacity() {
        let bandwidths = [ten_per_second().with_initial_tokens(0)];
        let mut state = BucketState::new(&bandwidths, 0);
        state.refill_all(&bandwidths, 500 * MILLI);
        assert_eq!(5, state.available_tokens());
        state.refill_all(&bandwidths, 10 * SECOND);
        assert_eq!(10, state.available_tokens());
        assert_eq!(10 * SECOND, state.bandwidths()[0].last_refill_nanos());
    }

    #[test]
    fn frequent_refills_do_not_leak_tokens() {
        // 3 tokens per second does not divide a millisecond evenly
        let bandwidths = [Bandwidth::per_second(nonzero!(3u64))
            .with_capacity(nonzero!(1000u64))
            .with_initial_tokens(0)];
        let mut polled = BucketState::new(&bandwidths, 0);
        for step in 1..=10_000u64 {
            polled.refill_all(&bandwidths, step * MILLI);
        }
        let mut once = BucketState::new(&bandwidths, 0);
        once.refill_all(&bandwidths, 10 * SECOND);

        assert_eq!(30, once.available_tokens());
        assert_eq!(polled, once);
    }

    #[test]
    fn clock_going_backwards_does_not_refill() {
        let bandwidths = [ten_per_second().with_initial_tokens(0)];
        let mut state = BucketState::new(&bandwidths, SECOND);
        state.refill_all(&bandwidths, 0);
        assert_eq!(0, state.available_tokens());
        assert_eq!(SECOND, state.bandwidths()[0].last_refill_nanos());
        state.refill_all(&bandwidths, SECOND + 100 * MILLI);
        assert_eq!(1, state.available_tokens());
    }

    #[test]
    fn consume_goes_into_debt() {
        let bandwidths = [ten_per_second()];
        let mut state = BucketState::new(&bandwidths, 0);
        state.consume(15);
        assert_eq!(-5, state.available_tokens());
        // repaying 5 tokens of debt takes half a second
        state.refill_all(&bandwidths, 500 * MILLI);
        assert_eq!(0, state.available_tokens());
    }

    #[test]
    fn scarcest_bandwidth_governs() {
        let bandwidths = [
            ten_per_second(),
            Bandwidth::per_second(nonzero!(1u64))
                .with_capacity(nonzero!(100u64))
                .with_initial_tokens(4),
        ];
        let mut state = BucketState::new(&bandwidths, 0);
        assert_eq!(4, state.available_tokens());
        state.consume(3);
        assert_eq!(7, state.bandwidths()[0].tokens());
        assert_eq!(1, state.bandwidths()[1].tokens());
        assert_eq!(1, state.available_tokens());
        // the slow bandwidth is one token short
        assert_eq!(
            Nanos::new(SECOND),
            state.delay_nanos_until_available(&bandwidths, 2)
        );
    }

    #[test]
    fn delay_until_available() {
        let bandwidths = [ten_per_second().with_initial_tokens(0)];
        let mut state = BucketState::new(&bandwidths, 0);
        assert_eq!(
            Nanos::new(500 * MILLI),
            state.delay_nanos_until_available(&bandwidths, 5)
        );
        // a partially accrued token shortens the wait
        state.refill_all(&bandwidths, 50 * MILLI);
        assert_eq!(0, state.available_tokens());
        assert_eq!(
            Nanos::new(450 * MILLI),
            state.delay_nanos_until_available(&bandwidths, 5)
        );
        state.refill_all(&bandwidths, 500 * MILLI);
        assert_eq!(Nanos::ZERO, state.delay_nanos_until_available(&bandwidths, 5));
        // above capacity is still a finite deficit
        assert_eq!(
            Nanos::new(600 * MILLI),
            state.delay_nanos_until_available(&bandwidths, 11)
        );
    }

    #[test]
    fn delay_rounds_up() {
        let bandwidths = [Bandwidth::per_period(nonzero!(3u64), Duration::from_nanos(10))
            .with_initial_tokens(0)];
        let state = BucketState::new(&bandwidths, 0);
        // one token takes 3.33ns
        assert_eq!(
            Nanos::new(4),
            state.delay_nanos_until_available(&bandwidths, 1)
        );
    }

    #[test]
    fn non_refilling_bandwidth_never_catches_up() {
        let bandwidths = [
            ten_per_second(),
            Bandwidth::non_refilling(nonzero!(3u64)).with_initial_tokens(1),
        ];
        let mut state = BucketState::new(&bandwidths, 0);
        assert_eq!(Nanos::ZERO, state.delay_nanos_until_available(&bandwidths, 1));
        assert_eq!(
            Nanos::INFINITE,
            state.delay_nanos_until_available(&bandwidths, 2)
        );
        state.refill_all(&bandwidths, 100 * SECOND);
        assert_eq!(1, state.available_tokens());
    }

    #[test]
    fn add_tokens_caps_at_capacity() {
        let bandwidths = [
            ten_per_second().with_initial_tokens(0),
            Bandwidth::per_second(nonzero!(1u64))
                .with_capacity(nonzero!(100u64))
                .with_initial_tokens(0),
        ];
        let mut state = BucketState::new(&bandwidths, 0);
        state.add_tokens(&bandwidths, 25);
        assert_eq!(10, state.bandwidths()[0].tokens());
        assert_eq!(25, state.bandwidths()[1].tokens());
        assert_eq!(10, state.available_tokens());
    }

    #[test]
    fn carry_survives_a_bandwidth_swap() {
        let before = [ten_per_second().with_initial_tokens(0)];
        let mut state = BucketState::new(&before, 0);
        state.refill_all(&before, 850 * MILLI);
        assert_eq!(8, state.available_tokens());

        // same rate, more room: the half token accrued so far is kept
        let wider = [ten_per_second().with_capacity(nonzero!(20u64))];
        state.refill_all(&wider, 900 * MILLI);
        assert_eq!(9, state.available_tokens());

        // a balance above a smaller capacity is capped by the next refill
        let narrower = [ten_per_second().with_capacity(nonzero!(5u64))];
        state.refill_all(&narrower, 900 * MILLI);
        assert_eq!(5, state.available_tokens());
    }

    #[test]
    fn refill_out_of_deep_debt_near_the_limits() {
        // room above the balance exceeds i64::MAX, and so does one refill
        let bandwidths = [Bandwidth::per_period(
            NonZeroU64::new(i64::MAX as u64 + 10).unwrap(),
            Duration::from_nanos(1),
        )
        .with_capacity(NonZeroU64::MAX)
        .with_initial_tokens(0)];
        let mut state = BucketState::new(&bandwidths, 0);
        state.consume(i64::MAX);
        assert_eq!(-i64::MAX, state.available_tokens());

        state.refill_all(&bandwidths, 1);
        assert_eq!(10, state.available_tokens());
        state.refill_all(&bandwidths, 2);
        assert_eq!(i64::MAX, state.available_tokens());
    }

    #[test]
    fn copy_from_overwrites_values() {
        let bandwidths = [ten_per_second()];
        let source = BucketState::new(&bandwidths, 7);
        let mut target = BucketState::new(&bandwidths, 0);
        target.consume(4);
        target.copy_from(&source);
        assert_eq!(source, target);

        let mut copy = source.clone();
        copy.consume(1);
        assert_eq!(10, source.available_tokens());
        assert_eq!(9, copy.available_tokens());
    }
}
