use crate::clock::Nanos;

/// Outcome of [`TokenBucket::try_consume_and_return_remaining`](crate::TokenBucket::try_consume_and_return_remaining).
///
/// Reports whether the tokens were consumed, the tokens left afterwards and,
/// when rejected, how long to wait before the same request could succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumptionProbe {
    consumed: bool,
    remaining_tokens: i64,
    nanos_to_wait_for_refill: Nanos,
}

impl ConsumptionProbe {
    pub(crate) fn consumed(remaining_tokens: i64) -> Self {
        Self {
            consumed: true,
            remaining_tokens,
            nanos_to_wait_for_refill: Nanos::ZERO,
        }
    }

    pub(crate) fn rejected(remaining_tokens: i64, nanos_to_wait_for_refill: Nanos) -> Self {
        Self {
            consumed: false,
            remaining_tokens,
            nanos_to_wait_for_refill,
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Tokens left in the bucket. Negative while a reservation is being repaid.
    pub fn remaining_tokens(&self) -> i64 {
        self.remaining_tokens
    }

    /// Zero when consumed; [`Nanos::INFINITE`] if the request can never succeed.
    pub fn nanos_to_wait_for_refill(&self) -> Nanos {
        self.nanos_to_wait_for_refill
    }
}
