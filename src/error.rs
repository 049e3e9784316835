/// A replacement configuration does not line up with the bandwidths the bucket
/// already tracks.
///
/// Bucket state is kept per bandwidth and paired positionally, so a new
/// configuration must describe the same number of bandwidths in the same
/// order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IncompatibleConfiguration {
    #[error(
        "the bucket tracks {previous} bandwidths but the new configuration has {requested}"
    )]
    BandwidthCount { previous: usize, requested: usize },
    #[error("bandwidth at position {position} changed identity from {previous:?} to {requested:?}")]
    BandwidthIdentity {
        position: usize,
        previous: String,
        requested: String,
    },
}

/// A bucket configuration that cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("at least one bandwidth is required")]
    NoBandwidths,
    #[error("bandwidth at position {position} has a zero refill period")]
    ZeroRefillPeriod { position: usize },
    #[error(
        "bandwidth at position {position} starts with {initial} tokens, above its capacity of {capacity}"
    )]
    InitialTokensExceedCapacity {
        position: usize,
        initial: u64,
        capacity: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_incompatible_configuration() {
        let err = IncompatibleConfiguration::BandwidthCount {
            previous: 2,
            requested: 1,
        };
        assert_eq!(
            "the bucket tracks 2 bandwidths but the new configuration has 1",
            err.to_string()
        );
        let err = IncompatibleConfiguration::BandwidthIdentity {
            position: 0,
            previous: "burst".to_owned(),
            requested: "sustained".to_owned(),
        };
        assert_eq!(
            "bandwidth at position 0 changed identity from \"burst\" to \"sustained\"",
            err.to_string()
        );
    }

    #[test]
    fn display_configuration_error() {
        let err = ConfigurationError::InitialTokensExceedCapacity {
            position: 1,
            initial: 11,
            capacity: 10,
        };
        assert_eq!(
            "bandwidth at position 1 starts with 11 tokens, above its capacity of 10",
            err.to_string()
        );
    }
}
