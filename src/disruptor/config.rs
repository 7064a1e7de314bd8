//! Ring buffer configuration
//!
//! A serialisable description of a ring buffer: its capacity and the
//! strategies to build it with. Missing fields fall back to their defaults,
//! so `{}` is a valid configuration.

use crate::disruptor::{
    is_power_of_two, ClaimStrategyKind, ClaimStrategyOption, DisruptorError, Result,
    WaitStrategyKind, WaitStrategyOption, YieldingStrategy,
};
use serde::{Deserialize, Serialize};

fn default_capacity() -> usize {
    1024
}

fn default_yield_spin_tries() -> u32 {
    YieldingStrategy::DEFAULT_SPIN_TRIES
}

/// Settings for building a [`RingBuffer`](crate::disruptor::RingBuffer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingBufferConfig {
    /// Number of slots, must be a power of 2
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub claim_strategy: ClaimStrategyOption,
    #[serde(default)]
    pub wait_strategy: WaitStrategyOption,
    /// Spins before yielding, used by the yielding wait strategy only
    #[serde(default = "default_yield_spin_tries")]
    pub yield_spin_tries: u32,
}

impl Default for RingBufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            claim_strategy: ClaimStrategyOption::default(),
            wait_strategy: WaitStrategyOption::default(),
            yield_spin_tries: default_yield_spin_tries(),
        }
    }
}

impl RingBufferConfig {
    /// Parse and validate a JSON configuration
    ///
    /// # Errors
    /// Returns `DisruptorError::Config` for malformed JSON and the
    /// validation error otherwise
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration describes a buildable ring
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` for a capacity that is not
    /// a power of 2 and `DisruptorError::InvalidConfig` for a yielding
    /// strategy with no spin tries
    pub fn validate(&self) -> Result<()> {
        if !is_power_of_two(self.capacity) {
            return Err(DisruptorError::InvalidBufferSize(self.capacity));
        }
        if self.wait_strategy == WaitStrategyOption::Yielding && self.yield_spin_tries == 0 {
            return Err(DisruptorError::InvalidConfig(
                "yield_spin_tries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the configured claim strategy
    pub fn claim_strategy(&self) -> ClaimStrategyKind {
        self.claim_strategy.new_instance(self.capacity)
    }

    /// Build the configured wait strategy
    pub fn wait_strategy(&self) -> WaitStrategyKind {
        match self.wait_strategy {
            WaitStrategyOption::Yielding => WaitStrategyKind::Yielding(
                YieldingStrategy::with_spin_tries(self.yield_spin_tries),
            ),
            option => option.new_instance(),
        }
    }
}
