//! Configuration types for billing clients and the retry service.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::{IapError, Result};

/// Backoff schedule between retry attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles after each attempt, capped at `max_delay_ms`.
    #[default]
    Exponential,
}

/// Configuration for the retry service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for any single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default)]
    pub strategy: BackoffStrategy,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    4_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            strategy: BackoffStrategy::default(),
        }
    }
}

impl RetryConfig {
    /// Set the attempt budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the base delay.
    pub fn with_base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Set the backoff strategy.
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Check the values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(IapError::Config("max_attempts must be at least 1".into()));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(IapError::Config(format!(
                "max_delay_ms ({}) is below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        Ok(())
    }

    /// Build the retry policy described by this config.
    pub fn to_policy(&self) -> RetryPolicy {
        let base = Duration::from_millis(self.base_delay_ms);
        let max = Duration::from_millis(self.max_delay_ms);
        match self.strategy {
            BackoffStrategy::Fixed => RetryPolicy::fixed(self.max_attempts, base),
            BackoffStrategy::Exponential => RetryPolicy::exponential(self.max_attempts, base, max),
        }
    }
}

/// Configuration for a billing client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Buffered purchase updates per subscriber before the oldest are dropped.
    #[serde(default = "default_purchase_update_capacity")]
    pub purchase_update_capacity: usize,

    /// Buffered state transitions per subscriber.
    #[serde(default = "default_transition_capacity")]
    pub transition_capacity: usize,
}

fn default_purchase_update_capacity() -> usize {
    64
}

fn default_transition_capacity() -> usize {
    32
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            purchase_update_capacity: default_purchase_update_capacity(),
            transition_capacity: default_transition_capacity(),
        }
    }
}

impl ClientConfig {
    pub fn with_purchase_update_capacity(mut self, capacity: usize) -> Self {
        self.purchase_update_capacity = capacity;
        self
    }

    pub fn with_transition_capacity(mut self, capacity: usize) -> Self {
        self.transition_capacity = capacity;
        self
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IapConfig {
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

impl IapConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.retry.validate()?;
        Ok(config)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }
}
