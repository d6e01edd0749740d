use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::Error;

const DEFAULT_FIXED_BACKOFF: Duration = Duration::from_secs(1);

/// Decides how long a worker waits after a failed attempt.
///
/// Every strategy is a pure function of the zero-based retry index.
#[derive(Clone)]
pub enum Backoff {
    /// Always the same wait.
    Fixed(Duration),
    /// `retry` seconds.
    Linear,
    /// `2^retry` seconds.
    Exponential,
    /// Linear, shifted by up to +/-33%.
    LinearJitter,
    /// Exponential, shifted by up to +/-33%.
    ExponentialJitter,
    /// Caller supplied strategy.
    Custom(Arc<dyn Fn(usize) -> Duration + Send + Sync>),
}

impl Backoff {
    pub fn custom<F>(strategy: F) -> Self
    where
        F: Fn(usize) -> Duration + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(strategy))
    }

    /// Returns the wait that follows the failed attempt `retry`.
    pub fn duration(&self, retry: usize) -> Duration {
        match self {
            Self::Fixed(wait) => *wait,
            Self::Linear => Duration::from_secs(linear_secs(retry)),
            Self::Exponential => Duration::from_secs(exponential_secs(retry)),
            Self::LinearJitter => jitter(linear_secs(retry)),
            Self::ExponentialJitter => jitter(exponential_secs(retry)),
            Self::Custom(strategy) => strategy(retry),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Fixed(DEFAULT_FIXED_BACKOFF)
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(wait) => f.debug_tuple("Fixed").field(wait).finish(),
            Self::Linear => f.write_str("Linear"),
            Self::Exponential => f.write_str("Exponential"),
            Self::LinearJitter => f.write_str("LinearJitter"),
            Self::ExponentialJitter => f.write_str("ExponentialJitter"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Parses `fixed`, `fixed:<millis>`, `linear`, `exponential`,
/// `linear-jitter` and `exponential-jitter`.
impl FromStr for Backoff {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "fixed" => Ok(Self::default()),
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            "linear-jitter" => Ok(Self::LinearJitter),
            "exponential-jitter" => Ok(Self::ExponentialJitter),
            other => {
                let millis = other
                    .strip_prefix("fixed:")
                    .ok_or_else(|| Error::Config(format!("unknown backoff strategy '{other}'")))?;
                let millis = millis
                    .trim()
                    .trim_end_matches("ms")
                    .parse::<u64>()
                    .map_err(|err| {
                        Error::Config(format!("invalid fixed backoff '{other}': {err}"))
                    })?;
                Ok(Self::Fixed(Duration::from_millis(millis)))
            }
        }
    }
}

fn linear_secs(retry: usize) -> u64 {
    u64::try_from(retry).unwrap_or(u64::MAX)
}

fn exponential_secs(retry: usize) -> u64 {
    let exp = u32::try_from(retry).unwrap_or(u32::MAX);
    2u64.saturating_pow(exp)
}

/// Moves `secs` up or down by a uniform amount of at most a third.
///
/// Never returns zero: the result is clamped to one millisecond.
fn jitter(secs: u64) -> Duration {
    let mut ms = secs.saturating_mul(1000);
    let max_jitter = ms / 3;

    let mut rng = rand::thread_rng();
    let shift = rng.gen_range(0..=max_jitter);
    if rng.gen_bool(0.5) {
        ms = ms.saturating_add(shift);
    } else {
        ms = ms.saturating_sub(shift);
    }

    Duration::from_millis(ms.max(1))
}
