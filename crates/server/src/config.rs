use std::net::SocketAddr;
use std::time::Duration;

use rand::seq::IndexedRandom;
use rand::Rng;

use imock_api::CHAOS_STATUSES;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_CHAOS_PERCENT: u8 = 15;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Fault injection; `None` leaves every request untouched.
    pub chaos: Option<ChaosConfig>,
    pub cors: bool,
    pub max_body_bytes: usize,
    /// Slots in the request log broadcast; slow subscribers lag and skip.
    pub request_log_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            chaos: None,
            cors: true,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_log_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChaosConfig {
    fail_percent: u8,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// What chaos decided for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChaosRoll {
    pub delay: Duration,
    pub fault: Option<u16>,
}

impl ChaosConfig {
    /// `fail_percent` above 100 is clamped.
    pub fn new(fail_percent: u8) -> Self { Self { fail_percent: fail_percent.min(100), min_delay_ms: 50, max_delay_ms: 500 } }

    pub fn fail_percent(&self) -> u8 { self.fail_percent }

    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> ChaosRoll {
        let (lo, hi) = (self.min_delay_ms.min(self.max_delay_ms), self.max_delay_ms.max(self.min_delay_ms));
        let delay = Duration::from_millis(rng.random_range(lo..=hi));
        let fault = if rng.random_range(0u8..100) < self.fail_percent { CHAOS_STATUSES.choose(rng).copied() } else { None };
        ChaosRoll { delay, fault }
    }
}

impl Default for ChaosConfig {
    fn default() -> Self { Self::new(DEFAULT_CHAOS_PERCENT) }
}
