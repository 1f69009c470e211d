use crate::ballot::NodeId;
use crate::error::ConfigError;
use crate::membership::Membership;
use crate::quorum::Quorum;
use crate::sim::Ticks;
use std::env;

/// Seed used when none is configured
pub const DEFAULT_SEED: u64 = 0;
/// Upper bound on random client pauses
pub const DEFAULT_MAX_TIME_DELAY: Ticks = 1000;
/// Deadline of each proposal phase
pub const DEFAULT_PHASE_TIMEOUT: Ticks = 100;
/// Environment variable overriding the simulation seed
pub const SEED_ENV: &str = "PAXOS_SIM_SEED";

/// Parameters of a simulated world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// Seed of the random number generator driving every draw
    pub seed: u64,
    /// Upper bound (exclusive) of `random_delay`
    pub max_time_delay: Ticks,
}

impl SimConfig {
    pub fn new(seed: u64, max_time_delay: Ticks) -> SimConfig {
        SimConfig {
            seed,
            max_time_delay,
        }
    }

    /// Reads the seed from `PAXOS_SIM_SEED`, falling back to
    /// [`DEFAULT_SEED`] when the variable is unset.
    pub fn from_env() -> Result<SimConfig, ConfigError> {
        let seed = match env::var(SEED_ENV) {
            Ok(v) => parse_seed(&v)?,
            Err(_) => DEFAULT_SEED,
        };
        Ok(SimConfig::new(seed, DEFAULT_MAX_TIME_DELAY))
    }

    pub fn with_seed(mut self, seed: u64) -> SimConfig {
        self.seed = seed;
        self
    }
}

impl Default for SimConfig {
    fn default() -> SimConfig {
        SimConfig::new(DEFAULT_SEED, DEFAULT_MAX_TIME_DELAY)
    }
}

fn parse_seed(v: &str) -> Result<u64, ConfigError> {
    v.trim().parse().map_err(|_| ConfigError::Env {
        var: SEED_ENV,
        value: v.to_string(),
    })
}

/// Immutable parameters of a proposer.
///
/// A proposer is bound to one membership snapshot. Reconfiguration builds a
/// new configuration (and new proposers) rather than mutating this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposerConfig {
    /// Identifier used as the tie breaking component of ballots
    pub pid: NodeId,
    /// Initial ballot counter, distinguishes proposer generations
    pub pidtime: u64,
    pub quorum: Quorum,
    pub membership: Membership,
    /// Deadline of each phase in ticks
    pub timeout: Ticks,
}

impl ProposerConfig {
    pub fn new(pid: NodeId, pidtime: u64, quorum: Quorum, membership: Membership) -> ProposerConfig {
        ProposerConfig {
            pid,
            pidtime,
            quorum,
            membership,
            timeout: DEFAULT_PHASE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Ticks) -> ProposerConfig {
        self.timeout = timeout;
        self
    }

    /// Checks the quorum against the membership and the phase deadline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout == 0 {
            return Err(ConfigError::Timeout);
        }
        self.quorum.validate(&self.membership)
    }
}
