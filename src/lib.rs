//! Rust implementation of a Paxos register with per-key single-decree
//! consensus, driven by a deterministic simulation.
//!
//! Every key is an independent Paxos instance. Writes are change functions
//! applied to the value committed so far, so a register behaves like a
//! compare-and-set cell. Proposers use configurable read and write quorums
//! and a versioned membership view, which lets acceptors be introduced while
//! clients keep writing.
//!
//! All timing, randomness and message delivery go through a [`SimContext`]:
//! the same seed yields the same schedule, the same network faults and the
//! same results.
//!
//! # Examples
//!
//! ```rust
//! use paxos_register::{
//!     register, Acceptor, Chain, Membership, Network, Proposer, ProposerConfig, Quorum,
//!     ShufflingProxy, SimConfig, SimContext,
//! };
//!
//! let ctx = SimContext::new(SimConfig::new(7, 1000));
//! let chain = Chain::new().with(ShufflingProxy::new(ctx.clone(), 3, 10));
//! let network = Network::new(ctx.clone(), chain);
//! for id in 0..3 {
//!     network.register(Acceptor::new(id));
//! }
//!
//! let membership = Membership::new(vec![0, 1, 2]).unwrap();
//! let config = ProposerConfig::new(100, 0, Quorum::new(2, 2), membership);
//! let proposer = Proposer::new(config, network).unwrap();
//!
//! ctx.timer().start();
//! let value = ctx
//!     .block_on(async move {
//!         let inc = |v: Option<u64>| v.map_or(1, |x| x + 1);
//!         proposer.propose("counter", register::update(inc)).await.unwrap();
//!         proposer.propose("counter", register::update(inc)).await.unwrap();
//!         proposer.read("counter").await.unwrap().value
//!     })
//!     .unwrap();
//!
//! let value = register::decode::<u64>(&value.unwrap()).unwrap();
//! assert_eq!((value.version, value.value), (1, 2));
//! ```
pub mod acceptor;
pub mod ballot;
pub mod config;
pub mod error;
pub mod membership;
pub mod messages;
pub mod network;
pub mod proposer;
pub mod quorum;
pub mod register;
pub mod retry;
pub mod session;
pub mod sim;

pub use crate::acceptor::Acceptor;
pub use crate::ballot::{Ballot, NodeId};
pub use crate::config::{ProposerConfig, SimConfig};
pub use crate::error::{
    ChangeRejected, ConfigError, ErrorKind, Fatal, ProposeError, Recoverable, SimError,
};
pub use crate::membership::{transition_is_safe, Membership};
pub use crate::messages::{Envelope, Key, Request, Response, RoundId};
pub use crate::network::{
    Chain, LoggingProxy, LossyProxy, Network, Proxy, Recorder, ShufflingProxy,
};
pub use crate::proposer::{Committed, ProposalResult, Proposer, ProposerSet, RoundState};
pub use crate::quorum::Quorum;
pub use crate::retry::Backoff;
pub use crate::session::{CommitEvent, CommitKind, CommitObserver, History, Session};
pub use crate::sim::{JoinHandle, SimContext, Ticks, Timer};
