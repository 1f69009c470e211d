//! Versioned register values layered above consensus.
//!
//! Consensus only sees opaque bytes. This layer stores a [`Versioned`] value
//! and provides change functions for [`Proposer::propose`]: each reads the
//! value committed so far and derives the next one, refusing with
//! [`ChangeRejected`] when the caller's expectation no longer holds.
//!
//! [`Proposer::propose`]: crate::proposer::Proposer::propose
use crate::error::ChangeRejected;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Replicated mutable value register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// Number of successful writes before this one
    pub version: u64,
    pub value: T,
}

impl<T> Versioned<T> {
    pub fn new(version: u64, value: T) -> Versioned<T> {
        Versioned { version, value }
    }
}

pub fn encode<T: Serialize>(v: &Versioned<T>) -> Result<Bytes, ChangeRejected> {
    bincode::serialize(v)
        .map(Bytes::from)
        .map_err(|e| ChangeRejected::new(format!("unencodable value: {}", e)))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<Versioned<T>, ChangeRejected> {
    bincode::deserialize(bytes).map_err(|e| ChangeRejected::new(format!("undecodable value: {}", e)))
}

/// Decodes an optional committed value, as returned by reads.
pub fn decode_opt<T: DeserializeOwned>(
    bytes: Option<&Bytes>,
) -> Result<Option<Versioned<T>>, ChangeRejected> {
    bytes.map(|b| decode(b)).transpose()
}

/// Change that sets version 0 of an empty register.
pub fn initialize<T: Serialize>(
    value: T,
) -> impl FnOnce(Option<&Bytes>) -> Result<Bytes, ChangeRejected> {
    move |current| match current {
        Some(_) => Err(ChangeRejected::new("register already initialized")),
        None => encode(&Versioned::new(0, value)),
    }
}

/// Change that replaces the value only if the committed version is still
/// `version`.
pub fn write_if<T>(
    version: u64,
    value: T,
) -> impl FnOnce(Option<&Bytes>) -> Result<Bytes, ChangeRejected>
where
    T: Serialize + DeserializeOwned,
{
    move |current| {
        let current: Versioned<T> = match current {
            Some(bytes) => decode(bytes)?,
            None => return Err(ChangeRejected::new("register is not initialized")),
        };
        if current.version != version {
            return Err(ChangeRejected::new(format!(
                "expected version {}, found {}",
                version, current.version
            )));
        }
        encode(&Versioned::new(version + 1, value))
    }
}

/// Change that derives the next value from the current one, if any.
pub fn update<T, F>(f: F) -> impl FnOnce(Option<&Bytes>) -> Result<Bytes, ChangeRejected>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce(Option<T>) -> T,
{
    move |current| {
        let next = match decode_opt::<T>(current)? {
            Some(v) => Versioned::new(v.version + 1, f(Some(v.value))),
            None => Versioned::new(0, f(None)),
        };
        encode(&next)
    }
}
