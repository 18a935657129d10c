use thiserror::Error;

/// Failures surfaced by a host accessor implementation.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("bone `{0}` not found")]
    BoneNotFound(String),
    #[error("bone `{0}` already exists")]
    DuplicateBone(String),
    #[error("bone collection `{0}` not found")]
    CollectionNotFound(String),
}
