use thiserror::Error;

use super::HostError;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RebaseError {
    #[error("motion bone `{0}` not found")]
    MotionBoneMissing(String),
    #[error("root motion bone `{0}` not found")]
    TargetBoneMissing(String),
    #[error("`{0}` has no keyed action, nothing to rebase")]
    NoAction(String),
    #[error("hips bone `{0}` not found, cannot add a root bone")]
    HipsMissing(String),
    #[error(transparent)]
    Host(#[from] HostError),
}
