use thiserror::Error;

use super::HostError;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BindError {
    /// The fit-height reference bone sits at zero height; scaling would
    /// divide by zero.
    #[error("reference bone `{0}` has zero world height, cannot fit target scale")]
    DegenerateHeight(String),
    #[error("root motion bone `{0}` not found in target armature")]
    RootBoneMissing(String),
    #[error(transparent)]
    Host(#[from] HostError),
}
