use thiserror::Error;

use crate::schema::{Finger, Side};

#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    /// Finger chains must have the same length on both rigs; a mismatch is a
    /// preset/configuration error, never silently truncated.
    #[error(
        "{side:?} {finger:?} chain length mismatch: {source_bones} source bones vs {target} target bones"
    )]
    FingerChainMismatch {
        side: Side,
        finger: Finger,
        source_bones: usize,
        target: usize,
    },
}
