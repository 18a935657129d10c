mod bind_error;
mod host_error;
mod mapping_error;
mod rebase_error;

pub use bind_error::*;
pub use host_error::*;
pub use mapping_error::*;
pub use rebase_error::*;
