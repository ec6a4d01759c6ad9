mod call_credentials;
mod client_credentials;
mod interceptor;
mod token_cache;

pub use call_credentials::*;
pub use client_credentials::*;
pub use interceptor::*;
pub use token_cache::*;

use crate::error::{Error, Result};

/// Ensure a token can be carried in an ASCII authorization header.
pub(crate) fn require_ascii(s: &str) -> Result<()> {
    if s.is_ascii() {
        Ok(())
    } else {
        Err(Error::InvalidHeaderValue)
    }
}
