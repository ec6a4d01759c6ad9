#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![forbid(unsafe_code)]

mod auth;
mod builder;
mod config;
pub mod error;
mod rbac;

pub use auth::*;
pub use builder::*;
pub use config::*;
pub use error::{Error, Result};
pub use rbac::*;
