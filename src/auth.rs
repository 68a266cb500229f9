//! Authorization-domain identity models: principals and bearer token payloads.

pub mod principal;
pub mod token;

pub use principal::*;
pub use token::*;
