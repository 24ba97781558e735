#[macro_use]
extern crate lazy_static;

pub mod chain;
pub mod config;
pub mod constants;
pub mod decode;
pub mod deploy;
pub mod infra;
pub mod logging;
pub mod messages;
pub mod query;
