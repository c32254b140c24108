#![forbid(unsafe_code)]

pub mod build;
pub mod chapter;
pub mod cli;
pub mod config;
pub mod deliver;
pub mod epub;
pub mod error;
pub mod filter;
pub mod formats;
pub mod logging;
pub mod omnivore;
pub mod sanitize;
