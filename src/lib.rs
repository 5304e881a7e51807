#![allow(async_fn_in_trait)]
pub mod clms;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod http;
pub mod logger;
pub mod paginator;
pub mod placement;
pub mod zenodo;

pub use error::{Error, Result};
