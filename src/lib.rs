#![warn(rust_2018_idioms)]

pub mod client;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod frame;
pub mod message;
pub mod session;
pub mod stream;

pub use client::{Client, Subscription};
pub use config::ClientConfig;
pub use error::{Error, Result};
