//! Core types and operations of the cross-posting bot.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage is reached through [`store::BotStore`], platforms through
//! [`platform::Publisher`]; the binaries plug concrete implementations in.

// Native `async fn` in traits; the futures are bounded `Send` explicitly.
#![allow(async_fn_in_trait)]

pub mod account;
pub mod content;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod health;
pub mod platform;
pub mod post;
pub mod reconcile;
pub mod schedule;
pub mod scheduling;
pub mod settings;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
