//! # tradecopier
//! An event-driven engine that mirrors trades between a terminal-backed broker account
//! ("master") and any number of follower accounts, while concurrently hosting user-authored
//! strategies bound to individual accounts and replaying historical bars through an
//! event-driven backtester that shares the strategies' own gateway interface.
//!
//! The crate is organised around the components of the core coordination engine:
//! * [`gate`] — serializes every call to the process-global broker terminal.
//! * [`supervisor`] — owns per-account connect/disconnect lifecycle and failure backoff.
//! * [`mirror`] — reconciles master and follower trade state every cycle.
//! * [`strategy`] — hosts user strategies behind an abstract [`gateway::TradingGateway`].
//! * [`backtest`] — an event-driven Data/Market/Signal/Order/Fill replay loop.
//! * [`datasync`] — keeps the local bar store current from a live terminal.
//! * [`core`] — the single background scheduler gluing the above together.
//! * [`queues`] — the three queues and snapshot type that form the UI boundary.

#![warn(missing_copy_implementations)]

#[macro_use]
extern crate prettytable;

pub mod backtest;
pub mod config;
pub mod core;
pub mod crypto;
pub mod datasync;
pub mod error;
pub mod event;
pub mod gate;
pub mod gateway;
pub mod logging;
pub mod mirror;
pub mod model;
pub mod queues;
pub mod shutdown;
pub mod strategy;
pub mod supervisor;

pub use error::CoreError;
