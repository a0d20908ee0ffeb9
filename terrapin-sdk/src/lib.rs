//! terrapin: a small framework for single-connection IRC bots.
//!
//! A [`Session`] owns one server connection and drives a single-task
//! read-dispatch-write loop: every inbound line is tried against three
//! handler tiers in priority order (server replies, password-gated admin
//! commands, callsign-addressed user commands), then every registered
//! service runs once. External code extends the bot before starting the
//! loop — commands run on demand when a user addresses the bot in a
//! channel, services run every iteration with their own persisted state.
//!
//! ```no_run
//! use terrapin_sdk::{ConnectConfig, Session};
//!
//! # async fn example() -> Result<(), terrapin_sdk::Error> {
//! let mut session = Session::new(ConnectConfig {
//!     server_addr: "irc.example.net:6667".into(),
//!     nick: "shelly".into(),
//!     default_channel: Some("#bots".into()),
//!     ..Default::default()
//! });
//! session.register_command("echo", |args| Some(args.join(" ")));
//! session.run().await
//! # }
//! ```

pub mod client;
pub mod error;
pub mod irc;
pub mod logger;
pub mod registry;

pub use client::{Channel, ConnectConfig, Session};
pub use error::Error;
pub use registry::{Registry, ServiceState};
