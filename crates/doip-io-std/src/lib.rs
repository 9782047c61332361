//! `std::net`-based TCP session runtime, UDP discovery/announcement, and
//! server orchestrator for `doip-core`.

pub mod connection;
pub mod discovery;
pub mod server;

pub use connection::{run_connection, TcpConnection};
pub use server::{ApplicationModelFactory, Server};
