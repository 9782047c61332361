#![cfg_attr(not(feature = "std"), no_std)]

// 'alloc' is used for dynamic allocation (e.g., Vec<u8> message buffers)
extern crate alloc;

// --- Foundation Modules ---
pub mod bytes;
pub mod error;
pub mod identifiers;
pub mod address;
pub mod config;
pub(crate) mod log;

// --- Wire Protocol ---
pub mod message;

// --- Session Layer ---
pub mod context;
pub mod state_machine;
pub mod application;

#[cfg(feature = "std")]
pub mod timer;

// --- Top-level Exports ---
pub use address::{
    DiagnosticNackCode, DoipAddress, NackCode, PayloadType, RoutingActivationResult,
    RoutingActivationType,
};
pub use application::{
    ApplicationModel, DownstreamCallback, DownstreamForwarder, DownstreamProvider,
    DownstreamResponse, DownstreamResume, DownstreamStatus,
};
pub use config::{ClientConfig, ServerConfig};
pub use context::{CloseReason, ConnectionContext, DiagnosticAck, DownstreamDisposition};
pub use error::DoipError;
pub use identifiers::{DoipEid, DoipGid, DoipVin};
pub use message::Message;
pub use state_machine::{ServerEvent, ServerState, ServerStateMachine, TimerControl, TimerKind};

#[cfg(feature = "std")]
pub use timer::{TimerId, TimerManager};
