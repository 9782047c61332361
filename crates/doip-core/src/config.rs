//! Server and client configuration.
//!
//! Plain structs with `Default` impls holding the ISO default timer and
//! announcement values; a small builder favors explicit field-by-field
//! construction over pulling in a derive-macro builder crate.

use alloc::string::String;

use crate::address::DoipAddress;
use crate::identifiers::{DoipEid, DoipGid, DoipVin};

/// Default UDP/TCP port DoIP entities listen on (ISO 13400-2).
pub const DOIP_DISCOVERY_PORT: u16 = 13400;

/// Server-side configuration: identity, announcement behavior, and timer
/// durations.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub vin: DoipVin,
    pub logical_address: DoipAddress,
    pub eid: DoipEid,
    pub gid: DoipGid,
    pub further_action_required: u8,
    pub announce_count: u32,
    pub announce_interval_ms: u64,
    pub loopback: bool,
    pub daemonize: bool,
    pub initial_inactivity_ms: u64,
    pub general_inactivity_ms: u64,
    pub alive_check_ms: u64,
    pub max_alive_check_retries: u32,
    pub downstream_timeout_ms: u64,
    pub max_message_size: u32,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            vin: DoipVin::ZERO,
            logical_address: 0x0E80,
            eid: DoipEid::ZERO,
            gid: DoipGid::ZERO,
            further_action_required: 0x00,
            announce_count: 3,
            announce_interval_ms: 500,
            loopback: false,
            daemonize: false,
            initial_inactivity_ms: 2000,
            general_inactivity_ms: 300_000,
            alive_check_ms: 500,
            max_alive_check_retries: 3,
            downstream_timeout_ms: 2000,
            max_message_size: 16 * 1024 * 1024,
            port: DOIP_DISCOVERY_PORT,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Field-by-field builder for [`ServerConfig`]; every method returns `self`
/// so calls chain.
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn vin(mut self, vin: &str) -> Self {
        self.config.vin = DoipVin::new(vin);
        self
    }

    pub fn logical_address(mut self, addr: DoipAddress) -> Self {
        self.config.logical_address = addr;
        self
    }

    pub fn eid(mut self, eid: DoipEid) -> Self {
        self.config.eid = eid;
        self
    }

    pub fn gid(mut self, gid: DoipGid) -> Self {
        self.config.gid = gid;
        self
    }

    pub fn further_action_required(mut self, code: u8) -> Self {
        self.config.further_action_required = code;
        self
    }

    pub fn announce_count(mut self, count: u32) -> Self {
        self.config.announce_count = count;
        self
    }

    pub fn announce_interval_ms(mut self, ms: u64) -> Self {
        self.config.announce_interval_ms = ms;
        self
    }

    pub fn loopback(mut self, loopback: bool) -> Self {
        self.config.loopback = loopback;
        self
    }

    pub fn daemonize(mut self, daemonize: bool) -> Self {
        self.config.daemonize = daemonize;
        self
    }

    pub fn initial_inactivity_ms(mut self, ms: u64) -> Self {
        self.config.initial_inactivity_ms = ms;
        self
    }

    pub fn general_inactivity_ms(mut self, ms: u64) -> Self {
        self.config.general_inactivity_ms = ms;
        self
    }

    pub fn alive_check_ms(mut self, ms: u64) -> Self {
        self.config.alive_check_ms = ms;
        self
    }

    pub fn max_alive_check_retries(mut self, retries: u32) -> Self {
        self.config.max_alive_check_retries = retries;
        self
    }

    pub fn downstream_timeout_ms(mut self, ms: u64) -> Self {
        self.config.downstream_timeout_ms = ms;
        self
    }

    pub fn max_message_size(mut self, size: u32) -> Self {
        self.config.max_message_size = size;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

/// Client-side configuration: target address/port and routing-activation
/// source address. Has no announcement timing since the client is passive
/// on discovery unless it chooses to listen for announcements.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub target_host: String,
    pub target_port: u16,
    pub source_address: DoipAddress,
    pub routing_activation_timeout_ms: u64,
    pub diagnostic_response_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target_host: String::from("127.0.0.1"),
            target_port: DOIP_DISCOVERY_PORT,
            source_address: 0xE000,
            routing_activation_timeout_ms: 2000,
            diagnostic_response_timeout_ms: 2000,
        }
    }
}
