//! CLI entry point for running a standalone DoIP server.

use clap::Parser;
use doip_core::{ApplicationModel, CloseReason, ConnectionContext, DiagnosticAck, DoipEid, DoipGid, Message, ServerConfig};
use doip_io_std::Server;

#[derive(Parser, Debug)]
#[command(name = "doip-server", about = "Standalone DoIP (ISO 13400-2) diagnostic server")]
struct Args {
    /// TCP/UDP port to listen on.
    #[arg(long, default_value_t = doip_core::config::DOIP_DISCOVERY_PORT)]
    port: u16,

    /// Logical address this entity answers to.
    #[arg(long, default_value = "0x0E80", value_parser = parse_hex_u16)]
    logical_address: u16,

    /// 17-character VIN advertised in vehicle identification responses.
    #[arg(long, default_value = "00000000000000000")]
    vin: String,

    /// Number of unsolicited vehicle announcements sent at startup.
    #[arg(long, default_value_t = 3)]
    announce_count: u32,

    /// Gap between vehicle announcements, in milliseconds.
    #[arg(long, default_value_t = 500)]
    announce_interval_ms: u64,

    /// Send announcements to 127.0.0.1 instead of the broadcast address.
    #[arg(long)]
    loopback: bool,

    /// Echo every diagnostic message back with a positive ack and log it.
    #[arg(long)]
    echo: bool,
}

fn parse_hex_u16(s: &str) -> Result<u16, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

/// A minimal application model: optionally acks every diagnostic message
/// and logs connection lifecycle events, for manual testing against a
/// real DoIP tester without wiring up a full UDS stack.
struct EchoModel {
    echo: bool,
}

impl ApplicationModel for EchoModel {
    fn on_open_connection(&self, ctx: &dyn ConnectionContext) {
        log::info!("connection opened, server address {:#06x}", ctx.server_address());
    }

    fn on_close_connection(&self, ctx: &dyn ConnectionContext, reason: CloseReason) {
        log::info!(
            "connection to {:?} closed: {:?}",
            ctx.client_address(),
            reason
        );
    }

    fn on_diagnostic_message(&self, _ctx: &dyn ConnectionContext, msg: &Message) -> DiagnosticAck {
        if self.echo {
            log::info!("diagnostic message payload: {:02x?}", msg.diagnostic_payload());
        }
        None
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = ServerConfig::builder()
        .port(args.port)
        .logical_address(args.logical_address)
        .vin(&args.vin)
        .eid(DoipEid::ZERO)
        .gid(DoipGid::ZERO)
        .announce_count(args.announce_count)
        .announce_interval_ms(args.announce_interval_ms)
        .loopback(args.loopback)
        .build();

    log::info!(
        "starting doip-server on port {} (vin={}, logical_address={:#06x})",
        config.port,
        config.vin.as_str(),
        config.logical_address
    );

    let echo = args.echo;
    let _server = Server::start(config, move || EchoModel { echo }).expect("failed to start server");

    // Runs until the process is killed (Ctrl-C). `Server::stop()` is
    // available to embedders that own the process lifecycle themselves.
    loop {
        std::thread::park();
    }
}
