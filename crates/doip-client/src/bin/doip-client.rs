//! CLI entry point for a standalone DoIP tester client.

use clap::Parser;
use doip_client::DoipClient;
use doip_core::config::ClientConfig;

#[derive(Parser, Debug)]
#[command(name = "doip-client", about = "DoIP (ISO 13400-2) tester client")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = doip_core::config::DOIP_DISCOVERY_PORT)]
    port: u16,
    #[arg(long, default_value = "0xE000", value_parser = parse_hex_u16)]
    source_address: u16,
    #[arg(long, default_value = "0x0E80", value_parser = parse_hex_u16)]
    target_address: u16,
    /// Diagnostic request payload, as a hex string (e.g. "1003").
    #[arg(long)]
    payload: String,
}

fn parse_hex_u16(s: &str) -> Result<u16, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn parse_hex_payload(s: &str) -> Vec<u8> {
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let byte_str = std::str::from_utf8(pair).expect("hex payload must be ASCII");
            u8::from_str_radix(byte_str, 16).expect("payload must be valid hex")
        })
        .collect()
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = ClientConfig {
        target_host: args.host,
        target_port: args.port,
        source_address: args.source_address,
        ..ClientConfig::default()
    };

    log::info!("connecting to {}:{}", config.target_host, config.target_port);
    let mut client = DoipClient::connect(config).expect("failed to connect and activate routing");
    log::info!("routing activated, source address {:#06x}", args.source_address);

    let payload = parse_hex_payload(&args.payload);
    match client.send_diagnostic(args.target_address, &payload) {
        Ok(response) => println!("response: {:02x?}", response),
        Err(e) => eprintln!("diagnostic request failed: {e}"),
    }

    client.close();
}
