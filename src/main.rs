use clap::Parser;
use oxibson::protocol::MessageHeader;
use oxibson::{config::CodecConfig, decode, extjson};
use std::io::Read;

fn main() -> anyhow::Result<()> {
    // Load .env first so clap's env fallbacks see variables
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Attempt to load config before initializing logs to pick up log_level from file
    let cfg_file_res = CodecConfig::load_from_file(cli.config.as_deref());
    let cfg = match &cfg_file_res {
        Ok(c) => c.clone(),
        Err(_) => CodecConfig::default(),
    };

    // Determine log filter precedence: CLI (--log-level / OXIBSON_LOG_LEVEL)
    // > RUST_LOG (env) > config file log_level > default("info")
    let filter_spec = if let Some(ref lvl) = cli.log_level {
        lvl.clone()
    } else if let Ok(env_spec) = std::env::var("RUST_LOG") {
        env_spec
    } else if let Some(ref lvl) = cfg.log_level {
        lvl.clone()
    } else {
        "info".to_string()
    };

    // Initialize logging with chosen filter
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter_spec))
        .compact()
        .init();

    if let Err(e) = cfg_file_res.as_ref() {
        tracing::warn!(error = %format!("{e:?}"), "invalid config; using defaults");
    }
    cfg.validate().map_err(|e| anyhow::anyhow!("{e}"))?;

    let bytes = read_input(cli.file.as_deref())?;
    tracing::info!(bytes = bytes.len(), "read input");

    if cli.packets {
        dump_packets(&bytes)?;
    } else {
        dump_documents(&bytes, !cli.naive, &cfg)?;
    }
    Ok(())
}

/// Print one relaxed Extended JSON document per line.
fn dump_documents(bytes: &[u8], tz_aware: bool, cfg: &CodecConfig) -> anyhow::Result<()> {
    let docs = decode::decode_all_with(bytes, tz_aware, cfg)?;
    tracing::debug!(docs = docs.len(), "decoded document stream");
    for doc in &docs {
        println!("{}", serde_json::to_string(&extjson::document_to_relaxed_json(doc))?);
    }
    Ok(())
}

/// Walk length-prefixed wire packets, printing each header. Bodies are
/// skipped; this mode is for eyeballing captured request streams.
fn dump_packets(bytes: &[u8]) -> anyhow::Result<()> {
    let mut rest = bytes;
    let mut index = 0usize;
    while !rest.is_empty() {
        let (header, _) = MessageHeader::parse(rest)
            .ok_or_else(|| anyhow::anyhow!("truncated packet header at packet {index}"))?;
        let length = header.message_length as usize;
        if length < MessageHeader::SIZE || rest.len() < length {
            anyhow::bail!("packet {index} declares {length} bytes, {} available", rest.len());
        }
        println!(
            "packet {index}: length={} request_id={} response_to={} op_code={}",
            header.message_length, header.request_id, header.response_to, header.op_code
        );
        rest = &rest[length..];
        index += 1;
    }
    Ok(())
}

fn read_input(path: Option<&str>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) => Ok(std::fs::read(path)?),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "oxibson",
    version,
    about = "Dump BSON document streams as Extended JSON"
)]
struct Cli {
    /// File of concatenated BSON documents (stdin when omitted)
    file: Option<String>,

    /// Treat input as length-prefixed wire packets and print their headers
    #[arg(long = "packets")]
    packets: bool,

    /// Decode datetimes as naive wall-clock values instead of UTC
    #[arg(long = "naive")]
    naive: bool,

    /// Path to config TOML file
    #[arg(short = 'c', long = "config", env = "OXIBSON_CONFIG")]
    config: Option<String>,

    /// Log level or filter spec (e.g., info or info,oxibson=debug)
    #[arg(long = "log-level", env = "OXIBSON_LOG_LEVEL")]
    log_level: Option<String>,
}
