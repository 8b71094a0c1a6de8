use std::{error::Error, fs, path::PathBuf, process, sync::Arc, time::Duration};

use clap::Parser;
use coin::{
    Dataset,
    protocol::{CurrencyServer, Endpoint, Network, ServerConfig, ServerTlsConfig},
};
use log::{info, warn};

#[derive(Debug, Parser)]
#[command(version, about = "Global currency lookup service", long_about = None)]
struct Cli {
    /// Service endpoint [ip addr or socket path]
    #[arg(short, long, default_value = ":4040")]
    endpoint: String,
    /// Network protocol
    #[arg(short, long, value_enum, default_value_t = Network::Tcp)]
    network: Network,
    /// Path to the currency dataset (CSV)
    #[arg(short, long, default_value = "./data.csv")]
    data: PathBuf,
    /// Public certificate (PEM); serves over TLS together with --key
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,
    /// Private key (PEM)
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,
    /// Per-connection read timeout in seconds
    #[arg(long)]
    read_timeout: Option<u64>,
    /// Per-connection write timeout in seconds
    #[arg(long)]
    write_timeout: Option<u64>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let dataset = Arc::new(Dataset::load(&cli.data)?);

    let endpoint = Endpoint::new(cli.network, cli.endpoint);
    let tls = match (cli.cert, cli.key) {
        (Some(cert), Some(key)) => Some(ServerTlsConfig::new(cert, key)),
        _ => None,
    };
    let config = ServerConfig {
        endpoint: endpoint.clone(),
        tls,
        read_timeout: cli.read_timeout.map(Duration::from_secs),
        write_timeout: cli.write_timeout.map(Duration::from_secs),
    };

    let server = CurrencyServer::bind(config, dataset)?;

    // The listener never gets dropped on Ctrl-C, so clean up its socket file here.
    let socket = endpoint.is_unix().then(|| endpoint.path().to_path_buf());
    ctrlc::set_handler(move || {
        info!("shutting down");
        if let Some(path) = &socket {
            if let Err(e) = fs::remove_file(path) {
                warn!("failed to remove socket file {}: {e}", path.display());
            }
        }
        process::exit(0);
    })?;

    server.serve();
    Ok(())
}
