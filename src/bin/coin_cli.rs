use std::{
    error::Error,
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;
use coin::{
    Command,
    cli::CommandError,
    print_response,
    protocol::{
        Client, ClientTlsConfig, Dialer, DialerConfig, Endpoint, Network, SocketConnector,
    },
    prompt,
};
use log::debug;

#[derive(Debug, Parser)]
#[command(version, about = "Interactive client for the currency lookup service", long_about = None)]
struct Cli {
    /// Service endpoint or socket path
    #[arg(short, long, default_value = "localhost:4040")]
    endpoint: String,
    /// Network protocol
    #[arg(short, long, value_enum, default_value_t = Network::Tcp)]
    network: Network,
    /// CA certificate (PEM) to trust; connects over TLS when given
    #[arg(long)]
    ca: Option<PathBuf>,
    /// Name to verify the server certificate against [default: endpoint host]
    #[arg(long, requires = "ca")]
    server_name: Option<String>,
    /// Connect timeout in seconds
    #[arg(long, default_value_t = 300)]
    timeout: u64,
    /// TCP keep-alive interval in seconds, 0 disables it
    #[arg(long, default_value_t = 300)]
    keep_alive: u64,
    /// Maximum connection attempts
    #[arg(long, default_value_t = 3)]
    retries: u32,
    /// Seconds to wait before retrying a failed connection
    #[arg(long, default_value_t = 1)]
    retry_interval: u64,
    /// Multiplier applied to the retry interval after each attempt
    #[arg(long, default_value_t = 1)]
    backoff: u32,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let endpoint = Endpoint::new(cli.network, cli.endpoint);
    let config = DialerConfig {
        connect_timeout: Duration::from_secs(cli.timeout),
        keep_alive: (cli.keep_alive > 0).then(|| Duration::from_secs(cli.keep_alive)),
        max_attempts: cli.retries,
        retry_interval: Duration::from_secs(cli.retry_interval),
        backoff: cli.backoff,
    };

    let mut connector = SocketConnector::new(endpoint.clone(), &config);
    if let Some(ca) = cli.ca {
        let mut tls = ClientTlsConfig::new(ca);
        if let Some(name) = cli.server_name {
            tls = tls.with_server_name(name);
        }
        connector = connector.with_tls(&tls)?;
    }

    let mut client = Client::dial(&Dialer::new(config), &mut connector)?;
    println!("connected to currency service: {}", endpoint.address);

    let stdin = io::stdin();
    let stdout = io::stdout();

    loop {
        println!("Enter search string or *");

        let cmd = match prompt(stdin.lock(), stdout.lock()) {
            Ok(cmd) => cmd,
            Err(CommandError::Io(e)) => return Err(e.into()),
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match cmd {
            Command::Exit => break,
            Command::Lookup(selector) => {
                let resp = client.lookup(&selector)?;
                let mut out = stdout.lock();
                print_response(&mut out, &resp)?;
                out.flush()?;
            }
        }
    }

    if let Err(e) = client.close() {
        debug!("error closing connection: {e}");
    }
    Ok(())
}
