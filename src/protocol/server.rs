use std::{
    io::{self, Read, Write},
    sync::Arc,
    thread,
    time::Duration,
};

use log::{debug, error, info, warn};

use crate::Dataset;

use super::{
    Connection, Endpoint, ProtocolTransport, Response, codec,
    listener::{Listener, ListenerError},
    tls::ServerTlsConfig,
    transport::TransportError,
};

/// First pause after a failed accept; doubled on each further failure in a row.
const ACCEPT_DELAY_MIN: Duration = Duration::from_millis(5);
const ACCEPT_DELAY_MAX: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub endpoint: Endpoint,
    /// Serve over TLS with this certificate and key.
    pub tls: Option<ServerTlsConfig>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl ServerConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            tls: None,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Currency lookup service: one listener, one thread per accepted connection.
pub struct CurrencyServer {
    listener: Listener,
    dataset: Arc<Dataset>,
    config: ServerConfig,
}

impl CurrencyServer {
    pub fn bind(config: ServerConfig, dataset: Arc<Dataset>) -> Result<Self, ListenerError> {
        let tls = config.tls.as_ref().map(ServerTlsConfig::build).transpose()?;
        let listener = Listener::bind(&config.endpoint, tls)?;

        info!("**** Global Currency Service ****");
        info!(
            "service started: {}{} serving {} currencies",
            config.endpoint,
            if listener.is_tls() { " (tls)" } else { "" },
            dataset.len()
        );

        Ok(Self {
            listener,
            dataset,
            config,
        })
    }

    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        self.listener.local_endpoint()
    }

    /// Accepts connections forever. Accept failures are logged and retried after a pause, so
    /// exhausted descriptors do not turn the loop into a busy spin.
    pub fn serve(self) {
        let mut next_id: u64 = 0;
        let mut delay = None;

        loop {
            let conn = match self.listener.accept() {
                Ok(conn) => conn,
                Err(e) => {
                    let pause = accept_delay(delay);
                    warn!("failed to accept connection: {e}; retrying in {pause:?}");
                    thread::sleep(pause);
                    delay = Some(pause);
                    continue;
                }
            };
            delay = None;

            if let Err(e) = conn.set_timeouts(self.config.read_timeout, self.config.write_timeout)
            {
                warn!("failed to configure connection from {}: {e}", conn.peer());
                continue;
            }

            next_id += 1;
            let peer = format!("#{next_id} {}", conn.peer());
            info!("connected to {peer}");

            let dataset = Arc::clone(&self.dataset);
            let spawned = thread::Builder::new()
                .name(format!("conn-{next_id}"))
                .spawn(move || handle_connection(conn, &dataset, &peer));

            if let Err(e) = spawned {
                error!("failed to spawn connection handler: {e}");
            }
        }
    }
}

fn accept_delay(previous: Option<Duration>) -> Duration {
    previous.map_or(ACCEPT_DELAY_MIN, |d| d.saturating_mul(2).min(ACCEPT_DELAY_MAX))
}

/// Runs the command loop on `conn` and closes it afterwards, however the loop ended.
fn handle_connection(conn: Connection, dataset: &Dataset, peer: &str) {
    let mut transport = ProtocolTransport::new(conn);

    match command_loop(&mut transport, dataset, peer) {
        Ok(()) => info!("{peer} disconnected"),
        Err(e) => warn!("closing connection {peer}: {e}"),
    }

    if let Err(e) = transport.get_mut().close() {
        debug!("error closing connection {peer}: {e}");
    }
}

/// Frame, decode, dispatch, encode, write; repeated until end of stream or an I/O failure.
/// A request that fails to decode is answered with an error object and the loop carries on.
pub(crate) fn command_loop<S: Read + Write>(
    transport: &mut ProtocolTransport<S>,
    dataset: &Dataset,
    peer: &str,
) -> Result<(), TransportError> {
    while let Some(frame) = transport.read_frame()? {
        let resp = dispatch(dataset, &frame, peer);
        transport.write_response(&resp)?;
    }
    Ok(())
}

fn dispatch(dataset: &Dataset, frame: &[u8], peer: &str) -> Response {
    match codec::decode_request(frame) {
        Ok(req) => {
            let records = dataset.find(req.selector());
            debug!(
                "{peer}: '{}' matched {} currencies",
                req.selector(),
                records.len()
            );
            Response::Records(records)
        }
        Err(e) => {
            warn!("{peer}: failed to decode request: {e}");
            Response::error(format!("failed to decode request: {e}"))
        }
    }
}
