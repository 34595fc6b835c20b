//! Stream transport server
//!
//! Accepts Unix domain socket (and optionally TCP) connections, reads one request per line
//! and forwards it to a [`RequestProcessor`], which runs it through a [`ServerLayer`].

use std::io::{BufRead, BufReader, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use std::{env, fs, process};

use crossbeam_channel::{Receiver, Sender};
use log::*;

use super::frame;
use crate::options::LayerOptions;
use crate::server::{Incoming, ServerLayer};

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Enable Unix socket server
    pub unix_socket: bool,
    /// Custom Unix socket path (if None, uses default location)
    pub unix_socket_path: Option<PathBuf>,
    /// Enable TCP server
    pub tcp: bool,
    /// TCP address to listen on. Port 0 picks a free port, see [`TransportServer::local_addr`].
    pub tcp_addr: String,
    /// Connection read/write timeout, also the time a connection waits for its response
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            unix_socket: true,
            unix_socket_path: None,
            tcp: false,
            tcp_addr: "127.0.0.1:9100".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Returns the Unix socket path to use
    pub fn socket_path(&self) -> PathBuf {
        if let Some(ref path) = self.unix_socket_path {
            return path.clone();
        }

        let filename = format!("rpc-layer-{}.sock", process::id());

        // Try XDG_RUNTIME_DIR first, fall back to /tmp
        if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
            PathBuf::from(runtime_dir).join(&filename)
        } else {
            PathBuf::from("/tmp").join(&filename)
        }
    }
}

/// Message sent from the connection threads to the processor
pub enum TransportMessage {
    /// A request that needs to be handled
    Request {
        incoming: Incoming,
        response_tx: Sender<String>,
    },
    /// Server is shutting down
    Shutdown,
}

/// Listens for connections and forwards requests to a [`RequestProcessor`]
pub struct TransportServer {
    config: TransportConfig,
    running: Arc<AtomicBool>,
    unix_thread: Option<JoinHandle<()>>,
    tcp_thread: Option<JoinHandle<()>>,
    tcp_local_addr: Option<SocketAddr>,
    request_tx: Sender<TransportMessage>,
    request_rx: Receiver<TransportMessage>,
}

impl TransportServer {
    /// Creates a new transport server with the given configuration
    pub fn new(config: TransportConfig) -> Self {
        let (request_tx, request_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            unix_thread: None,
            tcp_thread: None,
            tcp_local_addr: None,
            request_tx,
            request_rx,
        }
    }

    /// Returns a processor draining this server's requests
    pub fn processor(&self) -> RequestProcessor {
        RequestProcessor::new(self.request_rx.clone())
    }

    /// Starts listening
    pub fn start(&mut self) -> anyhow::Result<()> {
        self.running.store(true, Ordering::SeqCst);

        if self.config.unix_socket {
            self.start_unix()?;
        }

        if self.config.tcp {
            let listener = TcpListener::bind(&self.config.tcp_addr)?;
            listener.set_nonblocking(true)?;
            let local_addr = listener.local_addr()?;
            self.tcp_local_addr = Some(local_addr);

            info!("Listening on TCP: {}", local_addr);

            let running = self.running.clone();
            let request_tx = self.request_tx.clone();
            let timeout = self.config.timeout;

            self.tcp_thread = Some(thread::spawn(move || {
                Self::tcp_server_loop(listener, running, request_tx, timeout);
            }));
        }

        Ok(())
    }

    #[cfg(unix)]
    fn start_unix(&mut self) -> anyhow::Result<()> {
        let socket_path = self.config.socket_path();

        // Remove stale socket file if it exists
        if socket_path.exists() {
            fs::remove_file(&socket_path)?;
        }

        let listener = UnixListener::bind(&socket_path)?;
        listener.set_nonblocking(true)?;

        info!("Listening on Unix socket: {}", socket_path.display());

        let running = self.running.clone();
        let request_tx = self.request_tx.clone();
        let timeout = self.config.timeout;

        self.unix_thread = Some(thread::spawn(move || {
            Self::unix_server_loop(listener, running, request_tx, socket_path, timeout);
        }));

        Ok(())
    }

    #[cfg(not(unix))]
    fn start_unix(&mut self) -> anyhow::Result<()> {
        warn!("Unix sockets are not supported on this platform");
        Ok(())
    }

    /// Stops listening and tells the processor to shut down
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        // Wake up a blocked processor
        let _ = self.request_tx.send(TransportMessage::Shutdown);

        if let Some(thread) = self.unix_thread.take() {
            let _ = thread.join();
        }

        if let Some(thread) = self.tcp_thread.take() {
            let _ = thread.join();
        }

        // Clean up Unix socket file
        if cfg!(unix) && self.config.unix_socket {
            let socket_path = self.config.socket_path();
            if socket_path.exists() {
                let _ = fs::remove_file(&socket_path);
            }
        }
    }

    /// Returns the socket path if Unix socket is enabled
    pub fn socket_path(&self) -> Option<PathBuf> {
        if cfg!(unix) && self.config.unix_socket {
            Some(self.config.socket_path())
        } else {
            None
        }
    }

    /// Bound TCP address, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.tcp_local_addr
    }

    #[cfg(unix)]
    #[allow(clippy::needless_pass_by_value)]
    fn unix_server_loop(
        listener: UnixListener,
        running: Arc<AtomicBool>,
        request_tx: Sender<TransportMessage>,
        socket_path: PathBuf,
        timeout: Duration,
    ) {
        while running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _)) => {
                    let tx = request_tx.clone();
                    thread::spawn(move || {
                        if let Err(e) = Self::handle_unix_connection(stream, tx, timeout) {
                            debug!("Unix connection error: {}", e);
                        }
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    error!("Unix socket accept error: {}", e);
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }

        // Clean up socket file on exit
        let _ = fs::remove_file(&socket_path);
    }

    #[allow(clippy::needless_pass_by_value)]
    fn tcp_server_loop(
        listener: TcpListener,
        running: Arc<AtomicBool>,
        request_tx: Sender<TransportMessage>,
        timeout: Duration,
    ) {
        while running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    debug!("TCP connection from {}", addr);
                    let tx = request_tx.clone();
                    thread::spawn(move || {
                        if let Err(e) = Self::handle_tcp_connection(stream, addr.ip(), tx, timeout)
                        {
                            debug!("TCP connection error: {}", e);
                        }
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    error!("TCP accept error: {}", e);
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }

    #[cfg(unix)]
    #[allow(clippy::needless_pass_by_value)]
    fn handle_unix_connection(
        stream: UnixStream,
        request_tx: Sender<TransportMessage>,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        // Accepted sockets may inherit the listener's non-blocking mode
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;

        Self::handle_connection(&mut reader, &mut writer, None, request_tx, timeout)
    }

    #[allow(clippy::needless_pass_by_value)]
    fn handle_tcp_connection(
        stream: TcpStream,
        peer: IpAddr,
        request_tx: Sender<TransportMessage>,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;

        Self::handle_connection(&mut reader, &mut writer, Some(peer), request_tx, timeout)
    }

    #[allow(clippy::needless_pass_by_value)]
    fn handle_connection<R: BufRead, W: Write>(
        reader: &mut R,
        writer: &mut W,
        host: Option<IpAddr>,
        request_tx: Sender<TransportMessage>,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        let mut line = String::new();
        while reader.read_line(&mut line)? > 0 {
            if line.trim().is_empty() {
                line.clear();
                continue;
            }

            let incoming = frame::parse_request(host, &line);

            // Send request to processor and wait for response
            let (response_tx, response_rx) = crossbeam_channel::bounded(1);
            request_tx.send(TransportMessage::Request {
                incoming,
                response_tx,
            })?;

            let response = match response_rx.recv_timeout(timeout) {
                Ok(response) => response,
                Err(e) => {
                    warn!("No response from processor ({}), closing connection", e);
                    return Ok(());
                }
            };

            writeln!(writer, "{}", response.trim_end())?;
            writer.flush()?;

            line.clear();
        }

        Ok(())
    }
}

impl Drop for TransportServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs received requests through a [`ServerLayer`], one at a time
pub struct RequestProcessor {
    request_rx: Receiver<TransportMessage>,
    options: LayerOptions,
}

impl RequestProcessor {
    pub fn new(request_rx: Receiver<TransportMessage>) -> Self {
        Self {
            request_rx,
            options: LayerOptions::new(),
        }
    }

    /// Options merged over the layer's standing options for every request
    pub fn with_options(mut self, options: LayerOptions) -> Self {
        self.options = options;
        self
    }

    fn process<L: ServerLayer + ?Sized>(
        &self,
        layer: &mut L,
        incoming: &Incoming,
        response_tx: &Sender<String>,
    ) {
        let response = match layer.execute(incoming, self.options.clone(), false) {
            Ok(response) => response,
            Err(rejected) => {
                debug!("Request rejected: {}", rejected);
                rejected.response
            }
        };
        let _ = response_tx.send(response);
    }

    /// Tries to receive and process a pending request without blocking.
    /// Returns true if a request was processed.
    pub fn try_process<L: ServerLayer + ?Sized>(&self, layer: &mut L) -> bool {
        match self.request_rx.try_recv() {
            Ok(TransportMessage::Request {
                incoming,
                response_tx,
            }) => {
                self.process(layer, &incoming, &response_tx);
                true
            }
            Ok(TransportMessage::Shutdown) => false,
            Err(_) => false,
        }
    }

    /// Processes all pending requests without blocking.
    pub fn process_all<L: ServerLayer + ?Sized>(&self, layer: &mut L) {
        while self.try_process(layer) {}
    }

    /// Processes requests until the transport shuts down.
    pub fn run<L: ServerLayer + ?Sized>(&self, layer: &mut L) {
        while let Ok(message) = self.request_rx.recv() {
            match message {
                TransportMessage::Request {
                    incoming,
                    response_tx,
                } => self.process(layer, &incoming, &response_tx),
                TransportMessage::Shutdown => break,
            }
        }
        debug!("Request processor stopped");
    }
}
