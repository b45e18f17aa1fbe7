//! Inbound listener lifecycle
//!
//! Owns the HTTP, SOCKS and redirect listeners plus the LAN access settings
//! that decide which address they bind. Accepted connections are handed to
//! whichever data plane took the `incoming` channel; without one they are
//! closed right away.

use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const INCOMING_BUFFER: usize = 1024;

/// Listener kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Http,
    Socks,
    Redir,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerKind::Http => write!(f, "HTTP"),
            ListenerKind::Socks => write!(f, "SOCKS"),
            ListenerKind::Redir => write!(f, "Redir"),
        }
    }
}

/// Current listener ports (0 when a listener is not running)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Ports {
    pub port: u16,
    pub socks_port: u16,
    pub redir_port: u16,
}

/// Connection accepted by one of the listeners
#[derive(Debug)]
pub struct Inbound {
    pub kind: ListenerKind,
    pub stream: TcpStream,
    pub peer: SocketAddr,
}

type IncomingSender = Arc<RwLock<Option<mpsc::Sender<Inbound>>>>;

struct RunningListener {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl RunningListener {
    /// Stop accepting and wait until the socket is released
    async fn close(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}

/// Listener manager
pub struct ListenerManager {
    allow_lan: RwLock<bool>,
    bind_address: RwLock<String>,
    http: Mutex<Option<RunningListener>>,
    socks: Mutex<Option<RunningListener>>,
    redir: Mutex<Option<RunningListener>>,
    incoming: IncomingSender,
}

impl ListenerManager {
    pub fn new() -> Self {
        ListenerManager {
            allow_lan: RwLock::new(false),
            bind_address: RwLock::new("*".to_string()),
            http: Mutex::new(None),
            socks: Mutex::new(None),
            redir: Mutex::new(None),
            incoming: Arc::new(RwLock::new(None)),
        }
    }

    pub fn allow_lan(&self) -> bool {
        *self.allow_lan.read()
    }

    pub fn set_allow_lan(&self, allow: bool) {
        *self.allow_lan.write() = allow;
    }

    pub fn bind_address(&self) -> String {
        self.bind_address.read().clone()
    }

    pub fn set_bind_address(&self, address: String) {
        *self.bind_address.write() = address;
    }

    /// Snapshot of the current ports
    pub fn ports(&self) -> Ports {
        let port_of = |slot: &Mutex<Option<RunningListener>>| {
            slot.lock().as_ref().map(|l| l.addr.port()).unwrap_or(0)
        };

        Ports {
            port: port_of(&self.http),
            socks_port: port_of(&self.socks),
            redir_port: port_of(&self.redir),
        }
    }

    /// Channel receiving accepted connections; replaces any previous consumer
    pub fn take_incoming(&self) -> mpsc::Receiver<Inbound> {
        let (tx, rx) = mpsc::channel(INCOMING_BUFFER);
        *self.incoming.write() = Some(tx);
        rx
    }

    /// Address a listener on `port` binds with the current LAN settings
    pub fn listen_addr(&self, port: u16) -> Result<SocketAddr> {
        if !self.allow_lan() {
            return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port));
        }

        let bind_address = self.bind_address();
        if bind_address == "*" {
            return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
        }

        let ip: IpAddr = bind_address
            .parse()
            .map_err(|_| Error::listener(format!("Invalid bind address: {}", bind_address)))?;
        Ok(SocketAddr::new(ip, port))
    }

    /// Re-create a listener on `port`.
    ///
    /// Port 0 closes the listener. If the listener already runs on the
    /// address the current settings produce, nothing happens.
    pub async fn recreate(&self, kind: ListenerKind, port: u16) -> Result<()> {
        let slot = self.slot(kind);

        if port == 0 {
            let previous = slot.lock().take();
            if let Some(previous) = previous {
                previous.close().await;
                info!("{} proxy listener closed", kind);
            }
            return Ok(());
        }

        let addr = self.listen_addr(port)?;

        let previous = {
            let mut guard = slot.lock();
            if guard.as_ref().map(|l| l.addr) == Some(addr) {
                debug!("{} proxy listener already on {}", kind, addr);
                return Ok(());
            }
            guard.take()
        };
        if let Some(previous) = previous {
            previous.close().await;
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::listener(format!("{} proxy listen {}: {}", kind, addr, e)))?;
        info!("{} proxy listening on {}", kind, addr);

        let handle = tokio::spawn(accept_loop(kind, listener, self.incoming.clone()));
        let stale = slot.lock().replace(RunningListener { addr, handle });
        if let Some(stale) = stale {
            stale.handle.abort();
        }

        Ok(())
    }

    /// Close every listener
    pub async fn close_all(&self) {
        for kind in [ListenerKind::Http, ListenerKind::Socks, ListenerKind::Redir] {
            let _ = self.recreate(kind, 0).await;
        }
    }

    fn slot(&self, kind: ListenerKind) -> &Mutex<Option<RunningListener>> {
        match kind {
            ListenerKind::Http => &self.http,
            ListenerKind::Socks => &self.socks,
            ListenerKind::Redir => &self.redir,
        }
    }
}

impl Default for ListenerManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn accept_loop(kind: ListenerKind, listener: TcpListener, incoming: IncomingSender) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let tx = incoming.read().clone();
                let delivered = match tx {
                    Some(tx) => tx.try_send(Inbound { kind, stream, peer }).is_ok(),
                    None => false,
                };
                if !delivered {
                    debug!("{} connection from {} dropped: no consumer", kind, peer);
                }
            }
            Err(e) => {
                warn!("{} accept error: {}", kind, e);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}
