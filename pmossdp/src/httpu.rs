/*!
Transport HTTPU (HTTP sur UDP) utilisé par la recherche SSDP.

Le client de recherche est un *control point* : il ne se lie **jamais** au port
UDP 1900. Si un serveur SSDP local écoute déjà sur 1900, deux sockets liés au même
port (même avec SO_REUSEADDR) se partagent les datagrammes entrants et les
réponses HTTP/200 sont perdues au hasard. Le client utilise donc un port
éphémère (`0.0.0.0:0`) : il envoie le M-SEARCH au groupe multicast et reçoit
les réponses en unicast sur ce port.
*/

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::SsdpConfig;
use crate::errors::Result;
use crate::request::SearchRequest;
use crate::response::SsdpResponse;

/// Flux des réponses brutes d'un envoi ; il se ferme à l'échéance
pub type ResponseStream = mpsc::Receiver<SsdpResponse>;

/// Capacité du canal entre la boucle de réception et le consommateur
const RESPONSE_CHANNEL_CAPACITY: usize = 16;

/// Contrat du transport utilisé par la recherche
///
/// `send` émet `request` jusqu'à `num_sends` fois, puis renvoie toutes les
/// réponses reçues avant `total_wait` sous forme de flux, qui se termine à
/// l'échéance ou dès que `cancel` est déclenché.
#[async_trait]
pub trait HttpuTransport: Send + Sync {
    async fn send(
        &self,
        request: &SearchRequest,
        total_wait: Duration,
        num_sends: usize,
        cancel: CancellationToken,
    ) -> Result<ResponseStream>;
}

/// Client HTTPU sur un socket UDP IPv4
pub struct HttpuClient {
    /// Un seul échange à la fois par socket
    socket: Arc<Mutex<UdpSocket>>,
    local_addr: SocketAddr,
    destination: SocketAddr,
    buffer_size: usize,
}

impl HttpuClient {
    /// Crée un client avec la configuration par défaut
    ///
    /// # Panics
    ///
    /// Doit être appelé depuis un runtime tokio (I/O activées).
    pub fn new() -> Result<Self> {
        Self::with_config(&SsdpConfig::default())
    }

    /// Crée un client à partir de la section `network` de la configuration
    pub fn with_config(config: &SsdpConfig) -> Result<Self> {
        let bind_addr = config.bind_addr()?;
        let destination = config.destination_addr()?;

        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;
        socket2.set_multicast_ttl_v4(config.network.multicast_ttl)?;
        socket2.set_multicast_loop_v4(true)?; // utile en dev local
        socket2.set_nonblocking(true)?;
        socket2.bind(&bind_addr.into())?;

        let std_socket: std::net::UdpSocket = socket2.into();
        let socket = UdpSocket::from_std(std_socket)?;
        let local_addr = socket.local_addr()?;

        info!(
            "✅ HTTPU client ready on {} (destination {})",
            local_addr, destination
        );

        Ok(Self {
            socket: Arc::new(Mutex::new(socket)),
            local_addr,
            destination,
            buffer_size: config.network.buffer_size.max(512),
        })
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Adresse locale du socket (port éphémère)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl HttpuTransport for HttpuClient {
    async fn send(
        &self,
        request: &SearchRequest,
        total_wait: Duration,
        num_sends: usize,
        cancel: CancellationToken,
    ) -> Result<ResponseStream> {
        // Le verrou est conservé par la boucle de réception jusqu'à l'échéance
        let socket = Arc::clone(&self.socket).lock_owned().await;

        let deadline = Instant::now() + total_wait;
        let payload = request.to_bytes();
        for _ in 0..num_sends.max(1) {
            if let Err(e) = socket.send_to(&payload, self.destination).await {
                warn!("❌ Failed to send M-SEARCH to {}: {}", self.destination, e);
                return Err(e.into());
            }
        }
        info!(
            "📤 M-SEARCH sent {} time(s) to {} (ST={}, MX={})",
            num_sends.max(1),
            self.destination,
            request.search_target(),
            request.max_wait_seconds()
        );
        debug!(
            "📨 M-SEARCH payload\n<details>\n\n```\n{}\n```\n</details>\n",
            String::from_utf8_lossy(&payload)
        );

        let (tx, rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let buffer_size = self.buffer_size;

        tokio::spawn(async move {
            let mut buf = vec![0u8; buffer_size];
            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("HTTPU receive loop cancelled");
                        break;
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        trace!("HTTPU receive deadline reached");
                        break;
                    }
                    received = socket.recv_from(&mut buf) => received,
                };

                let (n, from) = match received {
                    Ok(r) => r,
                    // ICMP port unreachable remonté sur certains OS
                    Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => continue,
                    Err(e) => {
                        warn!("❌ HTTPU read error: {}", e);
                        break;
                    }
                };

                let response = match SsdpResponse::parse(&buf[..n], from) {
                    Ok(response) => response,
                    Err(e) => {
                        debug!("Ignoring datagram from {}: {}", from, e);
                        continue;
                    }
                };
                trace!("📥 HTTPU response from {}: {}", from, response.status());

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(response) => {
                        if sent.is_err() {
                            // Plus personne n'écoute
                            break;
                        }
                    }
                }
            }
            // `tx` est relâché ici : le flux se ferme
        });

        Ok(rx)
    }
}
