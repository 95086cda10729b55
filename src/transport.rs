//! DNS transports.
//!
//! [`DnsTransport`] is the seam between the resolution algorithm and the
//! network: one method that takes a query name and type and returns the raw
//! response message. Production traffic goes through [`UdpTransport`]; tests
//! substitute an in-memory transport serving canned messages.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::UdpSocket;
use tracing::debug;
use trust_dns_resolver::config::Protocol;
use trust_dns_resolver::system_conf::read_system_conf;

use crate::retry::{with_retransmit, RetransmitConfig};
use crate::wire::{self, Header, RecordType, MAX_ANSWER_BYTES};

/// A synchronous-looking request/response DNS exchange.
///
/// Implementations return the full response message bytes; interpretation of
/// the answer section is the caller's job. An `Err` means the exchange
/// itself failed (socket error, timeout after retransmits); a response with
/// a non-zero rcode is returned as-is.
pub trait DnsTransport: Send + Sync {
    fn query(&self, name: &str, rtype: RecordType)
        -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// UDP exchange against a single recursive nameserver.
pub struct UdpTransport {
    server: SocketAddr,
    timeout: Duration,
    retransmit: RetransmitConfig,
}

impl UdpTransport {
    /// Transport to one nameserver with a 5 second per-attempt timeout and
    /// two send attempts.
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            timeout: Duration::from_secs(5),
            retransmit: RetransmitConfig::default(),
        }
    }

    /// Builds a transport from the system resolver configuration
    /// (`/etc/resolv.conf` on Unix): first UDP nameserver, system timeout
    /// and attempt counts.
    pub fn from_system_conf() -> Result<Self> {
        let (config, opts) =
            read_system_conf().context("failed to read system resolver configuration")?;
        let server = config
            .name_servers()
            .iter()
            .find(|ns| ns.protocol == Protocol::Udp)
            .map(|ns| ns.socket_addr)
            .context("no UDP nameserver in system resolver configuration")?;
        Ok(Self::new(server)
            .with_timeout(opts.timeout)
            .with_attempts(opts.attempts as u32))
    }

    /// Sets the per-attempt receive timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how many times a query is sent before giving up.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.retransmit.attempts = attempts.max(1);
        self
    }

    async fn exchange_once(&self, packet: &[u8], id: u16) -> Result<Vec<u8>> {
        let local: SocketAddr = if self.server.is_ipv4() {
            "0.0.0.0:0".parse().expect("valid wildcard address")
        } else {
            "[::]:0".parse().expect("valid wildcard address")
        };
        let socket = UdpSocket::bind(local).await.context("failed to bind UDP socket")?;
        socket
            .connect(self.server)
            .await
            .with_context(|| format!("failed to connect to nameserver {}", self.server))?;
        socket.send(packet).await.context("failed to send DNS query")?;

        let receive = async {
            let mut buf = vec![0u8; MAX_ANSWER_BYTES];
            loop {
                let n = socket.recv(&mut buf).await.context("failed to receive DNS response")?;
                if let Ok(header) = Header::parse(&buf[..n]) {
                    if header.id == id && header.is_response() {
                        return Ok(buf[..n].to_vec());
                    }
                }
                debug!("discarding datagram that does not match query id {}", id);
            }
        };

        match tokio::time::timeout(self.timeout, receive).await {
            Ok(result) => result,
            Err(_) => bail!("query to {} timed out after {:?}", self.server, self.timeout),
        }
    }
}

impl DnsTransport for UdpTransport {
    async fn query(&self, name: &str, rtype: RecordType) -> Result<Vec<u8>> {
        let id: u16 = rand::random();
        let packet = wire::encode_query(id, name, rtype)
            .with_context(|| format!("failed to encode {} query for '{}'", rtype, name))?;

        with_retransmit(
            |attempt| {
                let packet = packet.clone();
                async move {
                    if attempt > 1 {
                        debug!("retransmitting {} query for '{}'", rtype, name);
                    }
                    self.exchange_once(&packet, id).await
                }
            },
            &self.retransmit,
        )
        .await
    }
}
