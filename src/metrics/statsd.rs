use std::net::{SocketAddr, ToSocketAddrs};

use tokio::net::UdpSocket;

use super::MetricSink;
use crate::error::MetricsError;
use crate::pipeline::context::LabelMap;

/// Datagram sink settings
#[derive(Debug, Clone)]
pub struct StatsdConfig {
    pub address: String,
    pub metric: String,
}

/// Sends one DogStatsD counter datagram per accepted line.
///
/// Sending is fire-and-forget: the socket is non-blocking and a datagram that
/// cannot be sent right away is dropped.
pub struct StatsdSink {
    config: StatsdConfig,
    socket: Option<UdpSocket>,
}

impl StatsdSink {
    pub fn new(config: StatsdConfig) -> Self {
        StatsdSink {
            config,
            socket: None,
        }
    }

    fn resolve(&self) -> Result<SocketAddr, MetricsError> {
        self.config
            .address
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| MetricsError::Resolve(self.config.address.clone()))
    }
}

/// `metric:1|c` plus `|#k:v,k:v` when there are labels
pub fn format_datagram(metric: &str, labels: &LabelMap) -> String {
    let mut datagram = format!("{}:1|c", metric);
    if !labels.is_empty() {
        let tags: Vec<String> = labels.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
        datagram.push_str("|#");
        datagram.push_str(&tags.join(","));
    }
    datagram
}

impl MetricSink for StatsdSink {
    fn name(&self) -> &str {
        "statsd"
    }

    fn start(&mut self) -> Result<(), MetricsError> {
        if self.socket.is_some() {
            return Ok(());
        }

        let target = self.resolve()?;
        let local: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = std::net::UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        socket.connect(target)?;
        self.socket = Some(UdpSocket::from_std(socket)?);
        tracing::debug!(%target, metric = %self.config.metric, "statsd client ready");
        Ok(())
    }

    fn stop(&mut self) {
        if self.socket.take().is_some() {
            tracing::debug!("statsd client closed");
        }
    }

    fn increment(&self, labels: &LabelMap) {
        let socket = match &self.socket {
            Some(socket) => socket,
            None => return,
        };
        let datagram = format_datagram(&self.config.metric, labels);
        if let Err(e) = socket.try_send(datagram.as_bytes()) {
            tracing::debug!(error = %e, "dropped statsd datagram");
        }
    }
}
