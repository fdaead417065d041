//! Outbound broker publishing.

use crate::config::BrokerConfig;
use crate::error::{NodeError, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tracing::debug;

const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Upper bound for flushing the Disconnect after an acknowledged publish.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Destination for climate payloads.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver `payload` to `topic`. Returns once the broker accepted it.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;
}

/// MQTT publisher opening a short-lived session per publish.
///
/// Each call connects, publishes with QoS 1 and waits for the broker's
/// acknowledgement, all bounded by the configured broker timeout.
#[derive(Debug, Clone)]
pub struct MqttPublisher {
    config: BrokerConfig,
}

impl MqttPublisher {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);
        options
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let (client, mut event_loop) = AsyncClient::new(self.options(), 10);

        client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .map_err(|e| NodeError::publish(e.to_string()))?;

        let delivery = async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        debug!("connected with result code '{:?}'", ack.code);
                    }
                    Ok(Event::Incoming(Packet::PubAck(ack))) => {
                        debug!("data published '{}'", ack.pkid);
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(e) => return Err(NodeError::publish(e.to_string())),
                }
            }
        };

        let outcome = match tokio::time::timeout(self.config.timeout, delivery).await {
            Ok(result) => result,
            Err(_) => Err(NodeError::publish(format!(
                "no acknowledgement from {}:{} within {:?}",
                self.config.host, self.config.port, self.config.timeout
            ))),
        };

        if outcome.is_ok() && client.try_disconnect().is_ok() {
            let flush = async {
                loop {
                    match event_loop.poll().await {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            };
            if tokio::time::timeout(DISCONNECT_TIMEOUT, flush).await.is_err() {
                debug!("disconnect from {} not flushed in time", self.config.host);
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const CONNECT: u8 = 1;
    const PUBLISH: u8 = 3;
    const DISCONNECT: u8 = 14;

    /// Read one MQTT control packet, returning its type and body.
    async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
        let header = stream.read_u8().await?;
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await?;
            len |= ((byte & 0x7F) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0; len];
        stream.read_exact(&mut body).await?;
        Ok((header >> 4, body))
    }

    /// Accept one session, acknowledge it, and record the packet types seen.
    async fn run_broker(listener: TcpListener) -> Vec<u8> {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut seen = Vec::new();

        while let Ok((kind, body)) = read_packet(&mut stream).await {
            seen.push(kind);
            match kind {
                CONNECT => stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap(),
                PUBLISH => {
                    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
                    let pkid = &body[2 + topic_len..4 + topic_len];
                    stream.write_all(&[0x40, 0x02, pkid[0], pkid[1]]).await.unwrap();
                }
                DISCONNECT => break,
                _ => {}
            }
        }

        seen
    }

    #[tokio::test]
    async fn test_publish_is_acknowledged_and_disconnects_cleanly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = tokio::spawn(run_broker(listener));

        let config = BrokerConfig::default()
            .with_host("127.0.0.1")
            .with_port(port)
            .with_timeout(Duration::from_secs(5));
        let publisher = MqttPublisher::new(config);

        publisher
            .publish("environmentals/test", br#"{"temperature":21.5,"humidity":45.0}"#)
            .await
            .unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(5), broker)
            .await
            .expect("broker session should end")
            .unwrap();
        assert_eq!(seen, vec![CONNECT, PUBLISH, DISCONNECT]);
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails() {
        // Nothing listens on port 1 of the loopback interface.
        let config = BrokerConfig::default()
            .with_host("127.0.0.1")
            .with_port(1)
            .with_timeout(Duration::from_secs(5));
        let publisher = MqttPublisher::new(config);

        let result = publisher.publish("environmentals/test", b"{}").await;
        assert!(matches!(result, Err(NodeError::PublishFailure(_))));
    }
}
