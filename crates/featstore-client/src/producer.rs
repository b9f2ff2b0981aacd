//! Broker row producer
//!
//! [`TcpRowProducer`] publishes encoded rows to a single broker topic over a
//! length-prefixed postcard connection. Submissions are fire-and-forget into
//! a bounded channel; a background sender task coalesces queued rows into
//! write bursts, then reads one acknowledgement per row. [`RowSink::flush`]
//! waits until the pending count drains to zero, bounded by the caller's
//! deadline, using wait-notify instead of busy polling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use featstore_protocol::{check_message_size, Request, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Submission queue depth
const QUEUE_DEPTH: usize = 1024;
/// Maximum rows coalesced into one write burst
const MAX_BURST: usize = 256;

/// Counters describing a sink's delivery progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Rows accepted into the submission queue
    pub submitted: u64,
    /// Rows acknowledged by the broker
    pub delivered: u64,
    /// Rows rejected by the broker or lost to a connection failure
    pub failed: u64,
}

/// Destination for encoded rows
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Queue one encoded row for delivery
    async fn submit(&self, value: Bytes) -> Result<()>;

    /// Wait until every submitted row is acknowledged or rejected
    ///
    /// Returns `Ok(true)` when the queue drained within `timeout`, `Ok(false)`
    /// when the deadline passed with rows still pending, and `Err` when the
    /// broker rejected rows or the connection failed.
    async fn flush(&self, timeout: Duration) -> Result<bool>;

    /// Current delivery counters
    fn stats(&self) -> SinkStats;
}

#[derive(Debug)]
struct ProducerShared {
    pending: AtomicU64,
    flush_notify: Notify,
    submitted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl ProducerShared {
    fn settle(&self, delivered: bool) {
        if delivered {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        let prev = self.pending.fetch_sub(1, Ordering::Release);
        if prev == 1 {
            self.flush_notify.notify_waiters();
        }
    }

    fn record_error(&self, message: String) {
        let mut slot = self.last_error.lock().unwrap_or_else(|e| e.into_inner());
        slot.get_or_insert(message);
    }
}

/// Length-prefixed TCP producer bound to one broker topic
#[derive(Debug)]
pub struct TcpRowProducer {
    topic: String,
    record_tx: mpsc::Sender<Bytes>,
    shared: Arc<ProducerShared>,
}

impl TcpRowProducer {
    /// Connect to the first reachable broker in a comma-separated address list
    pub async fn connect(brokers: &str, topic: &str, connect_timeout: Duration) -> Result<Self> {
        let addr = brokers
            .split(',')
            .map(str::trim)
            .find(|a| !a.is_empty())
            .ok_or_else(|| Error::BrokerUnavailable("no broker addresses configured".into()))?
            .to_string();

        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::BrokerUnavailable(format!("connection timeout to {}", addr)))?
            .map_err(|e| Error::BrokerUnavailable(format!("{}: {}", addr, e)))?;
        stream.set_nodelay(true).ok();

        let (record_tx, record_rx) = mpsc::channel(QUEUE_DEPTH);
        let shared = Arc::new(ProducerShared {
            pending: AtomicU64::new(0),
            flush_notify: Notify::new(),
            submitted: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            last_error: Mutex::new(None),
        });

        let sender_shared = shared.clone();
        let sender_topic = topic.to_string();
        tokio::spawn(async move {
            sender_task(sender_shared, sender_topic, stream, record_rx).await;
        });

        info!(%addr, topic, "row producer connected");
        Ok(Self {
            topic: topic.to_string(),
            record_tx,
            shared,
        })
    }

    /// Topic this producer publishes to
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn take_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl RowSink for TcpRowProducer {
    async fn submit(&self, value: Bytes) -> Result<()> {
        self.shared.pending.fetch_add(1, Ordering::Release);
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        if self.record_tx.send(value).await.is_err() {
            self.shared.settle(false);
            let detail = self
                .take_error()
                .unwrap_or_else(|| "sender task closed".to_string());
            return Err(Error::BrokerUnavailable(detail));
        }
        Ok(())
    }

    async fn flush(&self, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return match self.take_error() {
                    Some(message) => Err(Error::Server(message)),
                    None => Ok(true),
                };
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            tokio::select! {
                _ = self.shared.flush_notify.notified() => {}
                // Periodic re-check in case a notification was missed
                _ = tokio::time::sleep(remaining.min(Duration::from_millis(10))) => {}
            }
        }
    }

    fn stats(&self) -> SinkStats {
        SinkStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
        }
    }
}

/// Background task that writes bursts of publishes and reads their acks
async fn sender_task(
    shared: Arc<ProducerShared>,
    topic: String,
    stream: TcpStream,
    mut record_rx: mpsc::Receiver<Bytes>,
) {
    let (read_half, write_half) = stream.into_split();
    let mut writer = BufWriter::with_capacity(64 * 1024, write_half);
    let mut reader = BufReader::with_capacity(64 * 1024, read_half);

    let mut burst = Vec::with_capacity(MAX_BURST);
    while let Some(first) = record_rx.recv().await {
        burst.push(first);
        while burst.len() < MAX_BURST {
            match record_rx.try_recv() {
                Ok(value) => burst.push(value),
                Err(_) => break,
            }
        }

        if let Err(e) = send_burst(&shared, &topic, &mut writer, &mut reader, &burst).await {
            warn!(error = %e, pending = burst.len(), "broker connection lost");
            shared.record_error(e.to_string());
            for _ in burst.drain(..) {
                shared.settle(false);
            }
            // Fail everything still queued, then stop
            while record_rx.recv().await.is_some() {
                shared.settle(false);
            }
            return;
        }
        burst.clear();
    }
    debug!(%topic, "row producer sender task finished");
}

/// Write one burst of publishes, then read one acknowledgement per row
async fn send_burst(
    shared: &ProducerShared,
    topic: &str,
    writer: &mut BufWriter<tokio::net::tcp::OwnedWriteHalf>,
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    burst: &[Bytes],
) -> Result<()> {
    for value in burst {
        let request = Request::Publish {
            topic: topic.to_string(),
            key: None,
            value: value.clone(),
        };
        let bytes = request.to_bytes()?;
        writer.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
        writer.write_all(&bytes).await?;
    }
    // One flush per burst
    writer.flush().await?;

    let mut len_buf = [0u8; 4];
    for _ in burst {
        reader.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;
        check_message_size(len)?;
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;

        match Response::from_bytes(&buf)? {
            Response::Published { .. } => shared.settle(true),
            Response::Error { message } => {
                shared.record_error(message);
                shared.settle(false);
            }
            _ => {
                shared.record_error("unexpected broker response".to_string());
                shared.settle(false);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Minimal broker: acknowledges every publish with an incrementing offset
    async fn spawn_mock_broker() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut offset = 0u64;
                    let mut len_buf = [0u8; 4];
                    while socket.read_exact(&mut len_buf).await.is_ok() {
                        let len = u32::from_be_bytes(len_buf) as usize;
                        let mut buf = vec![0u8; len];
                        if socket.read_exact(&mut buf).await.is_err() {
                            break;
                        }
                        let reply = match Request::from_bytes(&buf) {
                            Ok(Request::Publish { .. }) => {
                                offset += 1;
                                Response::Published { offset }
                            }
                            _ => Response::Error {
                                message: "unexpected request".to_string(),
                            },
                        };
                        let bytes = reply.to_bytes().unwrap();
                        let frame = (bytes.len() as u32).to_be_bytes();
                        if socket.write_all(&frame).await.is_err()
                            || socket.write_all(&bytes).await.is_err()
                        {
                            break;
                        }
                    }
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_submit_and_flush_against_mock_broker() {
        let addr = spawn_mock_broker().await;
        let producer = TcpRowProducer::connect(&addr, "rows", Duration::from_secs(5))
            .await
            .unwrap();

        for i in 0..20u8 {
            producer.submit(Bytes::from(vec![i])).await.unwrap();
        }
        assert!(producer.flush(Duration::from_secs(5)).await.unwrap());

        let stats = producer.stats();
        assert_eq!(stats.submitted, 20);
        assert_eq!(stats.delivered, 20);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_flush_with_nothing_pending_is_immediate() {
        let addr = spawn_mock_broker().await;
        let producer = TcpRowProducer::connect(&addr, "rows", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(producer.flush(Duration::from_millis(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_refused_is_broker_unavailable() {
        // Bind then drop to get an address nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = TcpRowProducer::connect(&addr, "rows", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BrokerUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_broker_list_rejected() {
        let err = TcpRowProducer::connect(" , ", "rows", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BrokerUnavailable(_)));
    }
}
