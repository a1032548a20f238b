//! Mock transport for deterministic testing of the protocol driver.
//!
//! The appliance never answers a command directly; it emits status frames
//! some time later, or not at all. [`MockTransport`] models that: every
//! write is recorded with its timestamp, a write can be configured to make
//! the "device" push a reply, and tests can inject frames at any moment
//! through a [`MockHandle`].
//!
//! Timestamps use [`tokio::time::Instant`], so tests running with paused
//! time (`#[tokio::test(start_paused = true)]`) can assert exact spacing.
//!
//! # Example
//!
//! ```
//! use atelier_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the driver asks for status, the device reports volume 55.
//! mock.reply_to(b"0:7", b";1;55\r\n");
//! let handle = mock.handle();
//! handle.inject_line(";6; Y");
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use atelier_core::error::{Error, Result};
use atelier_core::transport::Transport;

/// One write observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentWrite {
    /// The exact bytes written.
    pub data: Vec<u8>,
    /// When the write completed.
    pub at: Instant,
}

#[derive(Debug, Default)]
struct Shared {
    writes: Vec<SentWrite>,
    replies: HashMap<Vec<u8>, Vec<u8>>,
    failing_writes: usize,
    connected: bool,
    closed: bool,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // A panicking test thread must not hide the recorded writes.
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A mock [`Transport`] standing in for the appliance's serial port.
#[derive(Debug)]
pub struct MockTransport {
    shared: Arc<Mutex<Shared>>,
    incoming_tx: mpsc::UnboundedSender<Vec<u8>>,
    incoming_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Bytes of an injected chunk that did not fit the caller's buffer.
    pending: Vec<u8>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        MockTransport {
            shared: Arc::new(Mutex::new(Shared {
                connected: true,
                ..Shared::default()
            })),
            incoming_tx,
            incoming_rx,
            pending: Vec::new(),
        }
    }

    /// Obtain a handle that stays usable after the mock is boxed and moved
    /// into the IO task.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            shared: Arc::clone(&self.shared),
            incoming_tx: self.incoming_tx.clone(),
        }
    }

    /// Make the device answer every write of `request` with `response`.
    pub fn reply_to(&mut self, request: &[u8], response: &[u8]) {
        self.handle().reply_to(request, response);
    }

    /// Make the next `n` writes fail with [`Error::Transport`].
    pub fn fail_next_writes(&mut self, n: usize) {
        self.handle().fail_next_writes(n);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Test-side view of a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Mutex<Shared>>,
    incoming_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl MockHandle {
    /// Push raw bytes onto the receive side, as if the device sent them.
    pub fn inject(&self, data: &[u8]) {
        let _ = self.incoming_tx.send(data.to_vec());
    }

    /// Push one status line, appending the `\r\n` delimiter.
    pub fn inject_line(&self, line: &str) {
        let mut data = line.as_bytes().to_vec();
        data.extend_from_slice(b"\r\n");
        self.inject(&data);
    }

    /// Make the device answer every write of `request` with `response`.
    pub fn reply_to(&self, request: &[u8], response: &[u8]) {
        lock(&self.shared)
            .replies
            .insert(request.to_vec(), response.to_vec());
    }

    /// Stop answering writes of `request`.
    pub fn clear_reply(&self, request: &[u8]) {
        lock(&self.shared).replies.remove(request);
    }

    /// Make the next `n` writes fail with [`Error::Transport`].
    pub fn fail_next_writes(&self, n: usize) {
        lock(&self.shared).failing_writes = n;
    }

    /// Set the connected state. A disconnected mock rejects all I/O with
    /// [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        lock(&self.shared).connected = connected;
    }

    /// All successful writes, oldest first.
    pub fn writes(&self) -> Vec<SentWrite> {
        lock(&self.shared).writes.clone()
    }

    /// The bytes of all successful writes, oldest first.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.shared)
            .writes
            .iter()
            .map(|w| w.data.clone())
            .collect()
    }

    /// Number of successful writes of exactly `request`.
    pub fn count_of(&self, request: &[u8]) -> usize {
        lock(&self.shared)
            .writes
            .iter()
            .filter(|w| w.data == request)
            .count()
    }

    /// Whether `close()` has been called on the transport.
    pub fn is_closed(&self) -> bool {
        lock(&self.shared).closed
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let reply = {
            let mut shared = lock(&self.shared);
            if !shared.connected {
                return Err(Error::NotConnected);
            }
            if shared.failing_writes > 0 {
                shared.failing_writes -= 1;
                return Err(Error::Transport("mock write failure".into()));
            }
            shared.writes.push(SentWrite {
                data: data.to_vec(),
                at: Instant::now(),
            });
            shared.replies.get(data).cloned()
        };

        if let Some(reply) = reply {
            let _ = self.incoming_tx.send(reply);
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !lock(&self.shared).connected {
            return Err(Error::NotConnected);
        }

        if self.pending.is_empty() {
            match tokio::time::timeout(timeout, self.incoming_rx.recv()).await {
                Ok(Some(chunk)) => self.pending = chunk,
                Ok(None) | Err(_) => return Err(Error::Timeout),
            }
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let mut shared = lock(&self.shared);
        shared.connected = false;
        shared.closed = true;
        self.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_records_writes() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();

        mock.send(b"0<3").await.unwrap();
        mock.send(b"0<4").await.unwrap();

        assert_eq!(handle.sent_data(), vec![b"0<3".to_vec(), b"0<4".to_vec()]);
        assert_eq!(handle.count_of(b"0<3"), 1);
    }

    #[tokio::test]
    async fn mock_reply_is_received_after_write() {
        let mut mock = MockTransport::new();
        mock.reply_to(b"0:7", b";0;\r\n");

        mock.send(b"0:7").await.unwrap();

        let mut buf = [0u8; 32];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b";0;\r\n");
    }

    #[tokio::test]
    async fn mock_injected_bytes_are_received() {
        let mut mock = MockTransport::new();
        mock.handle().inject_line(";1;55");

        let mut buf = [0u8; 32];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b";1;55\r\n");
    }

    #[tokio::test]
    async fn mock_partial_receive_keeps_remainder() {
        let mut mock = MockTransport::new();
        mock.handle().inject(b";6; Y\r\n");

        let mut buf = [0u8; 3];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b";6;");

        let mut buf = [0u8; 16];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b" Y\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn mock_receive_without_data_times_out() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 8];

        let result = mock.receive(&mut buf, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn mock_failing_writes_are_not_recorded() {
        let mut mock = MockTransport::new();
        mock.fail_next_writes(1);
        let handle = mock.handle();

        assert!(matches!(
            mock.send(b"0<5").await,
            Err(Error::Transport(_))
        ));
        mock.send(b"0<5").await.unwrap();

        assert_eq!(handle.count_of(b"0<5"), 1);
    }

    #[tokio::test]
    async fn mock_close_disconnects() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        assert!(mock.is_connected());

        mock.close().await.unwrap();
        assert!(!mock.is_connected());
        assert!(handle.is_closed());
        assert!(matches!(mock.send(b"0<2").await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn mock_cleared_reply_is_not_sent() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        handle.reply_to(b"0:7", b";0;\r\n");
        handle.clear_reply(b"0:7");

        mock.send(b"0:7").await.unwrap();

        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn mock_disconnect_and_reconnect() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();

        handle.set_connected(false);
        assert!(!mock.is_connected());
        assert!(matches!(mock.send(b"0:4").await, Err(Error::NotConnected)));
        let mut buf = [0u8; 8];
        assert!(matches!(
            mock.receive(&mut buf, Duration::from_millis(10)).await,
            Err(Error::NotConnected)
        ));

        handle.set_connected(true);
        mock.send(b"0:4").await.unwrap();
        assert_eq!(handle.sent_data(), vec![b"0:4".to_vec()]);
        assert!(!handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn mock_timestamps_follow_tokio_clock() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();

        mock.send(b"0<3").await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        mock.send(b"0<3").await.unwrap();

        let writes = handle.writes();
        assert_eq!(writes[1].at - writes[0].at, Duration::from_millis(500));
    }
}
