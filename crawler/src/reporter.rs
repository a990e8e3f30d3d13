//! Out-of-band reporting of crawl results.
//!
//! The engine and the address queue call a [`Reporter`] on their hot paths.
//! [`BufferedReporter`] only appends to a pending list there, a separate tokio
//! task started by [`spawn_flusher`] periodically swaps the list out and hands
//! the batch to a [`ReportSink`]. A slow sink therefore never stalls the crawl.

use bitcoin_seeder_connection::{Address, PeerHandshake};
use log::{info, warn};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default period between flushes of buffered reports.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Capability to record crawl results.
///
/// Implementations must return quickly and never block on I/O.
pub trait Reporter: Send + Sync {
    /// An address was seen for the first time.
    fn report_new_address(&self, address: &Address);
    /// A peer completed its half of the handshake.
    fn report_handshake(&self, handshake: &PeerHandshake);
}

/// A single crawl result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    NewAddress(Address),
    Handshake(PeerHandshake),
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::NewAddress(address) => write!(f, "New address: {address}"),
            Report::Handshake(handshake) => write!(f, "Handshake: {handshake}"),
        }
    }
}

/// Errors raised by a [`ReportSink`] while delivering a batch.
#[derive(Debug)]
pub enum ReportError {
    /// The receiving side of the sink has gone away.
    Closed,
    /// The sink failed to write the batch.
    Io(std::io::Error),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::Closed => write!(f, "Report sink closed"),
            ReportError::Io(err) => write!(f, "Report sink I/O error: {err}"),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Closed => None,
            ReportError::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        ReportError::Io(err)
    }
}

/// Destination for batches of reports.
pub trait ReportSink {
    fn deliver(
        &mut self,
        reports: Vec<Report>,
    ) -> impl Future<Output = Result<(), ReportError>> + Send;
}

/// Writes every report to the log at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReportSink for LogSink {
    async fn deliver(&mut self, reports: Vec<Report>) -> Result<(), ReportError> {
        for report in reports {
            info!("{report}");
        }
        Ok(())
    }
}

/// Forwards every report into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Report>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<Report>) -> Self {
        Self { sender }
    }
}

impl ReportSink for ChannelSink {
    async fn deliver(&mut self, reports: Vec<Report>) -> Result<(), ReportError> {
        for report in reports {
            self.sender.send(report).map_err(|_| ReportError::Closed)?;
        }
        Ok(())
    }
}

/// Reporter that buffers results for a background flusher.
#[derive(Debug, Default)]
pub struct BufferedReporter {
    pending: Mutex<Vec<Report>>,
}

impl BufferedReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap out everything buffered so far.
    pub fn take(&self) -> Vec<Report> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    fn push(&self, report: Report) {
        self.pending.lock().push(report);
    }
}

impl Reporter for BufferedReporter {
    fn report_new_address(&self, address: &Address) {
        self.push(Report::NewAddress(*address));
    }

    fn report_handshake(&self, handshake: &PeerHandshake) {
        self.push(Report::Handshake(handshake.clone()));
    }
}

/// Periodically drain `reporter` into `sink` on the current tokio runtime.
///
/// The task only holds a weak reference. It stops at the first tick after the
/// last strong reference is dropped, reports still pending at that point are
/// lost, so callers wanting a clean shutdown [`BufferedReporter::take`] and
/// deliver the remainder themselves. Delivery failures are logged and the
/// batch is dropped.
pub fn spawn_flusher<S>(
    reporter: &Arc<BufferedReporter>,
    mut sink: S,
    interval: Duration,
) -> JoinHandle<()>
where
    S: ReportSink + Send + 'static,
{
    let reporter: Weak<BufferedReporter> = Arc::downgrade(reporter);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reports = match reporter.upgrade() {
                Some(reporter) => reporter.take(),
                None => break,
            };
            if reports.is_empty() {
                continue;
            }
            let count = reports.len();
            if let Err(e) = sink.deliver(reports).await {
                warn!("Dropped {count} reports: {e}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::p2p::ServiceFlags;
    use std::net::{IpAddr, Ipv4Addr};

    fn address(last: u8) -> Address {
        Address::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), 8333)
    }

    fn handshake() -> PeerHandshake {
        PeerHandshake {
            address: address(9),
            user_agent: "/Satoshi:27.0.0/".to_string(),
            version: 70016,
            services: ServiceFlags::NETWORK,
            start_height: 850_000,
        }
    }

    #[test]
    fn test_buffered_reporter_take() {
        let reporter = BufferedReporter::new();
        reporter.report_new_address(&address(1));
        reporter.report_handshake(&handshake());
        assert_eq!(reporter.pending(), 2);

        assert_eq!(
            reporter.take(),
            vec![Report::NewAddress(address(1)), Report::Handshake(handshake())]
        );
        assert_eq!(reporter.pending(), 0);
        assert!(reporter.take().is_empty());
    }

    #[tokio::test]
    async fn test_flusher_delivers_batches() {
        let reporter = Arc::new(BufferedReporter::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let flusher = spawn_flusher(
            &reporter,
            ChannelSink::new(tx),
            Duration::from_millis(10),
        );

        reporter.report_new_address(&address(1));
        reporter.report_new_address(&address(2));
        assert_eq!(rx.recv().await, Some(Report::NewAddress(address(1))));
        assert_eq!(rx.recv().await, Some(Report::NewAddress(address(2))));

        reporter.report_handshake(&handshake());
        assert_eq!(rx.recv().await, Some(Report::Handshake(handshake())));

        drop(reporter);
        flusher.await.unwrap();
        // The sink is dropped with the task.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_closed_sink_is_not_fatal() {
        let reporter = Arc::new(BufferedReporter::new());
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let flusher = spawn_flusher(
            &reporter,
            ChannelSink::new(tx),
            Duration::from_millis(5),
        );

        reporter.report_new_address(&address(3));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(reporter.pending(), 0);
        assert!(!flusher.is_finished());

        drop(reporter);
        flusher.await.unwrap();
    }

    #[tokio::test]
    async fn test_log_sink() {
        let mut sink = LogSink;
        sink.deliver(vec![Report::Handshake(handshake())])
            .await
            .unwrap();
    }
}
