//! Builder pattern for configuring and creating crawler instances.

use crate::engine::{admission_ceiling, Engine, EngineError, EngineSettings, TcpDialer};
use crate::poller::MioMultiplexer;
use crate::queue::AddressQueue;
use crate::reporter::Reporter;
use crate::seed::default_port;
use bitcoin::Network;
use bitcoin_seeder_connection::{
    ConnectionConfiguration, UserAgent, UserAgentError, DEFAULT_PROTOCOL_VERSION,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default number of addresses admitted per engine turn.
const DEFAULT_BATCH_SIZE: usize = 128;
/// Default number of file descriptors kept free of peer sockets.
const DEFAULT_DESCRIPTOR_MARGIN: usize = 10;
/// Default longest wait for readiness in one turn.
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);
/// Default period between status log lines.
const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// A crawler over non-blocking TCP, driven by mio.
pub type Crawler = Engine<TcpDialer, MioMultiplexer>;

/// Errors that can occur during crawler configuration.
#[derive(Debug)]
pub enum CrawlerBuilderError {
    /// User agent doesn't follow the required format.
    InvalidUserAgent(UserAgentError),
    /// Batch size must admit at least one address per turn.
    InvalidBatchSize,
    /// The engine could not be started.
    Engine(EngineError),
}

impl fmt::Display for CrawlerBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlerBuilderError::InvalidUserAgent(err) => {
                write!(f, "Invalid user agent: {err}")
            }
            CrawlerBuilderError::InvalidBatchSize => write!(f, "Batch size must be at least one"),
            CrawlerBuilderError::Engine(err) => write!(f, "Failed to start engine: {err}"),
        }
    }
}

impl std::error::Error for CrawlerBuilderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CrawlerBuilderError::InvalidUserAgent(err) => Some(err),
            CrawlerBuilderError::InvalidBatchSize => None,
            CrawlerBuilderError::Engine(err) => Some(err),
        }
    }
}

impl From<EngineError> for CrawlerBuilderError {
    fn from(err: EngineError) -> Self {
        CrawlerBuilderError::Engine(err)
    }
}

/// Builder for creating a customized [`Crawler`] instance.
///
/// # Example
///
/// ```
/// # fn main() -> Result<(), bitcoin_seeder_crawler::CrawlerBuilderError> {
/// use bitcoin::Network;
/// use bitcoin_seeder_crawler::{AddressQueue, BufferedReporter, CrawlerBuilder};
/// use std::sync::Arc;
///
/// let reporter = Arc::new(BufferedReporter::new());
/// let queue = Arc::new(AddressQueue::with_reporter(reporter.clone()));
///
/// // Create a crawler with custom settings
/// let crawler = CrawlerBuilder::new(Network::Bitcoin)
///     .with_user_agent("/my-custom-crawler:1.0/")?
///     .with_protocol_version(70016)
///     .with_max_connections(64)
///     .build(queue, reporter)?;
/// assert_eq!(crawler.max_connections(), 64);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CrawlerBuilder {
    /// Bitcoin network the crawler will operate on.
    network: Network,
    /// Custom user agent advertised for connection.
    user_agent: Option<UserAgent>,
    /// Protocol version to advertise in connections.
    protocol_version: u32,
    /// Addresses admitted per turn.
    batch_size: usize,
    /// File descriptors held back from the rlimit derived ceiling.
    descriptor_margin: usize,
    /// Explicit connection ceiling, overriding the rlimit derived one.
    max_connections: Option<usize>,
    /// Longest wait for readiness in one turn.
    poll_timeout: Duration,
    /// Period between status log lines.
    status_interval: Duration,
    /// Verify payload checksums before dispatch.
    verify_checksum: bool,
}

impl CrawlerBuilder {
    /// Create a new crawler builder for `network`.
    pub fn new(network: Network) -> Self {
        CrawlerBuilder {
            network,
            user_agent: None,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            batch_size: DEFAULT_BATCH_SIZE,
            descriptor_margin: DEFAULT_DESCRIPTOR_MARGIN,
            max_connections: None,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            status_interval: DEFAULT_STATUS_INTERVAL,
            verify_checksum: true,
        }
    }

    /// Set a custom user agent string for the crawler.
    ///
    /// The user agent identifies the crawler to other peers on the network.
    /// It must follow Bitcoin Core's convention: "/Name:Version/".
    ///
    /// # Arguments
    ///
    /// * `user_agent` - The user agent string to use.
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - The builder for method chaining if validation succeeds.
    /// * `Err(CrawlerBuilderError)` - If the user agent format is invalid.
    pub fn with_user_agent<S: Into<String>>(
        mut self,
        user_agent: S,
    ) -> Result<Self, CrawlerBuilderError> {
        let user_agent =
            UserAgent::new(user_agent.into()).map_err(CrawlerBuilderError::InvalidUserAgent)?;
        self.user_agent = Some(user_agent);
        Ok(self)
    }

    /// Set the protocol version to advertise in connections.
    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    /// Set how many queued addresses are dialed per turn (defaults to 128).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set how many file descriptors stay reserved for non-peer use.
    ///
    /// Only used when no explicit ceiling is set with
    /// [`CrawlerBuilder::with_max_connections`] (defaults to 10).
    pub fn with_descriptor_margin(mut self, margin: usize) -> Self {
        self.descriptor_margin = margin;
        self
    }

    /// Cap concurrent connections explicitly instead of deriving the cap
    /// from the process file descriptor limit.
    ///
    /// Once the cap is reached, every new dial evicts the oldest connection.
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    /// Set the longest time one turn waits for readiness (defaults to 500 ms).
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the minimum period between status log lines (defaults to 60 seconds).
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    /// Toggle payload checksum verification (defaults to on).
    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Default p2p port of the configured network.
    pub fn default_port(&self) -> u16 {
        default_port(self.network)
    }

    /// Build the crawler with the configured options.
    ///
    /// # Arguments
    ///
    /// * `queue` - Addresses to crawl. Gossiped addresses are offered back to it.
    /// * `reporter` - Receives every observed handshake.
    ///
    /// # Errors
    ///
    /// Fails if the batch size is zero, or if the file descriptor limit or the
    /// readiness multiplexer is unavailable.
    pub fn build(
        self,
        queue: Arc<AddressQueue>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Crawler, CrawlerBuilderError> {
        if self.batch_size == 0 {
            return Err(CrawlerBuilderError::InvalidBatchSize);
        }
        let max_connections = match self.max_connections {
            Some(max) => max.max(1),
            None => admission_ceiling(self.descriptor_margin)?,
        };
        let multiplexer = MioMultiplexer::new().map_err(EngineError::Multiplexer)?;
        let configuration = ConnectionConfiguration::non_listening(
            self.network,
            self.protocol_version,
            self.user_agent,
        )
        .with_checksum_verification(self.verify_checksum);
        let settings = EngineSettings {
            max_connections,
            batch_size: self.batch_size,
            poll_timeout: self.poll_timeout,
            status_interval: self.status_interval,
        };

        Ok(Engine::new(
            queue,
            reporter,
            TcpDialer,
            multiplexer,
            configuration,
            settings,
        ))
    }
}
