mod builder;
mod engine;
mod poller;
mod queue;
mod registry;
mod reporter;
mod seed;

pub use builder::{Crawler, CrawlerBuilder, CrawlerBuilderError};
pub use engine::{admission_ceiling, Dialed, Dialer, Engine, EngineError, EngineSettings, TcpDialer};
pub use poller::{Interest, MioMultiplexer, Multiplexer, Readiness, Tag};
pub use queue::{AddressQueue, QueueError};
pub use registry::Registry;
pub use reporter::{
    spawn_flusher, BufferedReporter, ChannelSink, LogSink, Report, ReportError, ReportSink,
    Reporter, DEFAULT_FLUSH_INTERVAL,
};
pub use seed::{default_port, resolve_seed, seed_queue, DNS_SEEDS};

// Re-exports.
pub use bitcoin_seeder_connection::{
    Address, ConnectionConfiguration, ConnectionError, PeerHandshake, PeerProtocolVersion,
    PeerServices, UserAgent,
};
