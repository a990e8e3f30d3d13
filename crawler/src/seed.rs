//! Bootstrap addresses from DNS seeds.

use crate::queue::AddressQueue;
use bitcoin::Network;
use bitcoin_seeder_connection::Address;
use log::{debug, info, warn};
use tokio::net::lookup_host;

/// DNS seeders for mainnet.
pub const DNS_SEEDS: &[&str] = &[
    "seed.bitcoin.sipa.be",
    "dnsseed.bluematt.me",
    "dnsseed.bitcoin.dashjr.org",
    "seed.bitcoinstats.com",
    "seed.bitcoin.jonasschnelli.ch",
    "seed.btc.petertodd.org",
    "seed.bitcoin.sprovoost.nl",
];

/// Default p2p port of `network`.
pub fn default_port(network: Network) -> u16 {
    match network {
        Network::Bitcoin => 8333,
        Network::Testnet => 18333,
        Network::Testnet4 => 48333,
        Network::Signet => 38333,
        Network::Regtest => 18444,
    }
}

/// Resolve `host` to every endpoint it advertises, on `port`.
///
/// Resolution failures are logged and yield no addresses.
pub async fn resolve_seed(host: &str, port: u16) -> Vec<Address> {
    match lookup_host((host, port)).await {
        Ok(endpoints) => endpoints.map(Address::from).collect(),
        Err(e) => {
            warn!("Failed to resolve seed {host}: {e}");
            Vec::new()
        }
    }
}

/// Resolve every host in `hosts` and offer the results to `queue`.
///
/// Returns how many of the resolved addresses were new to the queue.
pub async fn seed_queue(queue: &AddressQueue, hosts: &[&str], port: u16) -> usize {
    let mut added = 0;
    for host in hosts {
        let addresses = resolve_seed(host, port).await;
        debug!("Seed {host} resolved to {} addresses", addresses.len());
        added += addresses
            .into_iter()
            .filter(|address| queue.offer(*address))
            .count();
    }
    info!("Seeded {added} addresses from {} hosts", hosts.len());
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_default_ports() {
        assert_eq!(default_port(Network::Bitcoin), 8333);
        assert_eq!(default_port(Network::Testnet), 18333);
        assert_eq!(default_port(Network::Testnet4), 48333);
        assert_eq!(default_port(Network::Signet), 38333);
        assert_eq!(default_port(Network::Regtest), 18444);
    }

    #[tokio::test]
    async fn test_resolve_literal() {
        let addresses = resolve_seed("127.0.0.1", 8333).await;
        assert_eq!(
            addresses,
            vec![Address::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8333)]
        );
        assert_eq!(addresses[0].port(), 8333);

        let addresses = resolve_seed("::1", 18444).await;
        assert_eq!(
            addresses,
            vec![Address::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 18444)]
        );
    }

    #[tokio::test]
    async fn test_seed_queue_counts_new_addresses() {
        let queue = AddressQueue::new();
        let added = seed_queue(&queue, &["127.0.0.1", "::1", "127.0.0.1"], 8333).await;
        assert_eq!(added, 2);
        assert_eq!(queue.len(), 2);
    }
}
