//! TCP-specific connections.

use super::{Connection, ConnectionError, Socket};
use crate::address::Address;
use mio::net::TcpStream;
use std::io;
use std::net::SocketAddr;

/// A TCP-based connection to a bitcoin peer.
///
/// This is a convenience type alias for [`Connection`] with mio's non-blocking TCP stream.
pub type TcpConnection = Connection<TcpStream>;

/// Start a non-blocking connect to `address`.
///
/// The returned stream is usually still connecting. Completion is signalled
/// by the stream becoming writable.
pub fn connect(address: &Address) -> Result<TcpStream, ConnectionError> {
    let stream = TcpStream::connect(address.socket_addr())?;
    // No delay is helpful for the small packets of the bitcoin p2p protocol.
    stream.set_nodelay(true)?;
    Ok(stream)
}

impl Socket for TcpStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn take_error(&self) -> io::Result<Option<io::Error>> {
        TcpStream::take_error(self)
    }
}
