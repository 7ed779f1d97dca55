//! A connected transport paired with its stream handles.

use std::fmt;
use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};

use super::WireProtocol;

/// Process-unique identity of one live transport. Used as the factory's
/// creation-timestamp key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One connected TCP transport, its buffered input/output handles and the
/// protocol negotiated at creation time.
///
/// Lives from a successful handshake until `SocketResourceFactory::destroy`.
#[derive(Debug)]
pub struct SocketAndStreams {
    id: ConnectionId,
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    protocol: WireProtocol,
}

impl SocketAndStreams {
    pub(crate) fn new(
        id: ConnectionId,
        stream: TcpStream,
        protocol: WireProtocol,
    ) -> io::Result<Self> {
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream.try_clone()?);
        Ok(Self {
            id,
            stream,
            reader,
            writer,
            protocol,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn protocol(&self) -> WireProtocol {
        self.protocol
    }

    pub fn reader(&mut self) -> &mut BufReader<TcpStream> {
        &mut self.reader
    }

    pub fn writer(&mut self) -> &mut BufWriter<TcpStream> {
        &mut self.writer
    }

    /// Whether the transport still looks usable: no pending socket error and
    /// the peer address still resolvable. This is the blocking-socket
    /// rendition of bound + connected + not closed.
    pub fn is_alive(&self) -> bool {
        match self.stream.take_error() {
            Ok(None) => {}
            Ok(Some(_)) | Err(_) => return false,
        }
        self.stream.peer_addr().is_ok()
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl fmt::Display for SocketAndStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.protocol)
    }
}
