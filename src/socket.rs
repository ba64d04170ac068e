/*!
# Socket setup

Everything touching raw socket options lives here. Sockets are created
through `socket2` so that options which must be set before `connect(2)` or
`bind(2)` can be applied, then handed to tokio.

All sockets close abortively: linger is enabled with a zero timeout, so
closing discards unsent data and resets the connection instead of leaving it
half-closed. IPv6 sockets accept IPv4-mapped peers as well.
*/
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;

use log::debug;

use socket2::{Domain, Protocol, SockRef, Socket, Type};

use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::config::SocketConfig;
use crate::ioutil::is_peer_gone;


fn new_socket(addr: &SocketAddr) -> io::Result<Socket> {
	let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))?;
	if addr.is_ipv6() {
		socket.set_only_v6(false)?;
	}
	socket.set_linger(Some(Duration::ZERO))?;
	socket.set_nonblocking(true)?;
	Ok(socket)
}

/// Apply the per-connection options to an established (accepted) stream.
pub(crate) fn configure(stream: &TcpStream, cfg: &SocketConfig) -> io::Result<()> {
	let sock = SockRef::from(stream);
	sock.set_nodelay(cfg.no_delay)?;
	sock.set_linger(Some(Duration::ZERO))?;
	Ok(())
}

/// Open an outbound connection to `addr` with the options applied up front.
pub(crate) async fn connect(addr: SocketAddr, cfg: &SocketConfig) -> io::Result<TcpStream> {
	let socket = new_socket(&addr)?;
	socket.set_nodelay(cfg.no_delay)?;
	let socket = TcpSocket::from_std_stream(socket.into());
	socket.connect(addr).await
}

/**
Bind and listen on `addr`.

Must be called from within a tokio runtime.
*/
pub(crate) fn listen(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
	let socket = new_socket(&addr)?;
	socket.bind(&addr.into())?;
	socket.listen(backlog)?;
	TcpListener::from_std(socket.into())
}

/**
Courteously shut down both directions.

Errors which merely say that the peer is gone already are expected and
swallowed. Anything else is returned, but the caller must still release the
socket.
*/
pub(crate) fn shutdown(sock: SockRef<'_>) -> io::Result<()> {
	match sock.shutdown(Shutdown::Both) {
		Ok(()) => Ok(()),
		Err(e) if is_peer_gone(&e) => {
			debug!("ignoring shutdown error on closed socket: {}", e);
			Ok(())
		},
		Err(e) => Err(e),
	}
}
