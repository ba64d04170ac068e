use std::fmt;
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::Arc;

use tokio::net::TcpStream;

use tokio_util::sync::CancellationToken;

use crate::config::SocketConfig;
use crate::dispatch::Protocol;
use crate::error::Error;

use super::connection::Connection;


/**
A socket freshly accepted by a [`crate::Server`], already configured.

Handed to [`crate::SessionHandler::create_session`], which decides whether
and how to turn it into a [`Session`].
*/
pub struct Accepted {
	pub(crate) sock: TcpStream,
	pub(crate) peer: SocketAddr,
	pub(crate) parent: CancellationToken,
	pub(crate) config: SocketConfig,
}

impl Accepted {
	pub fn peer_addr(&self) -> SocketAddr {
		self.peer
	}

	pub fn socket(&self) -> &TcpStream {
		&self.sock
	}

	/// The owning server's cancellation scope.
	pub fn server_cancellation(&self) -> &CancellationToken {
		&self.parent
	}
}

impl fmt::Debug for Accepted {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Accepted")
			.field("peer", &self.peer)
			.finish_non_exhaustive()
	}
}

/**
Server-side connection built from an accepted socket.

Its cancellation scope is a child of the server's, so shutting the server
down ends every session. Dereferences to the underlying [`Connection`].
*/
#[derive(Debug)]
pub struct Session<M> {
	conn: Arc<Connection<M>>,
}

impl<M> Clone for Session<M> {
	fn clone(&self) -> Self {
		Self{conn: self.conn.clone()}
	}
}

impl<M> Deref for Session<M> {
	type Target = Connection<M>;

	fn deref(&self) -> &Self::Target {
		&self.conn
	}
}

impl<M: Send + 'static> Session<M> {
	pub fn new(accepted: Accepted, protocol: Protocol<M>) -> Result<Self, Error> {
		let Accepted{sock, parent, config, ..} = accepted;
		let conn = Connection::new(sock, protocol, parent.child_token(), config)?;
		Ok(Self{conn})
	}

	/// Run the read loop on behalf of the server. Teardown is left to the server.
	pub(crate) async fn start(&self) -> Result<(), Error> {
		self.conn.listen().await
	}

	pub fn connection(&self) -> &Arc<Connection<M>> {
		&self.conn
	}
}
