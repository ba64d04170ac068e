use std::io;
use std::ops::Deref;
use std::sync::Arc;

use log::debug;

use tokio::select;
use tokio::net::{lookup_host, ToSocketAddrs};

use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::core::Spawn;
use crate::dispatch::Protocol;
use crate::error::Error;
use crate::ioutil::iotimeout;
use crate::socket;

use super::connection::Connection;
use super::worker::ReadWorker;


/**
Outbound connection.

[`Client::connect`] resolves the target, connects and starts the read loop in
the background. The loop disposes the connection when it ends; the handle
stays usable but reports [`Connection::is_connected`] as false from then on.

Dereferences to the underlying [`Connection`] for sending and teardown.
*/
#[derive(Debug)]
pub struct Client<M> {
	conn: Arc<Connection<M>>,
}

impl<M> Clone for Client<M> {
	fn clone(&self) -> Self {
		Self{conn: self.conn.clone()}
	}
}

impl<M> Deref for Client<M> {
	type Target = Connection<M>;

	fn deref(&self) -> &Self::Target {
		&self.conn
	}
}

impl<M: Send + 'static> Client<M> {
	/// Connect with a fresh cancellation scope.
	pub async fn connect<A: ToSocketAddrs>(target: A, protocol: Protocol<M>, config: ClientConfig) -> Result<Self, Error> {
		Self::connect_with_cancellation(target, protocol, config, CancellationToken::new()).await
	}

	/**
	Connect using `cancel` as the connection's scope.

	Every resolved address is tried in turn; the error of the last attempt is
	reported. Canceling `cancel` aborts a pending connect.
	*/
	pub async fn connect_with_cancellation<A: ToSocketAddrs>(
			target: A,
			protocol: Protocol<M>,
			config: ClientConfig,
			cancel: CancellationToken,
	) -> Result<Self, Error> {
		let addrs = lookup_host(target).await.map_err(Error::Connect)?;
		let mut last_err = None;
		let mut stream = None;
		for addr in addrs {
			let attempt = select! {
				biased;
				_ = cancel.cancelled() => Err(io::Error::new(io::ErrorKind::Interrupted, "connect canceled")),
				result = iotimeout(config.connect_timeout, socket::connect(addr, &config.socket), "connection timed out") => result,
			};
			match attempt {
				Ok(sock) => {
					stream = Some(sock);
					break;
				},
				Err(e) => {
					debug!("{}: connect failed: {}", addr, e);
					if cancel.is_cancelled() {
						return Err(Error::Connect(e));
					}
					last_err = Some(e);
				},
			}
		}
		let stream = match (stream, last_err) {
			(Some(stream), _) => stream,
			(None, Some(e)) => return Err(Error::Connect(e)),
			(None, None) => return Err(Error::Connect(io::Error::new(io::ErrorKind::InvalidInput, "no addresses to connect to"))),
		};

		let conn = Connection::new(stream, protocol, cancel, config.socket)?;
		debug!("{}: connected", conn.peer_addr());
		ReadWorker::new(conn.clone()).spawn();
		Ok(Self{conn})
	}

	pub fn connection(&self) -> &Arc<Connection<M>> {
		&self.conn
	}
}
