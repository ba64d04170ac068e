use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use log::{debug, error, warn};

use futures_util::FutureExt;

use crate::core::Spawn;
use crate::error::Error;

use super::connection::Connection;


pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
	if let Some(s) = payload.downcast_ref::<&'static str>() {
		s
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.as_str()
	} else {
		"unknown panic payload"
	}
}

/**
Await a connection's read loop, turning every way it can end into a log line.

A panic inside the decoder or dispatcher is caught here so that the caller
can still run its teardown.
*/
pub(crate) async fn supervise<F: Future<Output = Result<(), Error>>>(peer: SocketAddr, f: F) {
	match AssertUnwindSafe(f).catch_unwind().await {
		Ok(Ok(())) => debug!("{}: read loop finished", peer),
		Ok(Err(e)) => warn!("{}: read loop failed: {}", peer, e),
		Err(payload) => error!("{}: read loop panicked: {}", peer, panic_message(&*payload)),
	}
}

/// Background read loop of an outbound connection; disposes it on exit.
pub(super) struct ReadWorker<M> {
	conn: Arc<Connection<M>>,
}

impl<M: Send + 'static> ReadWorker<M> {
	pub(super) fn new(conn: Arc<Connection<M>>) -> Self {
		Self{conn}
	}

	async fn run(self) {
		supervise(self.conn.peer_addr(), self.conn.listen()).await;
		self.conn.dispose().await;
	}
}

impl<M: Send + 'static> Spawn for ReadWorker<M> {
	fn spawn(self) {
		tokio::spawn(async move { self.run().await });
	}
}
