use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex as SyncMutex};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use futures_util::FutureExt;

use socket2::SockRef;

use tokio::select;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{watch, Mutex};

use tokio_util::sync::CancellationToken;

use crate::config::SocketConfig;
use crate::dispatch::{Dispatcher, Protocol};
use crate::error::Error;
use crate::ioutil::{iotimeout, is_peer_gone};
use crate::socket;

use super::inbound::Reader;
use super::outbound::Outbound;


/**
One live duplex connection: the engine shared by [`crate::Client`] and
[`crate::Session`].

The read loop ([`Connection::run`]) decodes and dispatches messages strictly
one after another. [`Connection::send`] may be called concurrently from
anywhere; sends are serialized by a write lock so that frames never
interleave.

Teardown ([`Connection::dispose`]) runs at most once, either because the read
loop ended or because somebody asked for it; later calls do nothing.
*/
pub struct Connection<M> {
	peer: SocketAddr,
	local: SocketAddr,
	config: SocketConfig,
	cancel: CancellationToken,
	// taken by the read loop for its whole lifetime
	reader: SyncMutex<Option<Reader<OwnedReadHalf, M>>>,
	// the write lock; None once disposed
	writer: Mutex<Option<Outbound<OwnedWriteHalf, M>>>,
	dispatcher: Arc<dyn Dispatcher<M>>,
	connected: AtomicBool,
	disposed: AtomicBool,
	closed: watch::Sender<bool>,
}

impl<M> fmt::Debug for Connection<M> {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Connection")
			.field("peer", &self.peer)
			.field("local", &self.local)
			.field("connected", &self.is_connected())
			.finish_non_exhaustive()
	}
}

impl<M> Connection<M> {
	/// Remote endpoint. IPv4 peers of dual-stack sockets are reported as IPv4.
	pub fn peer_addr(&self) -> SocketAddr {
		self.peer
	}

	pub fn address(&self) -> IpAddr {
		self.peer.ip()
	}

	pub fn port(&self) -> u16 {
		self.peer.port()
	}

	pub fn local_addr(&self) -> SocketAddr {
		self.local
	}

	/// The cancellation scope of this connection. Canceling it ends the read
	/// loop at its next suspension point and fails pending sends.
	pub fn cancellation(&self) -> &CancellationToken {
		&self.cancel
	}

	/// Not canceled, not disposed, and the socket has not failed or hit end of stream.
	pub fn is_connected(&self) -> bool {
		!self.cancel.is_cancelled()
			&& self.connected.load(Ordering::Acquire)
			&& !self.disposed.load(Ordering::Acquire)
	}

	/// Resolves once [`Connection::dispose`] has completed.
	pub async fn closed(&self) {
		let mut rx = self.closed.subscribe();
		// the sender lives in self, so this cannot fail while we borrow self
		let _ = rx.wait_for(|closed| *closed).await;
	}

	fn mark_failed(&self) {
		self.connected.store(false, Ordering::Release);
		self.cancel.cancel();
	}
}

impl<M: Send + 'static> Connection<M> {
	/**
	Wrap an established socket.

	`cancel` is the connection's cancellation scope: a fresh token for a
	client, a child of the server's token for a session.
	*/
	pub fn new(sock: TcpStream, protocol: Protocol<M>, cancel: CancellationToken, config: SocketConfig) -> Result<Arc<Self>, Error> {
		let peer = sock.peer_addr()?;
		let peer = SocketAddr::new(peer.ip().to_canonical(), peer.port());
		let local = sock.local_addr()?;
		let (rx, tx) = sock.into_split();
		let Protocol{encoder, decoder, dispatcher} = protocol;
		let (closed, _) = watch::channel(false);
		Ok(Arc::new(Self{
			peer,
			local,
			config,
			cancel,
			reader: SyncMutex::new(Some(Reader::new(rx, decoder, config.read_size, config.receive_timeout))),
			writer: Mutex::new(Some(Outbound::new(tx, encoder))),
			dispatcher,
			connected: AtomicBool::new(true),
			disposed: AtomicBool::new(false),
			closed,
		}))
	}

	fn take_reader(&self) -> Option<Reader<OwnedReadHalf, M>> {
		match self.reader.lock() {
			Ok(mut guard) => guard.take(),
			Err(poisoned) => poisoned.into_inner().take(),
		}
	}

	/**
	Run the read loop until end of stream, cancellation, or failure, without
	tearing down afterwards.

	Peer resets count as a normal end of the connection. Decoder and dispatcher
	errors, and other I/O errors such as timeouts, are returned.
	*/
	pub(crate) async fn listen(self: &Arc<Self>) -> Result<(), Error> {
		let mut reader = match self.take_reader() {
			Some(reader) => reader,
			None if self.disposed.load(Ordering::Acquire) => return Err(Error::NotConnected),
			None => return Err(Error::AlreadyRunning),
		};
		let result = self.read_loop(&mut reader).await;
		self.connected.store(false, Ordering::Release);
		result
	}

	async fn read_loop(self: &Arc<Self>, reader: &mut Reader<OwnedReadHalf, M>) -> Result<(), Error> {
		while self.is_connected() {
			let next = select! {
				biased;
				_ = self.cancel.cancelled() => {
					debug!("{}: read loop canceled", self.peer);
					return Ok(());
				},
				next = reader.next_message() => next,
			};
			let message = match next {
				Ok(Some(message)) => message,
				Ok(None) => {
					debug!("{}: end of stream", self.peer);
					return Ok(());
				},
				Err(Error::Io(e)) if is_peer_gone(&e) => {
					debug!("{}: connection lost: {}", self.peer, e);
					return Ok(());
				},
				Err(e) => return Err(e),
			};
			if !self.is_connected() {
				break;
			}
			self.dispatcher.dispatch(self, message).await.map_err(Error::Dispatch)?;
		}
		Ok(())
	}

	/**
	Run the read loop and dispose the connection when it ends, whatever the
	reason.

	Fails with [`Error::AlreadyRunning`], leaving the connection untouched, if
	the loop was started before.

	# Panics

	A panic in the decoder or dispatcher is re-raised once the connection
	has been disposed.
	*/
	pub async fn run(self: &Arc<Self>) -> Result<(), Error> {
		match AssertUnwindSafe(self.listen()).catch_unwind().await {
			Ok(Err(Error::AlreadyRunning)) => Err(Error::AlreadyRunning),
			Ok(result) => {
				self.dispose().await;
				result
			},
			Err(payload) => {
				self.dispose().await;
				panic::resume_unwind(payload)
			},
		}
	}

	/**
	Encode `message` and write it out.

	Waits for any send already in flight. Fails with [`Error::NotConnected`]
	without writing anything if the connection is not live. A write that
	fails or is canceled midway breaks the connection.
	*/
	pub async fn send(&self, message: M) -> Result<(), Error> {
		let mut guard = select! {
			biased;
			_ = self.cancel.cancelled() => return Err(Error::NotConnected),
			guard = self.writer.lock() => guard,
		};
		if !self.is_connected() {
			return Err(Error::NotConnected);
		}
		let writer = match guard.as_mut() {
			Some(writer) => writer,
			None => return Err(Error::NotConnected),
		};
		let frame = writer.encoder.encode(message).map_err(Error::Encode)?;
		let result = select! {
			biased;
			_ = self.cancel.cancelled() => Err(std::io::Error::new(std::io::ErrorKind::Interrupted, "send canceled")),
			result = iotimeout(self.config.send_timeout, writer.write_frame(&frame), "send timed out") => result,
		};
		match result {
			Ok(()) => Ok(()),
			Err(e) => {
				debug!("{}: write failed: {}", self.peer, e);
				self.mark_failed();
				Err(Error::Io(e))
			},
		}
	}

	/**
	Tear the connection down. Idempotent.

	Cancels the scope, flushes and releases both stream halves, shuts the
	socket down (ignoring complaints about an already closed peer) and closes
	it. The socket is released even if the shutdown fails.
	*/
	pub async fn dispose(&self) {
		if self.disposed.swap(true, Ordering::AcqRel) {
			return;
		}
		self.connected.store(false, Ordering::Release);
		self.cancel.cancel();

		// only present if the read loop never ran
		drop(self.take_reader());

		let writer = self.writer.lock().await.take();
		if let Some(mut writer) = writer {
			match iotimeout(self.config.send_timeout, writer.flush(), "flush timed out").await {
				Ok(()) => (),
				Err(e) => debug!("{}: discarding unflushed data: {}", self.peer, e),
			}
			let sock: &TcpStream = writer.get_ref().as_ref();
			if let Err(e) = socket::shutdown(SockRef::from(sock)) {
				warn!("{}: shutdown failed: {}", self.peer, e);
			}
			drop(writer);
		}

		self.closed.send_replace(true);
		debug!("{}: disposed", self.peer);
	}
}
