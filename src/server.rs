/*!
# Listener sockets for stream connections

A [`Server`] owns one listening socket. Its accept loop turns every accepted
socket into a [`Session`] via the user's [`SessionHandler`] and runs each
session's read loop in a detached task, so that accepting never waits for a
session to finish.

The server keeps no list of its sessions. They are tied to it only through
cancellation: every session's scope is a child of the server's scope.
*/
use std::fmt;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex as SyncMutex};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, warn};

use futures_util::FutureExt;

use socket2::SockRef;

use tokio::select;
use tokio::net::TcpListener;

use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::core::Spawn;
use crate::error::Error;
use crate::ioutil::{is_resource_exhausted, is_transient_accept_error};
use crate::socket;
use crate::stream::{panic_message, supervise, Accepted, Session};


/**
Session factory and lifecycle hooks of a [`Server`].

Only [`SessionHandler::create_session`] is mandatory. Typically it builds a
[`crate::Protocol`] and calls [`Session::new`]; returning an error drops the
socket without affecting the server.
*/
pub trait SessionHandler: Send + Sync + 'static {
	type Message: Send + 'static;

	fn create_session(&self, accepted: Accepted) -> Result<Session<Self::Message>, Error>;

	/// Called after a session was created and before its read loop starts.
	///
	/// The accept loop waits for this hook, so a slow hook delays accepting
	/// the next connection.
	fn on_session_connected(&self, _session: &Session<Self::Message>) -> impl Future<Output = ()> + Send {
		async {}
	}

	/// Called after a session's read loop ended and before its socket is released.
	fn on_session_disconnected(&self, _session: &Session<Self::Message>) -> impl Future<Output = ()> + Send {
		async {}
	}
}

/// Detached supervisor of one session: read loop, disconnect hook, teardown.
struct SessionWorker<H: SessionHandler> {
	handler: Arc<H>,
	session: Session<H::Message>,
}

impl<H: SessionHandler> SessionWorker<H> {
	async fn run(self) {
		let peer = self.session.peer_addr();
		supervise(peer, self.session.start()).await;
		let hook = self.handler.on_session_disconnected(&self.session);
		if let Err(payload) = AssertUnwindSafe(hook).catch_unwind().await {
			error!("{}: disconnect hook panicked: {}", peer, panic_message(&*payload));
		}
		self.session.dispose().await;
	}
}

impl<H: SessionHandler> Spawn for SessionWorker<H> {
	fn spawn(self) {
		tokio::spawn(async move { self.run().await });
	}
}

pub struct Server<H: SessionHandler> {
	handler: Arc<H>,
	config: ServerConfig,
	local: SocketAddr,
	cancel: CancellationToken,
	listener: SyncMutex<Option<TcpListener>>,
	listening: AtomicBool,
	disposed: AtomicBool,
}

impl<H: SessionHandler> fmt::Debug for Server<H> {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Server")
			.field("local", &self.local)
			.field("running", &self.is_running())
			.finish_non_exhaustive()
	}
}

impl<H: SessionHandler> Server<H> {
	/**
	Bind and listen on `addr`.

	Binding happens here rather than in [`Server::start`] so that the effective
	address (e.g. an ephemeral port) is known before accepting begins. Must be
	called from within a tokio runtime.
	*/
	pub fn bind(addr: SocketAddr, config: ServerConfig, handler: H) -> Result<Self, Error> {
		let listener = socket::listen(addr, config.backlog).map_err(Error::Bind)?;
		let local = listener.local_addr().map_err(Error::Bind)?;
		debug!("listening on {}", local);
		Ok(Self{
			handler: Arc::new(handler),
			config,
			local,
			cancel: CancellationToken::new(),
			listener: SyncMutex::new(Some(listener)),
			listening: AtomicBool::new(true),
			disposed: AtomicBool::new(false),
		})
	}

	pub fn local_addr(&self) -> SocketAddr {
		self.local
	}

	pub fn address(&self) -> IpAddr {
		self.local.ip()
	}

	pub fn port(&self) -> u16 {
		self.local.port()
	}

	/// The server's cancellation scope; every session's scope descends from it.
	pub fn cancellation(&self) -> &CancellationToken {
		&self.cancel
	}

	pub fn handler(&self) -> &H {
		&self.handler
	}

	pub fn is_running(&self) -> bool {
		!self.cancel.is_cancelled()
			&& self.listening.load(Ordering::Acquire)
			&& !self.disposed.load(Ordering::Acquire)
	}

	fn take_listener(&self) -> Option<TcpListener> {
		match self.listener.lock() {
			Ok(mut guard) => guard.take(),
			Err(poisoned) => poisoned.into_inner().take(),
		}
	}

	/**
	Run the accept loop until the server is canceled or accepting fails fatally.

	The server is disposed when this returns, whichever way. Disposal cancels
	the server's scope, so sessions that are still running are canceled with
	it. A panic in [`SessionHandler::create_session`] or
	[`SessionHandler::on_session_connected`] drops that one connection and
	does not end the loop.
	*/
	pub async fn start(&self) -> Result<(), Error> {
		let listener = match self.take_listener() {
			Some(listener) => listener,
			None if self.disposed.load(Ordering::Acquire) => return Err(Error::NotConnected),
			None => return Err(Error::AlreadyRunning),
		};
		let result = self.accept_loop(&listener).await;
		match &result {
			Ok(()) => debug!("{}: accept loop finished", self.local),
			Err(e) => error!("{}: accept loop failed: {}", self.local, e),
		}
		self.close_listener(listener);
		self.dispose().await;
		result
	}

	async fn accept_loop(&self, listener: &TcpListener) -> Result<(), Error> {
		while self.is_running() {
			let accepted = select! {
				biased;
				_ = self.cancel.cancelled() => break,
				accepted = listener.accept() => accepted,
			};
			let (sock, peer) = match accepted {
				Ok(v) => v,
				Err(e) if is_transient_accept_error(&e) => {
					debug!("{}: dropping half-accepted connection: {}", self.local, e);
					continue;
				},
				Err(e) if is_resource_exhausted(&e) => {
					error!("{}: failed to accept socket: {}. backing off for {:?}", self.local, e, self.config.accept_retry_interval);
					select! {
						_ = tokio::time::sleep(self.config.accept_retry_interval) => (),
						_ = self.cancel.cancelled() => (),
					}
					continue;
				},
				Err(e) => return Err(Error::Accept(e)),
			};
			let peer = SocketAddr::new(peer.ip().to_canonical(), peer.port());

			if let Err(e) = socket::configure(&sock, &self.config.socket) {
				warn!("{}: failed to configure accepted socket: {}", peer, e);
				continue;
			}

			let accepted = Accepted{
				sock,
				peer,
				parent: self.cancel.clone(),
				config: self.config.socket,
			};
			let session = match panic::catch_unwind(AssertUnwindSafe(|| self.handler.create_session(accepted))) {
				Ok(Ok(session)) => session,
				Ok(Err(e)) => {
					warn!("{}: no session created: {}", peer, e);
					continue;
				},
				Err(payload) => {
					error!("{}: session factory panicked: {}", peer, panic_message(&*payload));
					continue;
				},
			};
			debug!("{}: session accepted", peer);

			// a panic here costs this session only, never the accept loop
			let hook = async { self.handler.on_session_connected(&session).await };
			if let Err(payload) = AssertUnwindSafe(hook).catch_unwind().await {
				error!("{}: connect hook panicked: {}", peer, panic_message(&*payload));
				session.dispose().await;
				continue;
			}

			SessionWorker{
				handler: self.handler.clone(),
				session,
			}.spawn();
		}
		Ok(())
	}

	fn close_listener(&self, listener: TcpListener) {
		self.listening.store(false, Ordering::Release);
		if let Err(e) = socket::shutdown(SockRef::from(&listener)) {
			debug!("{}: listener shutdown failed: {}", self.local, e);
		}
		drop(listener);
	}

	/**
	Stop accepting and cancel the server's scope (and with it every session).
	Idempotent.

	If the accept loop is running it observes the cancellation and releases
	the listening socket itself; otherwise the socket is released here.
	*/
	pub async fn dispose(&self) {
		if self.disposed.swap(true, Ordering::AcqRel) {
			return;
		}
		self.cancel.cancel();
		if let Some(listener) = self.take_listener() {
			self.close_listener(listener);
		}
		debug!("{}: server disposed", self.local);
	}
}
