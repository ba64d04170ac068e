#![allow(dead_code)]
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tcptransport::codec::LengthDelimited;
use tcptransport::{
	Accepted, BoxError, Client, ClientConfig, Connection, Dispatcher, Error,
	Protocol, Server, ServerConfig, Session, SessionHandler,
};


pub async fn within<F: Future>(f: F) -> F::Output {
	tokio::time::timeout(Duration::from_secs(5), f).await.expect("timed out")
}

/// Replies PONG to PING and echoes everything else.
pub fn echo() -> Arc<dyn Dispatcher<Bytes>> {
	Arc::new(|conn: Arc<Connection<Bytes>>, msg: Bytes| async move {
		let reply = if &msg[..] == b"PING" {
			Bytes::from_static(b"PONG")
		} else {
			msg
		};
		conn.send(reply).await?;
		Ok::<(), BoxError>(())
	})
}

/// Forwards every received message into a channel.
pub fn collect() -> (Arc<dyn Dispatcher<Bytes>>, mpsc::UnboundedReceiver<Bytes>) {
	let (tx, rx) = mpsc::unbounded_channel();
	let dispatcher = Arc::new(move |_conn: Arc<Connection<Bytes>>, msg: Bytes| {
		let tx = tx.clone();
		async move {
			let _ = tx.send(msg);
			Ok::<(), BoxError>(())
		}
	});
	(dispatcher, rx)
}

pub struct Hooks {
	pub connected: mpsc::UnboundedReceiver<Session<Bytes>>,
	pub disconnected: mpsc::UnboundedReceiver<Session<Bytes>>,
}

pub struct TestHandler {
	dispatcher: Arc<dyn Dispatcher<Bytes>>,
	codec: LengthDelimited,
	reject: bool,
	created: AtomicUsize,
	connected: mpsc::UnboundedSender<Session<Bytes>>,
	disconnected: mpsc::UnboundedSender<Session<Bytes>>,
}

impl TestHandler {
	pub fn new(dispatcher: Arc<dyn Dispatcher<Bytes>>) -> (Self, Hooks) {
		let (connected_tx, connected) = mpsc::unbounded_channel();
		let (disconnected_tx, disconnected) = mpsc::unbounded_channel();
		(
			Self{
				dispatcher,
				codec: LengthDelimited::default(),
				reject: false,
				created: AtomicUsize::new(0),
				connected: connected_tx,
				disconnected: disconnected_tx,
			},
			Hooks{connected, disconnected},
		)
	}

	pub fn with_codec(mut self, codec: LengthDelimited) -> Self {
		self.codec = codec;
		self
	}

	pub fn rejecting(mut self) -> Self {
		self.reject = true;
		self
	}

	pub fn created(&self) -> usize {
		self.created.load(Ordering::SeqCst)
	}
}

impl SessionHandler for TestHandler {
	type Message = Bytes;

	fn create_session(&self, accepted: Accepted) -> Result<Session<Bytes>, Error> {
		if self.reject {
			return Err(Error::Rejected(format!("{} not welcome", accepted.peer_addr()).into()));
		}
		self.created.fetch_add(1, Ordering::SeqCst);
		Session::new(accepted, Protocol::with_codec(self.codec, self.dispatcher.clone()))
	}

	fn on_session_connected(&self, session: &Session<Bytes>) -> impl Future<Output = ()> + Send {
		let _ = self.connected.send(session.clone());
		async {}
	}

	fn on_session_disconnected(&self, session: &Session<Bytes>) -> impl Future<Output = ()> + Send {
		let _ = self.disconnected.send(session.clone());
		async {}
	}
}

pub fn local() -> SocketAddr {
	"127.0.0.1:0".parse().unwrap()
}

pub fn serve<H: SessionHandler>(handler: H, config: ServerConfig) -> (Arc<Server<H>>, JoinHandle<Result<(), Error>>) {
	let server = Arc::new(Server::bind(local(), config, handler).unwrap());
	let task = tokio::spawn({
		let server = server.clone();
		async move { server.start().await }
	});
	(server, task)
}

pub async fn connect(addr: SocketAddr, dispatcher: Arc<dyn Dispatcher<Bytes>>) -> Client<Bytes> {
	Client::connect(addr, Protocol::with_codec(LengthDelimited::default(), dispatcher), ClientConfig::default())
		.await
		.unwrap()
}
