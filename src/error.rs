use std::io;

/// Error type returned by user-supplied collaborators (codecs, dispatchers,
/// session factories).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/**
Errors raised by connections, clients and servers.

Only [`Error::NotConnected`] and [`Error::AlreadyRunning`] describe the state
of the object the operation was invoked on; everything else wraps a failure of
the socket or of one of the collaborators.
*/
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The connection is canceled, disposed or the peer has gone away.
	#[error("invalid state: not connected")]
	NotConnected,

	/// The read loop (or accept loop) has already been started once.
	#[error("invalid state: already running")]
	AlreadyRunning,

	/// The outbound connection could not be established.
	#[error("failed to connect: {0}")]
	Connect(#[source] io::Error),

	/// The listening socket could not be bound.
	#[error("failed to bind listener: {0}")]
	Bind(#[source] io::Error),

	/// Accepting a connection failed in a way the accept loop cannot recover from.
	#[error("failed to accept connection: {0}")]
	Accept(#[source] io::Error),

	/// A read or write on an established connection failed.
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	#[error("failed to encode message: {0}")]
	Encode(#[source] BoxError),

	#[error("failed to decode message: {0}")]
	Decode(#[source] BoxError),

	#[error("message dispatch failed: {0}")]
	Dispatch(#[source] BoxError),

	/// The session factory declined an accepted socket.
	#[error("session rejected: {0}")]
	Rejected(#[source] BoxError),
}

impl Error {
	/// Return the kind of the underlying I/O error, if this error wraps one.
	pub fn io_kind(&self) -> Option<io::ErrorKind> {
		match self {
			Self::Connect(e) | Self::Bind(e) | Self::Accept(e) | Self::Io(e) => Some(e.kind()),
			Self::NotConnected => Some(io::ErrorKind::NotConnected),
			_ => None,
		}
	}
}
