/*!
# Application dispatch

The [`Dispatcher`] receives every decoded message together with the
connection it arrived on. Dispatch is sequential per connection: the next
message is not decoded before the returned future completes.
*/
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::codec::{Decoder, Encoder};
use crate::error::BoxError;
use crate::stream::Connection;

pub trait Dispatcher<M>: Send + Sync + 'static {
	/// Handle one message. May call [`Connection::send`] on `conn`.
	///
	/// Returning an error ends the connection.
	fn dispatch<'a>(&'a self, conn: &'a Arc<Connection<M>>, message: M) -> BoxFuture<'a, Result<(), BoxError>>;
}

impl<M, F, Fut> Dispatcher<M> for F
where
	M: Send + 'static,
	F: Fn(Arc<Connection<M>>, M) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
	fn dispatch<'a>(&'a self, conn: &'a Arc<Connection<M>>, message: M) -> BoxFuture<'a, Result<(), BoxError>> {
		Box::pin(self(conn.clone(), message))
	}
}

/**
The three collaborators a connection is built from.

Encoder and decoder belong to exactly one connection. The dispatcher is
shared, typically by all sessions of a server.
*/
pub struct Protocol<M> {
	pub(crate) encoder: Box<dyn Encoder<M>>,
	pub(crate) decoder: Box<dyn Decoder<M>>,
	pub(crate) dispatcher: Arc<dyn Dispatcher<M>>,
}

impl<M: Send + 'static> Protocol<M> {
	pub fn new<E, D>(encoder: E, decoder: D, dispatcher: Arc<dyn Dispatcher<M>>) -> Self
	where
		E: Encoder<M>,
		D: Decoder<M>,
	{
		Self{
			encoder: Box::new(encoder),
			decoder: Box::new(decoder),
			dispatcher,
		}
	}

	/// Use one value as both encoder and decoder.
	pub fn with_codec<C>(codec: C, dispatcher: Arc<dyn Dispatcher<M>>) -> Self
	where
		C: Encoder<M> + Decoder<M> + Clone,
	{
		Self::new(codec.clone(), codec, dispatcher)
	}
}

impl<M> fmt::Debug for Protocol<M> {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Protocol").finish_non_exhaustive()
	}
}
