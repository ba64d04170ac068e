/*!
# Message framing contracts

A connection never looks at message contents. Turning bytes into messages
and back is left to an [`Encoder`]/[`Decoder`] pair supplied by the user.

[`LengthDelimited`] is a ready-made pair for byte payloads prefixed with
their 32-bit big-endian length.
*/

mod length;
mod window;

use bytes::Bytes;

use crate::error::BoxError;

pub use length::{CodecError, LengthDelimited};
pub use window::Window;

/// Serializes one outbound message.
pub trait Encoder<M>: Send + 'static {
	/// Turn `message` into the exact bytes to put on the wire.
	///
	/// Called once per message while the connection's write lock is held.
	fn encode(&mut self, message: M) -> Result<Bytes, BoxError>;
}

/// Carves messages out of the inbound byte stream.
pub trait Decoder<M>: Send + 'static {
	/**
	Attempt to decode at most one message from the front of `window`.

	On success, advance `window` past exactly the bytes the message occupied
	and return it. Bytes after the message stay buffered for the next call.

	If the window does not hold a complete message yet, return `Ok(None)`
	without advancing. The decoder is called again once more bytes have been
	appended to the same buffered data.

	Errors end the connection.
	*/
	fn decode(&mut self, window: &mut Window<'_>) -> Result<Option<M>, BoxError>;
}
