/*!
# Message transport over TCP

Connection lifecycle, streaming message framing and ordered writes for custom
request/response or streaming protocols. The wire format and the business
logic are plugged in:

- a [`codec::Encoder`]/[`codec::Decoder`] pair converts between messages and
  bytes,
- a [`Dispatcher`] handles every decoded message,
- a [`SessionHandler`] tells a [`Server`] how to build a [`Session`] for an
  accepted socket.

[`Client`] and [`Session`] are thin wrappers around the same [`Connection`]
engine.
*/

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

mod config;
mod core;
mod dispatch;
mod error;
mod ioutil;
mod socket;

pub mod codec;
pub mod server;
pub mod stream;

pub use config::{ClientConfig, ServerConfig, SocketConfig};
pub use dispatch::{Dispatcher, Protocol};
pub use error::{BoxError, Error};
pub use server::{Server, SessionHandler};
pub use stream::{Accepted, Client, Connection, Session};

pub use tokio_util::sync::CancellationToken;
