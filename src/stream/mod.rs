/*!
# (TCP) stream connections, inbound and outbound

[`Connection`] is the engine: it owns one established socket, runs the
read/decode/dispatch loop and serializes sends. [`Client`] adds outbound
connect semantics, [`Session`] adds the glue for sockets accepted by a
[`crate::Server`].

Related modules:

- [`crate::server`] which handles listening sockets.
- [`crate::codec`] and [`crate::dispatch`] for the pluggable collaborators.
*/

mod client;
mod connection;
mod inbound;
mod outbound;
mod session;
mod worker;

pub use client::Client;
pub use connection::Connection;
pub use session::{Accepted, Session};

pub(crate) use worker::{panic_message, supervise};
