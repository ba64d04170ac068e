use std::time::Duration;

/**
Per-connection socket settings.

Applied to outbound sockets before connecting and to every socket a
[`crate::Server`] accepts. Dual-stack operation and abortive close
(zero linger) are always enabled and cannot be configured.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SocketConfig {
	/// Maximum time a single read may wait for data. `None` waits forever.
	pub receive_timeout: Option<Duration>,
	/// Maximum time writing and flushing one message may take. `None` waits forever.
	pub send_timeout: Option<Duration>,
	/// Disable small-packet coalescing (`TCP_NODELAY`).
	pub no_delay: bool,
	/// Upper bound of bytes pulled from the socket per read.
	pub read_size: usize,
}

impl Default for SocketConfig {
	fn default() -> Self {
		Self{
			receive_timeout: Some(Duration::from_millis(5_000)),
			send_timeout: Some(Duration::from_millis(5_000)),
			no_delay: true,
			read_size: 8192,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientConfig {
	pub socket: SocketConfig,
	/// Upper bound for establishing the connection. `None` leaves it to the OS.
	pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self{
			socket: SocketConfig::default(),
			connect_timeout: Some(Duration::new(20, 0)),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerConfig {
	/// Settings applied to each accepted socket.
	pub socket: SocketConfig,
	/// Length of the pending connection queue passed to `listen(2)`.
	pub backlog: i32,
	/// Back-off after the process ran out of file descriptors while accepting.
	pub accept_retry_interval: Duration,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self{
			socket: SocketConfig::default(),
			backlog: 1024,
			accept_retry_interval: Duration::new(10, 0),
		}
	}
}
