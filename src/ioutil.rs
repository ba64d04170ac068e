use std::io;
use std::time::Duration;

use tokio::time::timeout;
use tokio::time::error::Elapsed;


#[inline]
pub(crate) fn flatten_timeout<T>(r: Result<Result<T, io::Error>, Elapsed>, msg: &'static str) -> Result<T, io::Error> {
	match r {
		Ok(r) => r,
		Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, msg)),
	}
}

/// Run `f`, failing with `TimedOut` after `t`. `None` disables the limit.
#[inline]
pub(crate) async fn iotimeout<T, F: std::future::Future<Output = io::Result<T>>>(t: Option<Duration>, f: F, msg: &'static str) -> io::Result<T> {
	match t {
		Some(t) => flatten_timeout(timeout(t, f).await, msg),
		None => f.await,
	}
}

/// True for errors which only say that the peer is not there anymore.
pub(crate) fn is_peer_gone(e: &io::Error) -> bool {
	matches!(
		e.kind(),
		io::ErrorKind::NotConnected
			| io::ErrorKind::ConnectionReset
			| io::ErrorKind::ConnectionAborted
			| io::ErrorKind::BrokenPipe
			| io::ErrorKind::UnexpectedEof
	)
}

/// Accept failures which concern only the one connection being accepted.
pub(crate) fn is_transient_accept_error(e: &io::Error) -> bool {
	matches!(
		e.kind(),
		io::ErrorKind::ConnectionAborted
			| io::ErrorKind::ConnectionReset
			| io::ErrorKind::ConnectionRefused
			| io::ErrorKind::Interrupted
			| io::ErrorKind::WouldBlock
	)
}

/// Accept failures caused by running out of descriptors or buffers; these clear up on their own.
#[cfg(unix)]
pub(crate) fn is_resource_exhausted(e: &io::Error) -> bool {
	use nix::errno::Errno;

	match e.raw_os_error().map(Errno::from_i32) {
		Some(Errno::EMFILE) | Some(Errno::ENFILE) | Some(Errno::ENOBUFS) | Some(Errno::ENOMEM) => true,
		_ => false,
	}
}

#[cfg(not(unix))]
pub(crate) fn is_resource_exhausted(_e: &io::Error) -> bool {
	false
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn iotimeout_maps_elapsed_to_timed_out() {
		let result: io::Result<()> = iotimeout(
			Some(Duration::from_millis(10)),
			std::future::pending(),
			"too slow",
		).await;
		let err = result.unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::TimedOut);
		assert_eq!(err.to_string(), "too slow");
	}

	#[tokio::test]
	async fn iotimeout_without_limit_passes_result_through() {
		let result = iotimeout(None, async { Ok(42) }, "unused").await;
		assert_eq!(result.unwrap(), 42);
	}

	#[test]
	fn classification() {
		assert!(is_peer_gone(&io::Error::from(io::ErrorKind::ConnectionReset)));
		assert!(!is_peer_gone(&io::Error::from(io::ErrorKind::TimedOut)));
		assert!(is_transient_accept_error(&io::Error::from(io::ErrorKind::ConnectionAborted)));
		assert!(!is_transient_accept_error(&io::Error::from(io::ErrorKind::PermissionDenied)));
	}

	#[cfg(unix)]
	#[test]
	fn descriptor_exhaustion_is_recognized() {
		let err = io::Error::from_raw_os_error(nix::errno::Errno::EMFILE as i32);
		assert!(is_resource_exhausted(&err));
		assert!(!is_resource_exhausted(&io::Error::from(io::ErrorKind::Other)));
	}
}
