use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::codec::Encoder;


/// Buffered outbound stream plus the encoder feeding it. Lives behind the
/// connection's write lock.
pub(super) struct Outbound<W, M> {
	tx: BufWriter<W>,
	pub(super) encoder: Box<dyn Encoder<M>>,
}

impl<W: AsyncWrite + Unpin, M> Outbound<W, M> {
	pub(super) fn new(tx: W, encoder: Box<dyn Encoder<M>>) -> Self {
		Self{
			tx: BufWriter::new(tx),
			encoder,
		}
	}

	/// Write one complete frame and push it to the socket.
	pub(super) async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
		self.tx.write_all(frame).await?;
		self.tx.flush().await
	}

	pub(super) async fn flush(&mut self) -> io::Result<()> {
		self.tx.flush().await
	}

	pub(super) fn get_ref(&self) -> &W {
		self.tx.get_ref()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use bytes::Bytes;

	use crate::codec::LengthDelimited;

	#[tokio::test]
	async fn frames_reach_the_writer_in_order() {
		let mut out: Outbound<Vec<u8>, Bytes> = Outbound::new(Vec::new(), Box::new(LengthDelimited::default()));
		for payload in [&b"a"[..], &b"bc"[..]] {
			let frame = out.encoder.encode(Bytes::copy_from_slice(payload)).unwrap();
			out.write_frame(&frame).await.unwrap();
		}
		assert_eq!(out.get_ref(), &b"\x00\x00\x00\x01a\x00\x00\x00\x02bc".to_vec());
	}
}
