use std::io;
use std::time::Duration;

use log::{debug, warn};

use bytes::{Buf, BufMut, BytesMut};

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::{Decoder, Window};
use crate::error::Error;
use crate::ioutil::iotimeout;


/**
Buffered inbound byte stream.

Bytes accumulate in a single `BytesMut`; released bytes are dropped from the
front so that the storage is reused instead of reallocated per message.
*/
pub(super) struct Inbound<R> {
	rx: R,
	buf: BytesMut,
	read_size: usize,
}

impl<R: AsyncRead + Unpin> Inbound<R> {
	pub(super) fn new(rx: R, read_size: usize) -> Self {
		let read_size = read_size.max(1);
		Self{
			rx,
			buf: BytesMut::with_capacity(read_size),
			read_size,
		}
	}

	/// Append whatever is available from the socket (at most `read_size` bytes).
	///
	/// Returns the number of bytes appended; zero means end of stream.
	pub(super) async fn fill(&mut self) -> io::Result<usize> {
		self.buf.reserve(self.read_size);
		let mut limited = (&mut self.buf).limit(self.read_size);
		self.rx.read_buf(&mut limited).await
	}

	#[inline]
	pub(super) fn buffered(&self) -> &[u8] {
		&self.buf[..]
	}

	#[inline]
	pub(super) fn release(&mut self, n: usize) {
		self.buf.advance(n);
	}
}

/**
Inbound stream plus the decoder which carves messages out of it.

After a message was decoded, the next call first retries the decoder on the
data already buffered and only then waits for the socket. This drains several
messages that arrived in one read without waiting for more traffic.
*/
pub(super) struct Reader<R, M> {
	inbound: Inbound<R>,
	decoder: Box<dyn Decoder<M>>,
	timeout: Option<Duration>,
	pending: bool,
}

impl<R: AsyncRead + Unpin, M: 'static> Reader<R, M> {
	pub(super) fn new(rx: R, decoder: Box<dyn Decoder<M>>, read_size: usize, timeout: Option<Duration>) -> Self {
		Self{
			inbound: Inbound::new(rx, read_size),
			decoder,
			timeout,
			pending: false,
		}
	}

	/**
	Wait for the next complete message.

	Returns `Ok(None)` at end of stream. An incomplete message left in the
	buffer at that point is discarded.

	Cancel safe: dropping the future loses no bytes.
	*/
	pub(super) async fn next_message(&mut self) -> Result<Option<M>, Error> {
		loop {
			if !self.pending {
				let n = iotimeout(self.timeout, self.inbound.fill(), "receive timed out").await?;
				if n == 0 {
					let trailing = self.inbound.buffered().len();
					if trailing > 0 {
						debug!("discarding {} bytes of incomplete message at end of stream", trailing);
					}
					return Ok(None);
				}
			}
			match self.decode_one()? {
				Some(message) => {
					self.pending = true;
					return Ok(Some(message));
				},
				None => self.pending = false,
			}
		}
	}

	fn decode_one(&mut self) -> Result<Option<M>, Error> {
		let mut window = Window::new(self.inbound.buffered());
		let message = self.decoder.decode(&mut window).map_err(Error::Decode)?;
		let consumed = window.consumed();
		match message {
			Some(message) => {
				self.inbound.release(consumed);
				Ok(Some(message))
			},
			None => {
				if consumed > 0 {
					warn!("decoder advanced {} bytes without producing a message; keeping them buffered", consumed);
				}
				Ok(None)
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::collections::VecDeque;
	use std::pin::Pin;
	use std::task::{Context, Poll};

	use bytes::Bytes;

	use proptest::prelude::*;

	use tokio::io::ReadBuf;

	use crate::codec::{Encoder, LengthDelimited};

	/// Hands out one pre-arranged chunk per read.
	struct Chunked {
		chunks: VecDeque<Vec<u8>>,
		reads: usize,
	}

	impl Chunked {
		fn new<I: IntoIterator<Item = Vec<u8>>>(chunks: I) -> Self {
			Self{chunks: chunks.into_iter().collect(), reads: 0}
		}
	}

	impl AsyncRead for Chunked {
		fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
			self.reads += 1;
			if let Some(mut chunk) = self.chunks.pop_front() {
				let n = chunk.len().min(buf.remaining());
				buf.put_slice(&chunk[..n]);
				if n < chunk.len() {
					self.chunks.push_front(chunk.split_off(n));
				}
			}
			Poll::Ready(Ok(()))
		}
	}

	fn encode_all(messages: &[Vec<u8>]) -> Vec<u8> {
		let mut codec = LengthDelimited::default();
		let mut out = Vec::new();
		for m in messages {
			out.extend_from_slice(&codec.encode(Bytes::from(m.clone())).unwrap());
		}
		out
	}

	fn reader(chunks: Vec<Vec<u8>>, read_size: usize) -> Reader<Chunked, Bytes> {
		Reader::new(Chunked::new(chunks), Box::new(LengthDelimited::default()), read_size, None)
	}

	async fn collect(mut reader: Reader<Chunked, Bytes>) -> Vec<Vec<u8>> {
		let mut out = Vec::new();
		while let Some(m) = reader.next_message().await.unwrap() {
			out.push(m.to_vec());
		}
		out
	}

	/// Cut `data` at the given (sorted, deduplicated) offsets.
	fn split_at_offsets(data: &[u8], mut cuts: Vec<usize>) -> Vec<Vec<u8>> {
		cuts.retain(|c| *c > 0 && *c < data.len());
		cuts.sort_unstable();
		cuts.dedup();
		let mut chunks = Vec::new();
		let mut start = 0;
		for cut in cuts {
			chunks.push(data[start..cut].to_vec());
			start = cut;
		}
		chunks.push(data[start..].to_vec());
		chunks
	}

	#[tokio::test]
	async fn message_split_across_reads() {
		let data = encode_all(&[b"PING".to_vec()]);
		let chunks = vec![data[..3].to_vec(), data[3..6].to_vec(), data[6..].to_vec()];
		assert_eq!(collect(reader(chunks, 8192)).await, vec![b"PING".to_vec()]);
	}

	#[tokio::test]
	async fn two_messages_in_one_read_are_drained_without_reading_again() {
		let data = encode_all(&[b"one".to_vec(), b"two".to_vec()]);
		let mut r = reader(vec![data], 8192);

		assert_eq!(&r.next_message().await.unwrap().unwrap()[..], b"one");
		assert_eq!(r.inbound.rx.reads, 1);
		assert_eq!(&r.next_message().await.unwrap().unwrap()[..], b"two");
		assert_eq!(r.inbound.rx.reads, 1);
		assert!(r.next_message().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn incomplete_message_stays_buffered() {
		let data = encode_all(&[b"hello".to_vec()]);
		let mut r = reader(vec![data[..6].to_vec()], 8192);
		// first chunk is incomplete, then end of stream
		assert!(r.next_message().await.unwrap().is_none());
		assert_eq!(r.inbound.buffered(), &data[..6]);
	}

	#[tokio::test]
	async fn decoder_errors_surface() {
		let mut r: Reader<Chunked, Bytes> = Reader::new(
			Chunked::new(vec![b"\xff\xff\xff\xffxx".to_vec()]),
			Box::new(LengthDelimited::new(16)),
			8192,
			None,
		);
		match r.next_message().await {
			Err(Error::Decode(_)) => (),
			other => panic!("unexpected result: {:?}", other.map(|m| m.map(|b| b.len()))),
		}
	}

	struct Greedy;

	impl Decoder<Bytes> for Greedy {
		fn decode(&mut self, window: &mut Window<'_>) -> Result<Option<Bytes>, crate::error::BoxError> {
			if window.len() < 4 {
				// misbehaves: claims bytes without producing anything
				window.advance(window.len());
				return Ok(None);
			}
			let msg = Bytes::copy_from_slice(&window.as_slice()[..4]);
			window.advance(4);
			Ok(Some(msg))
		}
	}

	#[tokio::test]
	async fn advance_without_message_loses_nothing() {
		let chunks = vec![b"ab".to_vec(), b"cd".to_vec()];
		let r: Reader<Chunked, Bytes> = Reader::new(Chunked::new(chunks), Box::new(Greedy), 8192, None);
		assert_eq!(collect(r).await, vec![b"abcd".to_vec()]);
	}

	#[tokio::test]
	async fn small_read_size_still_assembles_large_messages() {
		let payload = vec![7u8; 10_000];
		let data = encode_all(&[payload.clone()]);
		assert_eq!(collect(reader(vec![data], 16)).await, vec![payload]);
	}

	proptest! {
		#[test]
		fn any_chunking_yields_the_sent_messages(
			messages in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16),
			cuts in prop::collection::vec(0usize..2048, 0..32),
			read_size in 1usize..64,
		) {
			let data = encode_all(&messages);
			let chunks = split_at_offsets(&data, cuts);
			let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
			let received = rt.block_on(collect(reader(chunks, read_size)));
			prop_assert_eq!(received, messages);
		}
	}
}
