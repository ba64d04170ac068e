use bytes::{BufMut, Bytes, BytesMut};

use crate::error::BoxError;

use super::{Decoder, Encoder, Window};

const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
	#[error("frame of {len} bytes exceeds the limit of {max} bytes")]
	FrameTooLarge{
		len: usize,
		max: usize,
	},
}

/**
Frames byte payloads as a 4-byte big-endian length followed by the payload.

Frames larger than `max_frame_length` are refused in both directions; on the
inbound side this ends the connection instead of buffering without bound.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthDelimited {
	max_frame_length: usize,
}

impl LengthDelimited {
	pub fn new(max_frame_length: usize) -> Self {
		Self{
			max_frame_length: max_frame_length.min(u32::MAX as usize),
		}
	}

	pub fn max_frame_length(&self) -> usize {
		self.max_frame_length
	}
}

impl Default for LengthDelimited {
	fn default() -> Self {
		Self::new(8 * 1024 * 1024)
	}
}

impl Encoder<Bytes> for LengthDelimited {
	fn encode(&mut self, message: Bytes) -> Result<Bytes, BoxError> {
		if message.len() > self.max_frame_length {
			return Err(Box::new(CodecError::FrameTooLarge{len: message.len(), max: self.max_frame_length}));
		}
		let mut buf = BytesMut::with_capacity(HEADER_LEN + message.len());
		buf.put_u32(message.len() as u32);
		buf.put_slice(&message);
		Ok(buf.freeze())
	}
}

impl Decoder<Bytes> for LengthDelimited {
	fn decode(&mut self, window: &mut Window<'_>) -> Result<Option<Bytes>, BoxError> {
		let data = window.as_slice();
		if data.len() < HEADER_LEN {
			return Ok(None);
		}
		let mut header = [0u8; HEADER_LEN];
		header.copy_from_slice(&data[..HEADER_LEN]);
		let len = u32::from_be_bytes(header) as usize;
		if len > self.max_frame_length {
			return Err(Box::new(CodecError::FrameTooLarge{len, max: self.max_frame_length}));
		}
		let end = HEADER_LEN + len;
		if data.len() < end {
			return Ok(None);
		}
		let payload = Bytes::copy_from_slice(&data[HEADER_LEN..end]);
		window.advance(end);
		Ok(Some(payload))
	}
}
