/**
View over the buffered but not yet consumed inbound bytes.

The decoder narrows the window from the front with [`Window::advance`]; the
read loop afterwards releases exactly [`Window::consumed`] bytes from its
buffer. The underlying buffer is not copied.
*/
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
	buf: &'a [u8],
	consumed: usize,
}

impl<'a> Window<'a> {
	pub fn new(buf: &'a [u8]) -> Self {
		Self{buf, consumed: 0}
	}

	/// The bytes not consumed so far.
	#[inline]
	pub fn as_slice(&self) -> &'a [u8] {
		&self.buf[self.consumed..]
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.buf.len() - self.consumed
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Number of bytes consumed from the front since the window was created.
	#[inline]
	pub fn consumed(&self) -> usize {
		self.consumed
	}

	/**
	Mark the next `n` bytes as consumed.

	# Panics

	If `n` exceeds [`Window::len`].
	*/
	pub fn advance(&mut self, n: usize) {
		assert!(n <= self.len(), "cannot advance window by {} bytes, only {} remaining", n, self.len());
		self.consumed += n;
	}
}

impl AsRef<[u8]> for Window<'_> {
	fn as_ref(&self) -> &[u8] {
		self.as_slice()
	}
}
