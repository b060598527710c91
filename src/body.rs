//! Response body type shared by every handler
//!
//! [`RangeBody`] implements [`http_body::Body`] for the three shapes a
//! response can take: nothing, an in-memory buffer, or a bounded read from
//! a provider window. A streamed window yields its bytes in ascending offset
//! order and fails with `UnexpectedEof` if the source ends early, so a
//! shortened file can never be passed off as a complete response.

use crate::provider::ByteWindow;
use bytes::{Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

const IO_BUFFER_SIZE: usize = 64 * 1024;

/// Response body. Implements [`Body`].
pub struct RangeBody {
    kind: Kind,
}

enum Kind {
    Empty,
    Full(Option<Bytes>),
    Window(WindowStream),
}

struct WindowStream {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    remaining: u64,
    buffer: BytesMut,
}

impl RangeBody {
    pub fn empty() -> Self {
        RangeBody { kind: Kind::Empty }
    }

    pub fn full(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        if data.is_empty() {
            return RangeBody::empty();
        }
        RangeBody {
            kind: Kind::Full(Some(data)),
        }
    }

    /// Stream exactly `len` bytes from `reader`
    pub fn reader(reader: Pin<Box<dyn AsyncRead + Send>>, len: u64) -> Self {
        if len == 0 {
            return RangeBody::empty();
        }
        RangeBody {
            kind: Kind::Window(WindowStream {
                reader,
                remaining: len,
                buffer: BytesMut::new(),
            }),
        }
    }
}

impl From<ByteWindow> for RangeBody {
    fn from(window: ByteWindow) -> Self {
        match window {
            ByteWindow::Buffered(data) => RangeBody::full(data),
            ByteWindow::Streamed { reader, len } => RangeBody::reader(reader, len),
        }
    }
}

impl From<Bytes> for RangeBody {
    fn from(data: Bytes) -> Self {
        RangeBody::full(data)
    }
}

impl From<&'static str> for RangeBody {
    fn from(data: &'static str) -> Self {
        RangeBody::full(Bytes::from_static(data.as_bytes()))
    }
}

impl From<String> for RangeBody {
    fn from(data: String) -> Self {
        RangeBody::full(Bytes::from(data))
    }
}

impl Default for RangeBody {
    fn default() -> Self {
        RangeBody::empty()
    }
}

impl fmt::Debug for RangeBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("RangeBody::Empty"),
            Kind::Full(data) => f
                .debug_struct("RangeBody::Full")
                .field("len", &data.as_ref().map(Bytes::len).unwrap_or(0))
                .finish(),
            Kind::Window(stream) => f
                .debug_struct("RangeBody::Window")
                .field("remaining", &stream.remaining)
                .finish(),
        }
    }
}

impl WindowStream {
    fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        if self.remaining == 0 {
            return Poll::Ready(None);
        }

        // the smaller of the buffer size and the number of bytes remaining
        let nbytes = usize::try_from(self.remaining)
            .unwrap_or(usize::MAX)
            .min(IO_BUFFER_SIZE);
        if self.buffer.len() < nbytes {
            self.buffer.resize(nbytes, 0);
        }

        let mut read_buf = ReadBuf::new(&mut self.buffer[..nbytes]);
        match self.reader.as_mut().poll_read(cx, &mut read_buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => {
                self.remaining = 0;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(Ok(())) => {
                let filled = read_buf.filled().len();
                if filled == 0 {
                    let missing = self.remaining;
                    self.remaining = 0;
                    return Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("resource ended {} bytes short of the requested window", missing),
                    ))));
                }

                self.remaining -= filled as u64;
                Poll::Ready(Some(Ok(self.buffer.split_to(filled).freeze())))
            }
        }
    }
}

impl Body for RangeBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        let this = self.get_mut();
        match &mut this.kind {
            Kind::Empty => Poll::Ready(None),
            Kind::Full(data) => Poll::Ready(data.take().map(|data| Ok(Frame::data(data)))),
            Kind::Window(stream) => stream
                .poll_chunk(cx)
                .map(|item| item.map(|result| result.map(Frame::data))),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Empty => true,
            Kind::Full(data) => data.is_none(),
            Kind::Window(stream) => stream.remaining == 0,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Empty => SizeHint::with_exact(0),
            Kind::Full(data) => {
                SizeHint::with_exact(data.as_ref().map(|d| d.len() as u64).unwrap_or(0))
            }
            Kind::Window(stream) => SizeHint::with_exact(stream.remaining),
        }
    }
}
