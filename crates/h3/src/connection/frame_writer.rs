use std::mem;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::codec::frame::write_frame_header;
use crate::codec::varint;
use crate::ensure;
use crate::pool::{BufferPool, PooledBuffer};
use crate::protocol::{FrameType, WriterError};

const MAX_FRAME_HEADER_LEN: usize = varint::MAX_LEN * 2;

/// Buffers DATA payload in pooled segments and writes it as one DATA frame per flush.
///
/// Bytes are produced either with [`write`](Self::write) or, without an extra copy,
/// by filling the span returned from [`get_mut`](Self::get_mut) and committing it
/// with [`advance`](Self::advance). A flush prefixes the buffered bytes with a
/// DATA frame header, writes every segment and hands the segments back to the
/// pool before returning.
#[derive(Debug)]
pub struct DataFrameWriter<W> {
    writer: W,
    pool: BufferPool,
    segments: Vec<PooledBuffer>,
    // committed length of the last segment while a span from `get_mut` is open
    committed: Option<usize>,
    completed: bool,
    cancelled: bool,
}

impl<W> DataFrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W, pool: BufferPool) -> Self {
        Self { writer, pool, segments: Vec::new(), committed: None, completed: false, cancelled: false }
    }

    #[inline]
    pub fn writer(&self) -> &W {
        &self.writer
    }

    #[inline]
    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Bytes committed but not flushed yet.
    pub fn buffered(&self) -> usize {
        let open = match (self.committed, self.segments.last()) {
            (Some(committed), Some(segment)) => segment.len() - committed,
            _ => 0,
        };
        self.segments.iter().map(|segment| segment.len()).sum::<usize>() - open
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// `true` once a cancellable flush observed its token before writing.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Returns a writable span of at least `size_hint` bytes (at least one byte for
    /// a zero hint). The span stays open until the next `get_mut`, `write` or flush.
    pub fn get_mut(&mut self, size_hint: usize) -> Result<&mut [u8], WriterError> {
        ensure!(!self.completed, WriterError::Completed);
        self.settle();

        let size_hint = size_hint.max(1);
        if self.segments.last().is_none_or(|segment| segment.remaining_capacity() < size_hint) {
            self.segments.push(self.pool.rent(size_hint));
        }

        let last = self.segments.len() - 1;
        let segment = &mut self.segments[last];
        let committed = segment.len();
        let capacity = segment.capacity();
        segment.resize(capacity, 0);
        self.committed = Some(committed);
        Ok(&mut segment[committed..])
    }

    /// Commits `n` bytes of the span returned by the last [`get_mut`](Self::get_mut).
    ///
    /// # Errors
    ///
    /// [`WriterError::OutOfRange`] when `n` exceeds what is left of the span.
    pub fn advance(&mut self, n: usize) -> Result<(), WriterError> {
        ensure!(!self.completed, WriterError::Completed);

        let (committed, available) = match (self.committed, self.segments.last()) {
            (Some(committed), Some(segment)) => (committed, segment.len() - committed),
            _ => (0, 0),
        };
        ensure!(n <= available, WriterError::out_of_range(n, available));

        if n > 0 {
            self.committed = Some(committed + n);
        }
        Ok(())
    }

    /// Copies `data` into the buffer, spanning segments as needed.
    pub fn write(&mut self, mut data: &[u8]) -> Result<(), WriterError> {
        ensure!(!self.completed, WriterError::Completed);

        while !data.is_empty() {
            let span = self.get_mut(data.len().min(self.pool.segment_size()))?;
            let n = span.len().min(data.len());
            span[..n].copy_from_slice(&data[..n]);
            self.advance(n)?;
            data = &data[n..];
        }
        self.settle();
        Ok(())
    }

    /// Writes the buffered bytes as one DATA frame, returning the bytes written
    /// including the frame header. Nothing is written when the buffer is empty.
    pub async fn flush(&mut self) -> Result<usize, WriterError> {
        self.flush_with(None).await
    }

    /// Like [`flush`](Self::flush), unless `cancel` is already cancelled: then the
    /// buffered bytes are kept, the writer is marked cancelled and
    /// [`WriterError::Cancelled`] is returned without writing anything.
    ///
    /// The token is checked once. A write already started runs to its end.
    pub async fn flush_cancellable(&mut self, cancel: &CancellationToken) -> Result<usize, WriterError> {
        self.flush_with(Some(cancel)).await
    }

    async fn flush_with(&mut self, cancel: Option<&CancellationToken>) -> Result<usize, WriterError> {
        ensure!(!self.completed, WriterError::Completed);
        self.settle();

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            self.cancelled = true;
            return Err(WriterError::Cancelled);
        }

        let len = self.buffered();
        if len == 0 {
            return Ok(0);
        }

        // taken before the first await, a failed or dropped write never flushes them twice
        let segments = mem::take(&mut self.segments);

        let mut header = [0u8; MAX_FRAME_HEADER_LEN];
        let header_len = write_frame_header(FrameType::DATA, len as u64, &mut &mut header[..])?;
        trace!(len, segments = segments.len(), "flush DATA frame");

        self.writer.write_all(&header[..header_len]).await?;
        for segment in &segments {
            self.writer.write_all(segment).await?;
        }
        self.writer.flush().await?;

        Ok(header_len + len)
    }

    /// Writes a complete non-DATA frame after flushing any buffered DATA, so frames
    /// leave in the order they were produced.
    pub async fn write_frame(&mut self, ty: FrameType, payload: &[u8]) -> Result<(), WriterError> {
        self.flush().await?;

        let mut header = [0u8; MAX_FRAME_HEADER_LEN];
        let header_len = write_frame_header(ty, payload.len() as u64, &mut &mut header[..])?;
        self.writer.write_all(&header[..header_len]).await?;
        self.writer.write_all(payload).await?;
        Ok(self.writer.flush().await?)
    }

    /// Flushes what is buffered and finishes the stream. Calling it again is a no-op.
    ///
    /// The writer counts as completed even when the final flush fails.
    pub async fn complete(&mut self) -> Result<(), WriterError> {
        if self.completed {
            return Ok(());
        }

        let flushed = self.flush().await;
        self.completed = true;
        self.release();
        flushed?;

        self.writer.shutdown().await?;
        Ok(())
    }

    /// Discards unflushed bytes and binds the writer to `writer`, returning the old one.
    pub fn reset(&mut self, writer: W) -> W {
        self.release();
        self.completed = false;
        self.cancelled = false;
        mem::replace(&mut self.writer, writer)
    }

    fn release(&mut self) {
        self.segments.clear();
        self.committed = None;
    }

    // trims the uncommitted tail of an open span
    fn settle(&mut self) {
        if let Some(committed) = self.committed.take()
            && let Some(segment) = self.segments.last_mut()
        {
            segment.truncate(committed);
        }
    }
}
