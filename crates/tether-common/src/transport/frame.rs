use std::io::{ErrorKind, Read, Write};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, TetherError};

/// Maximum accepted frame payload (100 MB)
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Size of the big-endian length prefix
pub const HEADER_LEN: usize = 4;

/// Length-prefixed framing.
///
/// Wire format: `[4-byte length as u32 big-endian] + [payload]`.
/// The codec knows nothing about what the payload means.
///
/// # Example
///
/// ```
/// use tether_common::transport::FrameCodec;
///
/// let frame = FrameCodec::encode(b"hello").unwrap();
/// assert_eq!(&frame[..4], &[0, 0, 0, 5]);
///
/// let mut buffer = frame.clone();
/// let payload = FrameCodec::decode(&mut buffer).unwrap();
/// assert_eq!(payload.as_deref(), Some(&b"hello"[..]));
/// assert!(buffer.is_empty());
/// ```
pub struct FrameCodec;

impl FrameCodec {
    /// Encodes a payload into a single frame.
    pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
        let len = Self::checked_len(payload.len())?;
        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(payload);
        Ok(frame)
    }

    /// Takes one complete frame off the front of `buffer`.
    ///
    /// Returns `Ok(None)` and leaves the buffer untouched while fewer than
    /// `4 + length` bytes are available, so partial frames are never
    /// surfaced.
    pub fn decode(buffer: &mut Vec<u8>) -> Result<Option<Vec<u8>>> {
        if buffer.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut len_buf = [0u8; HEADER_LEN];
        len_buf.copy_from_slice(&buffer[..HEADER_LEN]);
        let len = Self::validate_len(len_buf)?;

        if buffer.len() < HEADER_LEN + len {
            return Ok(None);
        }

        let payload = buffer[HEADER_LEN..HEADER_LEN + len].to_vec();
        buffer.drain(..HEADER_LEN + len);
        Ok(Some(payload))
    }

    /// Writes one frame to a blocking stream.
    pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
        let len = Self::checked_len(payload.len())?;
        writer.write_all(&len.to_be_bytes())?;
        writer.write_all(payload)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads one frame from a blocking stream.
    ///
    /// A clean EOF before the first length byte yields `Ok(None)`.
    pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; HEADER_LEN];
        let got = read_full(reader, &mut len_buf)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_LEN {
            return Err(TetherError::TruncatedFrame {
                expected: HEADER_LEN,
                received: got,
            });
        }

        let len = Self::validate_len(len_buf)?;
        let mut buf = vec![0u8; len];
        let got = read_full(reader, &mut buf)?;
        if got < len {
            return Err(TetherError::TruncatedFrame {
                expected: len,
                received: got,
            });
        }
        Ok(Some(buf))
    }

    /// Async version of [`FrameCodec::write_frame`].
    pub async fn write_frame_async<W>(writer: &mut W, payload: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let len = Self::checked_len(payload.len())?;
        writer.write_all(&len.to_be_bytes()).await?;
        writer.write_all(payload).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Async version of [`FrameCodec::read_frame`].
    pub async fn read_frame_async<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
    where
        R: AsyncRead + Unpin,
    {
        let mut len_buf = [0u8; HEADER_LEN];
        let got = read_full_async(reader, &mut len_buf).await?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_LEN {
            return Err(TetherError::TruncatedFrame {
                expected: HEADER_LEN,
                received: got,
            });
        }

        let len = Self::validate_len(len_buf)?;
        let mut buf = vec![0u8; len];
        let got = read_full_async(reader, &mut buf).await?;
        if got < len {
            return Err(TetherError::TruncatedFrame {
                expected: len,
                received: got,
            });
        }
        Ok(Some(buf))
    }

    fn checked_len(len: usize) -> Result<u32> {
        u32::try_from(len).map_err(|_| TetherError::FrameTooLarge(len))
    }

    // Refuse oversized lengths before allocating
    fn validate_len(len_buf: [u8; HEADER_LEN]) -> Result<usize> {
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(TetherError::FrameTooLarge(len));
        }
        Ok(len)
    }
}

/// Fills `buf` unless EOF comes first; returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

async fn read_full_async<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
