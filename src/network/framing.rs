//! Length-prefixed framing.
//!
//! ```text
//! +--------------------+---------------------+
//! | length (4 bytes)   | payload             |
//! | u32 big-endian     | (length bytes)      |
//! +--------------------+---------------------+
//! ```
//!
//! The prefix counts payload bytes only. Frames larger than the configured
//! limit are refused in both directions; a peer that announces one is cut off.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Framing limits.
#[derive(Debug, Clone, Copy)]
pub struct FrameLimits {
    /// Largest payload accepted or sent.
    pub max_payload: u32,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self { max_payload: 64 * 1024 }
    }
}

/// Framing failures. All of them end the connection.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Announced or outgoing payload is over the limit.
    #[error("frame of {size} bytes exceeds limit of {max}")]
    PayloadTooLarge {
        /// Payload size.
        size: u64,
        /// Configured limit.
        max: u32,
    },

    /// Peer hung up, possibly mid-frame.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn eof_as_closed(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Read one frame and return its payload.
pub async fn read_frame<R>(reader: &mut R, limits: FrameLimits) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix).await.map_err(eof_as_closed)?;

    let size = u32::from_be_bytes(prefix);
    if size > limits.max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: u64::from(size),
            max: limits.max_payload,
        });
    }

    let mut payload = vec![0u8; size as usize];
    reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;
    Ok(payload)
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], limits: FrameLimits) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let size = payload.len() as u64;
    if size > u64::from(limits.max_payload) {
        return Err(FrameError::PayloadTooLarge {
            size,
            max: limits.max_payload,
        });
    }

    // Bounded by max_payload above.
    let prefix = (size as u32).to_be_bytes();
    writer.write_all(&prefix).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
