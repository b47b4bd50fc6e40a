use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, SyncError};
use crate::transfer::CHUNK_SIZE;

/// Upper bound for one JSON frame; file bytes travel outside of frames
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Everything that travels over a connection.
///
/// A `Stream` header is followed by exactly `content_length` raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Request { id: u64, payload: String },
    Response { id: u64, payload: String },
    Stream { content_length: u64 },
}

// Send a frame: u32 length prefix followed by the JSON body
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let serialized =
        serde_json::to_vec(frame).map_err(|e| SyncError::Protocol(e.to_string()))?;
    let length = u32::try_from(serialized.len())
        .ok()
        .filter(|length| *length <= MAX_FRAME_LEN)
        .ok_or_else(|| SyncError::Protocol(format!("Frame of {} bytes is too large", serialized.len())))?;

    writer.write_u32(length).await?;
    writer.write_all(&serialized).await?;
    writer.flush().await?;

    Ok(())
}

// Receive one frame; a clean end of stream before the prefix is `Disconnected`
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let length = match reader.read_u32().await {
        Ok(length) => length,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(SyncError::Disconnected);
        }
        Err(e) => return Err(SyncError::Io(e)),
    };
    if length > MAX_FRAME_LEN {
        return Err(SyncError::Protocol(format!(
            "Frame of {} bytes exceeds the limit",
            length
        )));
    }

    let mut body = vec![0u8; length as usize];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|_| SyncError::Disconnected)?;

    serde_json::from_slice(&body).map_err(|e| SyncError::Protocol(format!("Malformed frame: {}", e)))
}

/// Send a stream header and exactly `content_length` bytes of `source`.
///
/// A source that ends early leaves the connection unframed; the caller must
/// drop the connection on error.
pub async fn write_stream<W, R>(writer: &mut W, content_length: u64, source: &mut R) -> Result<()>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    write_frame(writer, &Frame::Stream { content_length }).await?;

    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut remaining = content_length;
    while remaining > 0 {
        let wanted = remaining.min(CHUNK_SIZE as u64) as usize;
        let read = source.read(&mut buffer[..wanted]).await?;
        if read == 0 {
            return Err(SyncError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("Source ended with {} bytes left to send", remaining),
            )));
        }
        writer.write_all(&buffer[..read]).await?;
        remaining -= read as u64;
    }
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn frames_follow_each_other_on_the_wire() {
        let mut wire = Vec::new();
        write_frame(&mut wire, &Frame::Request { id: 1, payload: "!getFileList".into() })
            .await
            .unwrap();
        write_stream(&mut wire, 4, &mut Cursor::new(b"data".to_vec()))
            .await
            .unwrap();
        write_frame(&mut wire, &Frame::Response { id: 1, payload: "!dd".into() })
            .await
            .unwrap();

        let mut reader = Cursor::new(wire);
        assert_eq!(
            read_frame(&mut reader).await.unwrap(),
            Frame::Request { id: 1, payload: "!getFileList".into() }
        );
        assert_eq!(
            read_frame(&mut reader).await.unwrap(),
            Frame::Stream { content_length: 4 }
        );
        let mut bytes = [0u8; 4];
        reader.read_exact(&mut bytes).await.unwrap();
        assert_eq!(&bytes, b"data");
        assert_eq!(
            read_frame(&mut reader).await.unwrap(),
            Frame::Response { id: 1, payload: "!dd".into() }
        );
        assert!(matches!(read_frame(&mut reader).await, Err(SyncError::Disconnected)));
    }

    #[tokio::test]
    async fn oversized_prefix_is_a_protocol_error() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&(MAX_FRAME_LEN + 1).to_be_bytes());
        let result = read_frame(&mut Cursor::new(wire)).await;
        assert!(matches!(result, Err(SyncError::Protocol(_))));
    }

    #[tokio::test]
    async fn garbage_body_is_a_protocol_error() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&5u32.to_be_bytes());
        wire.extend_from_slice(b"nope!");
        let result = read_frame(&mut Cursor::new(wire)).await;
        assert!(matches!(result, Err(SyncError::Protocol(_))));
    }

    #[tokio::test]
    async fn short_source_fails_the_stream() {
        let mut wire = Vec::new();
        let result = write_stream(&mut wire, 10, &mut Cursor::new(b"abc".to_vec())).await;
        assert!(matches!(result, Err(SyncError::Io(_))));
    }
}
