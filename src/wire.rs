//! Wire envelope for the mix RPC surface.
//!
//! Requests and responses travel as postcard-encoded enums inside
//! u32 big-endian length-prefixed frames. Model arguments and diffs ride
//! inside the envelope as raw byte strings; the engine never reframes them.
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DecodeError, QuillonError, Result};

/// Upper bound for a single frame. Oversized frames are decode errors,
/// never allocations.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// The four verbs peers and operators invoke on a node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MixRequest {
    /// Invoke the model's pull with the caller's argument
    Pull { argument: Vec<u8> },
    /// Return this node's current pull argument
    GetPullArgument,
    /// Apply the caller's diff to this node's model
    Push { diff: Vec<u8> },
    /// Run one mix cycle synchronously, ignoring thresholds
    DoMix,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MixResponse {
    /// Diff produced by the remote model's pull
    Diff(Vec<u8>),
    /// The remote node's pull argument
    Argument(Vec<u8>),
    /// Diff applied
    Pushed,
    /// Whether the forced cycle ran to completion
    MixCompleted(bool),
    /// Textual diagnostic for a failed verb
    Error(String),
}

/// Serialize using postcard
pub fn serialize<T: Serialize>(msg: &T) -> Result<bytes::Bytes> {
    postcard::to_allocvec(msg)
        .map(bytes::Bytes::from)
        .map_err(QuillonError::from)
}

/// Deserialize using postcard
pub fn deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T> {
    postcard::from_bytes(data).map_err(QuillonError::from)
}

/// Write one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_BYTES {
        return Err(DecodeError::Frame(format!(
            "frame of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_FRAME_BYTES
        ))
        .into());
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(DecodeError::Frame(format!(
            "frame of {} bytes exceeds the {} byte limit",
            len, MAX_FRAME_BYTES
        ))
        .into());
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}
