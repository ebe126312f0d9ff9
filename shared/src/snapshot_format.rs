use serde::{Deserialize, Serialize};

use crate::{ReadingProgress, StickyNote, Stroke};

pub const SNAPSHOT_MAGIC: [u8; 4] = *b"PMSS";
pub const SNAPSHOT_VERSION: u32 = 1;
const SNAPSHOT_HEADER_LEN: usize = SNAPSHOT_MAGIC.len() + std::mem::size_of::<u32>();

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageStrokes {
    pub page: u32,
    pub strokes: Vec<Stroke>,
}

/// Everything one reader has stored against one document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub user_id: String,
    pub pages: Vec<PageStrokes>,
    pub notes: Vec<StickyNote>,
    pub in_reading_set: bool,
    pub progress: Option<ReadingProgress>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub document_id: String,
    pub users: Vec<UserSnapshot>,
}

#[derive(Debug, PartialEq)]
pub enum SnapshotDecodeError {
    UnsupportedVersion(u32),
    InvalidData,
}

impl std::fmt::Display for SnapshotDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotDecodeError::UnsupportedVersion(version) => {
                write!(f, "unsupported snapshot version {version}")
            }
            SnapshotDecodeError::InvalidData => write!(f, "invalid snapshot data"),
        }
    }
}

impl std::error::Error for SnapshotDecodeError {}

pub fn encode_snapshot(data: &DocumentSnapshot) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&SNAPSHOT_MAGIC);
    payload.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    let body =
        bincode::serde::encode_to_vec(data, bincode::config::standard()).unwrap_or_default();
    payload.extend_from_slice(&body);
    payload
}

pub fn decode_snapshot(payload: &[u8]) -> Result<DocumentSnapshot, SnapshotDecodeError> {
    if !(payload.len() >= SNAPSHOT_HEADER_LEN && payload.starts_with(&SNAPSHOT_MAGIC)) {
        return Err(SnapshotDecodeError::InvalidData);
    }
    let version = u32::from_le_bytes(
        payload[SNAPSHOT_MAGIC.len()..SNAPSHOT_HEADER_LEN]
            .try_into()
            .map_err(|_| SnapshotDecodeError::InvalidData)?,
    );
    let body = &payload[SNAPSHOT_HEADER_LEN..];
    match version {
        1 => bincode::serde::decode_from_slice(body, bincode::config::standard())
            .map(|(data, _)| data)
            .map_err(|_| SnapshotDecodeError::InvalidData),
        _ => Err(SnapshotDecodeError::UnsupportedVersion(version)),
    }
}
