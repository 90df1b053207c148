//! Block-structured content document
//!
//! Wire shape: `{ "blocks": [{ "id"?, "type", "data" }], "time", "version" }`.
//! Media blocks carry `data.file.url` and, while their asset is staged,
//! `data.file.pendingId`. Unknown block types and fields are kept as-is.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::registry::{PendingId, StagedMedia};

pub const PENDING_ID_FIELD: &str = "pendingId";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentDocument {
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Block {
    pub fn new(block_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: None,
            block_type: block_type.into(),
            data,
            extra: Map::new(),
        }
    }

    /// Image block pointing at a staged asset's local preview.
    pub fn pending_image(staged: &StagedMedia) -> Self {
        Self::pending_media("image", staged)
    }

    pub fn pending_video(staged: &StagedMedia) -> Self {
        Self::pending_media("video", staged)
    }

    fn pending_media(block_type: &str, staged: &StagedMedia) -> Self {
        Self::new(
            block_type,
            json!({
                "file": {
                    "url": staged.preview_uri,
                    "pendingId": staged.id,
                }
            }),
        )
    }

    fn file(&self) -> Option<&Map<String, Value>> {
        self.data.get("file").and_then(Value::as_object)
    }

    pub(crate) fn file_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.data.get_mut("file").and_then(Value::as_object_mut)
    }

    /// Raw `data.file.pendingId` string, if present.
    pub fn pending_ref(&self) -> Option<&str> {
        self.file()?.get(PENDING_ID_FIELD)?.as_str()
    }

    /// Parsed `data.file.pendingId`. Malformed ids read as `None`.
    pub fn pending_id(&self) -> Option<PendingId> {
        self.pending_ref()?.parse().ok()
    }

    pub fn file_url(&self) -> Option<&str> {
        self.file()?.get("url")?.as_str()
    }
}

impl ContentDocument {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            time: None,
            version: None,
        }
    }

    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Pending ids referenced by the document, in block order.
    pub fn pending_ids(&self) -> Vec<PendingId> {
        self.blocks.iter().filter_map(Block::pending_id).collect()
    }
}
