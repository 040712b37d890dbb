use serde::{Deserialize, Serialize};

/// Per-profile viewing state of an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemStatus {
    pub is_read: bool,
    pub play_progress: u32,
    pub is_favorite: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub is_read: Option<bool>,
    pub play_progress: Option<u32>,
    pub is_favorite: Option<bool>,
}
