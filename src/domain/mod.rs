pub mod category;
pub mod item;
pub mod source;
pub mod status;

pub use category::{Category, CategoryUpdate, NewCategory};
pub use item::{ContentType, Item, ItemUpsert, ListedItem};
pub use source::{ContentPreferences, NewSource, Source, SourceType, SourceUpdate};
pub use status::{ItemStatus, StatusUpdate};
