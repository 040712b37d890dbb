//! Content type classification of feed entries.

use crate::domain::{ContentPreferences, ContentType};

const SHORTS_SEGMENT: &str = "/shorts/";
const LIVE_SEGMENT: &str = "/live/";

/// Derive the content type of an entry from its link.
///
/// Shorts are checked before lives, so a link matching both is a short.
pub fn classify(link: &str) -> ContentType {
    if link.contains(SHORTS_SEGMENT) {
        ContentType::Short
    } else if link.contains(LIVE_SEGMENT) {
        ContentType::Live
    } else {
        ContentType::Video
    }
}

/// True when the source does not accept entries of this type.
pub fn should_skip(content_type: ContentType, preferences: &ContentPreferences) -> bool {
    !preferences.accepts(content_type)
}
