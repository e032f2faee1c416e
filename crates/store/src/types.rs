use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Post identifier. Platform ids exceed the 32-bit range, so the whole
/// pipeline uses u64 keys.
pub type PostId = u64;

/// A single social-media post with its optional reply/quote relationships.
///
/// Immutable once loaded; `quote_count` is the only field written after
/// the snapshot load, when the quote index folds derived counts back in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Post identifier
    pub id: PostId,

    /// Author account identifier
    pub author_id: u64,

    /// Author handle (without the leading '@')
    pub author_handle: String,

    /// Creation timestamp, when the snapshot recorded one
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// Body text
    pub text: String,

    /// Engagement counters
    #[serde(default)]
    pub favorite_count: u64,
    #[serde(default)]
    pub repost_count: u64,

    /// Post this one replies to, if any
    #[serde(default)]
    pub reply_to: Option<PostId>,

    /// Conversation identifier shared by every post in a reply tree
    #[serde(default)]
    pub conversation_id: Option<u64>,

    /// Post this one quotes, if any (independent of the reply relationship)
    #[serde(default)]
    pub quoted_id: Option<PostId>,

    /// Number of times this post is quoted by other authors.
    /// Derived by the quote index, zero until folded in.
    #[serde(default)]
    pub quote_count: u64,
}

impl Post {
    /// True for simple re-broadcasts, which carry no discourse signal.
    pub fn is_rebroadcast(&self) -> bool {
        self.text.starts_with("RT @")
    }
}

/// One described media attachment, keyed by post id in lookup tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescription {
    pub url: String,
    pub description: String,
}
