use strand_store::PostId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    /// Programming error: the complete-tree builder only ever receives
    /// posts that carry a conversation id.
    #[error("Post {0} has no conversation id")]
    MissingConversationId(PostId),
}
