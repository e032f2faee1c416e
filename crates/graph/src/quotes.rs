use std::collections::HashMap;
use strand_store::{PostId, PostStore};

/// Quoted id -> quoting ids, built once over the whole store.
///
/// Self-quotes (an author quoting their own post) are excluded: they are
/// reach-padding, not discourse propagation, so counting them would skew
/// every ranking downstream. Per-key lists are sorted by quoting id so
/// seed discovery is deterministic regardless of store iteration order.
#[derive(Debug, Default)]
pub struct QuoteIndex {
    quoters: HashMap<PostId, Vec<PostId>>,
}

impl QuoteIndex {
    pub fn build(store: &PostStore) -> Self {
        let mut quoters: HashMap<PostId, Vec<PostId>> = HashMap::new();
        let mut self_quotes = 0usize;

        for post in store.iter() {
            let Some(quoted_id) = post.quoted_id else {
                continue;
            };
            // Unknown quoted author counts as a genuine quote.
            if let Some(quoted) = store.get(quoted_id) {
                if quoted.author_id == post.author_id {
                    self_quotes += 1;
                    continue;
                }
            }
            quoters.entry(quoted_id).or_default().push(post.id);
        }
        for ids in quoters.values_mut() {
            ids.sort_unstable();
        }

        log::info!(
            "Built quote index: {} quoted posts ({} self-quotes excluded)",
            quoters.len(),
            self_quotes
        );
        Self { quoters }
    }

    pub fn quoters_of(&self, id: PostId) -> &[PostId] {
        self.quoters.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.quoters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quoters.is_empty()
    }

    /// Non-self quote count per quoted post, for folding back into the
    /// store.
    pub fn counts(&self) -> HashMap<PostId, u64> {
        self.quoters
            .iter()
            .map(|(id, quoters)| (*id, quoters.len() as u64))
            .collect()
    }

    /// Serializable view for the cache file.
    pub fn entries(&self) -> &HashMap<PostId, Vec<PostId>> {
        &self.quoters
    }

    pub fn from_entries(mut quoters: HashMap<PostId, Vec<PostId>>) -> Self {
        for ids in quoters.values_mut() {
            ids.sort_unstable();
        }
        Self { quoters }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use strand_store::Post;

    fn post(id: PostId, author_id: u64, quoted_id: Option<PostId>) -> Post {
        Post {
            id,
            author_id,
            author_handle: format!("user{author_id}"),
            created_at: None,
            text: String::new(),
            favorite_count: 0,
            repost_count: 0,
            reply_to: None,
            conversation_id: None,
            quoted_id,
            quote_count: 0,
        }
    }

    #[test]
    fn excludes_self_quotes() {
        let store = PostStore::from_posts(vec![
            post(1, 10, None),
            post(2, 10, Some(1)), // same author, excluded
            post(3, 20, Some(1)),
        ]);
        let index = QuoteIndex::build(&store);

        assert_eq!(index.quoters_of(1), &[3]);
        assert_eq!(index.counts().get(&1), Some(&1));
    }

    #[test]
    fn unknown_quoted_author_still_counts() {
        // 999 is not in the store; its author is unknown.
        let store = PostStore::from_posts(vec![post(1, 10, Some(999))]);
        let index = QuoteIndex::build(&store);

        assert_eq!(index.quoters_of(999), &[1]);
    }
}
