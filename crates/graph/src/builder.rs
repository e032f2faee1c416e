use crate::error::{GraphError, Result};
use crate::types::{ConversationKey, ConversationTree};
use std::collections::{BTreeMap, HashSet, VecDeque};
use strand_store::{Post, PostId};

/// Default ceiling on incomplete-chain traversal depth. A safety bound
/// against malformed data, not a semantic limit.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Builds conversation trees from a flat post collection.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    /// Traversal ceiling for incomplete chains.
    pub max_depth: usize,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Build trees for posts that carry a conversation id.
    ///
    /// Callers filter the input; a post without a conversation id here is
    /// a programming error and fails hard. A post without a reply target
    /// is its group's root; duplicate roots within one group resolve to
    /// the smallest id and are logged, since they indicate bad data.
    pub fn build_complete<'a>(
        &self,
        posts: impl IntoIterator<Item = &'a Post>,
    ) -> Result<BTreeMap<ConversationKey, ConversationTree>> {
        let mut trees: BTreeMap<ConversationKey, ConversationTree> = BTreeMap::new();
        let mut count = 0usize;

        for post in posts {
            let conv_id = post
                .conversation_id
                .ok_or(GraphError::MissingConversationId(post.id))?;
            let tree = trees.entry(conv_id).or_default();
            count += 1;

            match post.reply_to {
                Some(parent) => {
                    tree.children_of.entry(parent).or_default().push(post.id);
                    tree.parent_of.insert(post.id, parent);
                }
                None => match tree.root {
                    None => tree.root = Some(post.id),
                    Some(existing) => {
                        let kept = existing.min(post.id);
                        log::warn!(
                            "Conversation {} has duplicate roots ({} and {}), keeping {}",
                            conv_id,
                            existing,
                            post.id,
                            kept
                        );
                        tree.root = Some(kept);
                    }
                },
            }
        }

        for tree in trees.values_mut() {
            break_reply_cycles(tree);
            tree.leaf_paths = leaf_paths_from(tree.root.into_iter(), &tree.children_of);
        }

        log::info!(
            "Built {} conversation trees from {} posts",
            trees.len(),
            count
        );
        Ok(trees)
    }

    /// Build trees from reply chains that lack a conversation id.
    ///
    /// Defensive by construction: an edge is only recorded when the reply
    /// target is present in the input, and only when neither endpoint has
    /// taken part in an edge before, so no post ever gains a second parent
    /// however pathological the data. Each parentless post roots its own
    /// tree, traversed breadth-first under the depth ceiling.
    pub fn build_incomplete<'a>(
        &self,
        posts: impl IntoIterator<Item = &'a Post>,
    ) -> BTreeMap<ConversationKey, ConversationTree> {
        let posts: Vec<&Post> = posts.into_iter().collect();
        let present: HashSet<PostId> = posts.iter().map(|p| p.id).collect();

        let mut parents: BTreeMap<PostId, PostId> = BTreeMap::new();
        let mut children: BTreeMap<PostId, Vec<PostId>> = BTreeMap::new();
        let mut visited: HashSet<PostId> = HashSet::new();

        for post in &posts {
            let Some(reply_to) = post.reply_to else {
                continue;
            };
            if !present.contains(&reply_to) {
                continue;
            }
            if visited.contains(&reply_to) || visited.contains(&post.id) {
                log::debug!(
                    "Skipping reply edge {} -> {}: endpoint already linked",
                    post.id,
                    reply_to
                );
                continue;
            }
            parents.insert(post.id, reply_to);
            children.entry(reply_to).or_default().push(post.id);
            visited.insert(post.id);
            visited.insert(reply_to);
        }

        let mut trees = BTreeMap::new();
        for post in &posts {
            if parents.contains_key(&post.id) {
                continue;
            }
            let root_id = post.id;
            let mut tree = ConversationTree {
                root: Some(root_id),
                ..Default::default()
            };

            let mut queue = VecDeque::from([(root_id, vec![root_id], 0usize)]);
            while let Some((current, path, depth)) = queue.pop_front() {
                if depth > self.max_depth {
                    log::warn!("Max depth {} reached at post {}", self.max_depth, current);
                    break;
                }
                let kids = children.get(&current).map(Vec::as_slice).unwrap_or(&[]);
                for child in kids {
                    // A node never gains a second parent.
                    if !tree.parent_of.contains_key(child) {
                        tree.parent_of.insert(*child, current);
                        tree.children_of.entry(current).or_default().push(*child);
                        let mut child_path = path.clone();
                        child_path.push(*child);
                        queue.push_back((*child, child_path, depth + 1));
                    }
                }
                if kids.is_empty() {
                    tree.leaf_paths.insert(current, path);
                }
            }

            trees.insert(root_id, tree);
        }

        log::info!("Built {} incomplete trees", trees.len());
        trees
    }
}

/// Drop reply edges that close a cycle, turning the second-visited node
/// into a terminal leaf. Walks each parent chain once, memoizing nodes
/// already proven acyclic.
fn break_reply_cycles(tree: &mut ConversationTree) {
    let nodes: Vec<PostId> = tree.parent_of.keys().copied().collect();
    let mut safe: HashSet<PostId> = HashSet::new();

    for start in nodes {
        let mut walk: Vec<PostId> = Vec::new();
        let mut on_walk: HashSet<PostId> = HashSet::new();
        let mut current = start;

        loop {
            if safe.contains(&current) {
                break;
            }
            if !on_walk.insert(current) {
                // Cycle closed at `current`: drop the edge that re-enters it.
                let offender = *walk.last().expect("cycle implies a prior step");
                if let Some(parent) = tree.parent_of.remove(&offender) {
                    if let Some(kids) = tree.children_of.get_mut(&parent) {
                        kids.retain(|k| *k != offender);
                    }
                }
                log::warn!("Reply cycle detected at post {}, edge dropped", current);
                break;
            }
            walk.push(current);
            match tree.parent_of.get(&current) {
                Some(parent) => current = *parent,
                None => break,
            }
        }
        safe.extend(walk);
    }
}

/// Root-to-leaf paths via iterative depth-first traversal. The visited
/// guard keeps malformed child lists from looping.
pub(crate) fn leaf_paths_from(
    roots: impl IntoIterator<Item = PostId>,
    children_of: &BTreeMap<PostId, Vec<PostId>>,
) -> BTreeMap<PostId, Vec<PostId>> {
    let mut paths = BTreeMap::new();
    let mut visited: HashSet<PostId> = HashSet::new();

    for root in roots {
        let mut stack = vec![(root, vec![root])];
        visited.insert(root);

        while let Some((current, path)) = stack.pop() {
            let children = children_of.get(&current).map(Vec::as_slice).unwrap_or(&[]);
            let unvisited: Vec<PostId> = children
                .iter()
                .copied()
                .filter(|c| !visited.contains(c))
                .collect();
            if unvisited.is_empty() {
                paths.insert(current, path);
            } else {
                for child in unvisited {
                    visited.insert(child);
                    let mut child_path = path.clone();
                    child_path.push(child);
                    stack.push((child, child_path));
                }
            }
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use strand_store::Post;

    fn post(id: PostId, conv: Option<u64>, reply_to: Option<PostId>) -> Post {
        Post {
            id,
            author_id: id,
            author_handle: format!("user{id}"),
            created_at: None,
            text: format!("post {id}"),
            favorite_count: 0,
            repost_count: 0,
            reply_to,
            conversation_id: conv,
            quoted_id: None,
            quote_count: 0,
        }
    }

    #[test]
    fn complete_builds_root_children_and_paths() {
        let posts = vec![
            post(1, Some(1), None),
            post(2, Some(1), Some(1)),
            post(3, Some(1), Some(1)),
            post(4, Some(1), Some(2)),
        ];
        let trees = TreeBuilder::new().build_complete(posts.iter()).unwrap();
        let tree = &trees[&1];

        assert_eq!(tree.root, Some(1));
        assert_eq!(tree.parent_of[&4], 2);
        assert_eq!(tree.children(1), &[2, 3]);
        assert_eq!(tree.leaf_paths[&4], vec![1, 2, 4]);
        assert_eq!(tree.leaf_paths[&3], vec![1, 3]);
    }

    #[test]
    fn complete_rejects_missing_conversation_id() {
        let posts = vec![post(1, None, None)];
        let err = TreeBuilder::new().build_complete(posts.iter()).unwrap_err();
        assert!(matches!(err, GraphError::MissingConversationId(1)));
    }

    #[test]
    fn complete_duplicate_roots_keep_smallest() {
        let posts = vec![post(7, Some(1), None), post(3, Some(1), None)];
        let trees = TreeBuilder::new().build_complete(posts.iter()).unwrap();
        assert_eq!(trees[&1].root, Some(3));
    }

    #[test]
    fn complete_breaks_reply_cycles() {
        // 1 <-> 2 reply to each other; 3 replies to 1.
        let posts = vec![
            post(1, Some(1), Some(2)),
            post(2, Some(1), Some(1)),
            post(3, Some(1), Some(1)),
        ];
        let trees = TreeBuilder::new().build_complete(posts.iter()).unwrap();
        let tree = &trees[&1];

        // One of the cycle edges is gone, every node has at most one parent,
        // and traversal terminates.
        assert!(tree.parent_of.len() < 3);
        for children in tree.children_of.values() {
            for child in children {
                assert!(tree.parent_of.contains_key(child));
            }
        }
    }

    #[test]
    fn incomplete_links_at_most_one_edge_per_node() {
        // 2 replies to 1, then 3 replies to 1: second edge refused because
        // 1 already took part in an edge.
        let posts = vec![
            post(1, None, None),
            post(2, None, Some(1)),
            post(3, None, Some(1)),
        ];
        let list: Vec<&Post> = posts.iter().collect();
        let trees = TreeBuilder::new().build_incomplete(list);

        let tree = &trees[&1];
        assert_eq!(tree.children(1), &[2]);
        // 3 became a root of its own tree.
        assert!(trees.contains_key(&3));
    }

    #[test]
    fn incomplete_survives_reply_cycle() {
        let posts = vec![post(1, None, Some(2)), post(2, None, Some(1))];
        let list: Vec<&Post> = posts.iter().collect();
        let trees = TreeBuilder::new().build_incomplete(list);

        // The second edge of the cycle is refused; every node keeps at
        // most one parent.
        for tree in trees.values() {
            for (child, parent) in &tree.parent_of {
                assert_ne!(child, parent);
            }
        }
    }

    #[test]
    fn incomplete_ignores_dangling_reply_targets() {
        let posts = vec![post(5, None, Some(999))];
        let list: Vec<&Post> = posts.iter().collect();
        let trees = TreeBuilder::new().build_incomplete(list);

        assert_eq!(trees[&5].root, Some(5));
        assert!(trees[&5].parent_of.is_empty());
    }
}
