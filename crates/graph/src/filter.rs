use crate::builder::leaf_paths_from;
use crate::types::{ConversationKey, ConversationTree, FilteredTree};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use strand_store::{PostId, PostStore};

/// Depth bounds for neighborhood traversal. `None` means unbounded;
/// `from_root` replaces `down` when a seed is itself a conversation key,
/// so a quoted root still respects the caller's bound instead of pulling
/// in its whole tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthBounds {
    pub up: Option<usize>,
    pub down: Option<usize>,
    pub from_root: Option<usize>,
}

impl DepthBounds {
    pub fn uniform(depth: usize) -> Self {
        Self {
            up: Some(depth),
            down: Some(depth),
            from_root: Some(depth),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            up: None,
            down: None,
            from_root: None,
        }
    }

    /// The caller asked for no context expansion at all; quote blocks
    /// render without annexes.
    pub fn no_expansion(&self) -> bool {
        self.up == Some(0) && self.down == Some(0)
    }
}

/// Compute, per conversation, the induced view around the given seeds:
/// each seed, its ancestors up to `bounds.up` hops, and its descendants
/// under the applicable downward bound.
///
/// Seeds without a post record, without a conversation id, or whose
/// conversation has no precomputed tree are silently excluded here; they
/// are pure quote-chain seeds and are handled by the renderer directly.
pub fn filter_trees(
    seed_ids: &[PostId],
    trees: &BTreeMap<ConversationKey, ConversationTree>,
    store: &PostStore,
    bounds: DepthBounds,
) -> BTreeMap<ConversationKey, FilteredTree> {
    let mut by_conversation: BTreeMap<ConversationKey, Vec<PostId>> = BTreeMap::new();
    for id in seed_ids {
        let Some(post) = store.get(*id) else {
            log::debug!("Seed {} not in store, skipped", id);
            continue;
        };
        match post.conversation_id {
            Some(conv) if trees.contains_key(&conv) => {
                by_conversation.entry(conv).or_default().push(*id);
            }
            _ => log::debug!("Seed {} has no known conversation tree, skipped", id),
        }
    }

    let mut filtered = BTreeMap::new();
    for (conv, seeds) in by_conversation {
        let tree = &trees[&conv];
        let visible = visible_set(tree, &seeds, bounds, |id| trees.contains_key(&id));
        filtered.insert(conv, restrict(tree, visible));
    }
    filtered
}

/// Union over the seeds of {seed, bounded ancestors, bounded descendants}.
pub(crate) fn visible_set(
    tree: &ConversationTree,
    seeds: &[PostId],
    bounds: DepthBounds,
    is_conversation_key: impl Fn(PostId) -> bool,
) -> BTreeSet<PostId> {
    let mut visible = BTreeSet::new();

    for seed in seeds {
        visible.insert(*seed);

        // Ancestors. The walk guard stops on malformed parent chains.
        let mut walked: HashSet<PostId> = HashSet::from([*seed]);
        let mut current = *seed;
        let mut hops = 0usize;
        while bounds.up.map_or(true, |limit| hops < limit) {
            let Some(parent) = tree.parent_of.get(&current) else {
                break;
            };
            if !walked.insert(*parent) {
                log::warn!("Parent chain of {} loops at {}, stopping", seed, parent);
                break;
            }
            visible.insert(*parent);
            current = *parent;
            hops += 1;
        }

        // Descendants, breadth-first under the applicable bound.
        let down = if is_conversation_key(*seed) {
            bounds.from_root
        } else {
            bounds.down
        };
        let mut queue = VecDeque::from([(*seed, down)]);
        while let Some((current, remaining)) = queue.pop_front() {
            if remaining == Some(0) {
                continue;
            }
            for child in tree.children(current) {
                if visible.insert(*child) {
                    queue.push_back((*child, remaining.map(|d| d - 1)));
                }
            }
        }
    }

    visible
}

/// Restrict a tree's edges to pairs with both endpoints visible and
/// recompute leaf paths over the resulting forest.
pub(crate) fn restrict(tree: &ConversationTree, visible: BTreeSet<PostId>) -> FilteredTree {
    let mut out = ConversationTree {
        root: tree.root.filter(|r| visible.contains(r)),
        ..Default::default()
    };

    for node in &visible {
        if let Some(parent) = tree.parent_of.get(node) {
            if visible.contains(parent) {
                out.parent_of.insert(*node, *parent);
                out.children_of.entry(*parent).or_default().push(*node);
            }
        }
    }

    let mut filtered = FilteredTree { tree: out, visible };
    let roots = filtered.display_roots();
    filtered.tree.leaf_paths = leaf_paths_from(roots, &filtered.tree.children_of);
    filtered
}
