use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strand_store::PostId;

/// Key identifying one conversation tree: the root post's id for complete
/// conversations, or the chain root's id for incomplete ones.
pub type ConversationKey = u64;

/// Reply position of a post within one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLink {
    /// No recorded parent within the tree's span.
    Root,
    /// Reply to another post in the same tree.
    Child(PostId),
}

/// One conversation: a root post and its reply descendants.
///
/// `parent_of` and `children_of` are inverses restricted to the posts
/// present in the tree; a post never has more than one parent. Child lists
/// keep insertion order; traversal sorts before rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationTree {
    /// Root post id, or `None` when no root could be determined from the
    /// available data.
    pub root: Option<PostId>,

    /// Reply target per post, for posts that are replies.
    pub parent_of: BTreeMap<PostId, PostId>,

    /// Direct replies per post.
    pub children_of: BTreeMap<PostId, Vec<PostId>>,

    /// Root-to-leaf id paths, keyed by leaf. Derived data for span
    /// metrics; not consulted by the renderer.
    pub leaf_paths: BTreeMap<PostId, Vec<PostId>>,
}

impl ConversationTree {
    pub fn parent_link(&self, id: PostId) -> ParentLink {
        match self.parent_of.get(&id) {
            Some(parent) => ParentLink::Child(*parent),
            None => ParentLink::Root,
        }
    }

    pub fn children(&self, id: PostId) -> &[PostId] {
        self.children_of.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every post id mentioned by the tree's fields.
    pub fn node_ids(&self) -> BTreeSet<PostId> {
        let mut ids = BTreeSet::new();
        ids.extend(self.root);
        for (child, parent) in &self.parent_of {
            ids.insert(*child);
            ids.insert(*parent);
        }
        for (parent, children) in &self.children_of {
            ids.insert(*parent);
            ids.extend(children.iter().copied());
        }
        ids
    }
}

/// A conversation tree restricted to a visible node set.
///
/// Restriction can legitimately turn one tree into a forest: a visible
/// node whose original parent fell outside the view becomes a display
/// root.
#[derive(Debug, Clone, Default)]
pub struct FilteredTree {
    pub tree: ConversationTree,
    pub visible: BTreeSet<PostId>,
}

impl FilteredTree {
    /// Visible nodes whose parent is absent or not visible, in ascending
    /// id order.
    pub fn display_roots(&self) -> Vec<PostId> {
        self.visible
            .iter()
            .copied()
            .filter(|id| match self.tree.parent_link(*id) {
                ParentLink::Root => true,
                ParentLink::Child(parent) => !self.visible.contains(&parent),
            })
            .collect()
    }
}
