use crate::filter::{restrict, visible_set, DepthBounds};
use crate::types::{ConversationKey, ConversationTree, FilteredTree};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use strand_store::{MediaDescription, Post, PostId, PostStore};

/// One-line header: handle, timestamp, engagement counters, id.
pub fn default_header(post: &Post) -> String {
    let date = post
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let mut metrics = format!("❤️ {} 🔁 {}", post.favorite_count, post.repost_count);
    if post.quote_count > 0 {
        metrics.push_str(&format!(" 💬 {}", post.quote_count));
    }

    format!("@{} ({}) {} [id:{}]", post.author_handle, date, metrics, post.id)
}

const DIVIDER: &str = "===";
const QUOTE_INDENT_STEP: &str = "    ┃ ";

/// Pending node in the explicit render stack.
struct Frame {
    id: PostId,
    prefix: String,
    depth: usize,
    is_last: bool,
    /// Linear continuation of a single-reply chain: rendered without a
    /// branch connector at the parent's indent.
    linear: bool,
}

/// Renders strand views as deterministic indented text.
///
/// Owns all traversal state for one invocation: `printed` tracks bodies
/// already emitted (a body is never emitted twice; re-encounters become a
/// header plus marker), `scheduled` tracks bodies the current pass will
/// emit, and `visited_annexes` plus the FIFO queue drive deferred quote
/// expansion. Node traversal uses an explicit stack; reply chains can be
/// thousands of posts deep.
pub struct StrandRenderer<'a> {
    store: &'a PostStore,
    trees: &'a BTreeMap<ConversationKey, ConversationTree>,
    bounds: DepthBounds,
    header: Box<dyn Fn(&Post) -> String + 'a>,
    media: Option<&'a HashMap<PostId, Vec<MediaDescription>>>,
    printed: HashSet<PostId>,
    scheduled: HashSet<PostId>,
    visited_annexes: HashSet<PostId>,
    annex_queue: VecDeque<PostId>,
}

impl<'a> StrandRenderer<'a> {
    pub fn new(
        store: &'a PostStore,
        trees: &'a BTreeMap<ConversationKey, ConversationTree>,
        bounds: DepthBounds,
    ) -> Self {
        Self {
            store,
            trees,
            bounds,
            header: Box::new(default_header),
            media: None,
            printed: HashSet::new(),
            scheduled: HashSet::new(),
            visited_annexes: HashSet::new(),
            annex_queue: VecDeque::new(),
        }
    }

    /// Replace the per-post header formatter (used to annotate seeds).
    pub fn with_header(mut self, header: impl Fn(&Post) -> String + 'a) -> Self {
        self.header = Box::new(header);
        self
    }

    /// Attach a media-description lookup; absence of an entry is not an
    /// error.
    pub fn with_media(mut self, media: &'a HashMap<PostId, Vec<MediaDescription>>) -> Self {
        self.media = Some(media);
        self
    }

    /// Render the strand view for the given seeds, then drain the annex
    /// queue. Consumes the renderer: one invocation, one string.
    pub fn render(mut self, seed_ids: &[PostId]) -> String {
        let seeds: Vec<PostId> = seed_ids
            .iter()
            .copied()
            .filter(|id| self.store.contains(*id))
            .collect();
        if seeds.is_empty() {
            return "No valid post ids found.".to_string();
        }

        let mut lines = Vec::new();
        self.render_pass(&seeds, &mut lines);

        // Annex pass: a FIFO work queue rather than recursion, so
        // adversarial quote chains cannot blow the stack. Termination is
        // guaranteed because `visited_annexes` only grows and an id is
        // enqueued at most once.
        while let Some(annex_id) = self.annex_queue.pop_front() {
            lines.push(String::new());
            lines.push(format!(">>> Annex: Context for quoted post {} <<<", annex_id));
            self.render_pass(&[annex_id], &mut lines);
        }

        lines.join("\n")
    }

    /// Render one seed set: group by conversation, compute views, mark
    /// them scheduled, then emit each forest in key order.
    fn render_pass(&mut self, seeds: &[PostId], lines: &mut Vec<String>) {
        let mut groups: BTreeMap<ConversationKey, Vec<PostId>> = BTreeMap::new();
        for id in seeds {
            let Some(post) = self.store.get(*id) else {
                continue;
            };
            let key = match post.conversation_id {
                Some(conv) if self.trees.contains_key(&conv) => conv,
                // No known conversation: the seed keys its own group, as a
                // root of an incomplete tree or a conversation of one.
                _ => *id,
            };
            groups.entry(key).or_default().push(*id);
        }

        let mut views: BTreeMap<ConversationKey, FilteredTree> = BTreeMap::new();
        for (key, group_seeds) in &groups {
            let view = match self.trees.get(key) {
                Some(tree) => visible_view(tree, group_seeds, self.bounds, self.trees),
                None => singleton_view(group_seeds),
            };
            self.scheduled.extend(view.visible.iter().copied());
            views.insert(*key, view);
        }

        // Display roots of every view share one divider scheme, so two
        // conversations in one pass read as separate forests.
        let mut emitted_any = false;
        for view in views.values() {
            let roots = view.display_roots();
            if roots.is_empty() {
                lines.push("No visible posts found.".to_string());
                continue;
            }
            for root in roots {
                if emitted_any {
                    lines.push(String::new());
                    lines.push(DIVIDER.to_string());
                }
                emitted_any = true;
                self.render_forest(root, view, lines);
            }
        }
    }

    /// Emit one display root and its visible descendants via an explicit
    /// stack.
    fn render_forest(&mut self, root: PostId, view: &FilteredTree, lines: &mut Vec<String>) {
        let mut stack = vec![Frame {
            id: root,
            prefix: String::new(),
            depth: 0,
            is_last: true,
            linear: false,
        }];
        // Guards against malformed child lists looping the walk.
        let mut walked: HashSet<PostId> = HashSet::new();

        while let Some(frame) = stack.pop() {
            if !walked.insert(frame.id) {
                continue;
            }
            let Some(post) = self.store.get(frame.id) else {
                lines.push(format!("{}[Post {} not found]", frame.prefix, frame.id));
                continue;
            };

            let flat = frame.depth == 0 || frame.linear;
            let connector = if flat {
                ""
            } else if frame.is_last {
                "└── "
            } else {
                "├── "
            };
            let content_prefix = if flat {
                frame.prefix.clone()
            } else if frame.is_last {
                format!("{}    ", frame.prefix)
            } else {
                format!("{}│   ", frame.prefix)
            };

            lines.push(format!("{}{}{}", frame.prefix, connector, (self.header)(post)));

            if self.printed.contains(&frame.id) {
                lines.push(format!("{}[already shown above]", content_prefix));
            } else {
                for line in post.text.split('\n') {
                    lines.push(format!("{}{}", content_prefix, line));
                }
                self.emit_media(frame.id, &content_prefix, lines);
                if let Some(quoted_id) = post.quoted_id {
                    self.emit_quote_chain(quoted_id, &content_prefix, lines);
                }
                self.printed.insert(frame.id);
            }

            let mut children: Vec<PostId> = view
                .tree
                .children(frame.id)
                .iter()
                .copied()
                .filter(|c| view.visible.contains(c))
                .collect();
            children.sort_unstable();

            if children.len() == 1 {
                // Linear reply chain: a vertical continuation reads better
                // than a one-armed branch.
                lines.push(format!("{}↓", content_prefix));
                stack.push(Frame {
                    id: children[0],
                    prefix: content_prefix,
                    depth: frame.depth + 1,
                    is_last: true,
                    linear: true,
                });
            } else {
                for (i, child) in children.iter().enumerate().rev() {
                    stack.push(Frame {
                        id: *child,
                        prefix: content_prefix.clone(),
                        depth: frame.depth + 1,
                        is_last: i == children.len() - 1,
                        linear: false,
                    });
                }
            }
        }
    }

    fn emit_media(&self, id: PostId, indent: &str, lines: &mut Vec<String>) {
        let Some(media) = self.media else {
            return;
        };
        let Some(entries) = media.get(&id) else {
            return;
        };
        for entry in entries {
            lines.push(format!("{}[image: {}]", indent, entry.url));
            for line in entry.description.split('\n') {
                lines.push(format!("{}  {}", indent, line));
            }
        }
    }

    /// Emit a quote block, following nested quotes iteratively. Each step
    /// indents further; a local seen-set terminates quote cycles.
    fn emit_quote_chain(&mut self, first: PostId, base_indent: &str, lines: &mut Vec<String>) {
        let mut indent = format!("{}{}", base_indent, QUOTE_INDENT_STEP);
        let mut current = first;
        let mut chain_seen: HashSet<PostId> = HashSet::new();

        loop {
            if !chain_seen.insert(current) {
                log::warn!("Quote chain loops at post {}, stopping", current);
                break;
            }
            let Some(quoted) = self.store.get(current) else {
                lines.push(format!("{}[Quoted post {} not found]", indent, current));
                break;
            };

            let date = quoted
                .created_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "?".to_string());
            lines.push(format!(
                "{}@{} ({}) [quoted id:{}]:",
                indent, quoted.author_handle, date, current
            ));

            if self.printed.contains(&current) || self.scheduled.contains(&current) {
                // Full content is (or will be) shown elsewhere in this
                // strand; never duplicate a body.
                lines.push(format!("{}  [already shown in this strand]", indent));
            } else {
                for line in quoted.text.split('\n') {
                    lines.push(format!("{}  {}", indent, line));
                }
                self.printed.insert(current);
                if !self.bounds.no_expansion() {
                    lines.push(format!("{}  (see annex below for full context)", indent));
                    if self.visited_annexes.insert(current) {
                        self.annex_queue.push_back(current);
                    }
                }
            }

            match quoted.quoted_id {
                Some(next) => {
                    current = next;
                    indent.push_str(QUOTE_INDENT_STEP);
                }
                None => break,
            }
        }
    }
}

/// Bounded view around the seeds within one known tree.
fn visible_view(
    tree: &ConversationTree,
    seeds: &[PostId],
    bounds: DepthBounds,
    trees: &BTreeMap<ConversationKey, ConversationTree>,
) -> FilteredTree {
    let visible = visible_set(tree, seeds, bounds, |id| trees.contains_key(&id));
    restrict(tree, visible)
}

/// View for seeds with no known reply tree: each stands alone.
fn singleton_view(seeds: &[PostId]) -> FilteredTree {
    FilteredTree {
        tree: ConversationTree::default(),
        visible: seeds.iter().copied().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TreeBuilder;
    use pretty_assertions::assert_eq;
    use strand_store::Post;

    fn post(id: PostId, conv: Option<u64>, reply_to: Option<PostId>, quoted: Option<PostId>) -> Post {
        Post {
            id,
            author_id: id,
            author_handle: format!("user{id}"),
            created_at: None,
            text: format!("body of {id}"),
            favorite_count: 0,
            repost_count: 0,
            reply_to,
            conversation_id: conv,
            quoted_id: quoted,
            quote_count: 0,
        }
    }

    fn build(posts: &[Post]) -> (PostStore, BTreeMap<ConversationKey, ConversationTree>) {
        let with_conv: Vec<&Post> = posts.iter().filter(|p| p.conversation_id.is_some()).collect();
        let trees = TreeBuilder::new().build_complete(with_conv).unwrap();
        (PostStore::from_posts(posts.to_vec()), trees)
    }

    #[test]
    fn empty_seed_list_is_diagnostic_not_error() {
        let (store, trees) = build(&[]);
        let text = StrandRenderer::new(&store, &trees, DepthBounds::uniform(2)).render(&[]);
        assert_eq!(text, "No valid post ids found.");
    }

    #[test]
    fn unknown_seeds_are_diagnostic_not_error() {
        let (store, trees) = build(&[post(1, Some(1), None, None)]);
        let text = StrandRenderer::new(&store, &trees, DepthBounds::uniform(2)).render(&[42]);
        assert_eq!(text, "No valid post ids found.");
    }

    #[test]
    fn single_child_renders_as_linear_continuation() {
        let posts = vec![
            post(1, Some(1), None, None),
            post(2, Some(1), Some(1), None),
        ];
        let (store, trees) = build(&posts);
        let text =
            StrandRenderer::new(&store, &trees, DepthBounds::unbounded()).render(&[1]);

        assert!(text.contains("↓"), "missing linear marker:\n{text}");
        assert!(!text.contains("└──"), "single child must not branch:\n{text}");
    }

    #[test]
    fn siblings_render_with_branch_connectors() {
        let posts = vec![
            post(1, Some(1), None, None),
            post(2, Some(1), Some(1), None),
            post(3, Some(1), Some(1), None),
        ];
        let (store, trees) = build(&posts);
        let text =
            StrandRenderer::new(&store, &trees, DepthBounds::unbounded()).render(&[1]);

        assert!(text.contains("├── "), "mid child connector missing:\n{text}");
        assert!(text.contains("└── "), "last child connector missing:\n{text}");
    }

    #[test]
    fn missing_quoted_post_gets_placeholder() {
        let posts = vec![post(1, Some(1), None, Some(777))];
        let (store, trees) = build(&posts);
        let text =
            StrandRenderer::new(&store, &trees, DepthBounds::unbounded()).render(&[1]);

        assert!(text.contains("[Quoted post 777 not found]"), "{text}");
    }

    #[test]
    fn zero_bounds_suppress_annexes() {
        let posts = vec![
            post(1, Some(1), None, Some(2)),
            post(2, Some(2), None, None),
        ];
        let (store, trees) = build(&posts);
        let text = StrandRenderer::new(&store, &trees, DepthBounds::uniform(0)).render(&[1]);

        assert!(text.contains("body of 2"), "quote body still shown:\n{text}");
        assert!(!text.contains(">>> Annex"), "annex not suppressed:\n{text}");
    }

    #[test]
    fn quote_cycle_terminates() {
        // 1 quotes 2, 2 quotes 1.
        let posts = vec![
            post(1, Some(1), None, Some(2)),
            post(2, Some(2), None, Some(1)),
        ];
        let (store, trees) = build(&posts);
        let text =
            StrandRenderer::new(&store, &trees, DepthBounds::unbounded()).render(&[1]);

        // Terminates, and each body appears exactly once.
        assert_eq!(text.matches("body of 1").count(), 1, "{text}");
        assert_eq!(text.matches("body of 2").count(), 1, "{text}");
    }

    #[test]
    fn header_function_is_injected() {
        let posts = vec![post(1, Some(1), None, None)];
        let (store, trees) = build(&posts);
        let text = StrandRenderer::new(&store, &trees, DepthBounds::uniform(1))
            .with_header(|p| format!("<<{}>>", p.id))
            .render(&[1]);

        assert!(text.starts_with("<<1>>"), "{text}");
    }

    #[test]
    fn media_descriptions_are_emitted_when_present() {
        let posts = vec![post(1, Some(1), None, None)];
        let (store, trees) = build(&posts);
        let media = HashMap::from([(
            1u64,
            vec![MediaDescription {
                url: "https://img.example/a.jpg".into(),
                description: "a chart".into(),
            }],
        )]);
        let text = StrandRenderer::new(&store, &trees, DepthBounds::uniform(1))
            .with_media(&media)
            .render(&[1]);

        assert!(text.contains("[image: https://img.example/a.jpg]"), "{text}");
        assert!(text.contains("a chart"), "{text}");
    }
}
