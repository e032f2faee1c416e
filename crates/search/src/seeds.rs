use std::collections::HashSet;
use std::fmt;
use strand_store::PostId;

/// Where a seed came from. Provenance is carried through to the rendered
/// header so a reader can tell a direct quote from a semantic neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeedProvenance {
    /// The requested root post itself.
    Root,
    /// A post that quotes the root.
    QuoteOfRoot,
    /// A semantic neighbor of the root's text.
    SemanticSearch,
    /// A post that quotes a semantic neighbor.
    QuoteOfSemanticSearch,
}

impl fmt::Display for SeedProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SeedProvenance::Root => "root",
            SeedProvenance::QuoteOfRoot => "quote-of-root",
            SeedProvenance::SemanticSearch => "semantic-search",
            SeedProvenance::QuoteOfSemanticSearch => "quote-of-semantic-search",
        };
        f.write_str(label)
    }
}

/// One entry in a strand's seed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrandSeed {
    pub post_id: PostId,
    pub provenance: SeedProvenance,
}

impl StrandSeed {
    pub fn new(post_id: PostId, provenance: SeedProvenance) -> Self {
        Self { post_id, provenance }
    }
}

/// Drop repeated post ids, keeping the first occurrence. Discovery emits
/// seeds in provenance order (root first), so the first occurrence is
/// also the strongest provenance claim.
pub fn dedupe_seeds(seeds: Vec<StrandSeed>) -> Vec<StrandSeed> {
    let mut seen = HashSet::new();
    seeds
        .into_iter()
        .filter(|seed| seen.insert(seed.post_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dedupe_keeps_first_provenance() {
        let seeds = vec![
            StrandSeed::new(1, SeedProvenance::Root),
            StrandSeed::new(2, SeedProvenance::QuoteOfRoot),
            StrandSeed::new(2, SeedProvenance::SemanticSearch),
            StrandSeed::new(3, SeedProvenance::SemanticSearch),
            StrandSeed::new(1, SeedProvenance::QuoteOfSemanticSearch),
        ];

        let deduped = dedupe_seeds(seeds);
        assert_eq!(
            deduped,
            vec![
                StrandSeed::new(1, SeedProvenance::Root),
                StrandSeed::new(2, SeedProvenance::QuoteOfRoot),
                StrandSeed::new(3, SeedProvenance::SemanticSearch),
            ]
        );
    }

    #[test]
    fn provenance_labels_are_stable() {
        assert_eq!(SeedProvenance::Root.to_string(), "root");
        assert_eq!(
            SeedProvenance::QuoteOfSemanticSearch.to_string(),
            "quote-of-semantic-search"
        );
    }
}
