// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Subdivision search.
//!
//! A search tree constrains which tuplets may nest inside which: each
//! admissible child count maps to the rule its children must follow. The
//! search descends from an unsplit beat, trying every admissible split of
//! every node that still has unresolved onsets, and returns each distinct
//! resulting grid.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::beat::{Beat, Onset};
use super::grid::Grid;
use crate::error::{QuantizeError, Result};
use crate::music::Duration;

/// Nodes with at most this many onsets are not split further; at 0 any
/// node with an onset off its start is refined
pub const DEFAULT_REFINEMENT_THRESHOLD: usize = 0;

/// Admissible subdivisions below one node: child count -> rule for children.
///
/// An empty rule is terminal. Serialized as a nested map with `null` for
/// terminal entries, e.g. `{2: {3: null}, 5: null}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(
    from = "Option<BTreeMap<u32, SubdivisionRule>>",
    into = "Option<BTreeMap<u32, SubdivisionRule>>"
)]
pub struct SubdivisionRule {
    divisions: BTreeMap<u32, SubdivisionRule>,
}

impl From<Option<BTreeMap<u32, SubdivisionRule>>> for SubdivisionRule {
    fn from(divisions: Option<BTreeMap<u32, SubdivisionRule>>) -> Self {
        Self {
            divisions: divisions.unwrap_or_default(),
        }
    }
}

impl From<SubdivisionRule> for Option<BTreeMap<u32, SubdivisionRule>> {
    fn from(rule: SubdivisionRule) -> Self {
        if rule.divisions.is_empty() {
            None
        } else {
            Some(rule.divisions)
        }
    }
}

impl SubdivisionRule {
    /// A rule that allows no further subdivision
    pub fn terminal() -> Self {
        Self::default()
    }

    /// Allow splitting into `count` parts, each following `rule`
    pub fn with(mut self, count: u32, rule: SubdivisionRule) -> Self {
        self.divisions.insert(count, rule);
        self
    }

    /// Allow splitting into `count` terminal parts
    pub fn with_terminal(self, count: u32) -> Self {
        self.with(count, Self::terminal())
    }

    pub fn is_terminal(&self) -> bool {
        self.divisions.is_empty()
    }

    /// Admissible child counts, ascending
    pub fn counts(&self) -> impl Iterator<Item = u32> + '_ {
        self.divisions.keys().copied()
    }

    /// Admissible child counts with their children's rules
    pub fn divisions(&self) -> impl Iterator<Item = (u32, &SubdivisionRule)> {
        self.divisions.iter().map(|(count, rule)| (*count, rule))
    }

    /// The rule that applies after following `path` of child counts
    pub fn follow(&self, path: &[u32]) -> Option<&SubdivisionRule> {
        path.iter()
            .try_fold(self, |rule, count| rule.divisions.get(count))
    }

    /// Longest chain of nested subdivisions
    pub fn height(&self) -> usize {
        self.divisions
            .values()
            .map(|rule| rule.height() + 1)
            .max()
            .unwrap_or(0)
    }

    fn validate(&self) -> Result<()> {
        for (count, rule) in &self.divisions {
            if *count < 2 {
                return Err(QuantizeError::MalformedSearchTree(format!(
                    "child count {} must be at least 2",
                    count
                )));
            }
            rule.validate()?;
        }
        Ok(())
    }
}

/// Candidate shape before it is built into a grid
#[derive(Debug, Clone)]
enum Shape {
    Leaf,
    Split(Vec<Shape>),
}

/// Search constraint and candidate generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SearchTreeFields")]
pub struct SearchTree {
    definition: SubdivisionRule,
    refinement_threshold: usize,
}

/// Wire form of a search tree, checked before it becomes a `SearchTree`
#[derive(Deserialize)]
struct SearchTreeFields {
    definition: SubdivisionRule,
    refinement_threshold: usize,
}

impl TryFrom<SearchTreeFields> for SearchTree {
    type Error = QuantizeError;

    fn try_from(fields: SearchTreeFields) -> Result<Self> {
        Ok(Self::new(fields.definition)?.with_refinement_threshold(fields.refinement_threshold))
    }
}

impl Default for SearchTree {
    /// Tuplets up to 13 at the top level, with progressively fewer
    /// choices further down
    fn default() -> Self {
        let definition = SubdivisionRule::terminal()
            .with(
                2,
                SubdivisionRule::terminal()
                    .with(
                        2,
                        SubdivisionRule::terminal()
                            .with(2, SubdivisionRule::terminal().with_terminal(2))
                            .with_terminal(3),
                    )
                    .with_terminal(3)
                    .with_terminal(5)
                    .with_terminal(7),
            )
            .with(
                3,
                SubdivisionRule::terminal()
                    .with(2, SubdivisionRule::terminal().with_terminal(2))
                    .with_terminal(3)
                    .with_terminal(5),
            )
            .with(
                5,
                SubdivisionRule::terminal()
                    .with_terminal(2)
                    .with_terminal(3),
            )
            .with(7, SubdivisionRule::terminal().with_terminal(2))
            .with_terminal(11)
            .with_terminal(13);

        Self {
            definition,
            refinement_threshold: DEFAULT_REFINEMENT_THRESHOLD,
        }
    }
}

impl SearchTree {
    /// Create a search tree from a nested definition
    pub fn new(definition: SubdivisionRule) -> Result<Self> {
        if definition.is_terminal() {
            return Err(QuantizeError::MalformedSearchTree(
                "definition allows no subdivisions".to_string(),
            ));
        }
        definition.validate()?;
        Ok(Self {
            definition,
            refinement_threshold: DEFAULT_REFINEMENT_THRESHOLD,
        })
    }

    /// Create a search tree where every node at depth `d` may split into
    /// any count in `levels[d]`
    pub fn from_levels(levels: &[Vec<u32>]) -> Result<Self> {
        if levels.is_empty() {
            return Err(QuantizeError::MalformedSearchTree(
                "no subdivision levels given".to_string(),
            ));
        }

        let mut rule = SubdivisionRule::terminal();
        for (depth, counts) in levels.iter().enumerate().rev() {
            if counts.is_empty() {
                return Err(QuantizeError::MalformedSearchTree(format!(
                    "no admissible child counts at depth {}",
                    depth
                )));
            }
            let mut level = SubdivisionRule::terminal();
            for count in counts {
                level = level.with(*count, rule.clone());
            }
            rule = level;
        }

        Self::new(rule)
    }

    /// Set how many onsets a node must exceed before it is split
    pub fn with_refinement_threshold(mut self, threshold: usize) -> Self {
        self.refinement_threshold = threshold;
        self
    }

    pub fn definition(&self) -> &SubdivisionRule {
        &self.definition
    }

    pub fn refinement_threshold(&self) -> usize {
        self.refinement_threshold
    }

    /// Deepest subdivision this tree allows
    pub fn max_depth(&self) -> usize {
        self.definition.height()
    }

    /// Admissible child counts for a node reached through `path`
    pub fn divisions_at(&self, path: &[u32]) -> Vec<u32> {
        self.definition
            .follow(path)
            .map(|rule| rule.counts().collect())
            .unwrap_or_default()
    }

    /// Generate every distinct candidate grid for a beat
    pub fn generate_candidates(&self, beat: &Beat) -> Result<Vec<Grid>> {
        self.generate(beat.span(), beat.onsets())
    }

    /// Generate every distinct candidate grid for `onsets` over `span`.
    ///
    /// The unsplit grid is always the first candidate. Grids with the same
    /// leaf durations are only returned once.
    pub fn generate(&self, span: Duration, onsets: &[Onset]) -> Result<Vec<Grid>> {
        if !span.is_positive() {
            return Err(QuantizeError::InvalidSpan(span));
        }

        let attached: Vec<&Onset> = onsets.iter().collect();
        let shapes = self.options(&self.definition, Duration::zero(), span, &attached);

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for shape in &shapes {
            let grid = build_grid(span, shape, onsets)?;
            if seen.insert(grid.signature()) {
                candidates.push(grid);
            }
        }

        debug!(
            "Generated {} candidates ({} shapes) for span {} with {} onsets",
            candidates.len(),
            shapes.len(),
            span,
            onsets.len()
        );
        Ok(candidates)
    }

    /// Whether a node with these onsets should try further subdivision
    fn should_refine(&self, rule: &SubdivisionRule, start: Duration, onsets: &[&Onset]) -> bool {
        if rule.is_terminal() || onsets.len() <= self.refinement_threshold {
            return false;
        }
        onsets.iter().any(|onset| onset.offset != start)
    }

    /// All shapes a node may take: itself as a leaf, then each split
    fn options(
        &self,
        rule: &SubdivisionRule,
        start: Duration,
        duration: Duration,
        onsets: &[&Onset],
    ) -> Vec<Shape> {
        let mut shapes = vec![Shape::Leaf];
        if !self.should_refine(rule, start, onsets) {
            return shapes;
        }

        for (count, child_rule) in rule.divisions() {
            let child_duration = duration / count as i64;
            let parts = partition(onsets, start, child_duration, count as usize);
            let child_options: Vec<Vec<Shape>> = parts
                .iter()
                .enumerate()
                .map(|(i, part)| {
                    let child_start = start + child_duration * i as i64;
                    self.options(child_rule, child_start, child_duration, part)
                })
                .collect();
            shapes.extend(cartesian(&child_options).into_iter().map(Shape::Split));
        }
        shapes
    }
}

/// Split onsets among `count` equal children starting at `start`; onsets
/// outside the parent clamp to the first or last child
fn partition<'a>(
    onsets: &[&'a Onset],
    start: Duration,
    child_duration: Duration,
    count: usize,
) -> Vec<Vec<&'a Onset>> {
    let mut parts = vec![Vec::new(); count];
    for onset in onsets {
        let index = if onset.offset < start {
            0
        } else {
            let position = (onset.offset - start) / child_duration;
            let whole = (position.numer() / position.denom()) as usize;
            whole.min(count - 1)
        };
        parts[index].push(*onset);
    }
    parts
}

/// Every way of picking one shape per child
fn cartesian(options: &[Vec<Shape>]) -> Vec<Vec<Shape>> {
    let mut combos: Vec<Vec<Shape>> = vec![Vec::with_capacity(options.len())];
    for choices in options {
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                choices.iter().map(move |choice| {
                    let mut combo = prefix.clone();
                    combo.push(choice.clone());
                    combo
                })
            })
            .collect();
    }
    combos
}

fn build_grid(span: Duration, shape: &Shape, onsets: &[Onset]) -> Result<Grid> {
    let mut grid = Grid::new(span)?;
    let mut stack = vec![(grid.root(), shape)];
    while let Some((node, shape)) = stack.pop() {
        if let Shape::Split(children) = shape {
            let ids = grid.subdivide(node, children.len() as u32)?;
            stack.extend(ids.into_iter().zip(children.iter()));
        }
    }
    grid.fit_onsets(onsets);
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(n: i64, den: i64) -> Duration {
        Duration::new(n, den)
    }

    fn onsets(offsets: &[(i64, i64)]) -> Vec<Onset> {
        offsets
            .iter()
            .map(|(n, den)| Onset::new(d(*n, *den), vec![60]))
            .collect()
    }

    #[test]
    fn test_from_levels() {
        let tree = SearchTree::from_levels(&[vec![2, 3], vec![2]]).unwrap();
        assert_eq!(tree.max_depth(), 2);
        assert_eq!(tree.divisions_at(&[]), vec![2, 3]);
        assert_eq!(tree.divisions_at(&[3]), vec![2]);
        assert_eq!(tree.divisions_at(&[3, 2]), Vec::<u32>::new());
        assert_eq!(tree.divisions_at(&[5]), Vec::<u32>::new());
    }

    #[test]
    fn test_malformed_definitions() {
        assert!(matches!(
            SearchTree::from_levels(&[]),
            Err(QuantizeError::MalformedSearchTree(_))
        ));
        assert!(SearchTree::from_levels(&[vec![2], vec![]]).is_err());
        assert!(SearchTree::from_levels(&[vec![1]]).is_err());
        assert!(SearchTree::new(SubdivisionRule::terminal()).is_err());
        let nested_zero =
            SubdivisionRule::terminal().with(2, SubdivisionRule::terminal().with_terminal(0));
        assert!(SearchTree::new(nested_zero).is_err());
    }

    #[test]
    fn test_default_definition() {
        let tree = SearchTree::default();
        assert_eq!(tree.max_depth(), 4);
        assert_eq!(tree.divisions_at(&[]), vec![2, 3, 5, 7, 11, 13]);
        assert_eq!(tree.divisions_at(&[2]), vec![2, 3, 5, 7]);
        assert_eq!(tree.divisions_at(&[2, 2, 2]), vec![2]);
        assert_eq!(tree.divisions_at(&[7]), vec![2]);
        assert_eq!(tree.refinement_threshold(), DEFAULT_REFINEMENT_THRESHOLD);
    }

    #[test]
    fn test_no_onsets_gives_single_leaf() {
        let tree = SearchTree::default();
        let candidates = tree.generate(d(1, 4), &[]).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].leaf_count(), 1);
    }

    #[test]
    fn test_onset_on_downbeat_needs_no_split() {
        let tree = SearchTree::default();
        let candidates = tree.generate(Duration::one(), &onsets(&[(0, 1)])).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_rejects_non_positive_span() {
        let tree = SearchTree::default();
        assert!(matches!(
            tree.generate(Duration::zero(), &[]),
            Err(QuantizeError::InvalidSpan(_))
        ));
    }

    #[test]
    fn test_single_onset_refines_every_level() {
        let tree = SearchTree::from_levels(&[vec![2], vec![2]]).unwrap();
        let candidates = tree.generate(Duration::one(), &onsets(&[(49, 100)])).unwrap();
        let signatures: Vec<_> = candidates.iter().map(|g| g.signature()).collect();
        assert_eq!(
            signatures,
            vec![
                vec![d(1, 1)],
                vec![d(1, 2), d(1, 2)],
                vec![d(1, 4), d(1, 4), d(1, 2)],
            ]
        );
    }

    #[test]
    fn test_threshold_stops_sparse_nodes() {
        let tree = SearchTree::from_levels(&[vec![2], vec![2]])
            .unwrap()
            .with_refinement_threshold(1);
        let candidates = tree.generate(Duration::one(), &onsets(&[(49, 100)])).unwrap();
        assert_eq!(candidates.len(), 1);

        let pair = onsets(&[(1, 8), (3, 8)]);
        let candidates = tree.generate(Duration::one(), &pair).unwrap();
        let signatures: Vec<_> = candidates.iter().map(|g| g.signature()).collect();
        assert_eq!(
            signatures,
            vec![
                vec![d(1, 1)],
                vec![d(1, 2), d(1, 2)],
                vec![d(1, 4), d(1, 4), d(1, 2)],
            ]
        );
    }

    #[test]
    fn test_dotted_rhythm_has_exact_candidate() {
        let tree = SearchTree::default();
        let candidates = tree.generate(d(1, 4), &onsets(&[(0, 1), (3, 16)])).unwrap();
        let exact: Vec<&Grid> = candidates.iter().filter(|g| g.distance() == 0.0).collect();
        assert!(exact
            .iter()
            .any(|g| g.signature() == vec![d(1, 8), d(1, 16), d(1, 16)]));
    }

    #[test]
    fn test_triplet_candidates() {
        let tree = SearchTree::from_levels(&[vec![2, 3]]).unwrap();
        let candidates = tree
            .generate(Duration::one(), &onsets(&[(0, 1), (1, 3), (2, 3)]))
            .unwrap();
        let signatures: Vec<_> = candidates.iter().map(|g| g.signature()).collect();
        assert_eq!(
            signatures,
            vec![
                vec![d(1, 1)],
                vec![d(1, 2), d(1, 2)],
                vec![d(1, 3), d(1, 3), d(1, 3)],
            ]
        );
        assert_eq!(candidates[2].distance(), 0.0);
    }

    #[test]
    fn test_children_refine_independently() {
        // Two onsets in the second half; the first half stays whole
        let tree = SearchTree::from_levels(&[vec![2], vec![2]]).unwrap();
        let candidates = tree
            .generate(Duration::one(), &onsets(&[(0, 1), (5, 8), (7, 8)]))
            .unwrap();
        let signatures: Vec<_> = candidates.iter().map(|g| g.signature()).collect();
        assert_eq!(
            signatures,
            vec![
                vec![d(1, 1)],
                vec![d(1, 2), d(1, 2)],
                vec![d(1, 2), d(1, 4), d(1, 4)],
            ]
        );
    }

    #[test]
    fn test_candidates_are_deduplicated() {
        // 2x2 and 4 produce the same leaves
        let definition = SubdivisionRule::terminal()
            .with(2, SubdivisionRule::terminal().with_terminal(2))
            .with_terminal(4);
        let tree = SearchTree::new(definition)
            .unwrap()
            .with_refinement_threshold(0);
        let candidates = tree
            .generate(Duration::one(), &onsets(&[(1, 8), (3, 8), (5, 8), (7, 8)]))
            .unwrap();

        let mut signatures: Vec<_> = candidates.iter().map(|g| g.signature()).collect();
        let total = signatures.len();
        signatures.sort();
        signatures.dedup();
        assert_eq!(signatures.len(), total);
        assert!(signatures.contains(&vec![d(1, 4); 4]));
    }

    #[test]
    fn test_every_candidate_keeps_every_onset() {
        let tree = SearchTree::default();
        let input = onsets(&[(-1, 20), (1, 7), (2, 5), (3, 5), (19, 20), (1, 1)]);
        let candidates = tree.generate(Duration::one(), &input).unwrap();
        assert!(candidates.len() > 1);
        for grid in &candidates {
            assert_eq!(grid.onset_count(), input.len());
            let total: Duration = grid.signature().into_iter().sum();
            assert_eq!(total, Duration::one());
        }
    }

    #[test]
    fn test_rule_serde() {
        let definition = SubdivisionRule::terminal()
            .with(2, SubdivisionRule::terminal().with_terminal(3))
            .with_terminal(5);
        let yaml = serde_yaml::to_string(&definition).unwrap();
        let back: SubdivisionRule = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, definition);

        let parsed: SubdivisionRule = serde_yaml::from_str("{2: {3: null}, 5: null}").unwrap();
        assert_eq!(parsed, definition);

        let json = serde_json::to_vec(&SearchTree::default()).unwrap();
        let tree: SearchTree = serde_json::from_slice(&json).unwrap();
        assert_eq!(tree, SearchTree::default());
    }

    #[test]
    fn test_decoding_rejects_malformed_tree() {
        let zero_count = r#"{"definition": {"2": {"0": null}}, "refinement_threshold": 0}"#;
        assert!(serde_json::from_str::<SearchTree>(zero_count).is_err());

        let terminal = r#"{"definition": null, "refinement_threshold": 0}"#;
        assert!(serde_json::from_str::<SearchTree>(terminal).is_err());
    }
}
