// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Quantization grids.
//!
//! A grid is a rooted tree of rhythmic subdivisions stored as an arena of
//! nodes. Children are only ever created by [`Grid::subdivide`], which
//! splits a leaf into equal parts, so the durations of a node's children
//! always sum exactly to the node's own duration.
//!
//! Every onset is attached to exactly one leaf: the leaf whose half-open
//! extent `[offset, offset + duration)` contains it. Onsets before the beat
//! land on the first leaf and onsets at or after the span land on the last.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::beat::{Beat, Onset};
use crate::error::{QuantizeError, Result};
use crate::music::Duration;

/// Handle to a node in a [`Grid`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in its grid's arena
    pub fn index(self) -> usize {
        self.0
    }
}

/// One node of a grid; a leaf when it has no children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridNode {
    duration: Duration,
    offset: Duration,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    onsets: Vec<Onset>,
    is_divisible: bool,
}

impl GridNode {
    fn new(duration: Duration, offset: Duration, parent: Option<NodeId>) -> Self {
        Self {
            duration,
            offset,
            parent,
            children: Vec::new(),
            onsets: Vec::new(),
            is_divisible: true,
        }
    }

    /// Preprolated duration of this node
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Start of this node relative to the beat start
    pub fn offset(&self) -> Duration {
        self.offset
    }

    /// End of this node's half-open extent
    pub fn end(&self) -> Duration {
        self.offset + self.duration
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Onsets attached to this node (only leaves carry onsets)
    pub fn onsets(&self) -> &[Onset] {
        &self.onsets
    }

    /// Whether a search may split this node further
    pub fn is_divisible(&self) -> bool {
        self.is_divisible
    }
}

/// A candidate subdivision of one beat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GridArena")]
pub struct Grid {
    nodes: Vec<GridNode>,
}

/// Wire form of a grid; the arena is checked before it becomes a `Grid`
#[derive(Deserialize)]
struct GridArena {
    nodes: Vec<GridNode>,
}

impl TryFrom<GridArena> for Grid {
    type Error = QuantizeError;

    fn try_from(arena: GridArena) -> Result<Self> {
        let grid = Grid { nodes: arena.nodes };
        grid.validate()?;
        Ok(grid)
    }
}

impl Grid {
    const ROOT: NodeId = NodeId(0);

    /// Create an unsplit grid covering `span`
    pub fn new(span: Duration) -> Result<Self> {
        if !span.is_positive() {
            return Err(QuantizeError::InvalidSpan(span));
        }
        Ok(Self {
            nodes: vec![GridNode::new(span, Duration::zero(), None)],
        })
    }

    /// Create an unsplit grid with `onsets` attached to its single leaf
    pub fn with_onsets(span: Duration, onsets: &[Onset]) -> Result<Self> {
        let mut grid = Self::new(span)?;
        grid.fit_onsets(onsets);
        Ok(grid)
    }

    /// Create the unsplit grid for a beat, holding all of its onsets
    pub fn unsplit(beat: &Beat) -> Self {
        // A beat's span is positive by construction
        let mut grid = Self {
            nodes: vec![GridNode::new(beat.span(), Duration::zero(), None)],
        };
        grid.fit_onsets(beat.onsets());
        grid
    }

    pub fn root(&self) -> NodeId {
        Self::ROOT
    }

    /// Total duration of the grid (the beat span)
    pub fn span(&self) -> Duration {
        self.nodes[Self::ROOT.0].duration
    }

    /// Get a node by handle.
    ///
    /// Panics if `id` did not come from this grid.
    pub fn node(&self, id: NodeId) -> &GridNode {
        &self.nodes[id.0]
    }

    /// Get a node by handle, if it exists
    pub fn get(&self, id: NodeId) -> Option<&GridNode> {
        self.nodes.get(id.0)
    }

    /// Number of nodes in the arena
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check the arena invariants: a parentless root at index 0, every
    /// child after its parent and pointing back at it, positive durations,
    /// children tiling their parent exactly, and onsets only on leaves
    fn validate(&self) -> Result<()> {
        let malformed = |reason: String| Err(QuantizeError::MalformedGrid(reason));
        let root = match self.nodes.first() {
            Some(root) => root,
            None => return malformed("no root node".to_string()),
        };
        if root.parent.is_some() || root.offset != Duration::zero() {
            return malformed("root must start at 0 with no parent".to_string());
        }

        let mut claimed = vec![false; self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            if !node.duration.is_positive() {
                return malformed(format!("node {} has duration {}", index, node.duration));
            }
            if !node.is_leaf() && !node.onsets.is_empty() {
                return malformed(format!("internal node {} carries onsets", index));
            }

            let mut cursor = node.offset;
            for child_id in &node.children {
                let child = match self.nodes.get(child_id.0) {
                    Some(child) if child_id.0 > index => child,
                    _ => return malformed(format!("node {} has bad child {}", index, child_id.0)),
                };
                if claimed[child_id.0] || child.parent != Some(NodeId(index)) {
                    return malformed(format!("node {} is not owned by {}", child_id.0, index));
                }
                claimed[child_id.0] = true;
                if child.offset != cursor {
                    return malformed(format!("node {} does not start at {}", child_id.0, cursor));
                }
                cursor += child.duration;
            }
            if !node.is_leaf() && cursor != node.end() {
                return malformed(format!("children of node {} do not fill it", index));
            }
        }

        if claimed.iter().skip(1).any(|claimed| !claimed) {
            return malformed("arena holds nodes unreachable from the root".to_string());
        }
        Ok(())
    }

    fn check(&self, id: NodeId) -> Result<&GridNode> {
        self.nodes.get(id.0).ok_or(QuantizeError::UnknownNode(id.0))
    }

    /// Split a leaf into `count` equal children.
    ///
    /// Onsets attached to the leaf move to the child that contains them.
    pub fn subdivide(&mut self, id: NodeId, count: u32) -> Result<Vec<NodeId>> {
        let node = self.check(id)?;
        if count < 2 {
            return Err(QuantizeError::InvalidSubdivision {
                node: id.0,
                reason: format!("count {} must be at least 2", count),
            });
        }
        if !node.is_leaf() {
            return Err(QuantizeError::InvalidSubdivision {
                node: id.0,
                reason: "node already has children".to_string(),
            });
        }
        if !node.is_divisible {
            return Err(QuantizeError::InvalidSubdivision {
                node: id.0,
                reason: "node is marked indivisible".to_string(),
            });
        }

        let child_duration = node.duration / count as i64;
        let start = node.offset;

        let mut children = Vec::with_capacity(count as usize);
        for i in 0..count as i64 {
            let child = NodeId(self.nodes.len());
            self.nodes
                .push(GridNode::new(child_duration, start + child_duration * i, Some(id)));
            children.push(child);
        }

        let onsets = std::mem::take(&mut self.nodes[id.0].onsets);
        self.nodes[id.0].children = children.clone();
        for onset in onsets {
            let leaf = self.locate_leaf(onset.offset);
            self.nodes[leaf.0].onsets.push(onset);
        }

        Ok(children)
    }

    /// Attach onsets to the leaves that contain them
    pub fn fit_onsets(&mut self, onsets: &[Onset]) {
        for onset in onsets {
            let leaf = self.locate_leaf(onset.offset);
            self.nodes[leaf.0].onsets.push(onset.clone());
        }
        for node in &mut self.nodes {
            node.onsets.sort_by_key(|onset| onset.offset);
        }
    }

    /// Find the leaf whose extent contains `offset`, clamping to the first
    /// or last leaf for offsets outside the grid
    pub fn locate_leaf(&self, offset: Duration) -> NodeId {
        let mut current = Self::ROOT;
        loop {
            let children = &self.nodes[current.0].children;
            if children.is_empty() {
                return current;
            }
            current = children
                .iter()
                .rev()
                .find(|child| self.nodes[child.0].offset <= offset)
                .copied()
                .unwrap_or(children[0]);
        }
    }

    /// Leaves in time order
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![Self::ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if node.is_leaf() {
                leaves.push(id);
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        leaves
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_leaf()).count()
    }

    /// Number of subdivisions between the root and `id`
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.nodes[id.0].parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes[parent.0].parent;
        }
        depth
    }

    /// Attack points: every leaf start, then the next downbeat at the span
    pub fn offsets(&self) -> Vec<Duration> {
        let mut offsets: Vec<Duration> = self
            .leaves()
            .into_iter()
            .map(|id| self.nodes[id.0].offset)
            .collect();
        offsets.push(self.span());
        offsets
    }

    /// Leaf durations in time order; two grids with the same signature
    /// notate identically
    pub fn signature(&self) -> Vec<Duration> {
        self.leaves()
            .into_iter()
            .map(|id| self.nodes[id.0].duration)
            .collect()
    }

    /// All attached onsets, in leaf order
    pub fn onsets(&self) -> Vec<&Onset> {
        self.leaves()
            .into_iter()
            .flat_map(|id| self.nodes[id.0].onsets.iter())
            .collect()
    }

    pub fn onset_count(&self) -> usize {
        self.nodes.iter().map(|node| node.onsets.len()).sum()
    }

    /// Sum over onsets of the squared distance to the nearest attack point.
    ///
    /// Each per-onset distance is computed exactly; only squaring and
    /// summing happen in floating point, always in leaf order.
    pub fn distance(&self) -> f64 {
        let offsets = self.offsets();
        self.onsets()
            .into_iter()
            .map(|onset| {
                let nearest = nearest_distance(&offsets, onset.offset).to_f64();
                nearest * nearest
            })
            .sum()
    }

    /// Onsets grouped by the attack point they snap to.
    ///
    /// The result has `leaf_count() + 1` buckets; the last one is the next
    /// downbeat. An onset exactly between two attack points snaps to the
    /// later one.
    pub fn snapped_onsets(&self) -> Vec<Vec<Onset>> {
        let offsets = self.offsets();
        let mut buckets = vec![Vec::new(); offsets.len()];
        for onset in self.onsets() {
            buckets[snap_index(&offsets, onset.offset)].push(onset.clone());
        }
        for bucket in &mut buckets {
            bucket.sort_by_key(|onset: &Onset| onset.offset);
        }
        buckets
    }

    /// Realize the leaves as `(attack_offset, duration)` pairs scaled by
    /// `pulse_duration`
    pub fn realize(&self, pulse_duration: Duration) -> Result<Vec<(Duration, Duration)>> {
        if !pulse_duration.is_positive() {
            return Err(QuantizeError::InvalidDuration(pulse_duration));
        }
        Ok(self
            .leaves()
            .into_iter()
            .map(|id| {
                let node = &self.nodes[id.0];
                (node.offset * pulse_duration, node.duration * pulse_duration)
            })
            .collect())
    }

    /// Collapse the subtree under `id` into a single indivisible leaf that
    /// owns all of the subtree's onsets
    pub fn fuse(&self, id: NodeId) -> Result<Grid> {
        self.check(id)?;
        let mut fused = self.clone();

        let mut onsets: Vec<Onset> = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut fused.nodes[current.0];
            onsets.append(&mut node.onsets);
            stack.extend(node.children.iter().rev());
        }
        onsets.sort_by_key(|onset| onset.offset);

        let node = &mut fused.nodes[id.0];
        node.children.clear();
        node.onsets = onsets;
        node.is_divisible = false;

        Ok(fused.compact())
    }

    /// Drop nodes unreachable from the root and renumber the rest
    fn compact(self) -> Grid {
        let mut remap = vec![None; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([Self::ROOT]);
        while let Some(id) = queue.pop_front() {
            remap[id.0] = Some(NodeId(order.len()));
            order.push(id);
            queue.extend(self.nodes[id.0].children.iter().copied());
        }

        let mut old_nodes: Vec<Option<GridNode>> = self.nodes.into_iter().map(Some).collect();
        let nodes = order
            .into_iter()
            .filter_map(|old| old_nodes[old.0].take())
            .map(|mut node| {
                node.parent = node.parent.and_then(|p| remap[p.0]);
                node.children = node.children.iter().filter_map(|c| remap[c.0]).collect();
                node
            })
            .collect();

        Grid { nodes }
    }

    fn write_node(&self, id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = &self.nodes[id.0];
        if node.is_leaf() {
            return write!(f, "{}", node.duration);
        }
        write!(f, "({} (", node.duration)?;
        for (i, child) in node.children.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            self.write_node(*child, f)?;
        }
        write!(f, "))")
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_node(Self::ROOT, f)
    }
}

/// Distance from `offset` to the closest point in sorted `points`
fn nearest_distance(points: &[Duration], offset: Duration) -> Duration {
    let i = points.partition_point(|p| *p <= offset);
    let before = i.checked_sub(1).map(|j| (offset - points[j]).abs());
    let after = points.get(i).map(|p| (*p - offset).abs());
    match (before, after) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => Duration::zero(),
    }
}

/// Index of the point in sorted `points` that `offset` snaps to
fn snap_index(points: &[Duration], offset: Duration) -> usize {
    let i = points.partition_point(|p| *p < offset);
    if i == points.len() {
        return points.len() - 1;
    }
    if i == 0 || points[i] == offset {
        return i;
    }
    if points[i] - offset <= offset - points[i - 1] {
        i
    } else {
        i - 1
    }
}
