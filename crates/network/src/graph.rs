//! Segment graph construction
//!
//! Partitions the in-network pixels of a D8 flow grid into stream segments.
//! A segment is a maximal chain of pixels where every pixel after the first
//! has exactly one in-network predecessor. Chains start at headwaters (no
//! in-network predecessor) and at confluences (two or more), and end where
//! flow leaves the network or reaches a confluence.
//!
//! The parent/child links between segments form a forest of in-trees rooted
//! at terminal segments.

use crate::flow::FlowGrid;
use crate::traversal::accumulate;
use firebasin_core::{Error, Result};
use std::collections::HashMap;
use tracing::debug;

const NO_CHAIN: usize = usize::MAX;

/// A stream segment record
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub(crate) id: u32,
    pub(crate) pixels: Vec<(usize, usize)>,
    pub(crate) parents: Vec<u32>,
    pub(crate) child: Option<u32>,
    pub(crate) npixels: u64,
}

impl Segment {
    /// Stable segment ID, never reused after removal
    pub fn id(&self) -> u32 {
        self.id
    }

    /// (row, col) pixels ordered from upstream to the outlet
    pub fn pixels(&self) -> &[(usize, usize)] {
        &self.pixels
    }

    /// IDs of the segments draining directly into this one
    pub fn parents(&self) -> &[u32] {
        &self.parents
    }

    /// ID of the segment this one drains into
    pub fn child(&self) -> Option<u32> {
        self.child
    }

    pub fn is_terminal(&self) -> bool {
        self.child.is_none()
    }

    /// The most downstream pixel
    pub fn outlet(&self) -> (usize, usize) {
        // Segments are never built empty
        self.pixels[self.pixels.len() - 1]
    }

    /// Number of flow-grid pixels draining to (and including) the outlet
    pub fn npixels(&self) -> u64 {
        self.npixels
    }
}

/// One unsplit pixel chain
struct Chain {
    pixels: Vec<(usize, usize)>,
    /// Index of the chain this one drains into
    child: usize,
}

/// Build the segment collection for the pixels flagged in `in_network`.
///
/// * `in_network` - flat per-pixel membership; pixels without a flow
///   direction are dropped from the network
/// * `max_length` - optional maximum segment length in CRS base units
///
/// Segment IDs run from 1 in raster order of each chain's first pixel; the
/// pieces of a split chain take consecutive IDs from upstream to downstream.
pub fn build_segments(
    flow: &FlowGrid,
    in_network: &[bool],
    max_length: Option<f64>,
) -> Result<Vec<Segment>> {
    if let Some(max) = max_length {
        let diagonal = flow.transform().pixel_diagonal();
        if !max.is_finite() || max < diagonal {
            return Err(Error::InvalidParameter {
                name: "max_length",
                value: max.to_string(),
                reason: format!("must be at least one pixel diagonal ({})", diagonal),
            });
        }
    }

    let (rows, cols) = flow.shape();
    let n = flow.len();

    let member: Vec<bool> = (0..n)
        .map(|idx| {
            let (row, col) = flow.unflat(idx);
            in_network[idx] && flow.has_flow(row, col)
        })
        .collect();

    // Downstream in-network neighbor of each member pixel
    let next_in_network = |row: usize, col: usize| -> Option<(usize, usize)> {
        flow.downstream(row, col)
            .filter(|&(nr, nc)| member[flow.flat(nr, nc)])
    };

    // Step 1: In-network predecessor counts
    let mut predecessors = vec![0_u32; n];
    for row in 0..rows {
        for col in 0..cols {
            if !member[flow.flat(row, col)] {
                continue;
            }
            if let Some((nr, nc)) = next_in_network(row, col) {
                predecessors[flow.flat(nr, nc)] += 1;
            }
        }
    }

    // Step 2: Walk a chain from every head pixel
    let mut chain_of = vec![NO_CHAIN; n];
    let mut chains: Vec<Chain> = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            let idx = flow.flat(row, col);
            if !member[idx] || predecessors[idx] == 1 {
                continue;
            }

            let chain = chains.len();
            let mut pixels = Vec::new();
            let mut current = (row, col);
            loop {
                chain_of[flow.flat(current.0, current.1)] = chain;
                pixels.push(current);
                match next_in_network(current.0, current.1) {
                    Some(next)
                        if predecessors[flow.flat(next.0, next.1)] == 1
                            && chain_of[flow.flat(next.0, next.1)] == NO_CHAIN =>
                    {
                        current = next;
                    }
                    _ => break,
                }
            }
            chains.push(Chain {
                pixels,
                child: NO_CHAIN,
            });
        }
    }

    // Members never reached from a head lie on a closed flow loop
    if let Some(idx) = (0..n).find(|&idx| member[idx] && chain_of[idx] == NO_CHAIN) {
        let (row, col) = flow.unflat(idx);
        return Err(Error::Consistency(format!(
            "pixel ({}, {}) lies on a flow cycle inside the stream network",
            row, col
        )));
    }

    // Step 3: Link each chain to the chain starting at its confluence
    for chain in chains.iter_mut() {
        let (row, col) = chain.pixels[chain.pixels.len() - 1];
        if let Some((nr, nc)) = next_in_network(row, col) {
            chain.child = chain_of[flow.flat(nr, nc)];
        }
    }

    // Step 4: Split long chains and assign IDs
    let mut segments: Vec<Segment> = Vec::new();
    // First and last segment index of each chain
    let mut span: Vec<(usize, usize)> = Vec::with_capacity(chains.len());
    for chain in &chains {
        let pieces = match max_length {
            Some(max) => split_chain(flow, &chain.pixels, max),
            None => vec![chain.pixels.clone()],
        };
        let first = segments.len();
        for pixels in pieces {
            let id = segments.len() as u32 + 1;
            let mut parents = Vec::new();
            if segments.len() > first {
                if let Some(previous) = segments.last_mut() {
                    previous.child = Some(id);
                    parents.push(previous.id);
                }
            }
            segments.push(Segment {
                id,
                pixels,
                parents,
                child: None,
                npixels: 0,
            });
        }
        span.push((first, segments.len() - 1));
    }

    for (c, chain) in chains.iter().enumerate() {
        if chain.child == NO_CHAIN {
            continue;
        }
        let (_, last) = span[c];
        let (child_first, _) = span[chain.child];
        let child_id = segments[child_first].id;
        let parent_id = segments[last].id;
        if child_id == parent_id {
            return Err(Error::Consistency(format!(
                "segment {} drains into itself",
                parent_id
            )));
        }
        segments[last].child = Some(child_id);
        segments[child_first].parents.push(parent_id);
    }
    for segment in segments.iter_mut() {
        segment.parents.sort_unstable();
    }

    check_acyclic(&segments)?;

    // Step 5: Catchment sizes at each outlet
    let acc = accumulate(flow, None, None);
    for segment in segments.iter_mut() {
        let (row, col) = segment.outlet();
        segment.npixels = acc.count[flow.flat(row, col)];
    }

    debug!(
        chains = chains.len(),
        segments = segments.len(),
        "built stream segment graph"
    );
    Ok(segments)
}

/// Split a pixel chain into the fewest pieces no longer than `max_length`.
///
/// A piece's length runs from its first pixel to the first pixel of the next
/// piece, matching [`Segments::lengths`](crate::Segments::lengths). Among the
/// splits with the fewest pieces, each cut is placed as close as possible to
/// an equal fraction of the chain's length.
fn split_chain(flow: &FlowGrid, pixels: &[(usize, usize)], max_length: f64) -> Vec<Vec<(usize, usize)>> {
    let n = pixels.len();

    // Distance from the chain head to the start of each pixel, plus the total
    let mut cum = Vec::with_capacity(n + 1);
    let mut total = 0.0;
    for (i, &(row, col)) in pixels.iter().enumerate() {
        cum.push(total);
        if i + 1 < n || flow.downstream(row, col).is_some() {
            total += flow.step_length(row, col).unwrap_or(0.0);
        }
    }
    cum.push(total);

    // Absorb rounding in the cumulative sums
    let limit = max_length * (1.0 + 1e-12);

    // Farthest cut reachable by a single piece starting at pixel `a`. A single
    // step never exceeds the pixel diagonal, so every piece can hold a pixel.
    let reach = |a: usize| -> usize {
        let b = cum.partition_point(|&c| c - cum[a] <= limit) - 1;
        b.clamp(a + 1, n)
    };

    // Fewest pieces covering pixels a..n, by greedy extension
    let mut needed = vec![0_usize; n + 1];
    for a in (0..n).rev() {
        needed[a] = 1 + needed[reach(a)];
    }
    let k = needed[0];
    if k <= 1 {
        return vec![pixels.to_vec()];
    }

    let piece = total / k as f64;
    let mut bounds = vec![0_usize];
    for j in 1..k {
        let previous = bounds[j - 1];
        // Cuts the rest of the chain can still be covered from in k - j pieces
        let lowest = needed.partition_point(|&m| m > k - j).max(previous + 1);
        let highest = reach(previous).min(n - (k - j));

        let target = piece * j as f64;
        let after = cum.partition_point(|&c| c < target);
        let nearest = if after > 0 && target - cum[after - 1] < cum[after] - target {
            after - 1
        } else {
            after
        };
        bounds.push(nearest.clamp(lowest, highest));
    }
    bounds.push(n);

    bounds
        .windows(2)
        .map(|w| pixels[w[0]..w[1]].to_vec())
        .collect()
}

/// Kahn's algorithm over the segment links; leftover segments form a cycle
fn check_acyclic(segments: &[Segment]) -> Result<()> {
    let index: HashMap<u32, usize> = segments.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
    let mut remaining: Vec<usize> = segments.iter().map(|s| s.parents.len()).collect();
    let mut stack: Vec<usize> = (0..segments.len()).filter(|&i| remaining[i] == 0).collect();
    let mut visited = 0;

    while let Some(i) = stack.pop() {
        visited += 1;
        if let Some(child) = segments[i].child.and_then(|id| index.get(&id)) {
            remaining[*child] -= 1;
            if remaining[*child] == 0 {
                stack.push(*child);
            }
        }
    }

    if visited != segments.len() {
        return Err(Error::Consistency(format!(
            "{} segments lie on a flow cycle",
            segments.len() - visited
        )));
    }
    Ok(())
}
