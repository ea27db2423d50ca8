//! Pixel traversal over a D8 flow grid
//!
//! - Upstream catchment of a pixel (breadth-first over contributing neighbors)
//! - Downstream flow paths and their resolvability
//! - Weighted flow accumulation in topological order

use crate::flow::FlowGrid;
use std::collections::VecDeque;

/// All pixels draining to (and including) `outlet`, as flat indices.
///
/// The walk covers the whole flow grid, hillslopes included, not just the
/// stream network.
pub fn catchment(flow: &FlowGrid, outlet: (usize, usize)) -> Vec<usize> {
    let mut visited = vec![false; flow.len()];
    let mut pixels = Vec::new();
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();

    visited[flow.flat(outlet.0, outlet.1)] = true;
    queue.push_back(outlet);

    while let Some((row, col)) = queue.pop_front() {
        pixels.push(flow.flat(row, col));
        for (nr, nc) in flow.upstream(row, col) {
            let idx = flow.flat(nr, nc);
            if !visited[idx] {
                visited[idx] = true;
                queue.push_back((nr, nc));
            }
        }
    }

    pixels
}

/// Downstream flow path from a pixel, starting with the pixel itself.
///
/// Returns `None` if the path revisits a pixel, i.e. the pixel drains into a
/// flow cycle and has no well-defined outlet.
pub fn flow_path(flow: &FlowGrid, start: (usize, usize)) -> Option<Vec<(usize, usize)>> {
    let mut visited = std::collections::HashSet::new();
    let mut path = Vec::new();
    let mut current = Some(start);

    while let Some((row, col)) = current {
        if !visited.insert(flow.flat(row, col)) {
            return None;
        }
        path.push((row, col));
        current = flow.downstream(row, col);
    }

    Some(path)
}

/// Whether a pixel's catchment is well defined
pub fn is_resolvable(flow: &FlowGrid, pixel: (usize, usize)) -> bool {
    flow_path(flow, pixel).is_some()
}

/// Per-pixel catchment totals produced by [`accumulate`]
#[derive(Debug, Clone)]
pub struct Accumulation {
    /// Sum of included, non-NaN values over each catchment
    pub sum: Vec<f64>,
    /// Number of included, non-NaN pixels in each catchment
    pub count: Vec<u64>,
    /// Number of included NaN pixels in each catchment
    pub nans: Vec<u64>,
}

/// Accumulate values over every pixel's catchment (inclusive).
///
/// * `values` - flat per-pixel values; `None` weights every pixel by 1
/// * `include` - flat per-pixel inclusion mask; `None` includes everything
///
/// Pixels trapped in flow cycles never reach zero in-degree and keep only
/// the totals that reached them before the cycle.
pub fn accumulate(flow: &FlowGrid, values: Option<&[f64]>, include: Option<&[bool]>) -> Accumulation {
    let n = flow.len();
    let (rows, cols) = flow.shape();

    let mut sum = vec![0.0_f64; n];
    let mut count = vec![0_u64; n];
    let mut nans = vec![0_u64; n];

    // Step 1: Seed each pixel with its own contribution
    for idx in 0..n {
        if let Some(mask) = include {
            if !mask[idx] {
                continue;
            }
        }
        let value = values.map_or(1.0, |v| v[idx]);
        if value.is_nan() {
            nans[idx] = 1;
        } else {
            sum[idx] = value;
            count[idx] = 1;
        }
    }

    // Step 2: In-degree (how many pixels drain INTO each pixel)
    let mut in_degree = vec![0_u32; n];
    let mut downstream = vec![usize::MAX; n];
    for row in 0..rows {
        for col in 0..cols {
            if let Some((nr, nc)) = flow.downstream(row, col) {
                let target = flow.flat(nr, nc);
                downstream[flow.flat(row, col)] = target;
                in_degree[target] += 1;
            }
        }
    }

    // Step 3: Topological propagation from headwater pixels
    let mut stack: Vec<usize> = (0..n).filter(|&idx| in_degree[idx] == 0).collect();
    while let Some(idx) = stack.pop() {
        let target = downstream[idx];
        if target == usize::MAX {
            continue;
        }
        sum[target] += sum[idx];
        count[target] += count[idx];
        nans[target] += nans[idx];

        in_degree[target] -= 1;
        if in_degree[target] == 0 {
            stack.push(target);
        }
    }

    Accumulation { sum, count, nans }
}
