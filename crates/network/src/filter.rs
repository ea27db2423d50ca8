//! Segment filtering with flow-continuity preservation
//!
//! A continuous filter only removes segments at the upstream or downstream
//! frontier of their local network, so a retained network is never split
//! into pieces by a gap in the middle.

use crate::segments::Segments;
use firebasin_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Segments picked out by a filter
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Explicit segment IDs
    Ids(Vec<u32>),
    /// One flag per segment, in network order
    Mask(Vec<bool>),
}

/// Whether the selection lists the segments to keep or to remove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Keep,
    Remove,
}

/// Parameters for segment filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Only remove segments at the edges of their local network.
    /// Default: true
    pub continuous: bool,
    /// Never remove segments from the upstream frontier
    pub keep_upstream: bool,
    /// Never remove segments from the downstream frontier
    pub keep_downstream: bool,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            continuous: true,
            keep_upstream: false,
            keep_downstream: false,
        }
    }
}

impl Segments {
    /// Keep the selected segments and remove the rest.
    ///
    /// Returns one flag per pre-filter segment, true for segments that were
    /// retained. With `continuous` set, an unselected segment is still kept
    /// if removing it would break the flow path of its local network.
    pub fn keep(&mut self, selection: &Selection, params: &FilterParams) -> Result<Vec<bool>> {
        let removed = self.removal(selection, FilterMode::Keep, params)?;
        self.apply_removal(&removed)?;
        Ok(removed.into_iter().map(|r| !r).collect())
    }

    /// Remove the selected segments.
    ///
    /// Returns one flag per pre-filter segment, true for segments that were
    /// actually removed.
    pub fn remove(&mut self, selection: &Selection, params: &FilterParams) -> Result<Vec<bool>> {
        let removed = self.removal(selection, FilterMode::Remove, params)?;
        self.apply_removal(&removed)?;
        Ok(removed)
    }

    /// Preview a filter without changing the network.
    ///
    /// Returns the same indicator that [`Segments::keep`] or
    /// [`Segments::remove`] would return for `mode`.
    pub fn continuous(&self, selection: &Selection, mode: FilterMode, params: &FilterParams) -> Result<Vec<bool>> {
        let removed = self.removal(selection, mode, params)?;
        Ok(match mode {
            FilterMode::Keep => removed.into_iter().map(|r| !r).collect(),
            FilterMode::Remove => removed,
        })
    }

    /// Flag each segment in network order from a selection
    pub fn selected(&self, selection: &Selection) -> Result<Vec<bool>> {
        match selection {
            Selection::Mask(mask) => {
                if mask.len() != self.len() {
                    return Err(Error::SelectionLength {
                        expected: self.len(),
                        actual: mask.len(),
                    });
                }
                Ok(mask.clone())
            }
            Selection::Ids(ids) => {
                let mut flags = vec![false; self.len()];
                for &id in ids {
                    flags[self.position(id)?] = true;
                }
                Ok(flags)
            }
        }
    }

    /// Segments that a filter would remove, in network order
    fn removal(&self, selection: &Selection, mode: FilterMode, params: &FilterParams) -> Result<Vec<bool>> {
        let selected = self.selected(selection)?;
        let requested: Vec<bool> = match mode {
            FilterMode::Remove => selected,
            FilterMode::Keep => selected.into_iter().map(|s| !s).collect(),
        };
        if !params.continuous {
            return Ok(requested);
        }

        let order = self.upstream_first()?;
        let n = self.len();

        // Upstream frontier: every parent is already gone
        let mut from_upstream = vec![false; n];
        if !params.keep_upstream {
            for &i in &order {
                let frontier = self.segments[i]
                    .parents
                    .iter()
                    .all(|&p| self.index.get(&p).map_or(true, |&j| from_upstream[j]));
                from_upstream[i] = requested[i] && frontier;
            }
        }

        // Downstream frontier: the child is gone, or there is none
        let mut from_downstream = vec![false; n];
        if !params.keep_downstream {
            for &i in order.iter().rev() {
                let frontier = self.segments[i]
                    .child
                    .and_then(|c| self.index.get(&c))
                    .map_or(true, |&j| from_downstream[j]);
                from_downstream[i] = requested[i] && frontier;
            }
        }

        Ok(from_upstream
            .into_iter()
            .zip(from_downstream)
            .map(|(up, down)| up || down)
            .collect())
    }

    /// Segment positions ordered so that parents precede their children
    fn upstream_first(&self) -> Result<Vec<usize>> {
        let n = self.len();
        let mut remaining: Vec<usize> = self
            .segments
            .iter()
            .map(|s| s.parents.iter().filter(|p| self.index.contains_key(p)).count())
            .collect();
        let mut stack: Vec<usize> = (0..n).rev().filter(|&i| remaining[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(i) = stack.pop() {
            order.push(i);
            if let Some(&j) = self.segments[i].child.and_then(|c| self.index.get(&c)) {
                remaining[j] -= 1;
                if remaining[j] == 0 {
                    stack.push(j);
                }
            }
        }

        if order.len() != n {
            return Err(Error::Consistency(format!(
                "{} segments lie on a cycle of parent/child links",
                n - order.len()
            )));
        }
        Ok(order)
    }

    /// Drop the flagged segments and patch the links of their neighbors
    fn apply_removal(&mut self, removed: &[bool]) -> Result<()> {
        if removed.len() != self.len() {
            return Err(Error::Consistency(format!(
                "removal flags cover {} of {} segments",
                removed.len(),
                self.len()
            )));
        }
        if !removed.iter().any(|&r| r) {
            return Ok(());
        }

        let termini_before: HashSet<u32> = self.termini().into_iter().collect();
        let gone: HashSet<u32> = self
            .segments
            .iter()
            .zip(removed)
            .filter(|(_, r)| **r)
            .map(|(s, _)| s.id)
            .collect();

        let mut flags = removed.iter();
        self.segments.retain(|_| !flags.next().copied().unwrap_or(false));
        for segment in self.segments.iter_mut() {
            segment.parents.retain(|p| !gone.contains(p));
            if segment.child.is_some_and(|c| gone.contains(&c)) {
                segment.child = None;
            }
        }
        self.rebuild_index();

        let termini_after: HashSet<u32> = self.termini().into_iter().collect();
        if termini_before != termini_after {
            self.basins = None;
        }

        self.log_state("filter");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::tests::{two_networks, y_network};

    #[test]
    fn test_remove_tributary_keep_upstream() {
        let mut network = y_network();
        let params = FilterParams {
            keep_upstream: true,
            ..Default::default()
        };
        let removed = network.remove(&Selection::Ids(vec![1]), &params).unwrap();
        assert_eq!(removed, vec![false, false, false]);
        assert_eq!(network.len(), 3);
    }

    #[test]
    fn test_remove_tributary_continuous() {
        let mut network = y_network();
        let removed = network.remove(&Selection::Ids(vec![1]), &FilterParams::default()).unwrap();
        assert_eq!(removed, vec![true, false, false]);
        assert_eq!(network.ids(), vec![2, 3]);
        assert_eq!(network.parents(3).unwrap(), vec![2]);
    }

    #[test]
    fn test_sandwiched_segment_survives() {
        // Chain of three pieces; the middle one may not be removed
        let mut flow = firebasin_core::Raster::filled(1, 9, 1_u8);
        flow.set_transform(firebasin_core::GeoTransform::new(0.0, 1.0, 1.0, -1.0));
        let params = crate::NetworkParams {
            max_length: Some(3.0),
            ..Default::default()
        };
        let mut network = Segments::new(flow, &firebasin_core::Raster::filled(1, 9, 1), params).unwrap();
        assert_eq!(network.len(), 3);

        let removed = network.remove(&Selection::Ids(vec![2]), &FilterParams::default()).unwrap();
        assert_eq!(removed, vec![false, false, false]);

        let relaxed = FilterParams {
            continuous: false,
            ..Default::default()
        };
        let removed = network.remove(&Selection::Ids(vec![2]), &relaxed).unwrap();
        assert_eq!(removed, vec![false, true, false]);
        assert_eq!(network.child(1).unwrap(), None);
        assert!(network.parents(3).unwrap().is_empty());
    }

    #[test]
    fn test_remove_terminal_invalidates_basins() {
        let mut network = y_network();
        network.basin_raster().unwrap();
        assert!(network.basins().is_some());

        let removed = network.remove(&Selection::Ids(vec![3]), &FilterParams::default()).unwrap();
        assert_eq!(removed, vec![false, false, true]);
        assert!(network.basins().is_none());
        assert_eq!(network.termini(), vec![1, 2]);
    }

    #[test]
    fn test_remove_headwater_keeps_basins() {
        let mut network = y_network();
        network.basin_raster().unwrap();
        network.remove(&Selection::Ids(vec![2]), &FilterParams::default()).unwrap();
        assert!(network.basins().is_some());
    }

    #[test]
    fn test_keep_indicator_realigns() {
        let mut network = two_networks();
        let before = network.ids();
        let values: Vec<f64> = before.iter().map(|&id| id as f64 * 10.0).collect();

        let kept = network
            .keep(&Selection::Ids(vec![2, 5]), &FilterParams::default())
            .unwrap();
        assert_eq!(kept.iter().filter(|&&k| k).count(), network.len());

        let realigned: Vec<f64> = values.iter().zip(&kept).filter(|(_, k)| **k).map(|(v, _)| *v).collect();
        let expected: Vec<f64> = network.ids().iter().map(|&id| id as f64 * 10.0).collect();
        assert_eq!(realigned, expected);
        // The whole second network goes; segment 1 is a headwater and goes too
        assert_eq!(network.ids(), vec![2, 5]);
    }

    #[test]
    fn test_preview_does_not_mutate() {
        let network = y_network();
        let preview = network
            .continuous(&Selection::Mask(vec![true, true, false]), FilterMode::Remove, &FilterParams::default())
            .unwrap();
        assert_eq!(preview, vec![true, true, false]);
        assert_eq!(network.len(), 3);

        let kept = network
            .continuous(&Selection::Ids(vec![3]), FilterMode::Keep, &FilterParams::default())
            .unwrap();
        assert_eq!(kept, vec![false, false, true]);
    }

    #[test]
    fn test_invalid_selection_rejected_before_mutation() {
        let mut network = y_network();
        let err = network.remove(&Selection::Mask(vec![true]), &FilterParams::default()).unwrap_err();
        assert!(matches!(err, Error::SelectionLength { expected: 3, actual: 1 }));
        assert!(network.remove(&Selection::Ids(vec![1, 99]), &FilterParams::default()).is_err());
        assert_eq!(network.len(), 3);
    }

    #[test]
    fn test_copy_is_independent() {
        let original = y_network();
        let mut copy = original.clone();
        copy.remove(&Selection::Ids(vec![3]), &FilterParams::default()).unwrap();
        assert_eq!(original.len(), 3);
        assert_eq!(original.child(1).unwrap(), Some(3));
        assert_eq!(copy.child(1).unwrap(), None);
    }

    #[test]
    fn test_filter_params_json() {
        let params: FilterParams = serde_json::from_str(r#"{"keep_upstream": true}"#).unwrap();
        assert!(params.continuous);
        assert!(params.keep_upstream);
        assert!(!params.keep_downstream);
    }
}
