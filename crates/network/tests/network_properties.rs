//! End-to-end properties of stream segment networks.
//!
//! Networks are built from small synthetic D8 grids so that every expected
//! value can be worked out by hand.

use firebasin_core::{Error, GeoTransform, Raster};
use firebasin_network::prelude::*;

/// Initialize test logging (safe to call from every test)
fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("firebasin_network=debug".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

fn flow_raster(codes: &[u8], rows: usize, cols: usize) -> Raster<u8> {
    let mut r = Raster::from_vec(codes.to_vec(), rows, cols).unwrap();
    r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
    r
}

/// Two 2-pixel tributaries (IDs 1 and 2) joining a 1-pixel outlet (ID 3)
fn y_network() -> Segments {
    #[rustfmt::skip]
    let codes = [
        7, 0, 7,
        8, 0, 6,
        0, 7, 0,
    ];
    Segments::new(flow_raster(&codes, 3, 3), &Raster::filled(3, 3, 1), NetworkParams::default()).unwrap()
}

/// Every column drains south into a bottom channel draining east off the
/// grid. Streams run down every fourth column. Two bottom-row pixels in the
/// middle are cut from the mask, so the western network is nested in the
/// eastern one.
fn comb(size: usize) -> Segments {
    comb_with(size, NetworkParams::default())
}

fn comb_with(size: usize, params: NetworkParams) -> Segments {
    let mut flow = Raster::filled(size, size, 7_u8);
    flow.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));
    let mut mask = Raster::new(size, size);
    for col in 0..size {
        flow.set(size - 1, col, 1).unwrap();
        if col != size / 2 && col != size / 2 + 1 {
            mask.set(size - 1, col, 1).unwrap();
        }
        if col % 4 == 0 {
            for row in 0..size - 1 {
                mask.set(row, col, 1).unwrap();
            }
        }
    }
    Segments::new(flow, &mask, params).unwrap()
}

fn split_comb(size: usize) -> Segments {
    let params = NetworkParams {
        max_length: Some(5.0),
        units: LengthUnits::Base,
    };
    comb_with(size, params)
}

/// A single stream along `path`, each pixel flowing to the next
fn path_network(flow: &Raster<u8>, path: &[(usize, usize)], max_length: Option<f64>) -> Segments {
    let (rows, cols) = flow.shape();
    let mut mask = Raster::new(rows, cols);
    for &(row, col) in path {
        mask.set(row, col, 1_u8).unwrap();
    }
    let params = NetworkParams {
        max_length,
        units: LengthUnits::Base,
    };
    Segments::new(flow.clone(), &mask, params).unwrap()
}

/// Straight, diagonal and mixed single-stream paths on unit pixels
fn stream_paths() -> Vec<(&'static str, Raster<u8>, Vec<(usize, usize)>)> {
    let straight = flow_raster(&[1; 12], 1, 12);
    let straight_path: Vec<(usize, usize)> = (0..12).map(|col| (0, col)).collect();

    let diagonal = flow_raster(&[8; 49], 7, 7);
    let diagonal_path: Vec<(usize, usize)> = (0..7).map(|i| (i, i)).collect();

    let mixed_path = vec![
        (0, 0), (0, 1), (0, 2), (1, 3), (2, 4), (3, 4), (4, 4), (5, 5), (5, 6), (5, 7),
    ];
    let mixed_codes = [1, 1, 8, 8, 7, 7, 8, 1, 1, 1];
    let mut mixed = flow_raster(&[0; 48], 6, 8);
    for (&(row, col), &code) in mixed_path.iter().zip(&mixed_codes) {
        mixed.set(row, col, code).unwrap();
    }

    vec![
        ("straight", straight, straight_path),
        ("diagonal", diagonal, diagonal_path),
        ("mixed", mixed, mixed_path),
    ]
}

/// Fewest pieces of at most `max_length`, by exhaustive search over cuts.
/// `steps[i]` is the distance from pixel `i` to the next pixel downstream.
fn fewest_pieces(steps: &[f64], max_length: f64) -> usize {
    let n = steps.len();
    let mut best = vec![usize::MAX; n + 1];
    best[0] = 0;
    for end in 1..=n {
        for start in 0..end {
            let length: f64 = steps[start..end].iter().sum();
            if length <= max_length + 1e-9 && best[start] != usize::MAX {
                best[end] = best[end].min(best[start] + 1);
            }
        }
    }
    best[n]
}

/// Every segment has at most one child, links are mutual, and following
/// children always ends at a terminal segment
fn assert_forest(network: &Segments) {
    for segment in network.segments() {
        if let Some(child) = segment.child() {
            let child = network.segment(child).unwrap();
            assert!(child.parents().contains(&segment.id()));
        }
        for &parent in segment.parents() {
            assert_eq!(network.child(parent).unwrap(), Some(segment.id()));
        }
        let path = network.descendants(segment.id()).unwrap();
        assert!(path.len() < network.len());
        let last = path.last().copied().unwrap_or(segment.id());
        assert!(network.segment(last).unwrap().is_terminal());
    }
}

/// No removed segment had both a retained parent and a retained child
fn assert_frontier(before: &Segments, removed: &[bool]) {
    let retained = |id: u32| !removed[before.position(id).unwrap()];
    for (segment, &gone) in before.segments().iter().zip(removed) {
        if !gone {
            continue;
        }
        let upstream = segment.parents().iter().any(|&p| retained(p));
        let downstream = segment.child().is_some_and(|c| retained(c));
        assert!(
            !(upstream && downstream),
            "segment {} was removed from the middle of its network",
            segment.id()
        );
    }
}

#[test]
fn all_east_row_is_one_segment() {
    init_test_logging();
    let network = Segments::new(
        flow_raster(&[1; 3], 1, 3),
        &Raster::filled(1, 3, 1),
        NetworkParams::default(),
    )
    .unwrap();
    assert_eq!(network.len(), 1);
    assert_eq!(network.segment(1).unwrap().pixels(), &[(0, 0), (0, 1), (0, 2)]);
    assert_eq!(network.is_terminal(Some(&[1])).unwrap(), vec![true]);
    assert!(network.parents(1).unwrap().is_empty());
}

#[test]
fn y_confluence_links() {
    init_test_logging();
    let network = y_network();
    assert_eq!(network.len(), 3);
    assert_eq!(network.parents(3).unwrap(), vec![1, 2]);
    assert_eq!(network.child(1).unwrap(), Some(3));
    assert_eq!(network.child(2).unwrap(), Some(3));
}

#[test]
fn keep_upstream_protects_tributary() {
    init_test_logging();
    let mut network = y_network();
    let params = FilterParams {
        keep_upstream: true,
        ..Default::default()
    };
    let removed = network.remove(&Selection::Ids(vec![1]), &params).unwrap();
    assert!(removed.iter().all(|&r| !r));
    assert_eq!(network.len(), 3);
}

#[test]
fn y_basin_is_single_terminal() {
    init_test_logging();
    let mut network = y_network();
    let basins = network.basin_raster().unwrap();
    let labels: std::collections::HashSet<u32> = basins.data().iter().copied().filter(|&l| l != 0).collect();
    assert_eq!(labels.into_iter().collect::<Vec<_>>(), vec![3]);
    for &(row, col) in &[(0, 0), (1, 0), (0, 2), (1, 2), (2, 1)] {
        assert_eq!(basins.data()[(row, col)], 3);
    }
}

#[test]
fn forest_survives_any_filter_sequence() {
    init_test_logging();
    let mut network = split_comb(24);
    assert_forest(&network);

    for (modulus, remainder) in [(3, 0), (5, 2), (2, 1), (7, 3)] {
        let selection = Selection::Ids(
            network
                .ids()
                .into_iter()
                .filter(|id| id % modulus == remainder)
                .collect(),
        );
        let before = network.clone();
        let removed = network.remove(&selection, &FilterParams::default()).unwrap();
        assert_frontier(&before, &removed);
        assert_forest(&network);
        assert_eq!(network.len(), removed.iter().filter(|&&r| !r).count());
    }
}

#[test]
fn discontinuous_filter_still_patches_links() {
    init_test_logging();
    let mut network = split_comb(16);
    let params = FilterParams {
        continuous: false,
        ..Default::default()
    };
    let middle: Vec<u32> = network
        .segments()
        .iter()
        .filter(|s| s.child().is_some() && !s.parents().is_empty())
        .map(|s| s.id())
        .collect();
    assert!(!middle.is_empty());
    network.remove(&Selection::Ids(middle), &params).unwrap();
    assert_forest(&network);
}

#[test]
fn keep_indicator_realigns_arrays() {
    init_test_logging();
    let mut network = comb(20);
    let lengths = network.lengths(LengthUnits::Base);
    let ids = network.ids();
    let selection: Vec<bool> = ids.iter().map(|id| id % 2 == 0).collect();

    let kept = network.keep(&Selection::Mask(selection), &FilterParams::default()).unwrap();
    assert_eq!(kept.iter().filter(|&&k| k).count(), network.len());

    let realigned: Vec<f64> = lengths
        .iter()
        .zip(&kept)
        .filter(|(_, k)| **k)
        .map(|(l, _)| *l)
        .collect();
    assert_eq!(realigned, network.lengths(LengthUnits::Base));
}

#[test]
fn queries_are_idempotent_and_copies_independent() {
    init_test_logging();
    let original = comb(16);
    let terminal = original.termini()[0];
    let first = original.ancestors(terminal).unwrap();
    assert_eq!(original.ancestors(terminal).unwrap(), first);

    let mut copy = original.clone();
    copy.remove(&Selection::Ids(vec![terminal]), &FilterParams::default()).unwrap();
    assert_eq!(original.ancestors(terminal).unwrap(), first);
    assert!(original.segment(terminal).is_ok());
    assert!(matches!(copy.segment(terminal), Err(Error::SegmentNotFound(_))));
}

#[test]
fn nested_basins_take_downstream_label() {
    init_test_logging();
    let mut network = comb(12);
    let termini = network.termini();
    assert_eq!(termini.len(), 2);

    let nested = network.is_nested(Some(&termini)).unwrap();
    assert_eq!(nested.iter().filter(|&&n| n).count(), 1);
    let (inner, outer) = if nested[0] {
        (termini[0], termini[1])
    } else {
        (termini[1], termini[0])
    };

    // Every pixel of the inner catchment is labelled with the outer terminal
    let inner_catchment = network.catchment_mask(inner).unwrap();
    let basins = network.basin_raster().unwrap();
    for (pixel, &inside) in inner_catchment.data().indexed_iter() {
        if inside == 1 {
            assert_eq!(basins.data()[pixel], outer);
        }
    }
    assert!(basins.data().iter().all(|&label| label != inner));
}

#[test]
fn parallel_basins_match_sequential() {
    init_test_logging();
    let mut sequential = comb(32);
    let mut parallel = sequential.clone();
    sequential.locate_basins(&BasinParams::default()).unwrap();
    parallel
        .locate_basins(&BasinParams {
            mode: ProcessingMode::ParallelWith(3),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(sequential.basins().unwrap().data(), parallel.basins().unwrap().data());
}

#[test]
fn single_nan_poisons_mean_but_not_nanmean() {
    init_test_logging();
    let network = y_network();
    let mut values = Raster::filled(3, 3, 2.0_f64);
    values.set(1, 1, 100.0).unwrap();
    values.set(0, 2, f64::NAN).unwrap();

    let mean = network.catchment_summary(Statistic::Mean, &values, None, true).unwrap();
    assert!(mean[0].is_nan());
    let nanmean = network
        .catchment_summary("nanmean".parse().unwrap(), &values, None, true)
        .unwrap();
    assert!((nanmean[0] - 2.0).abs() < 1e-12);

    let slow = network
        .catchment_summary(Statistic::NanPercentile(50.0), &values, None, true)
        .unwrap();
    assert!((slow[0] - 2.0).abs() < 1e-12);
}

#[test]
fn export_round_trips_through_geojson() {
    init_test_logging();
    let mut network = comb(12);
    let slopes = vec![0.25; network.len()];
    let segments = network.segment_features(&[("slope", slopes)]).unwrap();
    let basins = network.basin_features(&[]).unwrap();

    let text = segments.to_geojson_string();
    let parsed: geojson::GeoJson = text.parse().unwrap();
    match parsed {
        geojson::GeoJson::FeatureCollection(fc) => assert_eq!(fc.features.len(), network.len()),
        other => panic!("expected a feature collection, got {:?}", other),
    }
    assert_eq!(basins.len(), network.termini().len());
}

#[test]
fn max_length_pieces_are_fewest_that_fit() {
    init_test_logging();
    for (name, flow, path) in stream_paths() {
        let whole = path_network(&flow, &path, None);
        assert_eq!(whole.len(), 1, "{} is a single stream", name);

        // Step lengths along the unsplit polyline; an outlet draining off
        // the grid adds no final step
        let line = whole.geometry(1).unwrap();
        let mut steps: Vec<f64> = line
            .0
            .windows(2)
            .map(|w| (w[1].x - w[0].x).hypot(w[1].y - w[0].y))
            .collect();
        steps.resize(path.len(), 0.0);

        for max_length in [1.5, 2.0, 2.9, 3.5, 7.0] {
            let network = path_network(&flow, &path, Some(max_length));
            for (segment, length) in network.segments().iter().zip(network.lengths(LengthUnits::Base)) {
                assert!(
                    length <= max_length + 1e-9,
                    "{}: segment {} is {} long with max_length {}",
                    name,
                    segment.id(),
                    length,
                    max_length
                );
            }
            assert_eq!(
                network.len(),
                fewest_pieces(&steps, max_length),
                "{}: piece count with max_length {}",
                name,
                max_length
            );

            let pixels: Vec<(usize, usize)> = network
                .segments()
                .iter()
                .flat_map(|s| s.pixels().iter().copied())
                .collect();
            assert_eq!(pixels, path, "{}: pieces must cover the stream in order", name);
        }
    }
}
