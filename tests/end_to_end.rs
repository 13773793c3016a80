use std::fs;
use std::path::{Path, PathBuf};

use lcindex::Error;
use lcindex::crossmatch::{match_candidates, resolve_source};
use lcindex::geom::sphere::arcsec_to_deg;
use lcindex::index::{
    BuildOptions, BuildOutcome, FieldCalibration, IndexPaths, SeamShift, build_index,
};
use lcindex::lightcurve::{DEFAULT_QUALITY_THRESHOLD, ReadOptions};
use lcindex::reader::{CatalogSelection, Reader};
use lcindex::record::Band;
use lcindex::scanner::scan_file;

/// A field with interleaved bands and partitions and a few epochs each.
fn mixed_field(dir: &Path) -> PathBuf {
    let mut body = String::new();
    let mut id = 1000;
    for i in 0..24 {
        let band = 1 + i % 3;
        let partition = (i * 7) % 5;
        let ra = 120.0 + 0.01 * i as f64;
        let dec = 30.0 + 0.005 * i as f64;
        let epochs = i % 4;
        body.push_str(&format!("# {id} {epochs} {band} 512 {partition} {ra} {dec}\n"));
        for e in 0..epochs {
            body.push_str(&format!("{} {} 0.02 0.03 {}\n", 58000.0 + e as f64, 18.0 + 0.1 * e as f64, e * 1000));
        }
        id += 1;
    }
    let raw = dir.join("field000512_ra119.5to121.0_dec29.5to31.0.txt");
    fs::write(&raw, body).unwrap();
    raw
}

#[test]
fn every_scanned_record_reads_back_at_its_offset() {
    let dir = tempfile::tempdir().unwrap();
    let raw = mixed_field(dir.path());
    build_index(&raw, &BuildOptions::default()).unwrap();
    let reader = Reader::open(&raw).unwrap();

    let scanned = scan_file(&raw).unwrap();
    let catalog = reader.catalog_rows(&CatalogSelection::all()).unwrap();
    assert_eq!(scanned.len(), catalog.len());
    for row in &catalog {
        let obj = reader.read(row.byte_offset, &ReadOptions::default()).unwrap();
        assert_eq!(obj.record.id, row.id);
        assert_eq!(obj.record.band, row.band);
        assert_eq!(obj.record.partition_id, row.partition_id);
        assert_eq!(&obj.record, row);
        assert_eq!(reader.indices().identifiers.offset_of(row.id), Some(row.byte_offset));
    }
}

#[test]
fn partition_spans_tile_the_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let raw = mixed_field(dir.path());
    build_index(&raw, &BuildOptions::default()).unwrap();
    let reader = Reader::open(&raw).unwrap();
    let catalog = fs::read_to_string(&reader.paths().catalog).unwrap();
    let header_len = catalog.find('\n').unwrap() as u64 + 1;

    let ranges = reader.indices().ranges.ranges();
    assert_eq!(ranges.first().unwrap().start, header_len);
    assert_eq!(ranges.last().unwrap().end, catalog.len() as u64);
    for pair in ranges.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
    for r in ranges {
        let span = &catalog[r.start as usize..r.end as usize];
        assert!(span.lines().all(|l| {
            let cols: Vec<&str> = l.split(',').collect();
            cols[2] == r.band.filter_id().to_string() && cols[4] == r.partition.to_string()
        }));
    }
}

#[test]
fn rebuild_without_overwrite_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let raw = mixed_field(dir.path());
    build_index(&raw, &BuildOptions::default()).unwrap();
    let paths = IndexPaths::for_raw(&raw);
    let snapshot = |p: &IndexPaths| -> Vec<Vec<u8>> {
        p.artifacts().iter().map(|a| fs::read(a).unwrap()).collect()
    };
    let first = snapshot(&paths);
    assert_eq!(
        build_index(&raw, &BuildOptions::default()).unwrap(),
        BuildOutcome::Skipped
    );
    assert_eq!(snapshot(&paths), first);
}

#[test]
fn quality_threshold_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("field000001_ra0.5to1.5_dec0.5to1.5.txt");
    let t = DEFAULT_QUALITY_THRESHOLD;
    fs::write(
        &raw,
        format!("# 1 2 1 1 0 1.0 1.0\n58001.0 17.0 0.1 0.0 {t}\n58000.0 17.5 0.1 0.0 {}\n", t - 1),
    )
    .unwrap();
    build_index(&raw, &BuildOptions::default()).unwrap();
    let reader = Reader::open(&raw).unwrap();
    let obj = reader.object(1, &ReadOptions::default()).unwrap();
    let lc = obj.lightcurve().unwrap();
    assert_eq!(lc.times(), &[58000.0]);
    assert_eq!(lc.quality_flags(), &[t - 1]);
}

#[test]
fn three_object_scenario_resolves_one_pair_and_one_singleton() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("field000300_ra44.5to45.5_dec9.5to10.5.txt");
    let dec: f64 = 10.0;
    let per_arcsec_ra = arcsec_to_deg(1.0) / dec.to_radians().cos();
    let r1 = 45.0;
    let r2 = r1 + 10.0 * per_arcsec_ra;
    let g = r1 + 1.0 * per_arcsec_ra;
    fs::write(
        &raw,
        format!(
            "# 1 0 1 300 12 {g} {dec}\n# 2 0 2 300 12 {r1} {dec}\n# 3 0 2 300 12 {r2} {dec}\n"
        ),
    )
    .unwrap();
    build_index(&raw, &BuildOptions::default()).unwrap();
    let reader = Reader::open(&raw).unwrap();

    let from_g = resolve_source(&reader, &reader.record(1).unwrap(), 2.0).unwrap();
    assert!(from_g.warnings.is_empty());
    assert_eq!(from_g.source.len(), 2);
    assert_eq!(from_g.source.member(Band::G).unwrap().id, 1);
    assert_eq!(from_g.source.member(Band::R).unwrap().id, 2);

    let from_r1 = resolve_source(&reader, &reader.record(2).unwrap(), 2.0).unwrap();
    assert_eq!(from_r1.source, from_g.source);

    let from_r2 = resolve_source(&reader, &reader.record(3).unwrap(), 2.0).unwrap();
    assert_eq!(from_r2.source.len(), 1);
    assert_eq!(from_r2.source.member(Band::R).unwrap().id, 3);
    assert_eq!((from_r2.source.ra, from_r2.source.dec), (r2, dec));
}

#[test]
fn matches_are_symmetric_between_bands() {
    let dir = tempfile::tempdir().unwrap();
    let raw = mixed_field(dir.path());
    build_index(&raw, &BuildOptions::default()).unwrap();
    let reader = Reader::open(&raw).unwrap();
    // A wide radius so that neighbouring objects do match.
    let radius = 60.0;
    for a in reader.catalog_rows(&CatalogSelection::all()).unwrap() {
        for band in a.band.others() {
            for hit in match_candidates(&reader, &a, band, radius) {
                let b = reader.record(hit.id).unwrap();
                let back = match_candidates(&reader, &b, a.band, radius);
                assert!(
                    back.iter().any(|n| n.id == a.id),
                    "{} finds {} but not the reverse",
                    a.id,
                    b.id
                );
            }
        }
    }
}

#[test]
fn seam_partition_is_searchable_across_zero() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("field000001_ra359.0to1.0_dec-1.0to1.0.txt");
    fs::write(&raw, "# 1 0 2 1 9 359.9 0.0\n# 2 0 2 1 9 0.1 0.0\n").unwrap();
    let radius_arcsec = 600.0;

    build_index(&raw, &BuildOptions::default()).unwrap();
    let reader = Reader::open(&raw).unwrap();
    assert_eq!(
        reader.indices().spatial.get(Band::R, 9).unwrap().shift,
        SeamShift::SubtractAbove180
    );
    let ids: Vec<u64> = reader
        .locate_objects(0.05, 0.0, radius_arcsec)
        .unwrap()
        .iter()
        .map(|o| o.record.id)
        .collect();
    assert_eq!(ids, vec![2, 1]);

    let unshifted = BuildOptions {
        overwrite: true,
        calibration: FieldCalibration::new().with(9, SeamShift::None),
    };
    build_index(&raw, &unshifted).unwrap();
    let reader = Reader::open(&raw).unwrap();
    let ids: Vec<u64> = reader
        .locate_objects(0.05, 0.0, radius_arcsec)
        .unwrap()
        .iter()
        .map(|o| o.record.id)
        .collect();
    assert_eq!(ids, vec![2]);
}

#[test]
fn bands_on_opposite_sides_of_the_seam_resolve_together() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("field000001_ra359.0to1.0_dec-1.0to1.0.txt");
    fs::write(&raw, "# 1 0 1 1 5 359.99995 0.0\n# 2 0 2 1 5 0.00005 0.0\n").unwrap();
    build_index(&raw, &BuildOptions::default()).unwrap();
    let reader = Reader::open(&raw).unwrap();

    let g = reader.indices().spatial.get(Band::G, 5).unwrap().shift;
    let r = reader.indices().spatial.get(Band::R, 5).unwrap().shift;
    assert_eq!(g, r);
    assert_ne!(g, SeamShift::None);

    let from_g = resolve_source(&reader, &reader.record(1).unwrap(), 2.0).unwrap();
    assert_eq!(from_g.source.len(), 2);
    assert_eq!(from_g.source.member(Band::R).unwrap().id, 2);
    let from_r = resolve_source(&reader, &reader.record(2).unwrap(), 2.0).unwrap();
    assert_eq!(from_r.source.len(), 2);
    assert_eq!(from_r.source.member(Band::G).unwrap().id, 1);

    let mut ids: Vec<u64> = reader
        .locate_objects(0.0, 0.0, 2.0)
        .unwrap()
        .iter()
        .map(|o| o.record.id)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn missing_index_names_artifact_and_remedy() {
    let dir = tempfile::tempdir().unwrap();
    let raw = mixed_field(dir.path());
    match Reader::open(&raw) {
        Err(Error::MissingIndex {
            artifact,
            remediation,
        }) => {
            assert!(artifact.to_string_lossy().ends_with(".objects"));
            assert_eq!(
                remediation,
                format!("lcindex build {}", dir.path().display())
            );
        }
        other => panic!("expected a missing index, got {other:?}"),
    }
    assert!(!IndexPaths::for_raw(&raw).catalog.exists());
}
