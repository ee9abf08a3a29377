//! Tests for the EVR format.

use chrono::{NaiveDate, Timelike};

use crate::formats::{EvrFormat, FormatError, RegionFormat};
use crate::model::RegionType;
use crate::test_data::evr::{EvrRegion, evr_file, ping};

/// Two regions as Echoview writes them, including notes and detection settings.
const TWO_REGIONS: &str = "EVRG 7 13.0.378.44817
2

13 4 1 0 3 -1 1 20190702 0356491275  9.2400000000 20190702 0357083675  33.1800000000
2
Edited by labeler
second note line
1
threshold -66
Age-1 Hake
20190702 0356491275 9.24 20190702 0357083675 9.24 20190702 0357083675 33.18 20190702 0356491275 33.18 1
Region 1

13 2 7 0 2 -1 0
0
0
Unclassified regions
20190702 0358000000 12.5 20190702 0359000000 14.0 2
Marker 7
";

#[test]
fn test_evr_format_metadata() {
    let format = EvrFormat;

    assert_eq!(format.id(), "evr");
    assert_eq!(format.display_name(), "Echoview Regions (EVR)");
    assert!(format.extensions().contains(&"evr"));
}

#[test]
fn test_parse_two_regions() {
    let regions = EvrFormat.parse(TWO_REGIONS).unwrap();
    assert_eq!(regions.len(), 2);

    let first = &regions[0];
    assert_eq!(first.id, 1);
    assert_eq!(first.class, "Age-1 Hake");
    assert_eq!(first.name, "Region 1");
    assert_eq!(first.region_type, RegionType::Analysis);
    assert_eq!(first.notes, vec!["Edited by labeler", "second note line"]);
    assert_eq!(first.detection_settings, vec!["threshold -66"]);
    assert_eq!(first.vertices.len(), 4);
    assert_eq!(first.vertices[2].depth, 33.18);

    let bounds = first.bounds.unwrap();
    assert_eq!(bounds.top, 9.24);
    assert_eq!(bounds.bottom, 33.18);
    assert_eq!(bounds.left.date(), NaiveDate::from_ymd_opt(2019, 7, 2).unwrap());
    assert_eq!(bounds.right.second(), 8);

    let second = &regions[1];
    assert_eq!(second.id, 7);
    assert!(second.bounds.is_none());
    assert_eq!(second.region_type, RegionType::Marker);
    assert_eq!(second.vertices.len(), 2);
    assert_eq!(second.name, "Marker 7");
}

#[test]
fn test_parse_keeps_open_rings_open() {
    // Closing rings is the overlay builder's job, not the parser's
    let regions = EvrFormat.parse(TWO_REGIONS).unwrap();
    assert!(!regions[0].is_closed());
}

#[test]
fn test_parse_generated_file() {
    let content = evr_file(&[
        EvrRegion::new(3, "Hake", &[(1.0, 5.0), (2.5, 5.0), (2.5, 9.0)]).note("auto"),
        EvrRegion::new(4, "Hake Mix", &[(4.0, 2.0), (6.0, 3.0)]),
    ]);

    let regions = EvrFormat.parse(&content).unwrap();
    assert_eq!(regions.len(), 2);
    assert_eq!(regions[0].notes, vec!["auto"]);
    assert_eq!(regions[0].vertices[1].time, ping(2.5));
    assert_eq!(regions[1].class, "Hake Mix");
    assert_eq!(regions[1].vertices[1].depth, 3.0);
}

#[test]
fn test_parse_empty_region_list() {
    let regions = EvrFormat.parse("EVRG 7 13.0.378.44817\n0\n").unwrap();
    assert!(regions.is_empty());
}

#[test]
fn test_parse_tolerates_bom_and_crlf() {
    let content = format!("\u{feff}{}", TWO_REGIONS.replace('\n', "\r\n"));
    let regions = EvrFormat.parse(&content).unwrap();
    assert_eq!(regions.len(), 2);
    assert_eq!(regions[1].name, "Marker 7");
}

#[test]
fn test_missing_magic() {
    let result = EvrFormat.parse("EVRX 7\n0\n");
    assert!(matches!(result, Err(FormatError::InvalidFormat { line: 1, .. })));
}

#[test]
fn test_truncated_file() {
    let truncated: String = TWO_REGIONS.lines().take(9).collect::<Vec<_>>().join("\n");
    match EvrFormat.parse(&truncated) {
        Err(FormatError::UnexpectedEof { expected }) => {
            assert!(expected.contains("region 1 of 2"), "{}", expected);
        }
        other => panic!("expected UnexpectedEof, got {:?}", other),
    }
}

#[test]
fn test_bad_point_count() {
    let broken = TWO_REGIONS.replacen("13 4 1", "13 5 1", 1);
    assert!(matches!(
        EvrFormat.parse(&broken),
        Err(FormatError::InvalidFormat { line: 11, .. })
    ));
}

#[test]
fn test_bad_vertex_timestamp() {
    let broken = TWO_REGIONS.replacen("20190702 0358000000", "20191302 0358000000", 1);
    assert!(matches!(
        EvrFormat.parse(&broken),
        Err(FormatError::InvalidTimestamp { line: 18, .. })
    ));
}
