//! Loader for regridded echogram cubes stored as Zarr v2 groups.
//!
//! The group is expected to hold the backscatter variable (usually `Sv`)
//! plus xarray coordinate arrays named after its dimensions: `channel`,
//! `ping_time` and the vertical axis (`depth`, or `echo_range` in stores
//! written before depth conversion).

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use ndarray::{ArrayD, Ix3};

use crate::constants::{ALTERNATE_VERTICAL_DIM, CHANNEL_DIM, TIME_DIM, VERTICAL_DIM};
use crate::data::EchogramData;
use crate::data::loader::{DatasetLoader, LoaderError};
use crate::data::zarr::{ZarrArray, ZarrGroup};

/// Loader for Zarr v2 directory stores.
///
/// The vertical dimension is canonicalised to `depth`: a variable laid out
/// on `echo_range` is read as if the dimension were named `depth`, taking
/// its coordinates from a 1-d `depth` array when the store has one and from
/// `echo_range` otherwise. Depth values keep their stored order.
pub struct ZarrLoader;

impl ZarrLoader {
    fn read_channels(group: &ZarrGroup, count: usize) -> Result<Vec<String>, LoaderError> {
        if !group.has_array(CHANNEL_DIM) {
            log::warn!("ZarrLoader: no '{}' coordinate, numbering channels", CHANNEL_DIM);
            return Ok((0..count).map(|i| format!("channel {}", i)).collect());
        }
        let names = group.array(CHANNEL_DIM)?.read_strings()?;
        check_len(CHANNEL_DIM, names.len(), count)?;
        Ok(names)
    }

    fn read_ping_times(group: &ZarrGroup, count: usize) -> Result<Vec<NaiveDateTime>, LoaderError> {
        let array = group.array(TIME_DIM)?;
        let raw = read_1d(&array, TIME_DIM)?;
        check_len(TIME_DIM, raw.len(), count)?;
        decode_cf_time(&raw, array.attr_str("units"))
    }

    /// Depth coordinates for the variable's vertical dimension `dim`.
    fn read_depths(group: &ZarrGroup, dim: &str, count: usize) -> Result<Vec<f64>, LoaderError> {
        let name = if dim == ALTERNATE_VERTICAL_DIM && group.has_array(VERTICAL_DIM) {
            let depth = group.array(VERTICAL_DIM)?;
            if depth.shape() == [count] {
                log::debug!(
                    "ZarrLoader: dropping '{}' in favour of '{}'",
                    ALTERNATE_VERTICAL_DIM,
                    VERTICAL_DIM
                );
                VERTICAL_DIM
            } else {
                dim
            }
        } else {
            dim
        };

        let depths = read_1d(&group.array(name)?, name)?;
        check_len(name, depths.len(), count)?;
        Ok(depths)
    }
}

impl DatasetLoader for ZarrLoader {
    fn id(&self) -> &'static str {
        "zarr"
    }

    fn display_name(&self) -> &'static str {
        "Zarr v2 store"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["zarr"]
    }

    fn can_load(&self, path: &Path) -> bool {
        path.join(".zgroup").is_file()
    }

    fn open(&self, path: &Path, variable: &str) -> Result<EchogramData, LoaderError> {
        let group = ZarrGroup::open(path)?;
        if !group.has_array(variable) {
            return Err(LoaderError::new(format!(
                "{:?} has no variable '{}'",
                path, variable
            )));
        }

        let array = group.array(variable)?;
        let dims = canonical_dimensions(&array.dimensions()?);
        log::debug!("ZarrLoader: '{}' dimensions {:?}", variable, dims);

        let order = axis_order(&dims)?;
        let shape = array.shape();
        let vertical_dim = array.dimensions()?[order[2]].clone();

        let channels = Self::read_channels(&group, shape[order[0]])?;
        let ping_time = Self::read_ping_times(&group, shape[order[1]])?;
        let depth = Self::read_depths(&group, &vertical_dim, shape[order[2]])?;

        let values = array
            .read_f64()?
            .permuted_axes(order.to_vec())
            .mapv(|v| v as f32)
            .into_dimensionality::<Ix3>()
            .map_err(|e| LoaderError::new(format!("'{}': {}", variable, e)))?;

        let data = EchogramData::new(variable, channels, ping_time, depth, values)
            .map_err(LoaderError::new)?;
        log::info!("ZarrLoader: loaded {:?}: {}", path, data.summary());
        Ok(data)
    }
}

/// Rename the alternate vertical dimension to the canonical one.
fn canonical_dimensions(dims: &[String]) -> Vec<String> {
    let has_depth = dims.iter().any(|d| d == VERTICAL_DIM);
    dims.iter()
        .map(|d| {
            if d == ALTERNATE_VERTICAL_DIM && !has_depth {
                VERTICAL_DIM.to_string()
            } else {
                d.clone()
            }
        })
        .collect()
}

/// Positions of the channel, time and depth dimensions in the stored layout.
fn axis_order(dims: &[String]) -> Result<[usize; 3], LoaderError> {
    if dims.len() != 3 {
        return Err(LoaderError::new(format!(
            "expected a 3-d variable over ({}, {}, {}), found dimensions {:?}",
            CHANNEL_DIM, TIME_DIM, VERTICAL_DIM, dims
        )));
    }
    let find = |name: &str| {
        dims.iter().position(|d| d == name).ok_or_else(|| {
            LoaderError::new(format!("missing '{}' dimension in {:?}", name, dims))
        })
    };
    Ok([find(CHANNEL_DIM)?, find(TIME_DIM)?, find(VERTICAL_DIM)?])
}

fn read_1d(array: &ZarrArray, name: &str) -> Result<Vec<f64>, LoaderError> {
    let values: ArrayD<f64> = array.read_f64()?;
    if values.ndim() != 1 {
        return Err(LoaderError::new(format!(
            "coordinate '{}' is {}-d, expected 1-d",
            name,
            values.ndim()
        )));
    }
    Ok(values.into_iter().collect())
}

fn check_len(name: &str, found: usize, expected: usize) -> Result<(), LoaderError> {
    if found == expected {
        Ok(())
    } else {
        Err(LoaderError::new(format!(
            "coordinate '{}' has {} values, variable has {}",
            name, found, expected
        )))
    }
}

/// Decode CF-convention time values (`<unit> since <timestamp>`).
///
/// Without a `units` attribute the values are taken as nanoseconds since the
/// Unix epoch, which is how xarray stores `datetime64[ns]` by default.
pub fn decode_cf_time(values: &[f64], units: Option<&str>) -> Result<Vec<NaiveDateTime>, LoaderError> {
    let (nanos_per_unit, epoch) = match units {
        Some(units) => parse_cf_units(units)?,
        None => (1.0, DateTime::<Utc>::UNIX_EPOCH.naive_utc()),
    };

    values
        .iter()
        .map(|&value| {
            let nanos = value * nanos_per_unit;
            if !nanos.is_finite() || nanos.abs() >= i64::MAX as f64 {
                return Err(LoaderError::new(format!("time value {} out of range", value)));
            }
            epoch
                .checked_add_signed(TimeDelta::nanoseconds(nanos.round() as i64))
                .ok_or_else(|| LoaderError::new(format!("time value {} out of range", value)))
        })
        .collect()
}

fn parse_cf_units(units: &str) -> Result<(f64, NaiveDateTime), LoaderError> {
    let invalid = || LoaderError::new(format!("unsupported time units '{}'", units));
    let (unit, reference) = units.split_once(" since ").ok_or_else(invalid)?;

    let nanos_per_unit = match unit.trim().to_lowercase().as_str() {
        "days" | "day" | "d" => 86_400e9,
        "hours" | "hour" | "h" => 3_600e9,
        "minutes" | "minute" | "min" => 60e9,
        "seconds" | "second" | "s" | "sec" => 1e9,
        "milliseconds" | "millisecond" | "ms" => 1e6,
        "microseconds" | "microsecond" | "us" => 1e3,
        "nanoseconds" | "nanosecond" | "ns" => 1.0,
        _ => return Err(invalid()),
    };

    let epoch = parse_reference_time(reference.trim()).ok_or_else(invalid)?;
    Ok((nanos_per_unit, epoch))
}

fn parse_reference_time(reference: &str) -> Option<NaiveDateTime> {
    let reference = reference
        .trim_end_matches('Z')
        .trim_end_matches(" UTC")
        .trim_end_matches("+00:00")
        .trim();

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(time) = NaiveDateTime::parse_from_str(reference, format) {
            return Some(time);
        }
    }
    NaiveDate::parse_from_str(reference, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_data::zarr::{ArraySpec, EchogramStore};
    use chrono::Timelike;

    #[test]
    fn test_decode_cf_seconds() {
        let times = decode_cf_time(&[0.0, 90.5], Some("seconds since 2019-07-02 03:00:00")).unwrap();
        assert_eq!(times[0].hour(), 3);
        assert_eq!(times[1].minute(), 1);
        assert_eq!(times[1].second(), 30);
        assert_eq!(times[1].nanosecond(), 500_000_000);
    }

    #[test]
    fn test_decode_cf_days_date_only() {
        let times = decode_cf_time(&[1.0], Some("days since 2023-09-01")).unwrap();
        assert_eq!(
            times[0],
            NaiveDate::from_ymd_opt(2023, 9, 2).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_decode_default_nanoseconds() {
        let times = decode_cf_time(&[1_000_000_000.0], None).unwrap();
        assert_eq!(
            times[0],
            NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_hms_opt(0, 0, 1).unwrap()
        );
    }

    #[test]
    fn test_decode_rejects_bad_units() {
        assert!(decode_cf_time(&[1.0], Some("fortnights since 2019-01-01")).is_err());
        assert!(decode_cf_time(&[1.0], Some("seconds")).is_err());
        assert!(decode_cf_time(&[f64::NAN], Some("seconds since 2019-01-01")).is_err());
    }

    #[test]
    fn test_canonical_dimensions() {
        let dims = ["channel", "ping_time", "echo_range"].map(String::from);
        assert_eq!(canonical_dimensions(&dims), vec!["channel", "ping_time", "depth"]);

        let dims = ["channel", "ping_time", "depth"].map(String::from);
        assert_eq!(canonical_dimensions(&dims), dims.to_vec());
    }

    #[test]
    fn test_axis_order_any_permutation() {
        let dims = ["ping_time", "depth", "channel"].map(String::from);
        assert_eq!(axis_order(&dims).unwrap(), [2, 0, 1]);
        let dims = ["ping_time", "depth"].map(String::from);
        assert!(axis_order(&dims).is_err());
    }

    #[test]
    fn test_open_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = EchogramStore::new(3, 4, 5).write(&dir.path().join("x0001.zarr"));

        let data = ZarrLoader.open(&store, "Sv").unwrap();
        assert_eq!(data.values.dim(), (3, 4, 5));
        assert_eq!(data.channels[2], "GPT 120 kHz");
        assert_eq!(data.depth[0], 0.5);
        assert_eq!(data.values[[1, 2, 3]], EchogramStore::value_at(1, 2, 3));
        assert!(data.ping_time[1] > data.ping_time[0]);
    }

    #[test]
    fn test_open_echo_range_transposed() {
        let dir = tempfile::tempdir().unwrap();
        let store = EchogramStore::new(3, 4, 5)
            .vertical_name("echo_range")
            .time_first()
            .write(&dir.path().join("x0002.zarr"));

        let data = ZarrLoader.open(&store, "Sv").unwrap();
        assert_eq!(data.values.dim(), (3, 4, 5));
        assert_eq!(data.values[[2, 1, 4]], EchogramStore::value_at(2, 1, 4));
        assert_eq!(data.depth.len(), 5);
    }

    #[test]
    fn test_open_blosc_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = EchogramStore::new(4, 40, 30)
            .blosc()
            .write(&dir.path().join("x0003.zarr"));

        let data = ZarrLoader.open(&store, "Sv").unwrap();
        assert_eq!(data.values.dim(), (4, 40, 30));
        assert_eq!(data.channels[3], "GPT 200 kHz");
        assert_eq!(data.depth[29], EchogramStore::depth_at(29));
        assert_eq!(data.values[[3, 39, 29]], EchogramStore::value_at(3, 39, 29));
        assert_eq!(data.values[[0, 21, 14]], EchogramStore::value_at(0, 21, 14));
    }

    #[test]
    fn test_missing_variable() {
        let dir = tempfile::tempdir().unwrap();
        let store = EchogramStore::new(3, 2, 2).write(&dir.path().join("x.zarr"));
        let err = ZarrLoader.open(&store, "MVBS").unwrap_err();
        assert!(err.to_string().contains("MVBS"));
    }

    #[test]
    fn test_can_load_checks_group_marker() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!ZarrLoader.can_load(dir.path()));
        crate::test_data::zarr::write_group(dir.path(), &[ArraySpec::unicode("channel", &["a"])]);
        assert!(ZarrLoader.can_load(dir.path()));
    }
}
