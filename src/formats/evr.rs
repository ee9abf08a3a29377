//! Echoview region definition (`.evr`) format.
//!
//! An EVR file is line oriented:
//!
//! ```text
//! EVRG 7 13.0.378.44817
//! 2
//!
//! 13 4 1 0 3 -1 1 20190702 0356491275 9.24 20190702 0357083675 33.18
//! 0
//! 0
//! Hake
//! 20190702 0356491275 9.24 20190702 0357083675 9.24 ... 1
//! Region 1
//!
//! 13 ...
//! ```
//!
//! After the `EVRG` header and the region count, each region is a blank
//! separator line, a header line (structure version, point count, region id,
//! selection flag, creation type, a dummy field, a bounding-box flag and
//! optionally the bounding box), a counted block of note lines, a counted
//! block of detection setting lines, the class name, one line of
//! `date time depth` triples followed by the region type code, and the
//! region name.
//!
//! Timestamps are `YYYYMMDD` plus `HHMMSSffff`, where `ffff` is in units of
//! 0.1 ms.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::{FormatError, RegionFormat};
use crate::model::{Region, RegionBounds, RegionType, Vertex};

/// Magic word on the first line.
const EVR_MAGIC: &str = "EVRG";

/// Header fields before the optional bounding box.
const HEADER_MIN_FIELDS: usize = 7;

/// Header fields when the bounding box is present.
const HEADER_BBOX_FIELDS: usize = 13;

/// Echoview region file format.
pub struct EvrFormat;

impl RegionFormat for EvrFormat {
    fn id(&self) -> &'static str {
        "evr"
    }

    fn display_name(&self) -> &'static str {
        "Echoview Regions (EVR)"
    }

    fn extensions(&self) -> &[&'static str] {
        &["evr"]
    }

    fn parse(&self, content: &str) -> Result<Vec<Region>, FormatError> {
        let mut reader = LineReader::new(content);

        let (line_no, header) = reader.next_line("EVRG header")?;
        let mut tokens = header.split_whitespace();
        if tokens.next() != Some(EVR_MAGIC) {
            return Err(FormatError::invalid_format(
                line_no,
                format!("expected '{}' file header", EVR_MAGIC),
            ));
        }
        let file_version = tokens.next().unwrap_or("?");
        log::debug!("EVR file format version {}", file_version);

        // The count is untrusted; regions are only allocated as they parse.
        let region_count: usize = reader.next_number("region count")?;
        let mut regions = Vec::new();

        for index in 0..region_count {
            let region = parse_region(&mut reader).map_err(|e| match e {
                FormatError::UnexpectedEof { expected } => FormatError::unexpected_eof(format!(
                    "{} of region {} of {}",
                    expected,
                    index + 1,
                    region_count
                )),
                other => other,
            })?;
            regions.push(region);
        }

        Ok(regions)
    }
}

/// Parse one region block, starting at its blank separator line(s).
fn parse_region(reader: &mut LineReader<'_>) -> Result<Region, FormatError> {
    let (header_line, header) = reader.next_non_empty("region header")?;
    let fields: Vec<&str> = header.split_whitespace().collect();
    if fields.len() < HEADER_MIN_FIELDS {
        return Err(FormatError::invalid_format(
            header_line,
            format!(
                "region header has {} fields, expected at least {}",
                fields.len(),
                HEADER_MIN_FIELDS
            ),
        ));
    }

    let point_count: usize = parse_field(fields[1], header_line, "point count")?;
    let id: u32 = parse_field(fields[2], header_line, "region id")?;
    let bbox_calculated: i32 = parse_field(fields[6], header_line, "bounding box flag")?;
    let bounds = if bbox_calculated == 1 && fields.len() >= HEADER_BBOX_FIELDS {
        Some(RegionBounds {
            left: parse_timestamp(fields[7], fields[8], header_line)?,
            top: parse_field(fields[9], header_line, "bounding box top")?,
            right: parse_timestamp(fields[10], fields[11], header_line)?,
            bottom: parse_field(fields[12], header_line, "bounding box bottom")?,
        })
    } else {
        None
    };

    let note_count: usize = reader.next_number("note line count")?;
    let notes = reader.take_lines(note_count, "note line")?;

    let setting_count: usize = reader.next_number("detection setting line count")?;
    let detection_settings = reader.take_lines(setting_count, "detection setting line")?;

    let (_, class) = reader.next_line("region class")?;
    let class = class.to_string();

    let (points_line, points) = reader.next_line("region points")?;
    let (vertices, region_type) = parse_points(points, point_count, points_line)?;

    let name = reader
        .next_line("region name")
        .map(|(_, name)| name.to_string())?;

    Ok(Region {
        id,
        class,
        name,
        region_type,
        notes,
        detection_settings,
        bounds,
        vertices,
    })
}

/// Parse the `date time depth` triples and the trailing region type code.
fn parse_points(
    line: &str,
    point_count: usize,
    line_no: usize,
) -> Result<(Vec<Vertex>, RegionType), FormatError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let coord_tokens = point_count.checked_mul(3).ok_or_else(|| {
        FormatError::invalid_format(line_no, format!("point count {} is too large", point_count))
    })?;

    let region_type = if tokens.len() == coord_tokens + 1 {
        RegionType::from(parse_field::<i32>(tokens[coord_tokens], line_no, "region type")?)
    } else if tokens.len() == coord_tokens {
        log::debug!("Line {}: region type missing, assuming analysis", line_no);
        RegionType::Analysis
    } else {
        return Err(FormatError::invalid_format(
            line_no,
            format!(
                "expected {} points ({} values plus region type), found {} values",
                point_count,
                coord_tokens,
                tokens.len()
            ),
        ));
    };

    let vertices = tokens[..coord_tokens]
        .chunks_exact(3)
        .map(|triple| {
            Ok(Vertex::new(
                parse_timestamp(triple[0], triple[1], line_no)?,
                parse_field(triple[2], line_no, "depth")?,
            ))
        })
        .collect::<Result<Vec<_>, FormatError>>()?;

    Ok((vertices, region_type))
}

/// Parse an EVR `YYYYMMDD HHMMSSffff` timestamp.
pub fn parse_timestamp(date: &str, time: &str, line: usize) -> Result<NaiveDateTime, FormatError> {
    let invalid = || FormatError::InvalidTimestamp {
        value: format!("{} {}", date, time),
        line,
    };

    let date = NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| invalid())?;

    if time.len() < 6 || !time.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let (hms, fraction) = time.split_at(6);
    let hour: u32 = hms[0..2].parse().map_err(|_| invalid())?;
    let minute: u32 = hms[2..4].parse().map_err(|_| invalid())?;
    let second: u32 = hms[4..6].parse().map_err(|_| invalid())?;

    // Fraction digits are decimal places of a second; keep microsecond precision.
    let mut micros = 0u32;
    for (i, digit) in fraction.bytes().take(6).enumerate() {
        micros += u32::from(digit - b'0') * 10u32.pow(5 - i as u32);
    }

    let time = NaiveTime::from_hms_micro_opt(hour, minute, second, micros).ok_or_else(invalid)?;
    Ok(NaiveDateTime::new(date, time))
}

fn parse_field<T: std::str::FromStr>(
    value: &str,
    line: usize,
    what: &str,
) -> Result<T, FormatError> {
    value
        .parse()
        .map_err(|_| FormatError::invalid_format(line, format!("invalid {} '{}'", what, value)))
}

/// Line cursor that tracks 1-based line numbers for error messages.
struct LineReader<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> LineReader<'a> {
    fn new(content: &'a str) -> Self {
        // Tolerate a UTF-8 byte order mark written by some Windows tools
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        Self {
            lines: content.lines().enumerate(),
        }
    }

    fn next_line(&mut self, expected: &str) -> Result<(usize, &'a str), FormatError> {
        self.lines
            .next()
            .map(|(i, line)| (i + 1, line.trim()))
            .ok_or_else(|| FormatError::unexpected_eof(expected))
    }

    fn next_non_empty(&mut self, expected: &str) -> Result<(usize, &'a str), FormatError> {
        loop {
            let (line_no, line) = self.next_line(expected)?;
            if !line.is_empty() {
                return Ok((line_no, line));
            }
        }
    }

    fn next_number<T: std::str::FromStr>(&mut self, expected: &str) -> Result<T, FormatError> {
        let (line_no, line) = self.next_non_empty(expected)?;
        parse_field(line, line_no, expected)
    }

    fn take_lines(&mut self, count: usize, expected: &str) -> Result<Vec<String>, FormatError> {
        (0..count)
            .map(|_| self.next_line(expected).map(|(_, line)| line.to_string()))
            .collect()
    }
}
