//! Echoview `.evr` text builder for tests.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::model::Vertex;

/// Time of the synthetic ping at `seconds` after 2019-07-02 03:00:00.
pub fn ping(seconds: f64) -> NaiveDateTime {
    let base = NaiveDate::from_ymd_opt(2019, 7, 2)
        .unwrap()
        .and_hms_opt(3, 0, 0)
        .unwrap();
    base + TimeDelta::milliseconds((seconds * 1000.0).round() as i64)
}

/// Format a time as EVR `YYYYMMDD HHMMSSffff`.
pub fn evr_time(time: NaiveDateTime) -> String {
    let tenths_of_ms = time.and_utc().timestamp_subsec_micros() / 100;
    format!("{} {:04}", time.format("%Y%m%d %H%M%S"), tenths_of_ms)
}

/// One region block.
pub struct EvrRegion {
    pub id: u32,
    pub class: String,
    pub vertices: Vec<Vertex>,
    pub notes: Vec<String>,
}

impl EvrRegion {
    pub fn new(id: u32, class: &str, points: &[(f64, f64)]) -> Self {
        Self {
            id,
            class: class.to_string(),
            vertices: points.iter().map(|&(s, d)| Vertex::new(ping(s), d)).collect(),
            notes: Vec::new(),
        }
    }

    pub fn note(mut self, note: &str) -> Self {
        self.notes.push(note.to_string());
        self
    }

    fn render(&self, out: &mut String) {
        let left = self.vertices.iter().map(|v| v.time).min();
        let right = self.vertices.iter().map(|v| v.time).max();
        let top = self.vertices.iter().map(|v| v.depth).fold(f64::INFINITY, f64::min);
        let bottom = self.vertices.iter().map(|v| v.depth).fold(f64::NEG_INFINITY, f64::max);

        out.push('\n');
        match (left, right) {
            (Some(left), Some(right)) => out.push_str(&format!(
                "13 {} {} 0 3 -1 1 {} {} {} {}\n",
                self.vertices.len(),
                self.id,
                evr_time(left),
                top,
                evr_time(right),
                bottom
            )),
            _ => out.push_str(&format!("13 0 {} 0 3 -1 0\n", self.id)),
        }
        out.push_str(&format!("{}\n", self.notes.len()));
        for note in &self.notes {
            out.push_str(note);
            out.push('\n');
        }
        out.push_str("0\n");
        out.push_str(&self.class);
        out.push('\n');
        let points: Vec<String> = self
            .vertices
            .iter()
            .map(|v| format!("{} {}", evr_time(v.time), v.depth))
            .collect();
        out.push_str(&points.join(" "));
        out.push_str(" 1\n");
        out.push_str(&format!("Region {}\n", self.id));
    }
}

/// Render a complete `.evr` file.
pub fn evr_file(regions: &[EvrRegion]) -> String {
    let mut out = format!("EVRG 7 13.0.378.44817\n{}\n", regions.len());
    for region in regions {
        region.render(&mut out);
    }
    out
}
