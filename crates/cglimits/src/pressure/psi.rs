//! Pressure stall information file parsing.
//!
//! ```text
//! some avg10=0.22 avg60=0.17 avg300=1.11 total=58761459
//! full avg10=0.00 avg60=0.00 avg300=0.00 total=0
//! ```

use std::path::Path;

use cglimits_common::{LimitsError, LimitsResult};
use serde::Serialize;

/// Rolling averages for one stall class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StallAverages {
    /// Share of time stalled over the last 10 seconds, in percent.
    pub avg10: f64,
    /// Share of time stalled over the last 60 seconds, in percent.
    pub avg60: f64,
    /// Share of time stalled over the last 300 seconds, in percent.
    pub avg300: f64,
    /// Total stall time in microseconds.
    pub total: u64,
}

/// Contents of a `*.pressure` file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PressureStall {
    /// At least one task stalled.
    pub some: StallAverages,
    /// All non-idle tasks stalled at once. Absent for CPU on older kernels.
    pub full: Option<StallAverages>,
}

impl PressureStall {
    /// Parse a pressure file read from `path`.
    ///
    /// A missing `some` line or a malformed field is an error.
    pub fn parse(path: &Path, content: &str) -> LimitsResult<Self> {
        let mut some = None;
        let mut full = None;

        for line in content.lines() {
            let mut fields = line.split_whitespace();
            let slot = match fields.next() {
                Some("some") => &mut some,
                Some("full") => &mut full,
                _ => continue,
            };
            *slot = Some(parse_averages(path, line, fields)?);
        }

        let some = some.ok_or_else(|| LimitsError::parse(path, content.trim()))?;
        Ok(Self { some, full })
    }
}

fn parse_averages<'a>(
    path: &Path,
    line: &str,
    fields: impl Iterator<Item = &'a str>,
) -> LimitsResult<StallAverages> {
    let mut averages = StallAverages::default();
    for field in fields {
        let Some((key, value)) = field.split_once('=') else {
            return Err(LimitsError::parse(path, line));
        };
        let bad = || LimitsError::parse(path, line);
        match key {
            "avg10" => averages.avg10 = value.parse().map_err(|_| bad())?,
            "avg60" => averages.avg60 = value.parse().map_err(|_| bad())?,
            "avg300" => averages.avg300 = value.parse().map_err(|_| bad())?,
            "total" => averages.total = value.parse().map_err(|_| bad())?,
            _ => {}
        }
    }
    Ok(averages)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "/sys/fs/cgroup/memory.pressure";

    #[test]
    fn parse_memory_pressure() {
        let content = "some avg10=1.53 avg60=0.17 avg300=1.11 total=58761459\n\
                       full avg10=0.00 avg60=0.00 avg300=0.00 total=0\n";
        let stall = PressureStall::parse(Path::new(PATH), content).unwrap();
        assert!((stall.some.avg10 - 1.53).abs() < f64::EPSILON);
        assert_eq!(stall.some.total, 58_761_459);
        assert_eq!(stall.full, Some(StallAverages::default()));
    }

    #[test]
    fn full_line_optional() {
        let content = "some avg10=0.00 avg60=0.00 avg300=0.00 total=0\n";
        let stall = PressureStall::parse(Path::new(PATH), content).unwrap();
        assert_eq!(stall.full, None);
    }

    #[test]
    fn malformed_content() {
        assert!(PressureStall::parse(Path::new(PATH), "").is_err());
        assert!(PressureStall::parse(Path::new(PATH), "some avg10=lots\n").is_err());
        assert!(PressureStall::parse(Path::new(PATH), "some avg10\n").is_err());
    }
}
