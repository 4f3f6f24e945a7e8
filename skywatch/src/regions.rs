//! Named polygonal regions, grouped by source file.
//!
//! Each region file yields an ordered list of named polygons; a point
//! resolves to the first region in the file that contains it, so a flight is
//! in at most one region per file. Regions may carry optional altitude and
//! heading gates, which constrain containment beyond the polygon itself
//! (heading ranges wrap through north).
//!
//! Files are YAML sequences:
//!
//! ```yaml
//! - name: "Rwy 31 Pattern"
//!   alt: [0, 1500]        # optional feet gate
//!   hdg: [300, 330]       # optional heading gate, wraps through 360
//!   polygon:
//!     - [37.46, -122.12]
//!     - [37.46, -122.10]
//!     - [37.44, -122.10]
//! ```
//!
//! An empty file contributes no regions for its slot. Conversion from other
//! formats (KML and friends) happens outside the engine.

use std::path::Path;

use serde::Deserialize;

use crate::error::{EngineError, Result};
use crate::geo;
use crate::report::Report;

/// A single named region: polygon plus optional altitude/heading gates.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    polygon: Vec<(f64, f64)>,
    alt: Option<(i32, i32)>,
    hdg: Option<(f64, f64)>,
}

impl Region {
    /// Does this region contain the given position, with the report's track
    /// and altitude satisfying any configured gates?
    pub fn contains(&self, lat: f64, lon: f64, track: Option<f64>, alt: Option<i32>) -> bool {
        if !geo::point_in_polygon(lat, lon, &self.polygon) {
            return false;
        }
        if let Some((min, max)) = self.alt {
            match alt {
                Some(a) if a >= min && a <= max => {}
                _ => return false,
            }
        }
        if let Some((start, end)) = self.hdg {
            match track {
                Some(t) if hdg_contains(t, start, end) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Is the heading within [start, end], wrapping through north when
/// end < start?
fn hdg_contains(hdg: f64, start: f64, end: f64) -> bool {
    if end < start {
        hdg >= start || hdg <= end
    } else {
        hdg >= start && hdg <= end
    }
}

// ---------------------------------------------------------------------------
// Region files
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegionSpec {
    name: String,
    polygon: Vec<[f64; 2]>,
    alt: Option<[i32; 2]>,
    hdg: Option<[f64; 2]>,
}

/// An ordered collection of regions loaded from one file.
#[derive(Debug, Clone)]
pub struct RegionFile {
    pub name: String,
    regions: Vec<Region>,
}

impl RegionFile {
    pub fn load(path: impl AsRef<Path>) -> Result<RegionFile> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::RegionFile {
            path: path.display().to_string(),
            msg: e.to_string(),
        })?;
        Self::from_yaml_str(&path.display().to_string(), &text)
    }

    pub fn from_yaml_str(name: &str, text: &str) -> Result<RegionFile> {
        let specs: Option<Vec<RegionSpec>> =
            serde_yaml::from_str(text).map_err(|e| EngineError::RegionFile {
                path: name.to_string(),
                msg: e.to_string(),
            })?;

        let mut regions = Vec::new();
        for spec in specs.unwrap_or_default() {
            if spec.polygon.len() < 3 {
                return Err(EngineError::RegionFile {
                    path: name.to_string(),
                    msg: format!("region '{}' has fewer than 3 vertices", spec.name),
                });
            }
            regions.push(Region {
                name: spec.name,
                polygon: spec.polygon.iter().map(|v| (v[0], v[1])).collect(),
                alt: spec.alt.map(|a| (a[0], a[1])),
                hdg: spec.hdg.map(|h| (h[0], h[1])),
            });
        }
        Ok(RegionFile {
            name: name.to_string(),
            regions,
        })
    }

    /// First region containing the report, in declaration order.
    pub fn first_containing(&self, report: &Report) -> Option<&Region> {
        self.regions
            .iter()
            .find(|r| r.contains(report.lat, report.lon, report.track, report.alt_baro))
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }
}

// ---------------------------------------------------------------------------
// Region set
// ---------------------------------------------------------------------------

/// All region files in the system, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    files: Vec<RegionFile>,
}

impl RegionSet {
    pub fn new(files: Vec<RegionFile>) -> RegionSet {
        RegionSet { files }
    }

    pub fn load(paths: &[String]) -> Result<RegionSet> {
        let files = paths
            .iter()
            .map(RegionFile::load)
            .collect::<Result<Vec<_>>>()?;
        Ok(RegionSet { files })
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Resolve region membership for a report: one entry per file, each the
    /// first containing region's name or `None`.
    pub fn resolve(&self, report: &Report) -> Vec<Option<String>> {
        self.files
            .iter()
            .map(|f| f.first_containing(report).map(|r| r.name.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
