//! Plain-text import and export of detections, point lists and transforms.
//!
//! All formats are space-delimited, one record per line.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use glam::{DMat4, DVec3};

use crate::blob_detection::Detection;
use crate::error::{Error, Result};
use crate::geometry::{mat4_from_rows, mat4_rows, PointCloud};

pub const DETECTIONS_HEADER: &str = "id dimension_z dimension_y dimension_x radius";

/// Coordinate order of the three position columns after the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnOrder {
    #[default]
    Zyx,
    Xyz,
}

/// Writes detections as `id z y x radius` rows under [`DETECTIONS_HEADER`].
///
/// Ids start at 1, z is scaled by `anisotropy` into isotropic units and the
/// radius is `√3 × scale`.
pub fn write_detections<W: Write>(
    mut writer: W,
    detections: &[Detection],
    anisotropy: f64,
) -> Result<()> {
    writeln!(writer, "{DETECTIONS_HEADER}")?;
    for (idx, det) in detections.iter().enumerate() {
        writeln!(
            writer,
            "{} {} {} {} {}",
            idx + 1,
            anisotropy * det.z,
            det.y,
            det.x,
            det.sphere_radius()
        )?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_detections(path: &Path, detections: &[Detection], anisotropy: f64) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    write_detections(file, detections, anisotropy)?;
    tracing::info!(path = %path.display(), count = detections.len(), "saved detections");
    Ok(())
}

/// Reads `id c0 c1 c2 [...]` rows into a point cloud with ids.
///
/// Columns after the fourth are ignored. With [`ColumnOrder::Xyz`] the
/// coordinates are flipped into (z, y, x) order. Blank lines are skipped.
pub fn read_points<R: BufRead>(reader: R, order: ColumnOrder, has_header: bool) -> Result<PointCloud> {
    let mut points = Vec::new();
    let mut ids = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if (has_header && line_no == 0) || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(Error::Parse(format!(
                "line {}: expected at least 4 columns, found {}",
                line_no + 1,
                fields.len()
            )));
        }

        let number = |s: &str| -> Result<f64> {
            s.parse::<f64>()
                .map_err(|e| Error::Parse(format!("line {}: {s:?}: {e}", line_no + 1)))
        };
        let id = number(fields[0])?;
        let (a, b, c) = (number(fields[1])?, number(fields[2])?, number(fields[3])?);

        ids.push(id.round() as i64);
        points.push(match order {
            ColumnOrder::Zyx => DVec3::new(a, b, c),
            ColumnOrder::Xyz => DVec3::new(c, b, a),
        });
    }

    PointCloud::new(points).with_ids(ids)
}

pub fn load_points(path: &Path, order: ColumnOrder, has_header: bool) -> Result<PointCloud> {
    let cloud = read_points(BufReader::new(File::open(path)?), order, has_header)?;
    tracing::info!(path = %path.display(), count = cloud.len(), "loaded points");
    Ok(cloud)
}

/// Writes the four rows of `transform` with three decimals.
pub fn write_transform<W: Write>(mut writer: W, transform: &DMat4) -> Result<()> {
    for row in mat4_rows(transform) {
        writeln!(
            writer,
            "{:.3} {:.3} {:.3} {:.3}",
            row[0], row[1], row[2], row[3]
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a 4×4 row-major transform. Any other shape is a parse error.
pub fn read_transform<R: BufRead>(reader: R) -> Result<DMat4> {
    let mut rows = Vec::with_capacity(4);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|s| {
                s.parse::<f64>()
                    .map_err(|e| Error::Parse(format!("transform entry {s:?}: {e}")))
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }

    let shape_ok = rows.len() == 4 && rows.iter().all(|r| r.len() == 4);
    if !shape_ok {
        return Err(Error::Parse(format!(
            "transform must be 4 x 4, found {} rows of widths {:?}",
            rows.len(),
            rows.iter().map(Vec::len).collect::<Vec<_>>()
        )));
    }

    let mut m = [[0.0; 4]; 4];
    for (dst, src) in m.iter_mut().zip(&rows) {
        dst.copy_from_slice(src);
    }
    Ok(mat4_from_rows(m))
}

pub fn save_transform(path: &Path, transform: &DMat4) -> Result<()> {
    write_transform(BufWriter::new(File::create(path)?), transform)?;
    tracing::info!(path = %path.display(), "saved transform");
    Ok(())
}

pub fn load_transform(path: &Path) -> Result<DMat4> {
    read_transform(BufReader::new(File::open(path)?))
}
