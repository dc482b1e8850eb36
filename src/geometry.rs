//! Scan region geometry: shapes and the measurement-point enumerator.
//!
//! [`ScanRegion::enumerate`] turns a region descriptor into the ordered
//! coordinate sequence a scan walks. The enumeration is pure and
//! deterministic: the same descriptor yields a bit-for-bit identical
//! sequence on every call. Restarting a scan regenerates the sequence from
//! the descriptor rather than persisting it, so this determinism is what
//! makes `--restart <index>` land on the same physical point.
//!
//! ## Lattice convention
//!
//! Each axis of length `L` at spacing `s` carries `floor(L / s) + 1` points
//! at `center + (i - (n - 1) / 2) * s`, computed from the integer index so
//! no rounding accumulates. The lattice is symmetric about the center; the
//! center point itself is included exactly when the per-axis count is odd.
//! A spacing larger than the extent degenerates to a single point per axis
//! (the center), never a silently mis-sized grid.
//!
//! Points are ordered z-major, then y, then x, ascending on each axis.

use crate::error::{AppResult, MapperError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Absorbs float fuzz in `extent / spacing` so an exactly-dividing spacing
/// never loses its boundary points (e.g. 0.3 / 0.1 = 2.999...).
const GRID_EPSILON: f64 = 1e-9;

/// A position in the logical (magnet) frame, in millimeters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// X component in mm.
    pub x: f64,
    /// Y component in mm.
    pub y: f64,
    /// Z component in mm.
    pub z: f64,
}

impl Coordinate {
    /// Construct a coordinate from its components.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another coordinate.
    pub fn distance(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Largest per-axis absolute difference to another coordinate.
    ///
    /// This is the metric `move_wait` converges under: every axis must be
    /// within tolerance, not just the Euclidean norm.
    pub fn axis_distance(&self, other: &Coordinate) -> f64 {
        (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.z - other.z).abs())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// The volume shape a scan covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// Regular 3D grid over a cube of edge `extent`.
    Cube,
    /// Circular cross-section of diameter `extent`, `height` along z.
    Cylinder,
    /// 3D grid filtered to a ball of diameter `extent`.
    Sphere,
    /// Disc of diameter `extent` in the XY plane at the center's z.
    Circle,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shape::Cube => "cube",
            Shape::Cylinder => "cylinder",
            Shape::Sphere => "sphere",
            Shape::Circle => "circle",
        };
        f.write_str(name)
    }
}

/// Descriptor for the region a scan covers.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanRegion {
    /// Volume shape.
    pub shape: Shape,
    /// Region center in the logical frame.
    pub center: Coordinate,
    /// Diameter (or cube edge length) in mm.
    pub extent: f64,
    /// Cylinder height in mm; defaults to `extent` for cylinders, unused
    /// otherwise.
    pub height: Option<f64>,
    /// Lattice spacing in mm.
    pub spacing: f64,
}

impl ScanRegion {
    /// Build a validated region descriptor.
    pub fn new(
        shape: Shape,
        center: Coordinate,
        extent: f64,
        height: Option<f64>,
        spacing: f64,
    ) -> AppResult<Self> {
        Self::validate_dimensions(extent, height, spacing)?;
        Ok(Self {
            shape,
            center,
            extent,
            height,
            spacing,
        })
    }

    /// Reject non-positive extent, spacing or height.
    ///
    /// Callable without a center so the CLI can fail fast before any device
    /// I/O (the center may only be known after calibration).
    pub fn validate_dimensions(extent: f64, height: Option<f64>, spacing: f64) -> AppResult<()> {
        if !extent.is_finite() || extent <= 0.0 {
            return Err(MapperError::InvalidRegion(format!(
                "extent must be positive, got {extent}"
            )));
        }
        if !spacing.is_finite() || spacing <= 0.0 {
            return Err(MapperError::InvalidRegion(format!(
                "spacing must be positive, got {spacing}"
            )));
        }
        if let Some(h) = height {
            if !h.is_finite() || h <= 0.0 {
                return Err(MapperError::InvalidRegion(format!(
                    "height must be positive, got {h}"
                )));
            }
        }
        Ok(())
    }

    /// Cylinder height, defaulting to the diameter (a right cylinder).
    fn effective_height(&self) -> f64 {
        self.height.unwrap_or(self.extent)
    }

    /// Enumerate the measurement coordinates for this region, in their
    /// fixed scan order.
    pub fn enumerate(&self) -> AppResult<Vec<Coordinate>> {
        let radius = self.extent / 2.0;
        let xs = axis_lattice(self.center.x, self.extent, self.spacing);
        let ys = axis_lattice(self.center.y, self.extent, self.spacing);

        let mut points = Vec::new();
        match self.shape {
            Shape::Circle => {
                for &y in &ys {
                    for &x in &xs {
                        if planar_distance(x, y, &self.center) <= radius {
                            points.push(Coordinate::new(x, y, self.center.z));
                        }
                    }
                }
            }
            Shape::Cube => {
                let zs = axis_lattice(self.center.z, self.extent, self.spacing);
                for &z in &zs {
                    for &y in &ys {
                        for &x in &xs {
                            points.push(Coordinate::new(x, y, z));
                        }
                    }
                }
            }
            Shape::Sphere => {
                let zs = axis_lattice(self.center.z, self.extent, self.spacing);
                for &z in &zs {
                    for &y in &ys {
                        for &x in &xs {
                            let p = Coordinate::new(x, y, z);
                            if p.distance(&self.center) <= radius {
                                points.push(p);
                            }
                        }
                    }
                }
            }
            Shape::Cylinder => {
                let zs = axis_lattice(self.center.z, self.effective_height(), self.spacing);
                for &z in &zs {
                    for &y in &ys {
                        for &x in &xs {
                            if planar_distance(x, y, &self.center) <= radius {
                                points.push(Coordinate::new(x, y, z));
                            }
                        }
                    }
                }
            }
        }
        Ok(points)
    }
}

/// Distance from `(x, y)` to the center in the XY plane.
fn planar_distance(x: f64, y: f64, center: &Coordinate) -> f64 {
    let dx = x - center.x;
    let dy = y - center.y;
    (dx * dx + dy * dy).sqrt()
}

/// Center-symmetric lattice along one axis: `floor(extent / spacing) + 1`
/// points, each computed directly from its integer index.
fn axis_lattice(center: f64, extent: f64, spacing: f64) -> Vec<f64> {
    let n = (extent / spacing + GRID_EPSILON).floor() as usize + 1;
    let half = (n - 1) as f64 / 2.0;
    (0..n)
        .map(|i| center + (i as f64 - half) * spacing)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(shape: Shape, extent: f64, spacing: f64) -> ScanRegion {
        ScanRegion::new(shape, Coordinate::new(0.0, 0.0, 0.0), extent, None, spacing).unwrap()
    }

    #[test]
    fn test_axis_lattice_symmetric() {
        assert_eq!(axis_lattice(0.0, 10.0, 5.0), vec![-5.0, 0.0, 5.0]);
        // Even point count: no center point, half-spacing offsets.
        assert_eq!(axis_lattice(0.0, 10.0, 10.0), vec![-5.0, 5.0]);
        // Non-dividing spacing still spans symmetrically.
        assert_eq!(axis_lattice(0.0, 10.0, 4.0), vec![-4.0, 0.0, 4.0]);
        // Offset center.
        assert_eq!(axis_lattice(100.0, 10.0, 5.0), vec![95.0, 100.0, 105.0]);
    }

    #[test]
    fn test_axis_lattice_float_fuzz() {
        // 0.3 / 0.1 is 2.999... in f64; the boundary points must survive.
        assert_eq!(axis_lattice(0.0, 0.3, 0.1).len(), 4);
    }

    #[test]
    fn test_degenerate_spacing_larger_than_extent() {
        let points = region(Shape::Cube, 5.0, 50.0).enumerate().unwrap();
        assert_eq!(points, vec![Coordinate::new(0.0, 0.0, 0.0)]);
    }

    #[test]
    fn test_invalid_descriptors_rejected() {
        let center = Coordinate::new(0.0, 0.0, 0.0);
        assert!(ScanRegion::new(Shape::Cube, center, 0.0, None, 5.0).is_err());
        assert!(ScanRegion::new(Shape::Cube, center, 10.0, None, 0.0).is_err());
        assert!(ScanRegion::new(Shape::Cube, center, 10.0, None, -5.0).is_err());
        assert!(ScanRegion::new(Shape::Cylinder, center, 10.0, Some(0.0), 5.0).is_err());
        assert!(ScanRegion::new(Shape::Cube, center, f64::NAN, None, 5.0).is_err());
    }

    #[test]
    fn test_determinism_all_shapes() {
        for shape in [Shape::Cube, Shape::Cylinder, Shape::Sphere, Shape::Circle] {
            let r = ScanRegion::new(
                shape,
                Coordinate::new(110.0, 110.0, 250.0),
                20.0,
                Some(14.0),
                3.0,
            )
            .unwrap();
            let first = r.enumerate().unwrap();
            let second = r.enumerate().unwrap();
            assert_eq!(first, second, "{shape} enumeration must be reproducible");
            assert!(!first.is_empty());
        }
    }

    #[test]
    fn test_cube_edge_10_spacing_10_is_corners() {
        let points = region(Shape::Cube, 10.0, 10.0).enumerate().unwrap();
        assert_eq!(points.len(), 8);
        for p in &points {
            assert_eq!(p.x.abs(), 5.0);
            assert_eq!(p.y.abs(), 5.0);
            assert_eq!(p.z.abs(), 5.0);
        }
        // z-major, then y, then x, ascending.
        assert_eq!(points[0], Coordinate::new(-5.0, -5.0, -5.0));
        assert_eq!(points[1], Coordinate::new(5.0, -5.0, -5.0));
        assert_eq!(points[2], Coordinate::new(-5.0, 5.0, -5.0));
        assert_eq!(points[7], Coordinate::new(5.0, 5.0, 5.0));
    }

    #[test]
    fn test_cube_ordering_is_z_major() {
        let points = region(Shape::Cube, 10.0, 5.0).enumerate().unwrap();
        assert_eq!(points.len(), 27);
        let mut sorted = points.clone();
        sorted.sort_by(|a, b| {
            (a.z, a.y, a.x)
                .partial_cmp(&(b.z, b.y, b.x))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        assert_eq!(points, sorted);
    }

    #[test]
    fn test_circle_coverage_and_symmetry() {
        let center = Coordinate::new(0.0, 0.0, 0.0);
        let points = region(Shape::Circle, 20.0, 5.0).enumerate().unwrap();
        assert!(!points.is_empty());
        for p in &points {
            assert!(p.distance(&center) <= 10.0 + 1e-12);
            assert_eq!(p.z, 0.0);
            // 180-degree rotation about the center stays in the set.
            let mirrored = Coordinate::new(-p.x, -p.y, p.z);
            assert!(
                points.contains(&mirrored),
                "missing mirror of {p}: {mirrored}"
            );
        }
    }

    #[test]
    fn test_sphere_is_cube_filtered_by_radius() {
        let center = Coordinate::new(0.0, 0.0, 0.0);
        let cube = region(Shape::Cube, 20.0, 5.0).enumerate().unwrap();
        let sphere = region(Shape::Sphere, 20.0, 5.0).enumerate().unwrap();
        let expected: Vec<Coordinate> = cube
            .into_iter()
            .filter(|p| p.distance(&center) <= 10.0)
            .collect();
        assert_eq!(sphere, expected);
        assert!(sphere.contains(&Coordinate::new(0.0, 0.0, 10.0)));
        assert!(!sphere.contains(&Coordinate::new(10.0, 10.0, 10.0)));
    }

    #[test]
    fn test_cylinder_respects_height_and_radius() {
        let r = ScanRegion::new(
            Shape::Cylinder,
            Coordinate::new(0.0, 0.0, 0.0),
            20.0,
            Some(10.0),
            5.0,
        )
        .unwrap();
        let points = r.enumerate().unwrap();
        assert!(!points.is_empty());
        for p in &points {
            assert!(planar_distance(p.x, p.y, &r.center) <= 10.0);
            assert!(p.z.abs() <= 5.0);
        }
        // Height lattice is independent of the diameter lattice.
        assert!(points.iter().any(|p| p.z == 5.0));
        assert!(points.iter().all(|p| p.z != 10.0));
    }

    #[test]
    fn test_offset_center_shifts_lattice() {
        let c = Coordinate::new(110.0, 110.0, 250.0);
        let r = ScanRegion::new(Shape::Cube, c, 10.0, None, 5.0).unwrap();
        let points = r.enumerate().unwrap();
        assert!(points.contains(&c));
        for p in &points {
            assert!(p.axis_distance(&c) <= 5.0);
        }
    }
}
