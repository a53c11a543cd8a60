// geometry.rs — Projection and volume geometry.
//
// The back-projector never sees angles. Every projection geometry is
// converted to a *vector geometry*: per angle, three 2D vectors
//
//   parallel:  ray        — direction of the parallel rays
//   fan:       ray        — source position
//   both:      det_origin — detector edge (start of pixel 0)
//              det_u      — step from one detector pixel to the next
//
// plus two scalars shared by all angles: the quadrature weight of one
// angle and the ramp scale 1 / (2 * effective detector spacing). Adding a
// geometry means writing a `to_vectors()`; the pipeline does not change.
//
// CONVENTIONS
// ───────────
// Parallel (angle t, detector width w, n detectors):
//   ray        = ( sin t, -cos t)
//   det_u      = ( cos t,  sin t) * w
//   det_origin = -n/2 * det_u                      (centred on the origin)
//
// Fan-flat (source distance R, detector distance d):
//   source     = ( sin t * R, -cos t * R)
//   det_u      = ( cos t,  sin t) * w
//   det_origin = (-sin t * d, cos t * d) - n/2 * det_u
//
// A fan beam is reconstructed on the virtual detector through the origin,
// whose spacing is w * R / (R + d). Samples are pre-weighted by the cosine
// of their ray angle to the central ray and every pixel contribution is
// weighted by 1/U^2, U = (distance from source along the central ray) / R.
//
// Angular quadrature: parallel angles cover [0, pi) and each carries pi/M.
// Fan angles cover [0, 2 pi); each carries 2 pi / M, halved because every
// line is measured twice, so pi / M again.
//
// Volume pixels: column c, row r (row 0 at the top, y = max_y).

use std::f32::consts::PI;
use std::fmt;

use crate::error::{FbpError, Result};

/// Beam shape, selects the mapping in the back-projector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamKind {
    Parallel,
    Fan,
}

impl BeamKind {
    /// Numeric code shared with `backproject.wgsl`.
    pub fn code(self) -> u32 {
        match self {
            BeamKind::Parallel => 0,
            BeamKind::Fan => 1,
        }
    }
}

/// Per-angle vectors. Layout matches `ProjectionVector` in backproject.wgsl
/// (4 × vec2<f32>, 32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ProjectionVector {
    /// Parallel: ray direction. Fan: source position.
    pub ray: [f32; 2],
    pub det_origin: [f32; 2],
    pub det_u: [f32; 2],
    pub _pad: [f32; 2],
}

const _: () = assert!(std::mem::size_of::<ProjectionVector>() == 32);

#[inline]
fn cross(a: [f32; 2], b: [f32; 2]) -> f32 {
    a[0] * b[1] - a[1] * b[0]
}

#[inline]
fn dot(a: [f32; 2], b: [f32; 2]) -> f32 {
    a[0] * b[0] + a[1] * b[1]
}

#[inline]
fn sub(a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

impl ProjectionVector {
    /// Continuous detector coordinate hit by the ray through point `p`
    /// (pixel i spans [i, i + 1)) and the back-projection weight of `p`.
    ///
    /// Returns `None` when `p` cannot be mapped (fan ray parallel to the
    /// detector, or `p` behind the source).
    pub fn project(&self, beam: BeamKind, p: [f32; 2]) -> Option<(f32, f32)> {
        match beam {
            BeamKind::Parallel => {
                let denom = cross(self.det_u, self.ray);
                if denom.abs() < f32::EPSILON {
                    return None;
                }
                Some((cross(sub(p, self.det_origin), self.ray) / denom, 1.0))
            }
            BeamKind::Fan => {
                let src = self.ray;
                let d = sub(p, src);
                let denom = cross(d, self.det_u);
                if denom.abs() < f32::EPSILON {
                    return None;
                }
                let t = cross(sub(self.det_origin, src), d) / denom;
                let u = -dot(d, src) / dot(src, src);
                if u <= 0.0 {
                    return None;
                }
                Some((t, 1.0 / (u * u)))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// VectorGeometry
// ---------------------------------------------------------------------------

/// Geometry in the form consumed by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorGeometry {
    pub beam: BeamKind,
    pub detector_count: usize,
    pub vectors: Vec<ProjectionVector>,
    /// Quadrature weight of one projection angle.
    pub angle_weight: f32,
    /// 1 / (2 * effective detector spacing).
    pub ramp_scale: f32,
}

impl VectorGeometry {
    pub fn angle_count(&self) -> usize {
        self.vectors.len()
    }

    /// Constant applied to every back-projected value.
    pub fn output_scale(&self) -> f32 {
        self.angle_weight * self.ramp_scale
    }

    /// Pre-weight for sample `det` of projection `angle` (1 for parallel
    /// beams, cosine of the ray angle to the central ray for fan beams).
    pub fn detector_weight(&self, angle: usize, det: usize) -> f32 {
        match self.beam {
            BeamKind::Parallel => 1.0,
            BeamKind::Fan => {
                let v = &self.vectors[angle];
                let s = det as f32 + 0.5;
                let q = [
                    v.det_origin[0] + s * v.det_u[0],
                    v.det_origin[1] + s * v.det_u[1],
                ];
                let ray = sub(q, v.ray);
                let central = [-v.ray[0], -v.ray[1]];
                let norm = dot(ray, ray).sqrt() * dot(central, central).sqrt();
                if norm > 0.0 { dot(ray, central) / norm } else { 0.0 }
            }
        }
    }

    /// Smallest source distance over all angles (fan beams only).
    pub fn min_source_distance(&self) -> Option<f32> {
        match self.beam {
            BeamKind::Parallel => None,
            BeamKind::Fan => self
                .vectors
                .iter()
                .map(|v| dot(v.ray, v.ray).sqrt())
                .reduce(f32::min),
        }
    }
}

/// A projection geometry: anything that can describe its rays as vectors.
pub trait ProjectionGeometry: fmt::Debug + Send + Sync {
    fn detector_count(&self) -> usize;
    fn angle_count(&self) -> usize;
    fn kind(&self) -> BeamKind;
    fn to_vectors(&self) -> VectorGeometry;
}

impl ProjectionGeometry for VectorGeometry {
    fn detector_count(&self) -> usize {
        self.detector_count
    }

    fn angle_count(&self) -> usize {
        self.vectors.len()
    }

    fn kind(&self) -> BeamKind {
        self.beam
    }

    fn to_vectors(&self) -> VectorGeometry {
        self.clone()
    }
}

// ---------------------------------------------------------------------------
// Parallel beam
// ---------------------------------------------------------------------------

/// Parallel-beam geometry with angles in radians over [0, pi).
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelGeometry {
    pub detector_count: usize,
    pub detector_width: f32,
    pub angles: Vec<f32>,
}

impl ParallelGeometry {
    pub fn new(detector_count: usize, detector_width: f32, angles: Vec<f32>) -> Self {
        ParallelGeometry { detector_count, detector_width, angles }
    }

    /// `angle_count` equally spaced angles over [0, pi), unit detectors.
    pub fn uniform(detector_count: usize, angle_count: usize) -> Self {
        let angles = (0..angle_count)
            .map(|i| i as f32 * PI / angle_count as f32)
            .collect();
        ParallelGeometry::new(detector_count, 1.0, angles)
    }
}

impl ProjectionGeometry for ParallelGeometry {
    fn detector_count(&self) -> usize {
        self.detector_count
    }

    fn angle_count(&self) -> usize {
        self.angles.len()
    }

    fn kind(&self) -> BeamKind {
        BeamKind::Parallel
    }

    fn to_vectors(&self) -> VectorGeometry {
        let half = 0.5 * self.detector_count as f32;
        let vectors = self
            .angles
            .iter()
            .map(|&t| {
                let (s, c) = t.sin_cos();
                let det_u = [c * self.detector_width, s * self.detector_width];
                ProjectionVector {
                    ray: [s, -c],
                    det_origin: [-half * det_u[0], -half * det_u[1]],
                    det_u,
                    _pad: [0.0; 2],
                }
            })
            .collect();
        VectorGeometry {
            beam: BeamKind::Parallel,
            detector_count: self.detector_count,
            vectors,
            angle_weight: PI / self.angles.len().max(1) as f32,
            ramp_scale: 1.0 / (2.0 * self.detector_width),
        }
    }
}

// ---------------------------------------------------------------------------
// Fan beam, flat detector
// ---------------------------------------------------------------------------

/// Fan-beam geometry with a flat detector, angles over [0, 2 pi).
#[derive(Debug, Clone, PartialEq)]
pub struct FanFlatGeometry {
    pub detector_count: usize,
    pub detector_width: f32,
    pub angles: Vec<f32>,
    pub origin_source: f32,
    pub origin_detector: f32,
}

impl FanFlatGeometry {
    pub fn new(
        detector_count: usize,
        detector_width: f32,
        angles: Vec<f32>,
        origin_source: f32,
        origin_detector: f32,
    ) -> Self {
        FanFlatGeometry { detector_count, detector_width, angles, origin_source, origin_detector }
    }

    /// `angle_count` equally spaced angles over a full circle.
    pub fn uniform(
        detector_count: usize,
        detector_width: f32,
        angle_count: usize,
        origin_source: f32,
        origin_detector: f32,
    ) -> Self {
        let angles = (0..angle_count)
            .map(|i| i as f32 * 2.0 * PI / angle_count as f32)
            .collect();
        FanFlatGeometry::new(detector_count, detector_width, angles, origin_source, origin_detector)
    }

    /// Detector spacing projected onto the line through the origin.
    pub fn virtual_detector_width(&self) -> f32 {
        self.detector_width * self.origin_source / (self.origin_source + self.origin_detector)
    }
}

impl ProjectionGeometry for FanFlatGeometry {
    fn detector_count(&self) -> usize {
        self.detector_count
    }

    fn angle_count(&self) -> usize {
        self.angles.len()
    }

    fn kind(&self) -> BeamKind {
        BeamKind::Fan
    }

    fn to_vectors(&self) -> VectorGeometry {
        let half = 0.5 * self.detector_count as f32;
        let vectors = self
            .angles
            .iter()
            .map(|&t| {
                let (s, c) = t.sin_cos();
                let det_u = [c * self.detector_width, s * self.detector_width];
                ProjectionVector {
                    ray: [s * self.origin_source, -c * self.origin_source],
                    det_origin: [
                        -s * self.origin_detector - half * det_u[0],
                        c * self.origin_detector - half * det_u[1],
                    ],
                    det_u,
                    _pad: [0.0; 2],
                }
            })
            .collect();
        VectorGeometry {
            beam: BeamKind::Fan,
            detector_count: self.detector_count,
            vectors,
            angle_weight: PI / self.angles.len().max(1) as f32,
            ramp_scale: 1.0 / (2.0 * self.virtual_detector_width()),
        }
    }
}

// ---------------------------------------------------------------------------
// Volume geometry
// ---------------------------------------------------------------------------

/// Reconstruction grid: `cols × rows` pixels over a rectangular window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeGeometry {
    pub cols: usize,
    pub rows: usize,
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl VolumeGeometry {
    /// Unit pixels, window centred on the origin.
    pub fn new(cols: usize, rows: usize) -> Self {
        let hx = 0.5 * cols as f32;
        let hy = 0.5 * rows as f32;
        VolumeGeometry { cols, rows, min_x: -hx, max_x: hx, min_y: -hy, max_y: hy }
    }

    pub fn with_window(cols: usize, rows: usize, min_x: f32, max_x: f32, min_y: f32, max_y: f32) -> Self {
        VolumeGeometry { cols, rows, min_x, max_x, min_y, max_y }
    }

    pub fn pixel_width(&self) -> f32 {
        (self.max_x - self.min_x) / self.cols as f32
    }

    pub fn pixel_height(&self) -> f32 {
        (self.max_y - self.min_y) / self.rows as f32
    }

    pub fn pixel_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Position of sub-sample (sx, sy) of pixel (col, row) with
    /// `supersampling` sub-samples per axis. (0, 0, 1) is the pixel centre.
    pub fn sample_position(&self, col: usize, row: usize, sx: u32, sy: u32, supersampling: u32) -> [f32; 2] {
        let s = supersampling as f32;
        [
            self.min_x + (col as f32 + (sx as f32 + 0.5) / s) * self.pixel_width(),
            self.max_y - (row as f32 + (sy as f32 + 0.5) / s) * self.pixel_height(),
        ]
    }

    pub fn pixel_center(&self, col: usize, row: usize) -> [f32; 2] {
        self.sample_position(col, row, 0, 0, 1)
    }

    /// Radius of the smallest origin-centred circle containing the window.
    pub fn bounding_radius(&self) -> f32 {
        let x = self.min_x.abs().max(self.max_x.abs());
        let y = self.min_y.abs().max(self.max_y.abs());
        (x * x + y * y).sqrt()
    }
}

/// Check that a projection geometry and a volume geometry can be combined.
pub fn check_compatible(projection: &VectorGeometry, volume: &VolumeGeometry) -> Result<()> {
    if projection.detector_count == 0 || projection.angle_count() == 0 {
        return Err(FbpError::geometry(format!(
            "projection geometry has {} detectors and {} angles",
            projection.detector_count,
            projection.angle_count()
        )));
    }
    if volume.cols == 0 || volume.rows == 0 {
        return Err(FbpError::geometry(format!(
            "volume geometry is {}×{}",
            volume.cols, volume.rows
        )));
    }
    let window = [volume.min_x, volume.max_x, volume.min_y, volume.max_y];
    if window.iter().any(|v| !v.is_finite()) || volume.min_x >= volume.max_x || volume.min_y >= volume.max_y {
        return Err(FbpError::geometry(format!(
            "volume window x [{}, {}] y [{}, {}] is empty or not finite",
            volume.min_x, volume.max_x, volume.min_y, volume.max_y
        )));
    }
    if !(projection.ramp_scale.is_finite() && projection.ramp_scale > 0.0) {
        return Err(FbpError::geometry("detector width must be positive and finite"));
    }
    if let Some(r) = projection.min_source_distance() {
        let radius = volume.bounding_radius();
        if !(r > radius) {
            return Err(FbpError::geometry(format!(
                "fan source distance {r} does not clear the volume (radius {radius})"
            )));
        }
    }
    Ok(())
}
