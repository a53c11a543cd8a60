// data.rs — Sinogram and volume containers, and the store that names them.
//
// The reconstruction never owns its inputs. Callers put data into a
// `DataStore`, which hands out shared handles:
//
//   SinogramHandle = Arc<Sinogram>          read-only during a run
//   VolumeHandle   = Arc<RwLock<Volume>>    written once per run
//
// The algorithm keeps `Weak` copies of these, so dropping the last strong
// handle (or removing the entry from the store) makes the algorithm report
// "not runnable" instead of keeping the data alive behind the caller's back.
//
// Both containers are row-major:
//   sinogram[angle * detector_count + detector]
//   volume[row * cols + col]

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::{FbpError, Result};
use crate::filter::CustomFilter;
use crate::geometry::{ProjectionGeometry, VolumeGeometry};

// ---------------------------------------------------------------------------
// Sinogram
// ---------------------------------------------------------------------------

/// Projection measurements: one row of detector samples per angle.
#[derive(Debug, Clone)]
pub struct Sinogram {
    geometry: Arc<dyn ProjectionGeometry>,
    data: Vec<f32>,
}

impl Sinogram {
    /// Wrap existing samples. The buffer must hold exactly
    /// `angle_count * detector_count` values.
    pub fn new(geometry: Arc<dyn ProjectionGeometry>, data: Vec<f32>) -> Result<Self> {
        let expected = geometry.angle_count() * geometry.detector_count();
        if data.len() != expected {
            return Err(FbpError::geometry(format!(
                "sinogram holds {} samples, geometry needs {} angles × {} detectors = {}",
                data.len(),
                geometry.angle_count(),
                geometry.detector_count(),
                expected
            )));
        }
        Ok(Sinogram { geometry, data })
    }

    pub fn zeros(geometry: Arc<dyn ProjectionGeometry>) -> Self {
        let len = geometry.angle_count() * geometry.detector_count();
        Sinogram { geometry, data: vec![0.0; len] }
    }

    /// Fill every sample from `f(angle, detector)`.
    pub fn from_fn(
        geometry: Arc<dyn ProjectionGeometry>,
        mut f: impl FnMut(usize, usize) -> f32,
    ) -> Self {
        let (m, n) = (geometry.angle_count(), geometry.detector_count());
        let mut data = Vec::with_capacity(m * n);
        for a in 0..m {
            for d in 0..n {
                data.push(f(a, d));
            }
        }
        Sinogram { geometry, data }
    }

    pub fn geometry(&self) -> &dyn ProjectionGeometry {
        self.geometry.as_ref()
    }

    pub fn detector_count(&self) -> usize {
        self.geometry.detector_count()
    }

    pub fn angle_count(&self) -> usize {
        self.geometry.angle_count()
    }

    pub fn row(&self, angle: usize) -> &[f32] {
        let n = self.detector_count();
        &self.data[angle * n..(angle + 1) * n]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

// ---------------------------------------------------------------------------
// Volume
// ---------------------------------------------------------------------------

/// Reconstruction grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    geometry: VolumeGeometry,
    data: Vec<f32>,
}

impl Volume {
    pub fn zeros(geometry: VolumeGeometry) -> Self {
        Volume { geometry, data: vec![0.0; geometry.pixel_count()] }
    }

    pub fn from_vec(geometry: VolumeGeometry, data: Vec<f32>) -> Result<Self> {
        if data.len() != geometry.pixel_count() {
            return Err(FbpError::geometry(format!(
                "volume holds {} pixels, geometry is {}×{}",
                data.len(),
                geometry.cols,
                geometry.rows
            )));
        }
        Ok(Volume { geometry, data })
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn cols(&self) -> usize {
        self.geometry.cols
    }

    pub fn rows(&self) -> usize {
        self.geometry.rows
    }

    #[inline]
    pub fn get(&self, col: usize, row: usize) -> f32 {
        self.data[row * self.geometry.cols + col]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Replace every pixel. `values` must match the grid size.
    pub(crate) fn overwrite(&mut self, values: &[f32]) {
        assert_eq!(values.len(), self.data.len(), "volume size changed during a run");
        self.data.copy_from_slice(values);
    }
}

// ---------------------------------------------------------------------------
// DataStore
// ---------------------------------------------------------------------------

pub type SinogramHandle = Arc<Sinogram>;
pub type VolumeHandle = Arc<RwLock<Volume>>;

/// Identifier of an entry in a [`DataStore`]. Ids start at 1 and are never
/// reused within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataId(pub u32);

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Sinogram(SinogramHandle),
    Volume(VolumeHandle),
    Filter(Arc<CustomFilter>),
}

/// Named data objects referenced by algorithm configurations.
#[derive(Debug, Default)]
pub struct DataStore {
    entries: HashMap<DataId, Entry>,
    last_id: u32,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> DataId {
        self.last_id += 1;
        DataId(self.last_id)
    }

    pub fn insert_sinogram(&mut self, sinogram: Sinogram) -> DataId {
        let id = self.next_id();
        self.entries.insert(id, Entry::Sinogram(Arc::new(sinogram)));
        id
    }

    pub fn insert_volume(&mut self, volume: Volume) -> DataId {
        let id = self.next_id();
        self.entries.insert(id, Entry::Volume(Arc::new(RwLock::new(volume))));
        id
    }

    /// Store custom filter rows for the `projection`/`sinogram` and
    /// `rprojection`/`rsinogram` families.
    pub fn insert_filter(&mut self, filter: CustomFilter) -> DataId {
        let id = self.next_id();
        self.entries.insert(id, Entry::Filter(Arc::new(filter)));
        id
    }

    pub fn sinogram(&self, id: DataId) -> Option<SinogramHandle> {
        match self.entries.get(&id) {
            Some(Entry::Sinogram(s)) => Some(Arc::clone(s)),
            _ => None,
        }
    }

    pub fn volume(&self, id: DataId) -> Option<VolumeHandle> {
        match self.entries.get(&id) {
            Some(Entry::Volume(v)) => Some(Arc::clone(v)),
            _ => None,
        }
    }

    pub fn filter(&self, id: DataId) -> Option<Arc<CustomFilter>> {
        match self.entries.get(&id) {
            Some(Entry::Filter(f)) => Some(Arc::clone(f)),
            _ => None,
        }
    }

    /// Drop the store's handle. Returns false if `id` was unknown.
    pub fn remove(&mut self, id: DataId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
