//! Back-to-front depth ordering of Gaussian centres.
//!
//! Depth is the view-space `z` of each centre under `view * model`. The
//! camera looks down `-z`, so sorting ascending puts the farthest splat
//! first, which is what over-compositing with straight alpha needs.

use glam::{Mat4, Vec3};
use rayon::prelude::*;
use std::time::Instant;

/// Computes a stable back-to-front permutation of `positions` under `view`.
pub trait SortBackend: Send {
    fn name(&self) -> &'static str;

    /// Writes one view-space `z` per position into `depths`.
    fn depths(&self, positions: &[Vec3], view: &Mat4, depths: &mut Vec<f32>);

    /// Fills `order` with `0..depths.len()` sorted by ascending depth, ties
    /// keeping their original relative order.
    fn order(&self, depths: &[f32], order: &mut Vec<u32>);
}

/// Single-threaded backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialSort;

/// Data-parallel backend on the global rayon pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParallelSort;

#[inline]
fn view_z(view: &Mat4, p: Vec3) -> f32 {
    view.transform_point3(p).z
}

impl SortBackend for SequentialSort {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn depths(&self, positions: &[Vec3], view: &Mat4, depths: &mut Vec<f32>) {
        depths.clear();
        depths.extend(positions.iter().map(|&p| view_z(view, p)));
    }

    fn order(&self, depths: &[f32], order: &mut Vec<u32>) {
        order.clear();
        order.extend(0..depths.len() as u32);
        order.sort_by(|&a, &b| depths[a as usize].total_cmp(&depths[b as usize]));
    }
}

impl SortBackend for ParallelSort {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn depths(&self, positions: &[Vec3], view: &Mat4, depths: &mut Vec<f32>) {
        depths.clear();
        positions
            .par_iter()
            .map(|&p| view_z(view, p))
            .collect_into_vec(depths);
    }

    fn order(&self, depths: &[f32], order: &mut Vec<u32>) {
        order.clear();
        order.extend(0..depths.len() as u32);
        // `par_sort_by` is stable, so both backends agree on ties.
        order.par_sort_by(|&a, &b| depths[a as usize].total_cmp(&depths[b as usize]));
    }
}

/// Which backend the viewer should sort with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortBackendKind {
    /// Parallel when more than one worker thread is available.
    #[default]
    Auto,
    Sequential,
    Parallel,
}

pub fn select_backend(kind: SortBackendKind) -> Box<dyn SortBackend> {
    match kind {
        SortBackendKind::Sequential => Box::new(SequentialSort),
        SortBackendKind::Parallel => Box::new(ParallelSort),
        SortBackendKind::Auto => {
            if rayon::current_num_threads() > 1 {
                Box::new(ParallelSort)
            } else {
                Box::new(SequentialSort)
            }
        }
    }
}

/// Sorting state carried across frames.
///
/// Holds a backend, scratch buffers reused between sorts, and the
/// generation/view pair the current order was computed for. Callers bump
/// the generation with [`SortContext::invalidate`] whenever the Gaussian
/// set is replaced; the order is recomputed only when either changes.
pub struct SortContext {
    backend: Box<dyn SortBackend>,
    generation: u64,
    sorted_for: Option<(u64, Mat4)>,
    depths: Vec<f32>,
    order: Vec<u32>,
}

impl SortContext {
    pub fn new(backend: Box<dyn SortBackend>) -> Self {
        Self {
            backend,
            generation: 0,
            sorted_for: None,
            depths: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn with_kind(kind: SortBackendKind) -> Self {
        Self::new(select_backend(kind))
    }

    #[inline]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn set_backend(&mut self, backend: Box<dyn SortBackend>) {
        self.backend = backend;
        self.sorted_for = None;
    }

    /// Marks the cached order stale; the next sort recomputes it.
    pub fn invalidate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the next [`SortContext::sort`] with `view` would reuse the cache.
    pub fn is_current(&self, view: &Mat4) -> bool {
        self.sorted_for == Some((self.generation, *view))
    }

    /// Returns the back-to-front permutation of `positions` under `view`,
    /// recomputing only if the set generation or `view` changed.
    pub fn sort(&mut self, positions: &[Vec3], view: &Mat4) -> &[u32] {
        if !self.is_current(view) || self.order.len() != positions.len() {
            let start = Instant::now();
            self.backend.depths(positions, view, &mut self.depths);
            self.backend.order(&self.depths, &mut self.order);
            self.sorted_for = Some((self.generation, *view));
            log::debug!(
                "sorted {} gaussians ({}) in {:.2?}",
                positions.len(),
                self.backend.name(),
                start.elapsed()
            );
        }
        &self.order
    }

    /// The last computed order, if any.
    #[inline]
    pub fn order(&self) -> &[u32] {
        &self.order
    }
}

impl Default for SortContext {
    fn default() -> Self {
        Self::with_kind(SortBackendKind::Auto)
    }
}

/// One-shot helper around [`SequentialSort`].
pub fn sort_gaussians(positions: &[Vec3], view: &Mat4) -> Vec<u32> {
    let mut depths = Vec::with_capacity(positions.len());
    let mut order = Vec::with_capacity(positions.len());
    SequentialSort.depths(positions, view, &mut depths);
    SequentialSort.order(&depths, &mut order);
    order
}
