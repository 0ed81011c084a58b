//! CPU-side Gaussian collection: the flattened GPU layout, the PLY decoder
//! and a synthetic smoke-test set.

use super::types::{BASE_FLOATS, OPACITY_OFFSET, POS_OFFSET, ROT_OFFSET, SCALE_OFFSET, SH_OFFSET};
use crate::error::ViewerError;
use glam::Vec3;
use splat_ply::{GaussianLayout, VertexTable};
use std::path::Path;

/// Zeroth-order SH basis constant.
pub const SH_C0: f32 = 0.282_09;

/// Identity rotation, `[w, x, y, z]`.
pub const IDENTITY_QUAT: [f32; 4] = [1.0, 0.0, 0.0, 0.0];

/// One materialised row of a [`GaussianSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct Gaussian {
    pub position: Vec3,
    /// Unit quaternion `[w, x, y, z]`.
    pub rotation: [f32; 4],
    pub scale: Vec3,
    pub opacity: f32,
    /// DC term first (RGB), then the extra bands interleaved per coefficient.
    pub sh: Vec<f32>,
}

/// Struct-of-arrays storage with a fixed SH width shared by every row.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianSet {
    positions: Vec<Vec3>,
    rotations: Vec<[f32; 4]>,
    scales: Vec<Vec3>,
    opacities: Vec<f32>,
    sh: Vec<f32>,
    sh_dim: usize,
}

/// L2-normalises a quaternion; zero-length or non-finite input falls back
/// to the identity rotation.
pub fn normalize_quat(q: [f32; 4]) -> [f32; 4] {
    if is_degenerate_quat(q) {
        return IDENTITY_QUAT;
    }
    let norm = quat_norm(q);
    q.map(|c| c / norm)
}

#[inline]
fn quat_norm(q: [f32; 4]) -> f32 {
    q.iter().map(|c| c * c).sum::<f32>().sqrt()
}

#[inline]
fn is_degenerate_quat(q: [f32; 4]) -> bool {
    let norm = quat_norm(q);
    !norm.is_finite() || norm <= f32::EPSILON
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl GaussianSet {
    /// An empty set whose rows will carry `sh_dim` colour coefficients.
    pub fn new(sh_dim: usize) -> Self {
        Self {
            positions: Vec::new(),
            rotations: Vec::new(),
            scales: Vec::new(),
            opacities: Vec::new(),
            sh: Vec::new(),
            sh_dim,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[inline]
    pub fn sh_dim(&self) -> usize {
        self.sh_dim
    }

    /// Floats per flattened row.
    #[inline]
    pub fn row_width(&self) -> usize {
        BASE_FLOATS + self.sh_dim
    }

    #[inline]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn push(&mut self, g: Gaussian) -> Result<(), ViewerError> {
        if g.sh.len() != self.sh_dim {
            return Err(ViewerError::shape("sh", self.sh_dim, g.sh.len()));
        }

        self.positions.push(g.position);
        self.rotations.push(normalize_quat(g.rotation));
        self.scales.push(g.scale);
        self.opacities.push(g.opacity);
        self.sh.extend_from_slice(&g.sh);
        Ok(())
    }

    /// Appends every row of `other`, preserving order.
    pub fn append(&mut self, other: &GaussianSet) -> Result<(), ViewerError> {
        if other.sh_dim != self.sh_dim {
            return Err(ViewerError::shape("sh", self.sh_dim, other.sh_dim));
        }

        self.positions.extend_from_slice(&other.positions);
        self.rotations.extend_from_slice(&other.rotations);
        self.scales.extend_from_slice(&other.scales);
        self.opacities.extend_from_slice(&other.opacities);
        self.sh.extend_from_slice(&other.sh);
        Ok(())
    }

    pub fn row(&self, i: usize) -> Option<Gaussian> {
        if i >= self.len() {
            return None;
        }

        Some(Gaussian {
            position: self.positions[i],
            rotation: self.rotations[i],
            scale: self.scales[i],
            opacity: self.opacities[i],
            sh: self.sh[i * self.sh_dim..(i + 1) * self.sh_dim].to_vec(),
        })
    }

    /// Dense row-major `N x (11 + sh_dim)` buffer in the order
    /// `[position, rotation, scale, opacity, sh]`.
    pub fn flatten(&self) -> Vec<f32> {
        let width = self.row_width();
        let mut out = Vec::with_capacity(self.len() * width);

        for i in 0..self.len() {
            out.extend_from_slice(&self.positions[i].to_array());
            out.extend_from_slice(&self.rotations[i]);
            out.extend_from_slice(&self.scales[i].to_array());
            out.push(self.opacities[i]);
            out.extend_from_slice(&self.sh[i * self.sh_dim..(i + 1) * self.sh_dim]);
        }

        debug_assert_eq!(out.len(), self.len() * width);
        out
    }

    /// Inverse of [`GaussianSet::flatten`].
    pub fn from_flat(data: &[f32], sh_dim: usize) -> Result<Self, ViewerError> {
        let width = BASE_FLOATS + sh_dim;
        if data.len() % width != 0 {
            return Err(ViewerError::shape("flat", data.len().next_multiple_of(width), data.len()));
        }

        let mut set = Self::new(sh_dim);
        for row in data.chunks_exact(width) {
            set.positions.push(Vec3::from_slice(&row[POS_OFFSET..ROT_OFFSET]));
            set.rotations.push([
                row[ROT_OFFSET],
                row[ROT_OFFSET + 1],
                row[ROT_OFFSET + 2],
                row[ROT_OFFSET + 3],
            ]);
            set.scales.push(Vec3::from_slice(&row[SCALE_OFFSET..OPACITY_OFFSET]));
            set.opacities.push(row[OPACITY_OFFSET]);
            set.sh.extend_from_slice(&row[SH_OFFSET..]);
        }
        Ok(set)
    }

    /// Four axis-marker Gaussians: a small ball at the origin and one
    /// elongated splat one unit along each axis.
    pub fn naive_set() -> Self {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z];
        let scales = [
            Vec3::new(0.03, 0.03, 0.03),
            Vec3::new(0.2, 0.03, 0.03),
            Vec3::new(0.03, 0.2, 0.03),
            Vec3::new(0.03, 0.03, 0.2),
        ];
        let colors: [[f32; 3]; 4] = [[1.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

        let mut set = Self::new(3);
        for ((position, scale), rgb) in positions.into_iter().zip(scales).zip(colors) {
            set.positions.push(position);
            set.rotations.push(IDENTITY_QUAT);
            set.scales.push(scale);
            set.opacities.push(1.0);
            // Store as DC coefficients so the shader's `SH_C0 * c + 0.5` returns `rgb`.
            set.sh.extend(rgb.map(|c| (c - 0.5) / SH_C0));
        }
        set
    }

    /// Reads a 3DGS PLY file and decodes its activations.
    pub fn load_from_file<P: AsRef<Path>>(path: P, max_sh_degree: u32) -> Result<Self, ViewerError> {
        let table = splat_ply::read_file(path)?;
        Self::from_vertex_table(&table, max_sh_degree)
    }

    /// Opacity via sigmoid, scale via exp, rotation normalised, and the
    /// channel-major `f_rest` block transposed to coefficient-major.
    pub fn from_vertex_table(table: &VertexTable, max_sh_degree: u32) -> Result<Self, ViewerError> {
        let layout = GaussianLayout::resolve(table, max_sh_degree)?;
        let n = table.len();
        let k = layout.rest_per_channel();
        let col = |i: usize| table.column_at(i);

        let vec3 = |cols: [usize; 3], i: usize| Vec3::new(col(cols[0])[i], col(cols[1])[i], col(cols[2])[i]);

        let mut set = Self::new(layout.sh_dim());
        set.positions.reserve_exact(n);
        set.rotations.reserve_exact(n);
        set.scales.reserve_exact(n);
        set.opacities.reserve_exact(n);
        set.sh.reserve_exact(n * set.sh_dim);

        let mut degenerate = 0usize;
        for i in 0..n {
            set.positions.push(vec3(layout.position, i));
            set.opacities.push(sigmoid(col(layout.opacity)[i]));
            set.scales.push(vec3(layout.scale, i).exp());

            let q = layout.rotation.map(|c| col(c)[i]);
            if is_degenerate_quat(q) {
                degenerate += 1;
            }
            set.rotations.push(normalize_quat(q));

            set.sh.extend(layout.f_dc.map(|c| col(c)[i]));
            for coeff in 0..k {
                for channel in 0..3 {
                    set.sh.push(col(layout.f_rest[channel * k + coeff])[i]);
                }
            }
        }

        if degenerate > 0 {
            log::warn!("{degenerate} Gaussians had zero-length rotations; replaced with identity");
        }

        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(sh_dim: usize, n: usize) -> GaussianSet {
        let mut set = GaussianSet::new(sh_dim);
        for i in 0..n {
            let f = i as f32;
            set.push(Gaussian {
                position: Vec3::new(f, -f, 0.5 * f),
                rotation: [1.0, 0.1 * f, 0.0, 0.0],
                scale: Vec3::splat(0.1 + f),
                opacity: 0.25,
                sh: (0..sh_dim).map(|s| s as f32 + f).collect(),
            })
            .unwrap();
        }
        set
    }

    #[test]
    fn normalize_quat_is_unit_or_identity() {
        for q in [[1.0, 2.0, 3.0, 4.0], [0.0, 0.0, 0.0, 5.0], [-0.3, 0.1, 1e-3, 0.7]] {
            let u = normalize_quat(q);
            let len = u.iter().map(|c| c * c).sum::<f32>().sqrt();
            assert!((len - 1.0).abs() < 1e-6);
        }
        assert_eq!(normalize_quat([0.0; 4]), IDENTITY_QUAT);
        assert_eq!(normalize_quat([f32::NAN, 0.0, 0.0, 1.0]), IDENTITY_QUAT);
    }

    #[test]
    fn flatten_layout_and_round_trip() {
        for n in [0usize, 1, 7] {
            let set = sample(12, n);
            let flat = set.flatten();
            assert_eq!(flat.len(), n * 23);

            let back = GaussianSet::from_flat(&flat, 12).unwrap();
            assert_eq!(back, set);
            for i in 0..n {
                assert_eq!(back.row(i), set.row(i));
            }
        }

        let set = sample(3, 2);
        let flat = set.flatten();
        // Row 1 starts at 14: position (1, -1, 0.5), then the rotation.
        assert_eq!(&flat[14..17], &[1.0, -1.0, 0.5]);
        assert_eq!(flat[14 + OPACITY_OFFSET], 0.25);
    }

    #[test]
    fn from_flat_rejects_partial_rows() {
        assert!(GaussianSet::from_flat(&[0.0; 15], 3).is_err());
    }

    #[test]
    fn push_and_append_enforce_sh_width() {
        let mut a = sample(3, 2);
        let b = sample(12, 1);
        assert!(a.append(&b).is_err());
        assert!(a
            .push(Gaussian {
                position: Vec3::ZERO,
                rotation: IDENTITY_QUAT,
                scale: Vec3::ONE,
                opacity: 1.0,
                sh: vec![0.0; 4],
            })
            .is_err());

        let c = sample(3, 3);
        a.append(&c).unwrap();
        assert_eq!(a.len(), 5);
        assert_eq!(a.row(2), c.row(0));
    }

    #[test]
    fn push_normalises_rotation() {
        let mut set = GaussianSet::new(3);
        set.push(Gaussian {
            position: Vec3::ZERO,
            rotation: [0.0, 0.0, 0.0, 0.0],
            scale: Vec3::ONE,
            opacity: 1.0,
            sh: vec![0.0; 3],
        })
        .unwrap();
        assert_eq!(set.row(0).unwrap().rotation, IDENTITY_QUAT);
    }

    #[test]
    fn naive_set_shape() {
        let set = GaussianSet::naive_set();
        assert_eq!(set.len(), 4);
        assert_eq!(set.sh_dim(), 3);
        assert_eq!(set.positions()[3], Vec3::Z);

        // DC decodes back to the intended colour.
        let red = set.row(1).unwrap().sh;
        let rgb: Vec<f32> = red.iter().map(|c| SH_C0 * c + 0.5).collect();
        for (got, want) in rgb.iter().zip([1.0, 0.0, 0.0]) {
            assert!((got - want).abs() < 1e-5);
        }
    }

    #[test]
    fn vertex_table_decoding() {
        // Degree 1: 9 rest scalars, 3 per channel.
        let mut names: Vec<String> = ["x", "y", "z", "opacity", "f_dc_0", "f_dc_1", "f_dc_2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        names.extend((0..9).map(|i| format!("f_rest_{i}")));
        names.extend((0..3).map(|i| format!("scale_{i}")));
        names.extend((0..4).map(|i| format!("rot_{i}")));

        let mut row = vec![1.0, 2.0, 3.0, 0.0, 0.1, 0.2, 0.3];
        row.extend((0..9).map(|i| 10.0 + i as f32));
        row.extend([0.0, 1.0f32.ln(), 2.0f32.ln()]);
        row.extend([0.0, 0.0, 0.0, 2.0]);

        let columns = row.iter().map(|&v| vec![v]).collect();
        let table = VertexTable::new(names, columns).unwrap();
        let set = GaussianSet::from_vertex_table(&table, 1).unwrap();

        let g = set.row(0).unwrap();
        assert_eq!(g.position, Vec3::new(1.0, 2.0, 3.0));
        assert!((g.opacity - 0.5).abs() < 1e-6);
        assert!((g.scale - Vec3::new(1.0, 1.0, 2.0)).abs().max_element() < 1e-5);
        assert_eq!(g.rotation, [0.0, 0.0, 0.0, 1.0]);

        // DC, then (coeff 0: r g b), (coeff 1: r g b), (coeff 2: r g b)
        // where channel c, coeff k came from f_rest_{c * 3 + k}.
        assert_eq!(
            g.sh,
            vec![0.1, 0.2, 0.3, 10.0, 13.0, 16.0, 11.0, 14.0, 17.0, 12.0, 15.0, 18.0]
        );
    }

    #[test]
    fn zero_rotation_in_file_decodes_to_identity() {
        let names: Vec<String> = ["x", "y", "z", "opacity", "f_dc_0", "f_dc_1", "f_dc_2"]
            .iter()
            .map(|s| s.to_string())
            .chain((0..3).map(|i| format!("scale_{i}")))
            .chain((0..4).map(|i| format!("rot_{i}")))
            .collect();
        let mut columns: Vec<Vec<f32>> = vec![vec![0.5, -1.0]; names.len()];
        for rot in &mut columns[10..] {
            *rot = vec![0.0, 0.0];
        }
        let table = VertexTable::new(names, columns).unwrap();
        let set = GaussianSet::from_vertex_table(&table, 0).unwrap();

        assert_eq!(set.len(), 2);
        for i in 0..set.len() {
            assert_eq!(set.row(i).unwrap().rotation, IDENTITY_QUAT);
        }
        let flat = set.flatten();
        assert_eq!(flat.len(), 2 * set.row_width());
        assert!(flat.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn wrong_rest_count_is_a_format_error() {
        let names: Vec<String> = ["x", "y", "z", "opacity", "f_dc_0", "f_dc_1", "f_dc_2", "f_rest_0"]
            .iter()
            .map(|s| s.to_string())
            .chain((0..3).map(|i| format!("scale_{i}")))
            .chain((0..4).map(|i| format!("rot_{i}")))
            .collect();
        let columns = names.iter().map(|_| vec![1.0]).collect();
        let table = VertexTable::new(names, columns).unwrap();

        assert!(matches!(
            GaussianSet::from_vertex_table(&table, 3),
            Err(ViewerError::Format(splat_ply::PlyError::PropertyCount { .. }))
        ));
    }
}
