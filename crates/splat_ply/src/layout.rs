//! Fixed 3DGS attribute schema resolved against a decoded vertex table.

use crate::{PlyError, VertexTable};

pub const POSITION_PROPERTIES: [&str; 3] = ["x", "y", "z"];
pub const OPACITY_PROPERTY: &str = "opacity";
pub const DC_PROPERTIES: [&str; 3] = ["f_dc_0", "f_dc_1", "f_dc_2"];
pub const REST_PREFIX: &str = "f_rest_";
pub const SCALE_PREFIX: &str = "scale_";
pub const ROTATION_PREFIX: &str = "rot_";

/// Number of `f_rest_*` scalars for a max SH degree `d`: `3 * (d + 1)^2 - 3`.
#[inline]
pub fn expected_rest_count(max_sh_degree: u32) -> usize {
    sh_dim(max_sh_degree) - 3
}

/// Total colour coefficients per point (DC included): `3 * (d + 1)^2`.
#[inline]
pub fn sh_dim(max_sh_degree: u32) -> usize {
    let bands = max_sh_degree as usize + 1;
    3 * bands * bands
}

/// Column indices of every 3DGS attribute inside a [`VertexTable`].
///
/// Prefixed groups are ordered by their integer suffix, so `f_rest_10`
/// lands after `f_rest_9` regardless of header order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaussianLayout {
    pub position: [usize; 3],
    pub opacity: usize,
    pub f_dc: [usize; 3],
    pub f_rest: Vec<usize>,
    pub scale: [usize; 3],
    pub rotation: [usize; 4],
    pub max_sh_degree: u32,
}

impl GaussianLayout {
    pub fn resolve(table: &VertexTable, max_sh_degree: u32) -> Result<Self, PlyError> {
        let find = |name: &str| {
            table
                .index_of(name)
                .ok_or_else(|| PlyError::MissingProperty(name.to_owned()))
        };

        let position = [
            find(POSITION_PROPERTIES[0])?,
            find(POSITION_PROPERTIES[1])?,
            find(POSITION_PROPERTIES[2])?,
        ];
        let opacity = find(OPACITY_PROPERTY)?;
        let f_dc = [
            find(DC_PROPERTIES[0])?,
            find(DC_PROPERTIES[1])?,
            find(DC_PROPERTIES[2])?,
        ];

        let f_rest = suffixed_group(table, REST_PREFIX, expected_rest_count(max_sh_degree))?;
        let scale = suffixed_group(table, SCALE_PREFIX, 3)?;
        let rotation = suffixed_group(table, ROTATION_PREFIX, 4)?;

        Ok(Self {
            position,
            opacity,
            f_dc,
            f_rest,
            scale: [scale[0], scale[1], scale[2]],
            rotation: [rotation[0], rotation[1], rotation[2], rotation[3]],
            max_sh_degree,
        })
    }

    /// Extra coefficients per colour channel (15 for degree 3).
    #[inline]
    pub fn rest_per_channel(&self) -> usize {
        self.f_rest.len() / 3
    }

    #[inline]
    pub fn sh_dim(&self) -> usize {
        3 + self.f_rest.len()
    }
}

/// Collects `<prefix><n>` columns sorted numerically by `n`.
fn suffixed_group(table: &VertexTable, prefix: &str, expected: usize) -> Result<Vec<usize>, PlyError> {
    let mut group = Vec::<(u32, usize)>::new();

    for (index, name) in table.names().iter().enumerate() {
        let Some(suffix) = name.strip_prefix(prefix) else {
            continue;
        };
        let n = suffix
            .parse::<u32>()
            .map_err(|_| PlyError::BadSuffix(name.clone()))?;
        group.push((n, index));
    }

    if group.len() != expected {
        return Err(PlyError::PropertyCount {
            prefix: prefix.to_owned(),
            expected,
            found: group.len(),
        });
    }

    group.sort_unstable_by_key(|&(n, _)| n);
    if let Some(w) = group.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(PlyError::BadSuffix(table.names()[w[1].1].clone()));
    }

    Ok(group.into_iter().map(|(_, index)| index).collect())
}
