// patch.rs -- patchDef2 curves
//
// A patch is a grid of control points, odd in both directions. Every 3x3
// window starting on an even row and column is one biquadratic Bezier
// surface; neighbouring windows share their border row or column.

use std::fmt;
use std::ops::{Add, Mul};

use jdlevel_common::q_shared::{vector_add, vector_scale, Vec2, Vec3};

use crate::face::fmt_vec3;
use crate::map::{LineTokens, ParseError};

/// Tessellation level used when nothing else is configured.
pub const DEFAULT_TESS_LEVEL: u32 = 8;

/// One control point: position and texture coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PatchVert {
    pub pos: Vec3,
    pub uv: Vec2,
}

impl Add for PatchVert {
    type Output = PatchVert;

    fn add(self, other: PatchVert) -> PatchVert {
        PatchVert {
            pos: vector_add(&self.pos, &other.pos),
            uv: [self.uv[0] + other.uv[0], self.uv[1] + other.uv[1]],
        }
    }
}

impl Mul<f32> for PatchVert {
    type Output = PatchVert;

    fn mul(self, w: f32) -> PatchVert {
        PatchVert {
            pos: vector_scale(&self.pos, w),
            uv: [self.uv[0] * w, self.uv[1] * w],
        }
    }
}

impl PatchVert {
    /// `( ( x y z u v ) ( x y z u v ) ... )`
    pub(crate) fn parse_row(toks: &mut LineTokens<'_>) -> Result<Vec<PatchVert>, ParseError> {
        toks.expect("(")?;
        let mut row = Vec::new();
        while toks.peek() == Some("(") {
            toks.expect("(")?;
            let pos = [toks.float()?, toks.float()?, toks.float()?];
            let uv = [toks.float()?, toks.float()?];
            toks.expect(")")?;
            row.push(PatchVert { pos, uv });
        }
        toks.expect(")")?;
        if !toks.is_empty() {
            let extra = toks.next()?;
            return Err(ParseError::Unexpected {
                line: toks.line(),
                token: extra.to_string(),
            });
        }
        Ok(row)
    }
}

/// 3x3 control points of one quadratic Bezier surface, `[row][col]`.
pub type ControlGrid = [[PatchVert; 3]; 3];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Patch {
    /// Number of control rows (lines in the source).
    pub rows: usize,
    /// Control points per row.
    pub cols: usize,
    pub material: String,
    pub verts: Vec<Vec<PatchVert>>,
}

/// Tessellated surface. Triangles index into `verts`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatchMesh {
    pub verts: Vec<PatchVert>,
    pub triangles: Vec<[u32; 3]>,
}

impl PatchMesh {
    /// Append another mesh, rebasing its indices.
    pub fn append(&mut self, other: PatchMesh) {
        let base = self.verts.len() as u32;
        self.verts.extend(other.verts);
        self.triangles
            .extend(other.triangles.into_iter().map(|t| [t[0] + base, t[1] + base, t[2] + base]));
    }
}

// ============================================================
// Bezier evaluation
// ============================================================

pub fn binomial_coefficient(n: u32, k: u32) -> u32 {
    if k > n {
        return 0;
    }
    let mut c = 1;
    for i in 0..k {
        c = c * (n - i) / (i + 1);
    }
    c
}

/// Bernstein basis polynomial b(n, k) at t.
pub fn bernstein(n: u32, k: u32, t: f32) -> f32 {
    binomial_coefficient(n, k) as f32 * t.powi(k as i32) * (1.0 - t).powi((n - k) as i32)
}

/// Point on the surface at (u, v), both in [0, 1]. `u` runs along a row
/// (across columns), `v` down the rows.
pub fn evaluate_quadratic_bezier_patch(cp: &ControlGrid, u: f32, v: f32) -> PatchVert {
    let mut out = PatchVert::default();
    for (i, row) in cp.iter().enumerate() {
        let bv = bernstein(2, i as u32, v);
        for (j, point) in row.iter().enumerate() {
            out = out + *point * (bv * bernstein(2, j as u32, u));
        }
    }
    out
}

/// Sample a 3x3 grid at (level + 1)^2 points and stitch two triangles per
/// cell. A level below 1 is raised to 1.
pub fn tessellate_control_grid(cp: &ControlGrid, level: u32) -> PatchMesh {
    let level = level.max(1);
    let step = level as f32;
    let mut mesh = PatchMesh::default();

    for y in 0..=level {
        for x in 0..=level {
            mesh.verts
                .push(evaluate_quadratic_bezier_patch(cp, x as f32 / step, y as f32 / step));
        }
    }

    let stride = level + 1;
    for y in 0..level {
        for x in 0..level {
            let i0 = y * stride + x;
            let i1 = i0 + 1;
            let i2 = i0 + stride;
            let i3 = i2 + 1;
            mesh.triangles.push([i0, i2, i1]);
            mesh.triangles.push([i1, i2, i3]);
        }
    }
    mesh
}

// ============================================================
// Patch
// ============================================================

impl Patch {
    pub fn new(rows: usize, cols: usize, material: impl Into<String>) -> Self {
        Patch {
            rows,
            cols,
            material: material.into(),
            verts: Vec::new(),
        }
    }

    /// Control grid of a 3x3 patch, `None` for any other shape.
    pub fn control_grid(&self) -> Option<ControlGrid> {
        if self.verts.len() != 3 || self.verts.iter().any(|r| r.len() != 3) {
            return None;
        }
        let mut cp = [[PatchVert::default(); 3]; 3];
        for (r, row) in self.verts.iter().enumerate() {
            cp[r].copy_from_slice(row);
        }
        Some(cp)
    }

    /// Split into 3x3 patches, one per window starting at an even row and
    /// column. A 3x3 patch comes back as itself.
    pub fn slice(&self) -> Vec<Patch> {
        let rows = self.verts.len();
        let cols = self.verts.first().map_or(0, Vec::len);
        if rows < 3 || cols < 3 {
            return Vec::new();
        }

        let mut out = Vec::new();
        for r in (0..rows - 2).step_by(2) {
            for c in (0..cols - 2).step_by(2) {
                let mut piece = Patch::new(3, 3, self.material.clone());
                piece.verts = self.verts[r..r + 3]
                    .iter()
                    .map(|row| row[c..c + 3].to_vec())
                    .collect();
                out.push(piece);
            }
        }
        out
    }

    /// Tessellate every 3x3 window and merge the results.
    pub fn tessellate(&self, level: u32) -> PatchMesh {
        let mut mesh = PatchMesh::default();
        for piece in self.slice() {
            if let Some(cp) = piece.control_grid() {
                mesh.append(tessellate_control_grid(&cp, level));
            }
        }
        mesh
    }
}

impl fmt::Display for PatchVert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "( {} {} {} )", fmt_vec3(&self.pos), self.uv[0], self.uv[1])
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        writeln!(f, "patchDef2")?;
        writeln!(f, "{{")?;
        writeln!(f, "{}", self.material)?;
        writeln!(f, "( {} {} 0 0 0 )", self.rows, self.cols)?;
        writeln!(f, "(")?;
        for row in &self.verts {
            write!(f, "(")?;
            for v in row {
                write!(f, " {v}")?;
            }
            writeln!(f, " )")?;
        }
        writeln!(f, ")")?;
        writeln!(f, "}}")?;
        writeln!(f, "}}")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat grid on the XY plane, control point (r, c) at (16c, 16r, 0).
    fn grid(rows: usize, cols: usize) -> Patch {
        let mut p = Patch::new(rows, cols, "curve/test");
        p.verts = (0..rows)
            .map(|r| {
                (0..cols)
                    .map(|c| PatchVert {
                        pos: [16.0 * c as f32, 16.0 * r as f32, 0.0],
                        uv: [c as f32, r as f32],
                    })
                    .collect()
            })
            .collect();
        p
    }

    #[test]
    fn binomials() {
        assert_eq!(binomial_coefficient(2, 0), 1);
        assert_eq!(binomial_coefficient(2, 1), 2);
        assert_eq!(binomial_coefficient(2, 2), 1);
        assert_eq!(binomial_coefficient(6, 3), 20);
        assert_eq!(binomial_coefficient(2, 3), 0);
    }

    #[test]
    fn bernstein_partition_of_unity() {
        for t in [0.0, 0.25, 0.5, 0.9, 1.0] {
            let sum: f32 = (0..=2).map(|k| bernstein(2, k, t)).sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn slice_three_by_three_is_identity() {
        let p = grid(3, 3);
        assert_eq!(p.slice(), vec![p.clone()]);
    }

    #[test]
    fn slice_windows_share_borders() {
        let p = grid(5, 5);
        let pieces = p.slice();
        assert_eq!(pieces.len(), 4);
        assert_eq!(pieces[0].verts[2][2], pieces[3].verts[0][0]);
        assert_eq!(pieces[1].verts[0][0], p.verts[0][2]);
        assert_eq!(pieces[2].verts[0][0], p.verts[2][0]);
    }

    #[test]
    fn slice_counts() {
        assert_eq!(grid(3, 7).slice().len(), 3);
        assert_eq!(grid(7, 7).slice().len(), 9);
        assert!(Patch::new(3, 3, "x").slice().is_empty());
    }

    #[test]
    fn level_one_hits_corners() {
        let p = grid(3, 3);
        let cp = p.control_grid().unwrap();
        let mesh = tessellate_control_grid(&cp, 1);
        assert_eq!(mesh.verts.len(), 4);
        assert_eq!(mesh.verts[0], cp[0][0]);
        assert_eq!(mesh.verts[1], cp[0][2]);
        assert_eq!(mesh.verts[2], cp[2][0]);
        assert_eq!(mesh.verts[3], cp[2][2]);
        assert_eq!(mesh.triangles, vec![[0, 2, 1], [1, 2, 3]]);
    }

    #[test]
    fn u_runs_along_rows_and_cells_face_down() {
        use jdlevel_common::q_shared::{cross_product, vector_subtract};

        let cp = grid(3, 3).control_grid().unwrap();
        assert_eq!(evaluate_quadratic_bezier_patch(&cp, 1.0, 0.0).pos, [32.0, 0.0, 0.0]);
        assert_eq!(evaluate_quadratic_bezier_patch(&cp, 0.0, 1.0).pos, [0.0, 32.0, 0.0]);

        let mesh = tessellate_control_grid(&cp, 2);
        for tri in &mesh.triangles {
            let [a, b, c] = tri.map(|i| mesh.verts[i as usize].pos);
            let n = cross_product(&vector_subtract(&b, &a), &vector_subtract(&c, &a));
            assert!(n[2] < 0.0);
        }
    }

    #[test]
    fn level_zero_is_clamped() {
        let cp = grid(3, 3).control_grid().unwrap();
        assert_eq!(tessellate_control_grid(&cp, 0), tessellate_control_grid(&cp, 1));
    }

    #[test]
    fn mesh_sizes() {
        let cp = grid(3, 3).control_grid().unwrap();
        let mesh = tessellate_control_grid(&cp, 8);
        assert_eq!(mesh.verts.len(), 81);
        assert_eq!(mesh.triangles.len(), 128);
        assert!(mesh.triangles.iter().flatten().all(|&i| (i as usize) < mesh.verts.len()));
    }

    #[test]
    fn curved_patch_midpoint() {
        let mut p = grid(3, 3);
        p.verts[1][1].pos[2] = 32.0;
        let cp = p.control_grid().unwrap();
        let mid = evaluate_quadratic_bezier_patch(&cp, 0.5, 0.5);
        // B(2,1,0.5)^2 = 0.25
        assert!((mid.pos[2] - 8.0).abs() < 1e-5);
        assert!((mid.pos[0] - 16.0).abs() < 1e-5);
        assert!((mid.uv[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn tessellate_whole_patch_rebases_indices() {
        let mesh = grid(3, 5).tessellate(2);
        assert_eq!(mesh.verts.len(), 2 * 9);
        assert_eq!(mesh.triangles.len(), 2 * 8);
        assert!(mesh.triangles[8..].iter().flatten().all(|&i| i >= 9));
    }

    #[test]
    fn parse_row_rejects_trailing_tokens() {
        let mut toks = LineTokens::new("( ( 0 0 0 0 0 ) ) junk", 4);
        let err = PatchVert::parse_row(&mut toks).unwrap_err();
        assert_eq!(err.token(), "junk");
        assert_eq!(err.line(), 4);
    }
}
