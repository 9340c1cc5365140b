// brush.rs -- convex brush solving
//
// A brush is the intersection of the half-spaces of its faces. Solving
// intersects every triple of face planes, keeps the points that lie inside
// all other half-spaces, and winds each face's ring of vertices counter-clockwise
// as seen from outside the brush.

use std::fmt;

use thiserror::Error;

use jdlevel_common::q_shared::{
    cross_product, dot_product, vector_average, vector_normalized, vector_subtract, Aabb, Vec2,
    Vec3,
};

use crate::face::Face;

/// A candidate vertex is rejected once it lies this far outside a face,
/// measured as the cosine between the face normal and the direction from
/// the face's point centroid to the vertex.
pub const VERTEX_INSIDE_EPSILON: f32 = 0.001;

/// Intersection coordinates this close to an integer are snapped to it.
pub const VERTEX_SNAP_EPSILON: f64 = 0.001;

/// Three planes whose normals' triple product is smaller than this have no
/// single common point.
const PARALLEL_EPSILON: f64 = 1e-9;

/// Location of a brush inside its map: owning entity and geometry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BrushId {
    pub entity: usize,
    pub geo: usize,
}

impl fmt::Display for BrushId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity {} brush {}", self.entity, self.geo)
    }
}

/// Non-fatal problems found while solving. The brush is kept either way.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryWarning {
    #[error("brush has only {faces} faces, at least 4 are needed")]
    TooFewFaces { faces: usize },

    #[error("face {face} has collinear points")]
    DegeneratePlane { face: usize },

    #[error("no plane intersection lies inside the brush")]
    NoVertices,

    #[error("face {face} touches no vertex")]
    FaceWithoutVertices { face: usize },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Brush {
    pub id: BrushId,
    pub faces: Vec<Face>,
    /// Unique solved vertices.
    pub verts: Vec<Vec3>,
    /// Unique texture coordinates.
    pub uvs: Vec<Vec2>,
}

// ============================================================
// Plane math (f64)
// ============================================================

type DVec3 = [f64; 3];

fn to_f64(v: &Vec3) -> DVec3 {
    [v[0] as f64, v[1] as f64, v[2] as f64]
}

fn dot64(a: &DVec3, b: &DVec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross64(a: &DVec3, b: &DVec3) -> DVec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn sub64(a: &DVec3, b: &DVec3) -> DVec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Face plane recomputed in double precision from the three source points.
fn face_plane64(face: &Face) -> (DVec3, f64) {
    let p1 = to_f64(&face.p1);
    let n = cross64(&sub64(&to_f64(&face.p2), &p1), &sub64(&to_f64(&face.p3), &p1));
    let len = dot64(&n, &n).sqrt();
    if len == 0.0 {
        return ([0.0; 3], 0.0);
    }
    let n = [n[0] / len, n[1] / len, n[2] / len];
    (n, dot64(&n, &p1))
}

/// Common point of three planes, `None` when any two are parallel.
fn intersect_planes(a: &(DVec3, f64), b: &(DVec3, f64), c: &(DVec3, f64)) -> Option<DVec3> {
    let n2xn3 = cross64(&b.0, &c.0);
    let denom = dot64(&a.0, &n2xn3);
    if denom.abs() < PARALLEL_EPSILON {
        return None;
    }
    let n3xn1 = cross64(&c.0, &a.0);
    let n1xn2 = cross64(&a.0, &b.0);
    let mut p = [0.0; 3];
    for i in 0..3 {
        p[i] = (a.1 * n2xn3[i] + b.1 * n3xn1[i] + c.1 * n1xn2[i]) / denom;
    }
    Some(p)
}

fn snap(p: &DVec3) -> Vec3 {
    let mut out = [0.0f32; 3];
    for i in 0..3 {
        let r = p[i].round();
        let c = if (p[i] - r).abs() < VERTEX_SNAP_EPSILON { r } else { p[i] };
        out[i] = c as f32;
    }
    out
}

// ============================================================
// Brush
// ============================================================

impl Brush {
    pub fn new(id: BrushId) -> Self {
        Brush {
            id,
            ..Default::default()
        }
    }

    pub fn is_solved(&self) -> bool {
        !self.verts.is_empty()
    }

    /// True when `vert` is on or inside every face's half-space.
    pub fn is_vert_legal(&self, vert: &Vec3) -> bool {
        self.faces.iter().all(|face| {
            let facing = vector_normalized(&vector_subtract(vert, &face.point_center()));
            dot_product(&facing, &face.normal()) >= -VERTEX_INSIDE_EPSILON
        })
    }

    /// Index of `vert` in `verts`, appending it if new.
    fn add_vert(&mut self, vert: Vec3) -> usize {
        if let Some(idx) = self.verts.iter().position(|v| *v == vert) {
            return idx;
        }
        self.verts.push(vert);
        self.verts.len() - 1
    }

    fn add_uv(&mut self, uv: Vec2) -> usize {
        if let Some(idx) = self.uvs.iter().position(|t| *t == uv) {
            return idx;
        }
        self.uvs.push(uv);
        self.uvs.len() - 1
    }

    /// Compute the vertices of the brush and wind every face. Any previous
    /// solution is discarded first.
    pub fn solve(&mut self) -> Vec<GeometryWarning> {
        let mut warnings = Vec::new();

        self.verts.clear();
        for face in &mut self.faces {
            face.vert_idx.clear();
            face.uv_idx.clear();
            face.center = None;
        }

        if self.faces.len() < 4 {
            warnings.push(GeometryWarning::TooFewFaces {
                faces: self.faces.len(),
            });
            return warnings;
        }

        for (i, face) in self.faces.iter().enumerate() {
            if face.plane.is_degenerate() {
                warnings.push(GeometryWarning::DegeneratePlane { face: i });
            }
        }

        let planes: Vec<(DVec3, f64)> = self.faces.iter().map(face_plane64).collect();
        let n = self.faces.len();
        for i in 0..n {
            for j in i + 1..n {
                for k in j + 1..n {
                    let Some(p) = intersect_planes(&planes[i], &planes[j], &planes[k]) else {
                        continue;
                    };
                    let vert = snap(&p);
                    if !self.is_vert_legal(&vert) {
                        continue;
                    }
                    let idx = self.add_vert(vert);
                    for f in [i, j, k] {
                        self.faces[f].add_vert_index(idx);
                    }
                }
            }
        }

        if self.verts.is_empty() {
            warnings.push(GeometryWarning::NoVertices);
            return warnings;
        }

        let verts = &self.verts;
        for (i, face) in self.faces.iter_mut().enumerate() {
            if !sort_face_vertices(face, verts) {
                warnings.push(GeometryWarning::FaceWithoutVertices { face: i });
            }
        }

        warnings
    }

    /// Project texture coordinates for every solved face, rebuilding the
    /// brush's UV list.
    pub fn calculate_uvs(&mut self) {
        self.uvs.clear();
        for f in 0..self.faces.len() {
            let projected = self.faces[f].project_uvs(&self.verts);
            let idx: Vec<usize> = projected.into_iter().map(|uv| self.add_uv(uv)).collect();
            self.faces[f].uv_idx = idx;
        }
    }

    /// Bounds of the solved vertices, `None` before solving.
    pub fn bounding_box(&self) -> Option<Aabb> {
        Aabb::from_points(&self.verts)
    }
}

/// Order a face's vertices by angle around its centroid so the ring winds
/// counter-clockwise seen from outside. The plane normal points into the
/// brush, so every later vertex is clockwise of the one before about it.
/// Returns false when the face has no vertices.
fn sort_face_vertices(face: &mut Face, verts: &[Vec3]) -> bool {
    let Some(center) = vector_average(face.verts(verts)) else {
        return false;
    };
    face.center = Some(center);

    let normal = face.normal();
    let r = vector_normalized(&vector_subtract(&verts[face.vert_idx[0]], &center));
    let s = cross_product(&r, &normal);

    let mut keyed: Vec<(f32, usize)> = face
        .vert_idx
        .iter()
        .map(|&i| {
            let d = vector_subtract(&verts[i], &center);
            (dot_product(&d, &s).atan2(dot_product(&d, &r)), i)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    face.vert_idx = keyed.into_iter().map(|(_, i)| i).collect();
    true
}

impl fmt::Display for Brush {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        for face in &self.faces {
            writeln!(f, "{face}")?;
        }
        writeln!(f, "}}")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::{StandardUV, TexAlign};

    fn align() -> TexAlign {
        TexAlign::Standard(StandardUV {
            x_offset: 0.0,
            y_offset: 0.0,
            rotation: 0.0,
            x_scale: 1.0,
            y_scale: 1.0,
        })
    }

    /// Axis-aligned box written the way editors write it (normals inward).
    fn box_brush(mins: Vec3, maxs: Vec3) -> Brush {
        let [x0, y0, z0] = mins;
        let [x1, y1, z1] = maxs;
        let pts: [[Vec3; 3]; 6] = [
            [[x0, y0, z0], [x0, y0 + 1.0, z0], [x0, y0, z0 + 1.0]],
            [[x0, y0, z0], [x0, y0, z0 + 1.0], [x0 + 1.0, y0, z0]],
            [[x0, y0, z0], [x0 + 1.0, y0, z0], [x0, y0 + 1.0, z0]],
            [[x1, y1, z1], [x1, y1 + 1.0, z1], [x1 + 1.0, y1, z1]],
            [[x1, y1, z1], [x1 + 1.0, y1, z1], [x1, y1, z1 + 1.0]],
            [[x1, y1, z1], [x1, y1, z1 + 1.0], [x1, y1 + 1.0, z1]],
        ];
        let mut brush = Brush::new(BrushId::default());
        brush.faces = pts.iter().map(|p| Face::new(*p, "tex/a", align())).collect();
        brush
    }

    #[test]
    fn intersect_axis_planes() {
        let px = ([1.0, 0.0, 0.0], 3.0);
        let py = ([0.0, 1.0, 0.0], -2.0);
        let pz = ([0.0, 0.0, 1.0], 5.0);
        assert_eq!(intersect_planes(&px, &py, &pz), Some([3.0, -2.0, 5.0]));
        assert_eq!(intersect_planes(&px, &px, &pz), None);
    }

    #[test]
    fn snap_near_integers_only() {
        assert_eq!(snap(&[63.9999, -0.0004, 10.5]), [64.0, 0.0, 10.5]);
    }

    #[test]
    fn cube_solves_to_eight_vertices() {
        let mut brush = box_brush([-64.0, -64.0, -16.0], [64.0, 64.0, 16.0]);
        let warnings = brush.solve();
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(brush.verts.len(), 8);
        for face in &brush.faces {
            assert_eq!(face.vert_idx.len(), 4);
            assert!(face.winding_area(&brush.verts) > 0.0);
            assert!(face.center.is_some());
        }
        let bounds = brush.bounding_box().unwrap();
        assert_eq!(bounds.mins, [-64.0, -64.0, -16.0]);
        assert_eq!(bounds.maxs, [64.0, 64.0, 16.0]);
    }

    #[test]
    fn rings_step_clockwise_about_plane_normal() {
        let mut brush = box_brush([0.0; 3], [32.0, 16.0, 8.0]);
        brush.solve();
        for face in &brush.faces {
            let c = face.center.unwrap();
            let n = face.normal();
            let ring: Vec<Vec3> = face.verts(&brush.verts).copied().collect();
            for i in 0..ring.len() {
                let a = vector_subtract(&c, &ring[i]);
                let b = vector_subtract(&c, &ring[(i + 1) % ring.len()]);
                assert!(dot_product(&n, &cross_product(&a, &b)) < 0.0);
            }
        }

        // top face: counter-clockwise seen from above
        let top = &brush.faces[3];
        assert_eq!(top.normal(), [0.0, 0.0, -1.0]);
        let ring: Vec<Vec3> = top.verts(&brush.verts).copied().collect();
        let e1 = vector_subtract(&ring[1], &ring[0]);
        let e2 = vector_subtract(&ring[2], &ring[1]);
        assert!(cross_product(&e1, &e2)[2] > 0.0);
    }

    #[test]
    fn face_centers_lie_on_their_planes() {
        let mut brush = box_brush([0.0; 3], [32.0, 16.0, 8.0]);
        brush.solve();
        for face in &brush.faces {
            let c = face.center.unwrap();
            assert!(face.plane.distance_to(&c).abs() < 1e-4);
        }
    }

    #[test]
    fn every_vertex_is_legal() {
        let mut brush = box_brush([0.0; 3], [10.0; 3]);
        brush.solve();
        assert!(brush.verts.iter().all(|v| brush.is_vert_legal(v)));
        assert!(!brush.is_vert_legal(&[20.0, 5.0, 5.0]));
    }

    #[test]
    fn extra_coplanar_face_does_not_duplicate_vertices() {
        let mut brush = box_brush([0.0; 3], [10.0; 3]);
        let dup = brush.faces[0].clone();
        brush.faces.push(dup);
        brush.solve();
        assert_eq!(brush.verts.len(), 8);
    }

    #[test]
    fn wedge_has_six_vertices() {
        // box cut down to the part on the +X/+Z side of the x + z = 64 diagonal
        let mut brush = box_brush([0.0; 3], [64.0; 3]);
        brush.faces.push(Face::new(
            [[64.0, 0.0, 0.0], [64.0, 1.0, 0.0], [0.0, 0.0, 64.0]],
            "tex/a",
            align(),
        ));
        let warnings = brush.solve();
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(brush.verts.len(), 6);
        let cut = brush.faces.last().unwrap();
        assert_eq!(cut.vert_idx.len(), 4);
        assert!(cut.winding_area(&brush.verts) > 0.0);
    }

    #[test]
    fn too_few_faces() {
        let mut brush = box_brush([0.0; 3], [1.0; 3]);
        brush.faces.truncate(3);
        assert_eq!(brush.solve(), vec![GeometryWarning::TooFewFaces { faces: 3 }]);
        assert!(!brush.is_solved());
        assert!(brush.bounding_box().is_none());
    }

    #[test]
    fn open_brush_has_no_vertices() {
        // four faces, all parallel to Z: no triple meets in one point
        let mut brush = box_brush([0.0; 3], [1.0; 3]);
        brush.faces.retain(|f| f.normal()[2] == 0.0);
        assert_eq!(brush.faces.len(), 4);
        assert!(brush.solve().contains(&GeometryWarning::NoVertices));
        assert!(brush.verts.is_empty());
    }

    #[test]
    fn degenerate_plane_is_reported() {
        let mut brush = box_brush([0.0; 3], [8.0; 3]);
        brush.faces.push(Face::new([[0.0; 3], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]], "tex/a", align()));
        let warnings = brush.solve();
        assert!(warnings.contains(&GeometryWarning::DegeneratePlane { face: 6 }));
        assert!(warnings.contains(&GeometryWarning::FaceWithoutVertices { face: 6 }));
        assert_eq!(brush.verts.len(), 8);
    }

    #[test]
    fn resolving_is_idempotent() {
        let mut brush = box_brush([0.0; 3], [8.0; 3]);
        brush.solve();
        let first = brush.clone();
        brush.solve();
        assert_eq!(brush.verts, first.verts);
        assert_eq!(brush.faces, first.faces);
    }

    #[test]
    fn uvs_are_deduplicated_and_parallel() {
        let mut brush = box_brush([0.0; 3], [512.0; 3]);
        brush.solve();
        brush.calculate_uvs();
        for face in &brush.faces {
            assert_eq!(face.uv_idx.len(), face.vert_idx.len());
            assert!(face.uv_idx.iter().all(|&i| i < brush.uvs.len()));
        }
        // a 512 cube on a 512 texture only ever lands on whole texture corners
        for uv in &brush.uvs {
            assert!(uv[0].fract() == 0.0 && uv[1].fract() == 0.0);
        }
        for (i, a) in brush.uvs.iter().enumerate() {
            assert!(!brush.uvs[i + 1..].contains(a));
        }
    }
}
