// face.rs -- brush faces, their planes and texture alignment
//
// A face is one half-space of a brush, given by three points on its plane.
// The plane normal is (p2 - p1) x (p3 - p1), which for maps written by the
// usual editors faces into the brush volume.

use std::fmt;

use jdlevel_common::q_shared::{
    cross_product, dot_product, vector_add, vector_length, vector_normalized, vector_scale,
    vector_subtract, Vec2, Vec3, AXIS_FORWARD, AXIS_RIGHT, AXIS_UP,
};

use crate::map::{LineTokens, ParseError};

/// Texture size assumed until the host supplies a real one.
pub const DEFAULT_TEX_SIZE: Vec2 = [512.0, 512.0];

// ============================================================
// Plane
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
}

impl Plane {
    /// Plane through three points. A degenerate (collinear) triple yields a
    /// zero normal.
    pub fn from_points(p1: &Vec3, p2: &Vec3, p3: &Vec3) -> Self {
        let ab = vector_subtract(p2, p1);
        let ac = vector_subtract(p3, p1);
        let normal = vector_normalized(&cross_product(&ab, &ac));
        Plane {
            normal,
            dist: dot_product(p1, &normal),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        vector_length(&self.normal) == 0.0
    }

    /// Signed distance from the plane, positive on the side the normal faces.
    pub fn distance_to(&self, p: &Vec3) -> f32 {
        dot_product(p, &self.normal) - self.dist
    }
}

// ============================================================
// Texture alignment
// ============================================================

/// Quake-style alignment: the texture is projected along the dominant world
/// axis, then rotated, scaled and shifted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardUV {
    pub x_offset: f32,
    pub y_offset: f32,
    pub rotation: f32,
    pub x_scale: f32,
    pub y_scale: f32,
}

/// Valve 220 alignment: explicit texture axes, which may be skewed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValveUV {
    pub u_axis: Vec3,
    pub u_offset: f32,
    pub v_axis: Vec3,
    pub v_offset: f32,
    /// Kept for writing the face back out; the axes already carry it.
    pub rotation: f32,
    pub u_scale: f32,
    pub v_scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TexAlign {
    Standard(StandardUV),
    Valve(ValveUV),
}

/// Editors write a scale of 0 to mean "unscaled".
fn effective_scale(scale: f32) -> f32 {
    if scale == 0.0 {
        1.0
    } else {
        scale
    }
}

impl StandardUV {
    pub fn uv(&self, vertex: &Vec3, normal: &Vec3, tex_size: &Vec2) -> Vec2 {
        let du = dot_product(normal, &AXIS_UP).abs();
        let dr = dot_product(normal, &AXIS_RIGHT).abs();
        let df = dot_product(normal, &AXIS_FORWARD).abs();

        let (u, v) = if du >= dr && du >= df {
            (vertex[0], -vertex[1])
        } else if dr >= du && dr >= df {
            (vertex[0], -vertex[2])
        } else {
            (vertex[1], -vertex[2])
        };

        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let mut uv = [u * cos - v * sin, u * sin + v * cos];

        uv[0] /= tex_size[0];
        uv[1] /= tex_size[1];
        uv[0] /= effective_scale(self.x_scale);
        uv[1] /= effective_scale(self.y_scale);
        uv[0] += self.x_offset / tex_size[0];
        uv[1] += self.y_offset / tex_size[1];
        uv
    }
}

impl ValveUV {
    pub fn uv(&self, vertex: &Vec3, tex_size: &Vec2) -> Vec2 {
        [
            dot_product(vertex, &self.u_axis) / (tex_size[0] * effective_scale(self.u_scale))
                + self.u_offset / tex_size[0],
            dot_product(vertex, &self.v_axis) / (tex_size[1] * effective_scale(self.v_scale))
                + self.v_offset / tex_size[1],
        ]
    }
}

impl TexAlign {
    pub fn uv(&self, vertex: &Vec3, normal: &Vec3, tex_size: &Vec2) -> Vec2 {
        match self {
            TexAlign::Standard(s) => s.uv(vertex, normal, tex_size),
            TexAlign::Valve(v) => v.uv(vertex, tex_size),
        }
    }
}

// ============================================================
// Face
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub p1: Vec3,
    pub p2: Vec3,
    pub p3: Vec3,
    pub material: String,
    pub align: TexAlign,
    pub tex_size: Vec2,
    /// Derived from p1..p3 once, at construction.
    pub plane: Plane,
    /// Average of the solved vertices; `None` until solved.
    pub center: Option<Vec3>,
    /// Indices into the owning brush's `verts`, in winding order.
    pub vert_idx: Vec<usize>,
    /// Indices into the owning brush's `uvs`, parallel to `vert_idx`.
    pub uv_idx: Vec<usize>,
    /// Second UV set supplied by the host's unwrap, parallel to `vert_idx`.
    pub lightmap_uvs: Vec<Vec2>,
}

impl Face {
    pub fn new(points: [Vec3; 3], material: impl Into<String>, align: TexAlign) -> Self {
        let [p1, p2, p3] = points;
        Face {
            p1,
            p2,
            p3,
            material: material.into(),
            align,
            tex_size: DEFAULT_TEX_SIZE,
            plane: Plane::from_points(&p1, &p2, &p3),
            center: None,
            vert_idx: Vec::new(),
            uv_idx: Vec::new(),
            lightmap_uvs: Vec::new(),
        }
    }

    pub fn normal(&self) -> Vec3 {
        self.plane.normal
    }

    /// Centroid of the three defining points, used for the inside test.
    pub fn point_center(&self) -> Vec3 {
        vector_scale(&vector_add(&vector_add(&self.p1, &self.p2), &self.p3), 1.0 / 3.0)
    }

    /// Register a brush vertex with this face, ignoring duplicates.
    pub fn add_vert_index(&mut self, idx: usize) {
        if !self.vert_idx.contains(&idx) {
            self.vert_idx.push(idx);
        }
    }

    /// Positions of this face's ring, resolved against the owning brush.
    pub fn verts<'a>(&'a self, brush_verts: &'a [Vec3]) -> impl Iterator<Item = &'a Vec3> + 'a {
        self.vert_idx.iter().map(move |&i| &brush_verts[i])
    }

    /// Texture coordinates for every vertex of the ring, in ring order.
    pub fn project_uvs(&self, brush_verts: &[Vec3]) -> Vec<Vec2> {
        let normal = self.plane.normal;
        self.verts(brush_verts)
            .map(|v| self.align.uv(v, &normal, &self.tex_size))
            .collect()
    }

    /// Twice the signed area of the ring measured along the outward normal
    /// (the plane normal faces into the brush). Positive for a correctly
    /// wound face.
    pub fn winding_area(&self, brush_verts: &[Vec3]) -> f32 {
        let ring: Vec<&Vec3> = self.verts(brush_verts).collect();
        if ring.len() < 3 {
            return 0.0;
        }
        let outward = vector_scale(&self.plane.normal, -1.0);
        let origin = ring[0];
        let mut area = 0.0;
        for i in 1..ring.len() - 1 {
            let a = vector_subtract(ring[i], origin);
            let b = vector_subtract(ring[i + 1], origin);
            area += dot_product(&cross_product(&a, &b), &outward);
        }
        area
    }

    /// Fan triangulation as positions in the ring (index into `vert_idx`
    /// and `uv_idx`), keeping the ring's winding.
    pub fn triangulate(&self) -> Vec<[usize; 3]> {
        let n = self.vert_idx.len();
        if n < 3 {
            return Vec::new();
        }
        (1..n - 1).map(|i| [0, i, i + 1]).collect()
    }

    /// Parse `( x y z ) ( x y z ) ( x y z ) material <alignment>`.
    /// Trailing content/surface flags written by some editors are ignored.
    pub(crate) fn parse(toks: &mut LineTokens<'_>) -> Result<Face, ParseError> {
        let p1 = toks.point()?;
        let p2 = toks.point()?;
        let p3 = toks.point()?;
        let material = toks.word()?.to_lowercase();

        let align = if toks.peek() == Some("[") {
            toks.expect("[")?;
            let u_axis = [toks.float()?, toks.float()?, toks.float()?];
            let u_offset = toks.float()?;
            toks.expect("]")?;
            toks.expect("[")?;
            let v_axis = [toks.float()?, toks.float()?, toks.float()?];
            let v_offset = toks.float()?;
            toks.expect("]")?;
            TexAlign::Valve(ValveUV {
                u_axis,
                u_offset,
                v_axis,
                v_offset,
                rotation: toks.float()?,
                u_scale: toks.float()?,
                v_scale: toks.float()?,
            })
        } else {
            TexAlign::Standard(StandardUV {
                x_offset: toks.float()?,
                y_offset: toks.float()?,
                rotation: toks.float()?,
                x_scale: toks.float()?,
                y_scale: toks.float()?,
            })
        };

        Ok(Face::new([p1, p2, p3], material, align))
    }
}

pub(crate) fn fmt_vec3(v: &Vec3) -> String {
    format!("{} {} {}", v[0], v[1], v[2])
}

impl fmt::Display for TexAlign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TexAlign::Standard(s) => write!(
                f,
                "{} {} {} {} {}",
                s.x_offset, s.y_offset, s.rotation, s.x_scale, s.y_scale
            ),
            TexAlign::Valve(v) => write!(
                f,
                "[ {} {} ] [ {} {} ] {} {} {} 0 0 0",
                fmt_vec3(&v.u_axis),
                v.u_offset,
                fmt_vec3(&v.v_axis),
                v.v_offset,
                v.rotation,
                v.u_scale,
                v.v_scale
            ),
        }
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "( {} ) ( {} ) ( {} ) {} {}",
            fmt_vec3(&self.p1),
            fmt_vec3(&self.p2),
            fmt_vec3(&self.p3),
            self.material,
            self.align
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
