// q_shared.rs -- foundational types and math shared by every jdlevel crate
//
// Map units are the editor's grid units (1 unit = 1 inch in most id-Tech
// games). Everything is single precision except where a caller needs the
// extra headroom of f64 for intersection math.

// ============================================================
// Basic types
// ============================================================

pub type Vec3 = [f32; 3];
pub type Vec2 = [f32; 2];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

/// World axes in the order the standard texture projection tests them.
pub const AXIS_UP: Vec3 = [0.0, 0.0, 1.0];
pub const AXIS_RIGHT: Vec3 = [0.0, 1.0, 0.0];
pub const AXIS_FORWARD: Vec3 = [1.0, 0.0, 0.0];

// ============================================================
// MATHLIB -- Vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

pub fn vector_length(v: &Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Normalize in place, returns the length before normalizing.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

/// Returns a unit copy of `v`, or the zero vector when `v` has no length.
pub fn vector_normalized(v: &Vec3) -> Vec3 {
    let mut out = *v;
    vector_normalize(&mut out);
    out
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

pub fn vector_min(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0].min(b[0]), a[1].min(b[1]), a[2].min(b[2])]
}

pub fn vector_max(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0].max(b[0]), a[1].max(b[1]), a[2].max(b[2])]
}

/// Average of a set of points. `None` for an empty set.
pub fn vector_average<'a, I>(points: I) -> Option<Vec3>
where
    I: IntoIterator<Item = &'a Vec3>,
{
    let mut sum = [0.0f32; 3];
    let mut count = 0usize;
    for p in points {
        sum = vector_add(&sum, p);
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(vector_scale(&sum, 1.0 / count as f32))
}

pub fn add_point_to_bounds(v: &Vec3, mins: &mut Vec3, maxs: &mut Vec3) {
    for i in 0..3 {
        if v[i] < mins[i] {
            mins[i] = v[i];
        }
        if v[i] > maxs[i] {
            maxs[i] = v[i];
        }
    }
}

/// Parse three whitespace separated floats ("x y z"), as stored in entity
/// keys such as `origin` and `_color`.
pub fn vec3_from_str(s: &str) -> Option<Vec3> {
    let mut it = s.split_whitespace().map(|t| t.parse::<f32>());
    let x = it.next()?.ok()?;
    let y = it.next()?.ok()?;
    let z = it.next()?.ok()?;
    if it.next().is_some() {
        return None;
    }
    Some([x, y, z])
}

// ============================================================
// Axis-aligned bounding boxes
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub mins: Vec3,
    pub maxs: Vec3,
}

impl Aabb {
    pub fn new(mins: Vec3, maxs: Vec3) -> Self {
        Self { mins, maxs }
    }

    pub fn from_point(p: &Vec3) -> Self {
        Self { mins: *p, maxs: *p }
    }

    /// Bounds of a point set, `None` when the set is empty.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Vec3>,
    {
        let mut it = points.into_iter();
        let mut bounds = Self::from_point(it.next()?);
        for p in it {
            bounds.add_point(p);
        }
        Some(bounds)
    }

    pub fn add_point(&mut self, p: &Vec3) {
        add_point_to_bounds(p, &mut self.mins, &mut self.maxs);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            mins: vector_min(&self.mins, &other.mins),
            maxs: vector_max(&self.maxs, &other.maxs),
        }
    }

    pub fn center(&self) -> Vec3 {
        vector_scale(&vector_add(&self.mins, &self.maxs), 0.5)
    }

    pub fn half_extents(&self) -> Vec3 {
        vector_scale(&vector_subtract(&self.maxs, &self.mins), 0.5)
    }

    /// Inclusive box/box test: touching faces count as overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.mins[0] <= other.maxs[0]
            && self.maxs[0] >= other.mins[0]
            && self.mins[1] <= other.maxs[1]
            && self.maxs[1] >= other.mins[1]
            && self.mins[2] <= other.maxs[2]
            && self.maxs[2] >= other.mins[2]
    }

    /// Inclusive point containment.
    pub fn contains_point(&self, p: &Vec3) -> bool {
        p[0] >= self.mins[0]
            && p[0] <= self.maxs[0]
            && p[1] >= self.mins[1]
            && p[1] <= self.maxs[1]
            && p[2] >= self.mins[2]
            && p[2] <= self.maxs[2]
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_product_axes() {
        assert_eq!(cross_product(&AXIS_FORWARD, &AXIS_RIGHT), AXIS_UP);
        assert_eq!(cross_product(&AXIS_RIGHT, &AXIS_UP), AXIS_FORWARD);
    }

    #[test]
    fn test_normalize_returns_length() {
        let mut v = [3.0, 0.0, 4.0];
        let len = vector_normalize(&mut v);
        assert_eq!(len, 5.0);
        assert!((vector_length(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let mut v = VEC3_ORIGIN;
        assert_eq!(vector_normalize(&mut v), 0.0);
        assert_eq!(v, VEC3_ORIGIN);
    }

    #[test]
    fn test_vector_average() {
        let pts = [[0.0, 0.0, 0.0], [2.0, 4.0, 6.0]];
        assert_eq!(vector_average(pts.iter()), Some([1.0, 2.0, 3.0]));
        assert_eq!(vector_average(std::iter::empty()), None);
    }

    #[test]
    fn test_vec3_from_str() {
        assert_eq!(vec3_from_str("1 -2 3.5"), Some([1.0, -2.0, 3.5]));
        assert_eq!(vec3_from_str("  0 0   0 "), Some([0.0, 0.0, 0.0]));
        assert_eq!(vec3_from_str("1 2"), None);
        assert_eq!(vec3_from_str("1 2 3 4"), None);
        assert_eq!(vec3_from_str("a b c"), None);
    }

    // =========================================================================
    // Aabb
    // =========================================================================

    #[test]
    fn test_aabb_from_points() {
        let pts = [[1.0, 5.0, -1.0], [-3.0, 2.0, 4.0], [0.0, 0.0, 0.0]];
        let b = Aabb::from_points(pts.iter()).unwrap();
        assert_eq!(b.mins, [-3.0, 0.0, -1.0]);
        assert_eq!(b.maxs, [1.0, 5.0, 4.0]);
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_aabb_overlap_is_inclusive() {
        let a = Aabb::new([0.0; 3], [10.0; 3]);
        let touching = Aabb::new([10.0, 0.0, 0.0], [20.0, 10.0, 10.0]);
        let apart = Aabb::new([10.5, 0.0, 0.0], [20.0, 10.0, 10.0]);
        assert!(a.overlaps(&touching));
        assert!(touching.overlaps(&a));
        assert!(!a.overlaps(&apart));
    }

    #[test]
    fn test_aabb_contains_point() {
        let a = Aabb::new([-1.0; 3], [1.0; 3]);
        assert!(a.contains_point(&[1.0, -1.0, 0.0]));
        assert!(!a.contains_point(&[1.01, 0.0, 0.0]));
    }

    #[test]
    fn test_aabb_center_and_extents() {
        let a = Aabb::new([0.0, -10.0, 2.0], [10.0, 10.0, 4.0]);
        assert_eq!(a.center(), [5.0, 0.0, 3.0]);
        assert_eq!(a.half_extents(), [5.0, 10.0, 1.0]);
    }
}
