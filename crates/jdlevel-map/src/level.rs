// level.rs -- JDLEVEL binary writer
//
// See jdlevel_common::lvlfiles for the layout. Only brushes are written;
// patches are tessellated separately and never reach the level file.

use std::io::Write;

use thiserror::Error;
use tracing::debug;

use jdlevel_common::lvlfiles::{
    fixed_field, DEFAULT_LIGHTMAP_SIZE, KEYVALUE_SIZE, LEVEL_HEADER, LIGHTMAP_BYTES_PER_PIXEL,
    MATERIAL_NAME_SIZE, TAG_ENTITY, TAG_LIGHTMAP, TAG_MATERIALS, TAG_SIZE,
};
use jdlevel_common::q_shared::{Aabb, Vec2, Vec3};

use crate::brush::Brush;
use crate::map::{Entity, Map};
use crate::material::MaterialTable;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("material '{material}' is not in the material table")]
    MissingMaterial { material: String },

    #[error("'{value}' is not ASCII")]
    NonAsciiField { value: String },

    #[error("lightmap is {width}x{height} but holds {len} bytes")]
    LightmapSize { width: u32, height: u32, len: usize },

    #[error("{what} count {count} does not fit in the level file")]
    CountOverflow { what: &'static str, count: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ============================================================
// Lightmap
// ============================================================

/// Baked lighting as tightly packed RGB8 rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lightmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Lightmap {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, EncodeError> {
        let lm = Lightmap {
            width,
            height,
            pixels,
        };
        lm.check()?;
        Ok(lm)
    }

    /// Fully lit square lightmap.
    pub fn blank(size: u32) -> Self {
        let len = size as usize * size as usize * LIGHTMAP_BYTES_PER_PIXEL;
        Lightmap {
            width: size,
            height: size,
            pixels: vec![0xff; len],
        }
    }

    fn check(&self) -> Result<(), EncodeError> {
        let want = self.width as usize * self.height as usize * LIGHTMAP_BYTES_PER_PIXEL;
        if self.pixels.len() != want {
            return Err(EncodeError::LightmapSize {
                width: self.width,
                height: self.height,
                len: self.pixels.len(),
            });
        }
        Ok(())
    }
}

impl Default for Lightmap {
    fn default() -> Self {
        Lightmap::blank(DEFAULT_LIGHTMAP_SIZE)
    }
}

// ============================================================
// Writer
// ============================================================

struct LevelWriter<W: Write> {
    out: W,
}

impl<W: Write> LevelWriter<W> {
    fn bytes(&mut self, b: &[u8]) -> Result<(), EncodeError> {
        self.out.write_all(b)?;
        Ok(())
    }

    fn fixed(&mut self, s: &str, width: usize) -> Result<(), EncodeError> {
        if !s.is_ascii() {
            return Err(EncodeError::NonAsciiField {
                value: s.to_string(),
            });
        }
        self.bytes(&fixed_field(s.as_bytes(), width))
    }

    fn tag(&mut self, tag: &[u8]) -> Result<(), EncodeError> {
        self.bytes(&fixed_field(tag, TAG_SIZE))
    }

    fn int(&mut self, v: i32) -> Result<(), EncodeError> {
        self.bytes(&v.to_le_bytes())
    }

    fn count(&mut self, what: &'static str, n: usize) -> Result<(), EncodeError> {
        let v = i32::try_from(n).map_err(|_| EncodeError::CountOverflow { what, count: n })?;
        self.int(v)
    }

    fn float(&mut self, v: f32) -> Result<(), EncodeError> {
        self.bytes(&v.to_le_bytes())
    }

    fn vec3(&mut self, v: &Vec3) -> Result<(), EncodeError> {
        v.iter().try_for_each(|&f| self.float(f))
    }

    fn vec2(&mut self, v: &Vec2) -> Result<(), EncodeError> {
        self.float(v[0])?;
        self.float(v[1])
    }

    /// Unset bounds are written as zeros.
    fn bounds(&mut self, b: Option<Aabb>) -> Result<(), EncodeError> {
        let b = b.unwrap_or(Aabb::new([0.0; 3], [0.0; 3]));
        self.vec3(&b.mins)?;
        self.vec3(&b.maxs)
    }

    fn materials(&mut self, table: &MaterialTable) -> Result<(), EncodeError> {
        self.tag(TAG_MATERIALS)?;
        self.count("material", table.len())?;
        for mat in table.iter() {
            self.fixed(&mat.name, MATERIAL_NAME_SIZE)?;
        }
        Ok(())
    }

    fn lightmap(&mut self, lm: &Lightmap) -> Result<(), EncodeError> {
        lm.check()?;
        self.tag(TAG_LIGHTMAP)?;
        self.count("lightmap width", lm.width as usize)?;
        self.count("lightmap height", lm.height as usize)?;
        self.bytes(&lm.pixels)
    }

    fn brush(&mut self, brush: &Brush, table: &MaterialTable) -> Result<(), EncodeError> {
        self.bounds(brush.bounding_box())?;

        self.count("vertex", brush.verts.len())?;
        for v in &brush.verts {
            self.vec3(v)?;
        }
        self.count("uv", brush.uvs.len())?;
        for uv in &brush.uvs {
            self.vec2(uv)?;
        }

        self.count("face", brush.faces.len())?;
        for face in &brush.faces {
            let mat = table
                .index_of(&face.material)
                .ok_or_else(|| EncodeError::MissingMaterial {
                    material: face.material.clone(),
                })?;
            self.count("material index", mat)?;
            self.count("vertex index", face.vert_idx.len())?;
            for &i in &face.vert_idx {
                self.count("vertex index", i)?;
            }
            self.count("uv index", face.uv_idx.len())?;
            for &i in &face.uv_idx {
                self.count("uv index", i)?;
            }
            self.count("lightmap uv", face.lightmap_uvs.len())?;
            for uv in &face.lightmap_uvs {
                self.vec2(uv)?;
            }
        }
        Ok(())
    }

    fn entity(&mut self, entity: &Entity, table: &MaterialTable) -> Result<(), EncodeError> {
        self.bounds(entity.bounding_box)?;
        self.count("property", entity.properties.len())?;
        self.count("brush", entity.brushes().count())?;
        for (key, value) in &entity.properties {
            self.fixed(key, KEYVALUE_SIZE)?;
            self.fixed(value, KEYVALUE_SIZE)?;
        }
        for brush in entity.brushes() {
            self.brush(brush, table)?;
        }
        Ok(())
    }
}

/// Write `map` as a level file. Brushes should already be solved and have
/// their UVs computed; unsolved brushes are written with no geometry.
pub fn write_level<W: Write>(out: W, map: &Map, lightmap: &Lightmap) -> Result<(), EncodeError> {
    let table = MaterialTable::from_map(map);
    let mut w = LevelWriter { out };

    w.tag(LEVEL_HEADER)?;
    w.materials(&table)?;
    w.lightmap(lightmap)?;
    w.tag(TAG_ENTITY)?;
    w.count("entity", map.entities.len())?;
    for entity in &map.entities {
        w.entity(entity, &table)?;
    }
    w.out.flush()?;

    debug!(
        materials = table.len(),
        entities = map.entities.len(),
        "level written"
    );
    Ok(())
}

/// `write_level` into a fresh buffer.
pub fn encode(map: &Map, lightmap: &Lightmap) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    write_level(&mut buf, map, lightmap)?;
    Ok(buf)
}

// =============================================================================
// Tests
// =============================================================================
