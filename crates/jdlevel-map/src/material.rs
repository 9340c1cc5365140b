// material.rs -- material table and texture size lookup
//
// Faces refer to materials by name. The level file stores the names once, in
// first-use order, and faces refer to them by index. Texture sizes come from
// the host: either a fixed table or the image files under the game directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, warn};

use jdlevel_common::q_shared::Vec2;

use crate::map::Map;

/// Shader every material uses unless the host says otherwise.
pub const DEFAULT_SHADER: &str = "lightmapped";

/// Image formats searched for a material, in order.
pub const TEXTURE_EXTENSIONS: [&str; 3] = ["tga", "jpg", "png"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    pub name: String,
    pub shader: String,
    /// Shader inputs by name, such as `diffuse` -> image path.
    pub data: IndexMap<String, String>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Material {
            name: name.into(),
            shader: DEFAULT_SHADER.to_string(),
            data: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MaterialTable {
    materials: Vec<Material>,
    index: HashMap<String, usize>,
}

impl MaterialTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per name in `map.materials`, same order.
    pub fn from_map(map: &Map) -> Self {
        let mut table = Self::new();
        for name in &map.materials {
            table.add(name);
        }
        table
    }

    /// Index of `name`, adding it when new.
    pub fn add(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.materials.len();
        self.materials.push(Material::new(name));
        self.index.insert(name.to_string(), idx);
        idx
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, idx: usize) -> Option<&Material> {
        self.materials.get(idx)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }

    /// Point each material's `diffuse` input at its image under `dir`.
    /// Returns the number of materials with no image.
    pub fn resolve_textures(&mut self, dir: &TextureDir) -> usize {
        let mut missing = 0;
        for mat in &mut self.materials {
            match dir.find_texture(&mat.name) {
                Some(path) => {
                    mat.data
                        .insert("diffuse".to_string(), path.to_string_lossy().into_owned());
                }
                None => {
                    warn!("Can't find texture for material {}", mat.name);
                    missing += 1;
                }
            }
        }
        missing
    }
}

// ============================================================
// Texture sizes
// ============================================================

/// Source of texture pixel dimensions, keyed by material name.
pub trait TextureSizes {
    fn texture_size(&self, material: &str) -> Option<Vec2>;
}

impl TextureSizes for HashMap<String, Vec2> {
    fn texture_size(&self, material: &str) -> Option<Vec2> {
        self.get(material).copied()
    }
}

/// No sizes at all: every face keeps the default.
impl TextureSizes for () {
    fn texture_size(&self, _material: &str) -> Option<Vec2> {
        None
    }
}

#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("no texture for {material} under {}", .root.display())]
    NotFound { material: String, root: PathBuf },

    #[error("{}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Textures stored as `<game>/textures/<material>.<ext>`.
#[derive(Debug, Clone)]
pub struct TextureDir {
    root: PathBuf,
}

impl TextureDir {
    pub fn new(game_path: impl AsRef<Path>) -> Self {
        TextureDir {
            root: game_path.as_ref().join("textures"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn find_texture(&self, material: &str) -> Option<PathBuf> {
        TEXTURE_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{material}.{ext}")))
            .find(|p| p.is_file())
    }

    /// Pixel size of the texture for `material`.
    pub fn read_size(&self, material: &str) -> Result<Vec2, MaterialError> {
        let path = self
            .find_texture(material)
            .ok_or_else(|| MaterialError::NotFound {
                material: material.to_string(),
                root: self.root.clone(),
            })?;
        let (w, h) = image::image_dimensions(&path)
            .map_err(|source| MaterialError::Image { path: path.clone(), source })?;
        debug!(material, width = w, height = h, "texture size");
        Ok([w as f32, h as f32])
    }
}

impl TextureSizes for TextureDir {
    /// Missing textures are left to `resolve_textures` to report; unreadable
    /// ones are logged here. Either way the face keeps its default size.
    fn texture_size(&self, material: &str) -> Option<Vec2> {
        match self.read_size(material) {
            Ok(size) => Some(size),
            Err(MaterialError::NotFound { .. }) => None,
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
