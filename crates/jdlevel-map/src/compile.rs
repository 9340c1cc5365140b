// compile.rs -- parse, solve and index a map in one pass
//
// Brushes are independent of each other, so solving fans out over rayon
// once there are enough of them to pay for the thread handoff.

use std::path::PathBuf;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use jdlevel_common::cvar::{CvarContext, CvarFlags};
use jdlevel_common::lvlfiles::DEFAULT_LIGHTMAP_SIZE;

use crate::brush::{Brush, BrushId, GeometryWarning};
use crate::level::{encode, EncodeError, Lightmap};
use crate::light::{collect_lights, LightDef};
use crate::map::{Map, ParseError};
use crate::material::TextureSizes;
use crate::octree::Octree;
use crate::patch::{PatchMesh, DEFAULT_TESS_LEVEL};

/// Below this many brushes, solve sequentially (rayon overhead not worth it).
pub const PARALLEL_THRESHOLD: usize = 64;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ============================================================
// Options
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Game directory; textures are looked up under `<game>/textures`.
    pub game_path: PathBuf,
    pub tess_level: u32,
    pub lightmap_size: u32,
    pub parallel: bool,
    /// Output file; next to the map with a `.lvl` extension when unset.
    pub output: Option<PathBuf>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            game_path: PathBuf::from("."),
            tess_level: DEFAULT_TESS_LEVEL,
            lightmap_size: DEFAULT_LIGHTMAP_SIZE,
            parallel: true,
            output: None,
        }
    }
}

impl CompileOptions {
    /// Register every compile cvar with its default.
    pub fn register_cvars(cvars: &mut CvarContext) {
        let defaults = CompileOptions::default();
        cvars.get("game", Some("."), CvarFlags::empty());
        cvars.get("tess_level", Some(&defaults.tess_level.to_string()), CvarFlags::empty());
        cvars.get("lightmap_size", Some(&defaults.lightmap_size.to_string()), CvarFlags::empty());
        cvars.get("parallel", Some("1"), CvarFlags::empty());
        cvars.get("output", Some(""), CvarFlags::empty());
    }

    pub fn from_cvars(cvars: &CvarContext) -> Self {
        let defaults = CompileOptions::default();
        let positive = |name: &str, fallback: u32| {
            let v = cvars.variable_value(name);
            if v >= 1.0 {
                v as u32
            } else {
                fallback
            }
        };
        let game = cvars.variable_string("game");
        let output = cvars.variable_string("output");

        CompileOptions {
            game_path: if game.is_empty() {
                defaults.game_path
            } else {
                PathBuf::from(game)
            },
            tess_level: positive("tess_level", defaults.tess_level),
            lightmap_size: positive("lightmap_size", defaults.lightmap_size),
            parallel: cvars.find_var("parallel").map_or(true, |v| v.value != 0.0),
            output: (!output.is_empty()).then(|| PathBuf::from(output)),
        }
    }
}

// ============================================================
// Pipeline
// ============================================================

fn solve_brush(brush: &mut Brush) -> Vec<(BrushId, GeometryWarning)> {
    let warnings = brush.solve();
    if brush.is_solved() {
        brush.calculate_uvs();
    }
    warnings.into_iter().map(|w| (brush.id, w)).collect()
}

/// Solve every brush and project its UVs. Returns the warnings raised,
/// tagged with the brush they came from, in map order.
pub fn process_geo(map: &mut Map, parallel: bool) -> Vec<(BrushId, GeometryWarning)> {
    let mut brushes: Vec<&mut Brush> = map.brushes_mut().collect();
    let count = brushes.len();

    let warnings: Vec<(BrushId, GeometryWarning)> = if parallel && count >= PARALLEL_THRESHOLD {
        brushes
            .par_iter_mut()
            .flat_map_iter(|b| solve_brush(b))
            .collect()
    } else {
        brushes.iter_mut().flat_map(|b| solve_brush(b)).collect()
    };

    for (id, w) in &warnings {
        warn!("{}: {}", id, w);
    }
    debug!(brushes = count, warnings = warnings.len(), "geometry solved");
    warnings
}

/// Everything produced from one map.
#[derive(Debug, Clone)]
pub struct CompiledLevel {
    pub map: Map,
    pub octree: Option<Octree>,
    /// (entity id, geometry slot, mesh) per patch.
    pub patches: Vec<(usize, usize, PatchMesh)>,
    pub lights: Vec<LightDef>,
    pub warnings: Vec<(BrushId, GeometryWarning)>,
}

impl CompiledLevel {
    pub fn encode(&self, lightmap: &Lightmap) -> Result<Vec<u8>, EncodeError> {
        encode(&self.map, lightmap)
    }
}

/// Parse, size textures, solve, tessellate and index one map.
pub fn compile_map(
    text: &str,
    options: &CompileOptions,
    textures: &dyn TextureSizes,
) -> Result<CompiledLevel, CompileError> {
    compile_named(text, "<map>", options, textures)
}

/// `compile_map` with a source name carried into the map for diagnostics.
pub fn compile_named(
    text: &str,
    name: &str,
    options: &CompileOptions,
    textures: &dyn TextureSizes,
) -> Result<CompiledLevel, CompileError> {
    let mut map = Map::load_named(text, name)?;
    let sized = map.apply_texture_sizes(textures);
    debug!(faces = sized, "texture sizes applied");

    let warnings = process_geo(&mut map, options.parallel);

    let mut patches = Vec::new();
    for entity in &map.entities {
        for (slot, patch) in entity.patches() {
            patches.push((entity.id, slot, patch.tessellate(options.tess_level)));
        }
    }

    let octree = Octree::from_map(&map);
    if octree.is_none() {
        warn!("map has no solid geometry, no octree built");
    }
    let lights = collect_lights(&map);

    info!(
        "{}: {} entities, {} brushes, {} patches, {} lights",
        name,
        map.entities.len(),
        map.brushes().count(),
        patches.len(),
        lights.len()
    );

    Ok(CompiledLevel {
        map,
        octree,
        patches,
        lights,
        warnings,
    })
}

// =============================================================================
// Tests
// =============================================================================
