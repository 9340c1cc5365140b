#![allow(clippy::needless_range_loop, clippy::float_cmp, clippy::type_complexity)]

pub mod map;
pub mod face;
pub mod brush;
pub mod patch;
pub mod octree;
pub mod material;
pub mod light;
pub mod level;
pub mod compile;

pub use brush::{Brush, BrushId, GeometryWarning};
pub use compile::{compile_map, compile_named, CompileError, CompileOptions, CompiledLevel};
pub use level::{encode, write_level, EncodeError, Lightmap};
pub use map::{Entity, Geometry, Map, ParseError};
