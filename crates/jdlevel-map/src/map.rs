// map.rs -- .map source model and line parser
//
// A map is a list of entities. Each entity carries ordered key/value
// properties and owns zero or more geometry items (brushes or patchDef2
// curves). Parsing is line based: one face per line, one patch row per
// line, one property per line.

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use jdlevel_common::crc::crc_block;
use jdlevel_common::q_shared::{vec3_from_str, Aabb, Vec3};

use crate::brush::{Brush, BrushId};
use crate::face::Face;
use crate::material::TextureSizes;
use crate::patch::{Patch, PatchVert};

/// Entity key/value pairs in file order. Re-setting a key keeps its slot.
pub type Properties = IndexMap<String, String>;

// ============================================================
// Errors
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: unexpected '{token}'")]
    Unexpected { line: usize, token: String },

    #[error("line {line}: '{token}' is not a number")]
    InvalidNumber { line: usize, token: String },

    #[error("line {line}: malformed property '{token}'")]
    InvalidProperty { line: usize, token: String },

    #[error("line {line}: patch size {rows}x{cols} must be odd and at least 3")]
    InvalidPatchSize {
        line: usize,
        token: String,
        rows: i64,
        cols: i64,
    },

    #[error("line {line}: patch expected {expected} {what}, found {found}")]
    PatchRowMismatch {
        line: usize,
        token: String,
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: '{token}' is never closed")]
    UnexpectedEof { line: usize, token: String },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::Unexpected { line, .. }
            | ParseError::InvalidNumber { line, .. }
            | ParseError::InvalidProperty { line, .. }
            | ParseError::InvalidPatchSize { line, .. }
            | ParseError::PatchRowMismatch { line, .. }
            | ParseError::UnexpectedEof { line, .. } => *line,
        }
    }

    /// The offending token (or the whole line for property errors).
    pub fn token(&self) -> &str {
        match self {
            ParseError::Unexpected { token, .. }
            | ParseError::InvalidNumber { token, .. }
            | ParseError::InvalidProperty { token, .. }
            | ParseError::InvalidPatchSize { token, .. }
            | ParseError::PatchRowMismatch { token, .. }
            | ParseError::UnexpectedEof { token, .. } => token,
        }
    }

    fn unexpected(line: usize, token: &str) -> Self {
        ParseError::Unexpected {
            line,
            token: token.to_string(),
        }
    }
}

// ============================================================
// Tokens
// ============================================================

const END_OF_LINE: &str = "<end of line>";

/// Split a line on whitespace, with each parenthesis and bracket as a token
/// of its own so `(0 0 0)` and `( 0 0 0 )` read the same.
fn split_tokens(line: &str) -> Vec<&str> {
    let mut toks = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        let delim = matches!(c, '(' | ')' | '[' | ']');
        if c.is_whitespace() || delim {
            if let Some(s) = start.take() {
                toks.push(&line[s..i]);
            }
            if delim {
                toks.push(&line[i..i + c.len_utf8()]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        toks.push(&line[s..]);
    }
    toks
}

/// Cursor over the tokens of one source line.
pub(crate) struct LineTokens<'a> {
    toks: Vec<&'a str>,
    pos: usize,
    line: usize,
}

impl<'a> LineTokens<'a> {
    pub(crate) fn new(text: &'a str, line: usize) -> Self {
        LineTokens {
            toks: split_tokens(text),
            pos: 0,
            line,
        }
    }

    pub(crate) fn line(&self) -> usize {
        self.line
    }

    pub(crate) fn peek(&self) -> Option<&'a str> {
        self.toks.get(self.pos).copied()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.toks.len()
    }

    pub(crate) fn next(&mut self) -> Result<&'a str, ParseError> {
        let tok = self
            .peek()
            .ok_or_else(|| ParseError::unexpected(self.line, END_OF_LINE))?;
        self.pos += 1;
        Ok(tok)
    }

    pub(crate) fn expect(&mut self, want: &str) -> Result<(), ParseError> {
        let tok = self.next()?;
        if tok != want {
            return Err(ParseError::unexpected(self.line, tok));
        }
        Ok(())
    }

    /// A bare word such as a material name; delimiters are rejected.
    pub(crate) fn word(&mut self) -> Result<&'a str, ParseError> {
        let tok = self.next()?;
        if matches!(tok, "(" | ")" | "[" | "]") {
            return Err(ParseError::unexpected(self.line, tok));
        }
        Ok(tok)
    }

    pub(crate) fn float(&mut self) -> Result<f32, ParseError> {
        let tok = self.next()?;
        tok.parse::<f32>().map_err(|_| ParseError::InvalidNumber {
            line: self.line,
            token: tok.to_string(),
        })
    }

    pub(crate) fn int(&mut self) -> Result<i64, ParseError> {
        let tok = self.next()?;
        tok.parse::<i64>().map_err(|_| ParseError::InvalidNumber {
            line: self.line,
            token: tok.to_string(),
        })
    }

    /// `( x y z )`
    pub(crate) fn point(&mut self) -> Result<Vec3, ParseError> {
        self.expect("(")?;
        let p = [self.float()?, self.float()?, self.float()?];
        self.expect(")")?;
        Ok(p)
    }
}

// ============================================================
// Geometry and entities
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Brush(Brush),
    Patch(Patch),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: usize,
    pub properties: Properties,
    pub geo: Vec<Geometry>,
    /// Explicit bounds for the level file. Never derived automatically.
    pub bounding_box: Option<Aabb>,
}

impl Entity {
    pub fn new(id: usize) -> Self {
        Entity {
            id,
            properties: Properties::new(),
            geo: Vec::new(),
            bounding_box: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn classname(&self) -> Option<&str> {
        self.get("classname")
    }

    /// The `origin` key as a point, `None` if missing or malformed.
    pub fn origin(&self) -> Option<Vec3> {
        self.get("origin").and_then(vec3_from_str)
    }

    pub fn brushes(&self) -> impl Iterator<Item = &Brush> {
        self.geo.iter().filter_map(|g| match g {
            Geometry::Brush(b) => Some(b),
            Geometry::Patch(_) => None,
        })
    }

    pub fn brushes_mut(&mut self) -> impl Iterator<Item = &mut Brush> {
        self.geo.iter_mut().filter_map(|g| match g {
            Geometry::Brush(b) => Some(b),
            Geometry::Patch(_) => None,
        })
    }

    pub fn patches(&self) -> impl Iterator<Item = (usize, &Patch)> {
        self.geo.iter().enumerate().filter_map(|(i, g)| match g {
            Geometry::Patch(p) => Some((i, p)),
            Geometry::Brush(_) => None,
        })
    }
}

// ============================================================
// Map
// ============================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Map {
    pub entities: Vec<Entity>,
    /// Every material referenced by a face or patch, first use first.
    pub materials: Vec<String>,
    /// `target` value -> ids of entities carrying it.
    pub targets: IndexMap<String, Vec<usize>>,
    /// `targetname` value -> ids of entities carrying it.
    pub targetnames: IndexMap<String, Vec<usize>>,
    /// CRC of the source text.
    pub checksum: u16,
    /// File name or other label for diagnostics.
    pub source_name: Option<String>,
}

impl Map {
    /// Parse `.map` source text.
    pub fn load(text: &str) -> Result<Map, ParseError> {
        let mut map = Parser::new(text).run()?;
        map.checksum = crc_block(text.as_bytes());
        debug!(
            entities = map.entities.len(),
            materials = map.materials.len(),
            checksum = map.checksum,
            "map parsed"
        );
        Ok(map)
    }

    /// `load`, remembering where the text came from.
    pub fn load_named(text: &str, name: &str) -> Result<Map, ParseError> {
        let mut map = Map::load(text)?;
        map.source_name = Some(name.to_string());
        Ok(map)
    }

    pub fn entity(&self, id: usize) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn worldspawn(&self) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.classname() == Some("worldspawn"))
    }

    /// Register a material name, returning its index in `materials`.
    pub fn add_material(&mut self, name: &str) -> usize {
        let name = name.trim().to_lowercase();
        if let Some(idx) = self.materials.iter().position(|m| *m == name) {
            return idx;
        }
        self.materials.push(name);
        self.materials.len() - 1
    }

    /// Ids of the entities whose `target` is `name`.
    pub fn targets_of(&self, name: &str) -> &[usize] {
        self.targets.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids of the entities whose `targetname` is `name`.
    pub fn targetnames_of(&self, name: &str) -> &[usize] {
        self.targetnames.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn brushes(&self) -> impl Iterator<Item = &Brush> {
        self.entities.iter().flat_map(|e| e.brushes())
    }

    pub fn brushes_mut(&mut self) -> impl Iterator<Item = &mut Brush> {
        self.entities.iter_mut().flat_map(|e| e.brushes_mut())
    }

    pub fn brush(&self, id: BrushId) -> Option<&Brush> {
        match self.entities.get(id.entity)?.geo.get(id.geo)? {
            Geometry::Brush(b) => Some(b),
            Geometry::Patch(_) => None,
        }
    }

    /// Replace the default texture size of every face whose material the
    /// host knows about. Each material is looked up once.
    pub fn apply_texture_sizes(&mut self, sizes: &dyn TextureSizes) -> usize {
        let mut known = std::collections::HashMap::new();
        for name in &self.materials {
            if let Some(size) = sizes.texture_size(name) {
                known.insert(name.clone(), size);
            }
        }

        let mut updated = 0;
        for brush in self.brushes_mut() {
            for face in &mut brush.faces {
                if let Some(size) = known.get(&face.material) {
                    face.tex_size = *size;
                    updated += 1;
                }
            }
        }
        updated
    }

    /// Track `target`/`targetname` keys. `old` is the value the key had on
    /// this entity before, if any; a key set twice keeps only the last value.
    fn register_property(&mut self, entity: usize, key: &str, old: Option<&str>, value: &str) {
        let index = match key {
            "target" => &mut self.targets,
            "targetname" => &mut self.targetnames,
            _ => return,
        };
        if let Some(old) = old {
            if let Some(ids) = index.get_mut(old) {
                ids.retain(|&id| id != entity);
                if ids.is_empty() {
                    index.shift_remove(old);
                }
            }
        }
        let ids = index.entry(value.to_string()).or_default();
        if !ids.contains(&entity) {
            ids.push(entity);
        }
    }
}

// ============================================================
// Parser
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CurveStage {
    Keyword,
    Open,
    Material,
    Size,
    RowsOpen,
    Rows,
    CloseInner,
    CloseOuter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    None,
    Entity,
    Brush,
    Curve(CurveStage),
}

/// `"key" "value"`. Values containing quotes are rejoined.
fn parse_property(line: &str, line_no: usize) -> Result<(String, String), ParseError> {
    let parts: Vec<&str> = line.split('"').collect();
    let invalid = || ParseError::InvalidProperty {
        line: line_no,
        token: line.to_string(),
    };
    match parts.len() {
        n if n < 5 => Err(invalid()),
        5 => Ok((parts[1].to_string(), parts[3].to_string())),
        n => Ok((parts[1].to_string(), parts[3..n - 1].join("\""))),
    }
}

fn is_patch_row(line: &str) -> bool {
    line.strip_prefix('(')
        .map(|rest| rest.trim_start().starts_with('('))
        .unwrap_or(false)
}

struct Parser<'a> {
    /// (line number, trimmed text), comments and blank lines removed
    lines: Vec<(usize, &'a str)>,
    map: Map,
    mode: Mode,
    /// line and token that opened the innermost open block
    open: (usize, &'a str),
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty() && !l.starts_with("//"))
            .collect();
        Parser {
            lines,
            map: Map::default(),
            mode: Mode::None,
            open: (0, ""),
        }
    }

    fn run(mut self) -> Result<Map, ParseError> {
        for pos in 0..self.lines.len() {
            let (line_no, line) = self.lines[pos];
            match self.mode {
                Mode::None => self.top_level(line_no, line)?,
                Mode::Entity => self.entity_line(pos, line_no, line)?,
                Mode::Brush => self.brush_line(line_no, line)?,
                Mode::Curve(stage) => self.curve_line(stage, line_no, line)?,
            }
        }

        if self.mode != Mode::None {
            let (line, token) = self.open;
            return Err(ParseError::UnexpectedEof {
                line,
                token: token.to_string(),
            });
        }
        Ok(self.map)
    }

    fn current_entity(&mut self) -> &mut Entity {
        let idx = self.map.entities.len() - 1;
        &mut self.map.entities[idx]
    }

    fn top_level(&mut self, line_no: usize, line: &'a str) -> Result<(), ParseError> {
        if line != "{" {
            return Err(ParseError::unexpected(line_no, first_token(line)));
        }
        let id = self.map.entities.len();
        self.map.entities.push(Entity::new(id));
        self.mode = Mode::Entity;
        self.open = (line_no, "{");
        Ok(())
    }

    fn entity_line(&mut self, pos: usize, line_no: usize, line: &'a str) -> Result<(), ParseError> {
        if line == "}" {
            self.mode = Mode::None;
            return Ok(());
        }

        if line == "{" {
            let Some(&(_, next)) = self.lines.get(pos + 1) else {
                return Err(ParseError::UnexpectedEof {
                    line: line_no,
                    token: "{".to_string(),
                });
            };
            if next.starts_with('(') {
                let entity = self.current_entity();
                let id = BrushId {
                    entity: entity.id,
                    geo: entity.geo.len(),
                };
                entity.geo.push(Geometry::Brush(Brush::new(id)));
                self.mode = Mode::Brush;
            } else if next == "patchDef2" {
                self.mode = Mode::Curve(CurveStage::Keyword);
            } else {
                return Err(ParseError::unexpected(line_no, "{"));
            }
            self.open = (line_no, "{");
            return Ok(());
        }

        if line.starts_with('"') {
            let (key, value) = parse_property(line, line_no)?;
            let entity = self.current_entity();
            let id = entity.id;
            let old = entity.get(&key).map(str::to_string);
            self.map.register_property(id, &key, old.as_deref(), &value);
            self.current_entity().set(key, value);
            return Ok(());
        }

        Err(ParseError::unexpected(line_no, first_token(line)))
    }

    fn brush_line(&mut self, line_no: usize, line: &'a str) -> Result<(), ParseError> {
        if line == "}" {
            self.mode = Mode::Entity;
            return Ok(());
        }
        if !line.starts_with('(') || is_patch_row(line) {
            return Err(ParseError::unexpected(line_no, first_token(line)));
        }

        let mut toks = LineTokens::new(line, line_no);
        let face = Face::parse(&mut toks)?;
        self.map.add_material(&face.material);
        if let Some(Geometry::Brush(brush)) = self.current_entity().geo.last_mut() {
            brush.faces.push(face);
        }
        Ok(())
    }

    fn current_patch(&mut self) -> Option<&mut Patch> {
        match self.current_entity().geo.last_mut() {
            Some(Geometry::Patch(p)) => Some(p),
            _ => None,
        }
    }

    fn curve_line(&mut self, stage: CurveStage, line_no: usize, line: &'a str) -> Result<(), ParseError> {
        let expect = |want: &str| -> Result<(), ParseError> {
            if line == want {
                Ok(())
            } else {
                Err(ParseError::unexpected(line_no, first_token(line)))
            }
        };

        let next = match stage {
            CurveStage::Keyword => {
                expect("patchDef2")?;
                CurveStage::Open
            }
            CurveStage::Open => {
                expect("{")?;
                CurveStage::Material
            }
            CurveStage::Material => {
                let mut toks = LineTokens::new(line, line_no);
                let name = toks.word()?.to_lowercase();
                if matches!(name.as_str(), "{" | "}") || !toks.is_empty() {
                    return Err(ParseError::unexpected(line_no, line));
                }
                self.map.add_material(&name);
                let entity = self.current_entity();
                entity.geo.push(Geometry::Patch(Patch::new(0, 0, name)));
                CurveStage::Size
            }
            CurveStage::Size => {
                let mut toks = LineTokens::new(line, line_no);
                toks.expect("(")?;
                let rows = toks.int()?;
                let cols = toks.int()?;
                let valid = |n: i64| n >= 3 && n % 2 == 1;
                if !valid(rows) || !valid(cols) {
                    return Err(ParseError::InvalidPatchSize {
                        line: line_no,
                        token: line.to_string(),
                        rows,
                        cols,
                    });
                }
                if let Some(patch) = self.current_patch() {
                    patch.rows = rows as usize;
                    patch.cols = cols as usize;
                }
                CurveStage::RowsOpen
            }
            CurveStage::RowsOpen => {
                expect("(")?;
                CurveStage::Rows
            }
            CurveStage::Rows if line == ")" => {
                if let Some(patch) = self.current_patch() {
                    if patch.verts.len() != patch.rows {
                        return Err(ParseError::PatchRowMismatch {
                            line: line_no,
                            token: ")".to_string(),
                            what: "rows",
                            expected: patch.rows,
                            found: patch.verts.len(),
                        });
                    }
                }
                CurveStage::CloseInner
            }
            CurveStage::Rows => {
                if !is_patch_row(line) {
                    return Err(ParseError::unexpected(line_no, first_token(line)));
                }
                let mut toks = LineTokens::new(line, line_no);
                let row = PatchVert::parse_row(&mut toks)?;
                if let Some(patch) = self.current_patch() {
                    if row.len() != patch.cols {
                        return Err(ParseError::PatchRowMismatch {
                            line: line_no,
                            token: line.to_string(),
                            what: "columns",
                            expected: patch.cols,
                            found: row.len(),
                        });
                    }
                    patch.verts.push(row);
                }
                CurveStage::Rows
            }
            CurveStage::CloseInner => {
                expect("}")?;
                CurveStage::CloseOuter
            }
            CurveStage::CloseOuter => {
                expect("}")?;
                self.mode = Mode::Entity;
                return Ok(());
            }
        };

        self.mode = Mode::Curve(next);
        Ok(())
    }
}

fn first_token(line: &str) -> &str {
    split_tokens(line).first().copied().unwrap_or(line)
}

// ============================================================
// Serialization
// ============================================================

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Geometry::Brush(b) => b.fmt(f),
            Geometry::Patch(p) => p.fmt(f),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        for (key, value) in &self.properties {
            writeln!(f, "\"{key}\" \"{value}\"")?;
        }
        for geo in &self.geo {
            write!(f, "{geo}")?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entity) in self.entities.iter().enumerate() {
            writeln!(f, "// entity {i}")?;
            write!(f, "{entity}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
