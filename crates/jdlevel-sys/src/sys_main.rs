// sys_main.rs -- command line driver for the level compiler
//
//   jdlevel [+set <cvar> <value>]... <file.map>
//
// Reads the map, compiles it with textures from the `game` directory and
// writes the level file next to it (or to the `output` cvar).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use jdlevel_common::common::{ComArgs, DISTNAME, DISTVER};
use jdlevel_common::cvar::{CvarContext, CvarFlags};
use jdlevel_map::material::{MaterialTable, TextureDir};
use jdlevel_map::compile::compile_named;
use jdlevel_map::{CompileError, CompileOptions, Lightmap};

/// Level file written for `map`: the map path with a `.lvl` extension.
pub fn output_path(map: &Path, options: &CompileOptions) -> PathBuf {
    match &options.output {
        Some(out) => out.clone(),
        None => map.with_extension("lvl"),
    }
}

/// True when several maps would all be written to the one `output` file.
pub fn output_collides(map_count: usize, options: &CompileOptions) -> bool {
    options.output.is_some() && map_count > 1
}

/// Cvars with defaults, then command line overrides applied.
pub fn init_cvars(args: &mut ComArgs) -> CvarContext {
    let mut cvars = CvarContext::new();
    cvars.get("developer", Some("0"), CvarFlags::empty());
    cvars.get("version", Some(&format!("{DISTNAME} {DISTVER}")), CvarFlags::NOSET);
    CompileOptions::register_cvars(&mut cvars);
    args.add_early_commands(&mut cvars);
    cvars
}

/// Compile one map file and write its level. Returns the path written.
pub fn compile_file(map_path: &Path, options: &CompileOptions) -> Result<PathBuf, CompileError> {
    let text = fs::read_to_string(map_path)?;
    let textures = TextureDir::new(&options.game_path);

    let level = compile_named(&text, &map_path.display().to_string(), options, &textures)?;
    let missing = MaterialTable::from_map(&level.map).resolve_textures(&textures);
    if missing > 0 {
        info!("{} materials have no texture under {}", missing, textures.root().display());
    }

    let lightmap = Lightmap::blank(options.lightmap_size);
    let data = level.encode(&lightmap)?;

    let out = output_path(map_path, options);
    fs::write(&out, &data)?;
    info!("wrote {} ({} bytes)", out.display(), data.len());
    Ok(out)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use jdlevel_common::lvlfiles::read_fixed_str;

    fn args(list: &[&str]) -> ComArgs {
        let owned: Vec<String> = list.iter().map(|s| s.to_string()).collect();
        let mut a = ComArgs::new();
        a.init(&owned);
        a
    }

    #[test]
    fn default_output_sits_next_to_map() {
        let opts = CompileOptions::default();
        assert_eq!(output_path(Path::new("maps/dm1.map"), &opts), PathBuf::from("maps/dm1.lvl"));
        let opts = CompileOptions {
            output: Some(PathBuf::from("/tmp/x.lvl")),
            ..CompileOptions::default()
        };
        assert_eq!(output_path(Path::new("maps/dm1.map"), &opts), PathBuf::from("/tmp/x.lvl"));
    }

    #[test]
    fn fixed_output_allows_one_map() {
        let opts = CompileOptions {
            output: Some(PathBuf::from("out.lvl")),
            ..CompileOptions::default()
        };
        assert!(!output_collides(1, &opts));
        assert!(output_collides(2, &opts));
        assert!(!output_collides(2, &CompileOptions::default()));
    }

    #[test]
    fn command_line_overrides_defaults() {
        let mut a = args(&["jdlevel", "+set", "tess_level", "2", "+set", "version", "x", "a.map"]);
        let cvars = init_cvars(&mut a);
        assert_eq!(cvars.variable_value("tess_level"), 2.0);
        // version is write protected
        assert!(cvars.variable_string("version").starts_with(DISTNAME));
        assert_eq!(a.positional(), vec!["a.map"]);
    }

    #[test]
    fn compile_file_writes_level() {
        let dir = std::env::temp_dir().join(format!("jdlevel-sys-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let map = dir.join("point.map");
        fs::write(&map, "{\n\"classname\" \"worldspawn\"\n}\n").unwrap();

        let opts = CompileOptions {
            game_path: dir.clone(),
            lightmap_size: 4,
            ..CompileOptions::default()
        };
        let out = compile_file(&map, &opts).unwrap();
        assert_eq!(out, dir.join("point.lvl"));
        let data = fs::read(&out).unwrap();
        assert_eq!(read_fixed_str(&data, 0, 16), "JDLEVEL");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_map_is_io_error() {
        let err = compile_file(Path::new("/nonexistent/none.map"), &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err, CompileError::Io(_)));
    }
}
