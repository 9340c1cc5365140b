// Entry point for the jdlevel map compiler.

use std::path::Path;
use std::process::ExitCode;

use tracing::{error, info, Level};

use jdlevel_common::common::{ComArgs, DISTNAME, DISTVER};
use jdlevel_map::CompileOptions;
use jdlevel_sys::sys_main::{compile_file, init_cvars, output_collides};

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().collect();
    let mut args = ComArgs::new();
    args.init(&argv);
    let cvars = init_cvars(&mut args);

    let level = if cvars.variable_value("developer") != 0.0 {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    info!("{} {}", DISTNAME, DISTVER);

    let maps = args.positional();
    if maps.is_empty() {
        error!("usage: {} [+set <cvar> <value>]... <file.map>...", args.com_argv(0));
        return ExitCode::FAILURE;
    }
    if cvars.variable_value("developer") != 0.0 {
        cvars.list();
    }

    let options = CompileOptions::from_cvars(&cvars);
    if output_collides(maps.len(), &options) {
        error!("output is set, compile one map at a time ({} given)", maps.len());
        return ExitCode::FAILURE;
    }

    let mut failed = false;
    for map in maps {
        if let Err(e) = compile_file(Path::new(map), &options) {
            error!("{}: {}", map, e);
            failed = true;
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
