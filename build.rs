//! Build script for generating the `kiln` man page.
//!
//! The man page is rendered from the clap definitions into `OUT_DIR` so
//! packaging can pick it up alongside the binary.

use std::env;
use std::io::Write;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir = Utf8PathBuf::from(env::var("OUT_DIR")?);
    let mut page = Vec::new();
    Man::new(Cli::command()).render(&mut page)?;

    Dir::open_ambient_dir(&out_dir, ambient_authority())?.write("kiln.1", &page)?;
    Ok(())
}
