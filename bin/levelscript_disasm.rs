use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use levelscript::bytecode::{disasm, ByteOrder, CommandLayout, PointerWidth};
use levelscript::VmConfig;

#[derive(Parser)]
#[command(author, version, about = "Lists the commands of a level script", long_about = None)]
struct Cli {
    /// Script file to disassemble
    input: PathBuf,
    /// Take the command layout from a TOML interpreter configuration
    #[arg(short, long, conflicts_with_all = ["wide", "big_extensions"])]
    config: Option<PathBuf>,
    /// Scripts use 8-byte pointers
    #[arg(long)]
    wide: bool,
    /// Extension opcodes store their operands big-endian
    #[arg(long)]
    big_extensions: bool,
    /// Output path (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Cli {
    fn layout(&self) -> Result<CommandLayout> {
        if let Some(path) = &self.config {
            return Ok(VmConfig::from_file(path)?.layout);
        }
        let width = if self.wide {
            PointerWidth::Wide
        } else {
            PointerWidth::Narrow
        };
        let order = if self.big_extensions {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        };
        Ok(CommandLayout::new(width, order))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let layout = cli.layout()?;
    let bytes =
        fs::read(&cli.input).with_context(|| format!("failed to read {}", cli.input.display()))?;
    let listing = disasm::disassemble(&bytes, layout);

    match &cli.output {
        Some(path) => {
            let mut file = fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            file.write_all(listing.as_bytes())
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "Disassembled {} -> {} ({} commands)",
                cli.input.display(),
                path.display(),
                listing.lines().count()
            );
        }
        None => print!("{listing}"),
    }
    Ok(())
}
