use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use rand::rngs::OsRng;
use smallblock::{cipher::Key, load};

#[derive(Parser, Debug)]
#[command(name = "keygen", version, about = "Writes a random 128-bit key as hex")]
struct Cli {
    /// Where to write the key
    file: PathBuf,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let key = Key::generate(&mut OsRng)?;
    load::write_key(&cli.file, &key)?;
    Ok(())
}
