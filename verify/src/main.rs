use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use smallblock::{block::BlockWidth, cbc::CbcEngine, cipher::feistel::Feistel, load};

#[derive(Parser, Debug)]
#[command(name = "verify", version, about = "Sanity checks for the CBC implementation")]
struct Cli {
    /// Print the ciphertexts and plaintexts that are compared
    #[arg(long)]
    verbose: bool,
    /// Bits per half-block
    #[arg(long, default_value_t = 16)]
    half_bits: u32,
    /// File holding the key as 32 hex digits
    key_file: PathBuf,
    /// File holding the plaintext
    text_file: PathBuf,
}

/// Two encryptions of the same plaintext must differ.
fn non_deterministic(engine: &CbcEngine<Feistel>, plaintext: &[u8], verbose: bool) -> Result<bool> {
    let first = engine.encrypt(plaintext)?;
    let second = engine.encrypt(plaintext)?;

    if verbose {
        println!("Encryption 1: {}", hex::encode(&first));
        println!("Encryption 2: {}", hex::encode(&second));
        println!();
    }
    Ok(first != second)
}

fn round_trip(engine: &CbcEngine<Feistel>, plaintext: &[u8], verbose: bool) -> Result<bool> {
    let decrypted = engine.decrypt(&engine.encrypt(plaintext)?)?;

    if verbose {
        println!("The original plaintext:   '{}'", String::from_utf8_lossy(plaintext));
        println!("The decrypted ciphertext: '{}'", String::from_utf8_lossy(&decrypted));
        println!();
    }
    Ok(decrypted == plaintext)
}

fn verdict(ok: bool) -> &'static str {
    if ok {
        "OK"
    } else {
        "not OK, something is wrong..."
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let width = BlockWidth::new(cli.half_bits)?;
    let key = load::read_key(&cli.key_file)?;
    println!("Key: {}", key.to_hex());
    println!();

    let text = load::read_text(&cli.text_file, width)?;
    println!(
        "Read {} chars from file '{}' into a buffer of size {}",
        text.read,
        cli.text_file.display(),
        text.bytes.len()
    );
    println!();

    let engine = CbcEngine::<Feistel>::init(&key, width)?;

    let ok = non_deterministic(&engine, &text.bytes, cli.verbose)?;
    println!("Ciphertexts non-deterministic: {}", verdict(ok));
    println!();

    let ok = round_trip(&engine, &text.bytes, cli.verbose)?;
    println!("Proper encryption/decryption:  {}", verdict(ok));
    println!();
    Ok(())
}
