use std::{path::PathBuf, time::Instant};

use clap::Parser;
use color_eyre::eyre::Result;
use smallblock::{
    attack::{BirthdayAttacker, MaxEncryptions, Phase},
    block::BlockWidth,
    cbc::CbcEngine,
    cipher::feistel::Feistel,
    load,
};

#[derive(Parser, Debug)]
#[command(name = "attack", version, about = "Birthday attack on CBC with a small block cipher")]
struct Cli {
    /// Report every collision
    #[arg(long)]
    verbose: bool,
    /// Number of attacks to average over
    #[arg(short = 'n', default_value_t = 1)]
    trials: u32,
    /// Bits per half-block
    #[arg(long, default_value_t = 16)]
    half_bits: u32,
    /// Give up an attack after this many encryptions
    #[arg(long)]
    max_encryptions: Option<u64>,
    /// File holding the key as 32 hex digits
    key_file: PathBuf,
    /// File holding the plaintext
    text_file: PathBuf,
}

fn spaced_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
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
    let trials = cli.trials.max(1);
    let limit = cli.max_encryptions.unwrap_or(u64::MAX);

    let mut total_encryptions = 0u64;
    let mut total_seconds = 0.0;
    for _ in 0..trials {
        let ciphertext = engine.encrypt(&text.bytes)?;

        let start = Instant::now();
        let collision = BirthdayAttacker::new(&engine).run(&ciphertext, MaxEncryptions(limit))?;
        let seconds = start.elapsed().as_secs_f64();

        if cli.verbose {
            match collision.phase {
                Phase::Passive { block } => {
                    println!("Collision found on cipher text block #{block}")
                }
                Phase::Active { .. } => println!(
                    "Collision found after encrypting {} blocks",
                    collision.encryptions
                ),
            }
            println!("Collision found after {seconds:.2e} s");
            println!("Messages XOR: {}", spaced_hex(&width.to_bytes(collision.xor)));
        }

        total_seconds += seconds;
        total_encryptions += collision.encryptions;
    }

    println!(
        "Average number of encryptions: {:.2}",
        total_encryptions as f64 / f64::from(trials)
    );
    println!("Average attack time: {:.2e} s", total_seconds / f64::from(trials));
    Ok(())
}
