use std::{fs, path::Path};

use crate::{block::BlockWidth, cipher::Key, error::Result};

/// Plaintext read from a file, zero-padded to whole blocks.
pub struct Text {
    pub bytes: Vec<u8>,
    /// Number of bytes actually read from the file.
    pub read: usize,
}

/// Reads a key stored as 32 hex digits. Surrounding whitespace is ignored.
pub fn read_key(path: impl AsRef<Path>) -> Result<Key> {
    Key::from_hex(fs::read_to_string(path)?.trim())
}

pub fn write_key(path: impl AsRef<Path>, key: &Key) -> Result<()> {
    fs::write(path, format!("{}\n", key.to_hex()))?;
    Ok(())
}

pub fn read_text(path: impl AsRef<Path>, width: BlockWidth) -> Result<Text> {
    let bytes = fs::read(path)?;
    let read = bytes.len();
    Ok(Text {
        bytes: zero_pad(bytes, width),
        read,
    })
}

/// Pads with zero bytes up to the next block boundary, always leaving room for at
/// least one terminating zero.
pub fn zero_pad(mut bytes: Vec<u8>, width: BlockWidth) -> Vec<u8> {
    let block_bytes = width.block_bytes();
    let len = (bytes.len() + 1).div_ceil(block_bytes) * block_bytes;
    bytes.resize(len, 0);
    bytes
}

#[cfg(test)]
fn scratch_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("smallblock-{}-{}", std::process::id(), name))
}

#[test]
fn test_zero_pad() {
    let width = BlockWidth::new(16).unwrap();
    assert_eq!(zero_pad(vec![], width), vec![0; 4]);
    assert_eq!(zero_pad(vec![1, 2, 3], width), vec![1, 2, 3, 0]);
    assert_eq!(zero_pad(vec![1, 2, 3, 4], width), vec![1, 2, 3, 4, 0, 0, 0, 0]);
}

#[test]
fn test_key_file() {
    let path = scratch_path("key.txt");
    let key = Key::new(*b"YELLOW SUBMARINE");
    write_key(&path, &key).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "59454c4c4f57205355424d4152494e45\n"
    );
    assert_eq!(read_key(&path).unwrap(), key);
    fs::remove_file(&path).unwrap();
}

#[test]
fn test_text_file() {
    let path = scratch_path("text.txt");
    fs::write(&path, b"hello").unwrap();
    let text = read_text(&path, BlockWidth::new(8).unwrap()).unwrap();
    assert_eq!(text.read, 5);
    assert_eq!(text.bytes, b"hello\0");
    fs::remove_file(&path).unwrap();
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        read_key(scratch_path("missing")),
        Err(crate::error::Error::Io(_))
    ));
}
