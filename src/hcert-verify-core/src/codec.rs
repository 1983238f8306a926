//! Transport codecs: Base45 text encoding and zlib compression.
//!
//! Certificates travel as `PREFIX + base45(zlib(COSE_Sign1))`. Both layers
//! are undone here before any CBOR is looked at.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::VerifyError;

/// RFC 9285 alphabet.
const BASE45_ALPHABET: &[u8; 45] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

/// Ceiling on the size of a decompressed envelope.
pub const MAX_DECOMPRESSED_SIZE: usize = 4 * 1024 * 1024;

fn base45_value(c: u8) -> Option<u32> {
    BASE45_ALPHABET
        .iter()
        .position(|&a| a == c)
        .map(|p| p as u32)
}

/// Decode Base45 text.
///
/// # Errors
///
/// Returns `Base45DecodingFailed` for characters outside the alphabet, a
/// dangling single character, or a group whose value overflows.
pub fn base45_decode(input: &str) -> Result<Vec<u8>, VerifyError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 3 * 2 + 1);

    for chunk in bytes.chunks(3) {
        let mut digits = [0u32; 3];
        for (i, &c) in chunk.iter().enumerate() {
            digits[i] = base45_value(c).ok_or_else(|| {
                VerifyError::base45(format!("invalid character {:?}", c as char))
            })?;
        }

        match chunk.len() {
            3 => {
                let n = digits[0] + digits[1] * 45 + digits[2] * 45 * 45;
                if n > 0xFFFF {
                    return Err(VerifyError::base45("group value exceeds 16 bits"));
                }
                out.push((n >> 8) as u8);
                out.push((n & 0xFF) as u8);
            },
            2 => {
                let n = digits[0] + digits[1] * 45;
                if n > 0xFF {
                    return Err(VerifyError::base45("trailing group exceeds 8 bits"));
                }
                out.push(n as u8);
            },
            _ => return Err(VerifyError::base45("dangling character")),
        }
    }

    Ok(out)
}

/// Encode bytes as Base45 text.
#[must_use]
pub fn base45_encode(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len() / 2 * 3 + 2);
    let push = |out: &mut String, v: u32| out.push(BASE45_ALPHABET[v as usize] as char);

    for chunk in input.chunks(2) {
        if let [a, b] = chunk {
            let n = u32::from(*a) * 256 + u32::from(*b);
            push(&mut out, n % 45);
            push(&mut out, (n / 45) % 45);
            push(&mut out, n / (45 * 45));
        } else {
            let n = u32::from(chunk[0]);
            push(&mut out, n % 45);
            push(&mut out, n / 45);
        }
    }

    out
}

/// Inflate a zlib stream.
///
/// # Errors
///
/// Returns `DecompressionFailed` if the stream is malformed or inflates past
/// [`MAX_DECOMPRESSED_SIZE`].
pub fn zlib_decompress(input: &[u8]) -> Result<Vec<u8>, VerifyError> {
    let mut out = Vec::new();
    ZlibDecoder::new(input)
        .take(MAX_DECOMPRESSED_SIZE as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| VerifyError::decompression(e.to_string()))?;

    if out.len() > MAX_DECOMPRESSED_SIZE {
        return Err(VerifyError::decompression(format!(
            "output exceeds {MAX_DECOMPRESSED_SIZE} bytes"
        )));
    }
    Ok(out)
}

/// Deflate bytes into a zlib stream.
///
/// # Errors
///
/// Returns `DecompressionFailed` if the encoder reports an I/O error.
pub fn zlib_compress(input: &[u8]) -> Result<Vec<u8>, VerifyError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(input)
        .map_err(|e| VerifyError::decompression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| VerifyError::decompression(e.to_string()))
}
