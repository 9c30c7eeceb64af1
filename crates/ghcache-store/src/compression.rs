//! Compression utilities for body records.
//!
//! A stored body is one tag byte naming the codec followed by the compressed
//! JSON payload, so any reader can decode it whatever codec the writer used.

use ghcache_core::{CompressionType, Error, Result};
use serde_json::Value;
use std::io::Read;

const TAG_NONE: u8 = 0;
const TAG_GZIP: u8 = 1;
const TAG_ZSTD: u8 = 2;
const TAG_LZ4: u8 = 3;

/// Compress data using the specified algorithm.
pub fn compress(data: &[u8], algorithm: CompressionType) -> Result<Vec<u8>> {
    match algorithm {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Gzip => compress_gzip(data),
        CompressionType::Zstd => compress_zstd(data),
        CompressionType::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
    }
}

/// Decompress data using the specified algorithm.
pub fn decompress(data: &[u8], algorithm: CompressionType) -> Result<Vec<u8>> {
    match algorithm {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Gzip => decompress_gzip(data),
        CompressionType::Zstd => decompress_zstd(data),
        CompressionType::Lz4 => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| Error::Compression(format!("LZ4 decompression failed: {}", e))),
    }
}

/// Serialize and compress a payload into a tagged body record.
pub fn encode_body(payload: &Value, algorithm: CompressionType) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(payload)?;
    let compressed = compress(&json, algorithm)?;
    let mut body = Vec::with_capacity(compressed.len() + 1);
    body.push(tag(algorithm));
    body.extend_from_slice(&compressed);
    Ok(body)
}

/// Decode a tagged body record back into its payload.
pub fn decode_body(body: &[u8]) -> Result<Value> {
    let (&tag, data) = body
        .split_first()
        .ok_or_else(|| Error::Compression("Empty body record".into()))?;
    let json = decompress(data, algorithm(tag)?)?;
    Ok(serde_json::from_slice(&json)?)
}

fn tag(algorithm: CompressionType) -> u8 {
    match algorithm {
        CompressionType::None => TAG_NONE,
        CompressionType::Gzip => TAG_GZIP,
        CompressionType::Zstd => TAG_ZSTD,
        CompressionType::Lz4 => TAG_LZ4,
    }
}

fn algorithm(tag: u8) -> Result<CompressionType> {
    match tag {
        TAG_NONE => Ok(CompressionType::None),
        TAG_GZIP => Ok(CompressionType::Gzip),
        TAG_ZSTD => Ok(CompressionType::Zstd),
        TAG_LZ4 => Ok(CompressionType::Lz4),
        other => Err(Error::Compression(format!("Unknown body codec tag: {}", other))),
    }
}

fn codec_error(codec: &str) -> impl Fn(std::io::Error) -> Error + '_ {
    move |e| Error::Compression(format!("{} codec failed: {}", codec, e))
}

/// Drain a streaming codec into a buffer.
fn read_all(mut reader: impl Read, codec: &str) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    reader
        .read_to_end(&mut output)
        .map_err(codec_error(codec))?;
    Ok(output)
}

fn compress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::stream::encode_all(data, 3).map_err(codec_error("Zstd"))
}

fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    let decoder = zstd::Decoder::new(data).map_err(codec_error("Zstd"))?;
    read_all(decoder, "Zstd")
}

fn compress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    read_all(
        flate2::read::GzEncoder::new(data, flate2::Compression::default()),
        "Gzip",
    )
}

fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    read_all(flate2::read::GzDecoder::new(data), "Gzip")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_readable_whatever_the_writer_codec() {
        let payload = json!([{"name": "repo-a", "private": false}, {"name": "repo-b"}]);
        for codec in [
            CompressionType::None,
            CompressionType::Gzip,
            CompressionType::Zstd,
            CompressionType::Lz4,
        ] {
            let body = encode_body(&payload, codec).unwrap();
            assert_eq!(body[0], tag(codec));
            assert_eq!(decode_body(&body).unwrap(), payload);
        }
    }

    #[test]
    fn test_gzip_shrinks_repetitive_payloads() {
        let payload = json!(vec!["contoso/repository"; 200]);
        let plain = encode_body(&payload, CompressionType::None).unwrap();
        let gzip = encode_body(&payload, CompressionType::Gzip).unwrap();
        assert!(gzip.len() < plain.len() / 4);
    }

    #[test]
    fn test_corrupt_bodies_are_errors() {
        assert!(matches!(decode_body(&[]), Err(Error::Compression(_))));
        assert!(matches!(decode_body(&[9, 1, 2]), Err(Error::Compression(_))));
        assert!(decode_body(&[TAG_GZIP, 0xde, 0xad]).is_err());
    }
}
