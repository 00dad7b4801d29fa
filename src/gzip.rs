//! Gzip framing shared by both compression layers.
//!
//! The outer layer wraps `header || payload`; the inner layer is the
//! archive's own `.tar.gz` compression.  Both are single-member gzip
//! streams.  Headers are written with `mtime = 0` so that identical input
//! produces identical bytes.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use std::io::{self, Read, Write};

/// First two bytes of every gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// zlib's default level, used for the inner `.tar.gz`.
pub const DEFAULT_LEVEL: u32 = 6;
/// Level used for the outer layer.
pub const BEST_LEVEL:    u32 = 9;

pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

/// Gzip encoder over `writer` at `level` (clamped to 0..=9).
pub fn encoder<W: Write>(writer: W, level: u32) -> GzEncoder<W> {
    GzBuilder::new()
        .mtime(0)
        .operating_system(255)
        .write(writer, Compression::new(level.min(9)))
}

pub fn compress(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut enc = encoder(Vec::with_capacity(data.len() / 2 + 64), level);
    enc.write_all(data)?;
    enc.finish()
}

/// Decode one gzip member.  Input that does not start with the gzip magic
/// is rejected up front rather than handed to the inflater.
pub fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    if !is_gzip(data) {
        let found = &data[..data.len().min(2)];
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("missing gzip magic, found {}", hex::encode(found)),
        ));
    }
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_then_decompress() {
        let data = b"nvram=1\nwan=dhcp\n".repeat(50);
        for level in [0, DEFAULT_LEVEL, BEST_LEVEL] {
            let packed = compress(&data, level).unwrap();
            assert!(is_gzip(&packed));
            assert_eq!(decompress(&packed).unwrap(), data);
        }
    }

    #[test]
    fn output_is_deterministic() {
        let a = compress(b"same input", BEST_LEVEL).unwrap();
        let b = compress(b"same input", BEST_LEVEL).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_non_gzip() {
        let err = decompress(b"PK\x03\x04 not gzip").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(decompress(b"").is_err());
    }

    #[test]
    fn rejects_truncated_stream() {
        let packed = compress(&[42u8; 4096], BEST_LEVEL).unwrap();
        assert!(decompress(&packed[..packed.len() / 2]).is_err());
    }
}
