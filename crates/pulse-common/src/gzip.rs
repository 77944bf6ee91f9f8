use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Compresses `data` with gzip at the default level.
pub fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompresses a gzip stream. Fails on truncated or corrupt input.
pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let body = br#"[{"id":"a","type":"gauge","value":1.5}]"#;
        let packed = compress(body).unwrap();
        assert_ne!(packed.as_slice(), body.as_slice());
        assert_eq!(decompress(&packed).unwrap(), body);
    }

    #[test]
    fn corrupt_stream_errors() {
        assert!(decompress(b"definitely not gzip").is_err());
    }
}
