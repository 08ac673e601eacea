//! MSU-1 PCM header inspection
//!
//! An MSU-1 PCM file starts with the `MSU1` magic followed by a little-endian
//! u32 loop point (in samples).

use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::trace;

use super::rules::LoopOracle;

const MAGIC: &[u8; 4] = b"MSU1";
const HEADER_LEN: usize = 8;

/// Loop oracle backed by the PCM header
///
/// A file loops iff its header is valid and the loop point is non-zero.
/// Unreadable or malformed files are reported as not looping.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmLoopOracle;

impl PcmLoopOracle {
    /// Read the loop point from a PCM file header
    pub fn loop_point(path: &Path) -> Option<u32> {
        let mut header = [0u8; HEADER_LEN];
        let mut file = File::open(path).ok()?;
        file.read_exact(&mut header).ok()?;
        parse_header(&header)
    }
}

fn parse_header(header: &[u8; HEADER_LEN]) -> Option<u32> {
    if &header[..4] != MAGIC {
        return None;
    }
    Some(u32::from_le_bytes([header[4], header[5], header[6], header[7]]))
}

impl LoopOracle for PcmLoopOracle {
    fn loops(&self, path: &Path) -> bool {
        let point = Self::loop_point(path);
        trace!(path = %path.display(), loop_point = ?point, "PCM header");
        matches!(point, Some(p) if p > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn pcm_with(header: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(header).unwrap();
        file.write_all(&[0u8; 16]).unwrap();
        file
    }

    #[test]
    fn test_loop_point_detection() {
        let looping = pcm_with(b"MSU1\x10\x27\x00\x00");
        let one_shot = pcm_with(b"MSU1\x00\x00\x00\x00");
        let garbage = pcm_with(b"RIFF\x10\x27\x00\x00");

        assert_eq!(PcmLoopOracle::loop_point(looping.path()), Some(10_000));
        assert!(PcmLoopOracle.loops(looping.path()));
        assert!(!PcmLoopOracle.loops(one_shot.path()));
        assert!(!PcmLoopOracle.loops(garbage.path()));
        assert!(!PcmLoopOracle.loops(Path::new("/nonexistent/track-1.pcm")));
    }

    #[test]
    fn test_truncated_header() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"MSU1\x01").unwrap();
        assert_eq!(PcmLoopOracle::loop_point(file.path()), None);
    }
}
