//! Streaming Hasher: a tee-style sink that updates MD5, SHA-1,
//! SHA-256, and CRC32 as bytes flow, without buffering the full body.
//!
//! An incremental, multi-algorithm accumulator suitable for teeing
//! between a source reader and a destination writer during a
//! cross-account streaming copy.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// The digests produced at end-of-stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hashes {
    pub md5_hex: String,
    pub sha1_hex: String,
    pub sha256_hex: String,
    pub crc32: u32,
    pub size: u64,
}

impl Hashes {
    /// ETag-comparable form: reference S3 quotes single-part MD5 ETags.
    pub fn md5_etag(&self) -> String {
        format!("\"{}\"", self.md5_hex)
    }
}

/// Incremental multi-algorithm hasher. `write` is called once per chunk as
/// data streams through; `finish` consumes it and returns the digests.
pub struct StreamingHasher {
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
    crc32: crc32fast::Hasher,
    size: u64,
}

impl Default for StreamingHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self {
            md5: Md5::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            crc32: crc32fast::Hasher::new(),
            size: 0,
        }
    }

    /// Feed a chunk through all four algorithms. Called from the tee point
    /// between the source reader and destination writer; never buffers the
    /// chunk beyond the four in-progress digest states.
    pub fn write(&mut self, chunk: &[u8]) {
        self.md5.update(chunk);
        self.sha1.update(chunk);
        self.sha256.update(chunk);
        self.crc32.update(chunk);
        self.size += chunk.len() as u64;
    }

    pub fn bytes_written(&self) -> u64 {
        self.size
    }

    /// Finalize all four digests. Consumes `self` since the underlying
    /// hasher states are moved out.
    pub fn finish(self) -> Hashes {
        Hashes {
            md5_hex: hex::encode(self.md5.finalize()),
            sha1_hex: hex::encode(self.sha1.finalize()),
            sha256_hex: hex::encode(self.sha256.finalize()),
            crc32: self.crc32.finalize(),
            size: self.size,
        }
    }
}

/// An [`AsyncRead`] tee: reads from `inner`, feeding every chunk through a
/// [`StreamingHasher`] before returning it to the caller. Used to hash a
/// GET response body while it streams straight into a PUT body,
/// with zero additional buffering beyond the digest states themselves.
pub struct TeeReader<R> {
    inner: R,
    hasher: StreamingHasher,
}

impl<R> TeeReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: StreamingHasher::new(),
        }
    }

    /// Consume the tee, returning the inner reader (for cases where the
    /// caller wants it back) and the finished hashes.
    pub fn into_hashes(self) -> Hashes {
        self.hasher.finish()
    }
}

impl<R: tokio::io::AsyncRead + Unpin> tokio::io::AsyncRead for TeeReader<R> {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let inner = std::pin::Pin::new(&mut self.inner);
        let poll = inner.poll_read(cx, buf);
        if poll.is_ready() {
            let after = buf.filled().len();
            if after > before {
                self.hasher.write(&buf.filled()[before..after]);
            }
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_out_of_band_digests() {
        let body = b"the quick brown fox jumps over the lazy dog";
        let mut hasher = StreamingHasher::new();
        // Feed in small chunks to exercise incremental update.
        for chunk in body.chunks(7) {
            hasher.write(chunk);
        }
        let hashes = hasher.finish();

        assert_eq!(hashes.size, body.len() as u64);

        let expected_md5 = hex::encode(md5::Md5::digest(body));
        assert_eq!(hashes.md5_hex, expected_md5);

        let expected_sha1 = hex::encode(sha1::Sha1::digest(body));
        assert_eq!(hashes.sha1_hex, expected_sha1);

        let expected_sha256 = hex::encode(sha2::Sha256::digest(body));
        assert_eq!(hashes.sha256_hex, expected_sha256);

        let mut crc = crc32fast::Hasher::new();
        crc.update(body);
        assert_eq!(hashes.crc32, crc.finalize());
    }

    #[test]
    fn empty_input_hashes_are_stable() {
        let hasher = StreamingHasher::new();
        let hashes = hasher.finish();
        assert_eq!(hashes.size, 0);
        assert_eq!(hashes.md5_hex, hex::encode(md5::Md5::digest(b"")));
    }

    #[tokio::test]
    async fn tee_reader_hashes_while_passing_bytes_through() {
        use tokio::io::AsyncReadExt;

        let body = b"streamed payload bytes".to_vec();
        let mut tee = TeeReader::new(std::io::Cursor::new(body.clone()));
        let mut out = Vec::new();
        tee.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, body);

        let hashes = tee.into_hashes();
        assert_eq!(hashes.size, body.len() as u64);
        assert_eq!(hashes.md5_hex, hex::encode(md5::Md5::digest(&body)));
    }
}
