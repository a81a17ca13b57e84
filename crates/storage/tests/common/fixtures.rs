use bloom_storage::FilesystemBackend;
use bytes::Bytes;
use tempfile::TempDir;

/// Signing secret long enough to pass config validation.
pub const SIGNING_SECRET: &str = "0123456789abcdef0123456789abcdef";

/// Filesystem backend rooted in a fresh temp dir. Keep the dir alive for the test.
pub async fn filesystem_backend() -> (TempDir, FilesystemBackend) {
    let temp_dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(
        temp_dir.path(),
        Some("http://localhost:3000".to_string()),
        Some(SIGNING_SECRET.to_string()),
    )
    .await
    .unwrap();
    (temp_dir, backend)
}

/// Deterministic stand-in for a scanner frame.
pub fn png_bytes(frame: u8) -> Bytes {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend(std::iter::repeat_n(frame, 64));
    Bytes::from(data)
}
