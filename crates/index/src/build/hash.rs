use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use shelf_config::FilterSpec;
use std::path::Path;
use tokio::io::AsyncReadExt;

const READ_BUFFER: usize = 64 * 1024;

/// BLAKE3 digest over the catalog file and the filter in effect, hex encoded.
///
/// Persisted as `inpxHash`; a changed catalog or filter yields a new value.
pub async fn catalog_hash(catalog: &Path, filter: Option<&FilterSpec>) -> Result<String> {
    let mut file = tokio::fs::File::open(catalog).await.or_raise(|| ErrorKind::Io(catalog.to_path_buf()))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let read = file.read(&mut buffer).await.or_raise(|| ErrorKind::Io(catalog.to_path_buf()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    let filter = serde_json::to_vec(&filter).or_raise(|| ErrorKind::config("filter cannot be serialized"))?;
    hasher.update(&filter);
    Ok(hasher.finalize().to_hex().to_string())
}
