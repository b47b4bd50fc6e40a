use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::error::{Result, SyncError};
use crate::sync::FileIndex;
use crate::utils::Log;

/// Relative path -> lower-case hex MD5 digest
pub type HashIndex = HashMap<String, String>;

/// Marker sent in place of a digest when the file does not exist
pub const ABSENT: &str = "-";

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Calculate the MD5 digest of a file, streaming it in 64 KiB chunks.
///
/// Good enough to notice a change, not to detect tampering.
pub fn calculate_file_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| SyncError::from_io(path, e))?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer).map_err(|e| SyncError::from_io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash every file of the index.
///
/// Files that vanish or cannot be read between the scan and the hash are
/// left out, so the result is always a subset of the index.
pub fn build_from_index(index: &FileIndex) -> HashIndex {
    let mut hashes = HashIndex::with_capacity(index.len());

    for (relative_path, absolute_path) in index {
        match calculate_file_hash(absolute_path) {
            Ok(hash) => {
                hashes.insert(relative_path.clone(), hash);
            }
            Err(e) => {
                Log::warning(format!("Skipping {}: {}", relative_path, e), Some(5));
            }
        }
    }

    hashes
}
