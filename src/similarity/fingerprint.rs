use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Files larger than this are fingerprinted by prefix and size only
pub const PREFIX_BYTES: u64 = 1024 * 1024;

/// Cheap file signature used to spot byte-identical duplicates.
///
/// Large files hash only their first megabyte plus the decimal file size, so
/// equality is probabilistic. This is a pre-filter, not an integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentFingerprint {
    pub size_bytes: u64,
    pub digest: String,
}

pub fn fingerprint(path: &Path) -> Result<ContentFingerprint> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let size_bytes = file
        .metadata()
        .with_context(|| format!("Failed to stat {:?}", path))?
        .len();

    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();

    if size_bytes > PREFIX_BYTES {
        let mut prefix = Vec::with_capacity(PREFIX_BYTES as usize);
        reader
            .by_ref()
            .take(PREFIX_BYTES)
            .read_to_end(&mut prefix)
            .with_context(|| format!("Failed to read {:?}", path))?;
        hasher.update(&prefix);
        hasher.update(size_bytes.to_string().as_bytes());
    } else {
        let mut buffer = [0; 8192];
        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .with_context(|| format!("Failed to read {:?}", path))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
    }

    Ok(ContentFingerprint {
        size_bytes,
        digest: hasher.finalize().to_hex().to_string(),
    })
}

/// Memoizes fingerprints by path for one search run. Failures are logged and
/// remembered as `None` so a vanished file is not retried.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: HashMap<PathBuf, Option<ContentFingerprint>>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &Path) -> Option<&ContentFingerprint> {
        self.entries
            .entry(path.to_path_buf())
            .or_insert_with(|| match fingerprint(path) {
                Ok(fp) => Some(fp),
                Err(e) => {
                    log::warn!("Fingerprint failed for {:?}: {:#}", path, e);
                    None
                }
            })
            .as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Bucket paths by digest, keeping only buckets with more than one member.
/// Buckets and their members keep input order.
pub fn group_exact_duplicates<'a>(
    fingerprints: impl IntoIterator<Item = (&'a Path, &'a ContentFingerprint)>,
) -> Vec<Vec<PathBuf>> {
    let mut order: Vec<&str> = Vec::new();
    let mut buckets: HashMap<&str, Vec<PathBuf>> = HashMap::new();

    for (path, fp) in fingerprints {
        let bucket = buckets.entry(fp.digest.as_str()).or_default();
        if bucket.is_empty() {
            order.push(fp.digest.as_str());
        }
        bucket.push(path.to_path_buf());
    }

    order
        .into_iter()
        .filter_map(|digest| buckets.remove(digest))
        .filter(|bucket| bucket.len() > 1)
        .collect()
}
