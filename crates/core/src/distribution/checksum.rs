use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

use super::DistributionError;
use crate::config::ChecksumKind;

const BUFFER_SIZE: usize = 64 * 1024;

/// Hex digest of a file's contents.
pub async fn file_digest(path: &Path, kind: ChecksumKind) -> Result<String, DistributionError> {
    let read_err = |e| DistributionError::io(format!("failed to read {}", path.display()), e);

    let file = File::open(path).await.map_err(read_err)?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut buffer = vec![0u8; BUFFER_SIZE];

    match kind {
        ChecksumKind::Md5 => {
            let mut context = md5::Context::new();
            loop {
                let n = reader.read(&mut buffer).await.map_err(read_err)?;
                if n == 0 {
                    break;
                }
                context.consume(&buffer[..n]);
            }
            Ok(format!("{:x}", context.compute()))
        }
        ChecksumKind::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = reader.read(&mut buffer).await.map_err(read_err)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
            Ok(format!("{:x}", hasher.finalize()))
        }
    }
}

/// Contents of a checksum file, in `md5sum` format.
pub fn checksum_line(digest: &str, file_name: &str) -> String {
    format!("{}  {}\n", digest, file_name)
}

/// Extract the digest from `md5sum`-style output or a checksum file.
pub fn parse_digest(text: &str) -> Option<String> {
    let token = text.split_whitespace().next()?;
    if !token.is_empty() && token.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(token.to_ascii_lowercase())
    } else {
        None
    }
}
