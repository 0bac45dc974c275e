//! Streaming archive download and traversal-hardened extraction.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use reqwest::Client;
use tar::Archive;
use tracing::{debug, instrument};

use crate::error::{FetchError, FetchResult};

const CHUNK_LOG_EVERY_BYTES: u64 = 16 * 1024 * 1024;

/// Streams the gzipped tarball for (owner, name, ref) from the hosted code
/// platform, enforcing `max_bytes` as a hard ceiling on cumulative size.
#[instrument(skip(client, token))]
pub async fn download_tarball(
    client: &Client,
    owner: &str,
    name: &str,
    git_ref: &str,
    token: &str,
    max_bytes: u64,
) -> FetchResult<Vec<u8>> {
    let url = format!("https://api.github.com/repos/{owner}/{name}/tarball/{git_ref}");
    let response = client
        .get(&url)
        .bearer_auth(token)
        .header("Accept", "application/vnd.github.v3+json")
        .send()
        .await
        .map_err(|e| FetchError::Http(e.to_string()))?;
    let response = response
        .error_for_status()
        .map_err(|e| FetchError::Http(e.to_string()))?;

    let mut buf: Vec<u8> = Vec::new();
    let mut total: u64 = 0;
    let mut next_log = CHUNK_LOG_EVERY_BYTES;
    let mut stream = response;
    while let Some(chunk) = stream
        .chunk()
        .await
        .map_err(|e| FetchError::Http(e.to_string()))?
    {
        total += chunk.len() as u64;
        if total > max_bytes {
            return Err(FetchError::ArchiveTooLarge { limit: max_bytes });
        }
        buf.extend_from_slice(&chunk);
        if total > next_log {
            debug!(bytes = total, "archive download progress");
            next_log += CHUNK_LOG_EVERY_BYTES;
        }
    }
    Ok(buf)
}

/// Extracts a gzipped tarball into `dest`, rejecting any entry whose path or
/// symlink target would resolve outside `dest`. Returns the work directory:
/// the sole top-level directory if exactly one exists, else `dest` itself.
#[instrument(skip(bytes))]
pub fn extract_tarball(bytes: &[u8], dest: &Path) -> FetchResult<PathBuf> {
    std::fs::create_dir_all(dest)?;
    let decoder = GzDecoder::new(bytes);
    let mut archive = Archive::new(decoder);

    for entry in archive
        .entries()
        .map_err(|e| FetchError::Extraction(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| FetchError::Extraction(e.to_string()))?;
        let entry_path = entry
            .path()
            .map_err(|e| FetchError::Extraction(e.to_string()))?
            .into_owned();

        let components = normalize_components(&entry_path).ok_or_else(|| {
            FetchError::Extraction(format!(
                "path traversal entry rejected: {}",
                entry_path.display()
            ))
        })?;
        if components.is_empty() {
            continue;
        }

        if let Some(link_target) = entry
            .link_name()
            .map_err(|e| FetchError::Extraction(e.to_string()))?
        {
            if !symlink_target_is_safe(&components, &link_target) {
                return Err(FetchError::Extraction(format!(
                    "symlink escapes scratch directory: {}",
                    entry_path.display()
                )));
            }
        }

        let out_path = dest.join(components_to_path(&components));
        entry
            .unpack(&out_path)
            .map_err(|e| FetchError::Extraction(e.to_string()))?;
    }

    resolve_work_dir(dest)
}

fn normalize_components(path: &Path) -> Option<Vec<OsString>> {
    let mut stack: Vec<OsString> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(part) => stack.push(part.to_os_string()),
            Component::CurDir => {}
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(stack)
}

fn symlink_target_is_safe(entry_components: &[OsString], link_target: &Path) -> bool {
    let mut stack = entry_components.to_vec();
    stack.pop(); // the entry's own parent directory
    for comp in link_target.components() {
        match comp {
            Component::Normal(part) => stack.push(part.to_os_string()),
            Component::CurDir => {}
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return false;
                }
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

fn components_to_path(components: &[OsString]) -> PathBuf {
    components.iter().collect()
}

fn resolve_work_dir(dest: &Path) -> FetchResult<PathBuf> {
    let mut subdirs = Vec::new();
    for entry in std::fs::read_dir(dest)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if entry.file_type()?.is_dir() {
            subdirs.push(entry.path());
        }
    }
    if subdirs.len() == 1 {
        Ok(subdirs.into_iter().next().unwrap())
    } else {
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let gz = Vec::new();
        let encoder = flate2::write::GzEncoder::new(gz, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn extracts_single_top_level_dir_as_work_dir() {
        let tarball = build_tarball(&[("acme-app-abc123/hello.py", b"print(1)\n")]);
        let dest = tempfile::tempdir().unwrap();
        let work_dir = extract_tarball(&tarball, dest.path()).unwrap();
        assert!(work_dir.ends_with("acme-app-abc123"));
        assert!(work_dir.join("hello.py").is_file());
    }

    #[test]
    fn rejects_parent_dir_traversal_entries() {
        let tarball = build_tarball(&[("../evil.txt", b"pwned")]);
        let dest = tempfile::tempdir().unwrap();
        let err = extract_tarball(&tarball, dest.path()).unwrap_err();
        assert!(matches!(err, FetchError::Extraction(_)));
    }

    #[test]
    fn multiple_top_level_entries_use_dest_as_work_dir() {
        let tarball = build_tarball(&[("a/one.txt", b"1"), ("b/two.txt", b"2")]);
        let dest = tempfile::tempdir().unwrap();
        let work_dir = extract_tarball(&tarball, dest.path()).unwrap();
        assert_eq!(work_dir, dest.path());
    }

    #[test]
    fn normalize_components_rejects_escaping_parent_dirs() {
        assert!(normalize_components(Path::new("../../etc/passwd")).is_none());
        assert_eq!(
            normalize_components(Path::new("a/b/../c")).unwrap(),
            vec![OsString::from("a"), OsString::from("c")]
        );
    }
}
