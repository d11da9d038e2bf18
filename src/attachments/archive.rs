//! Packing downloaded attachments into a single `.tar.gz`.

use std::collections::HashMap;
use std::sync::LazyLock;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use regex::Regex;

use crate::error::StorageError;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\?%*:|"<>]"#).expect("valid filename regex"));

/// Archive base name for `context`; falls back to `attachments` when blank.
pub fn sanitize_context_name(context: &str) -> String {
    let trimmed = context.trim();
    if trimmed.is_empty() {
        return "attachments".to_string();
    }
    UNSAFE_CHARS.replace_all(trimmed, "-").into_owned()
}

/// `{sanitized context}.tar.gz`
pub fn archive_file_name(context: &str) -> String {
    format!("{}.tar.gz", sanitize_context_name(context))
}

/// Entry names inside the archive, made unique with a ` (n)` suffix.
fn unique_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    names
        .map(|raw| {
            let name = UNSAFE_CHARS.replace_all(raw, "-").into_owned();
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                return name;
            }
            match name.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({}).{ext}", *count - 1),
                _ => format!("{name} ({})", *count - 1),
            }
        })
        .collect()
}

/// Build a gzip-compressed tar holding `files` as `(name, contents)`.
pub fn build_tar_gz(files: &[(String, Bytes)]) -> Result<Vec<u8>, StorageError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let names = unique_names(files.iter().map(|(name, _)| name.as_str()));
    let mtime = chrono::Utc::now().timestamp().max(0) as u64;

    for (name, (_, contents)) in names.iter().zip(files) {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_ref())
            .map_err(|e| StorageError::Archive(format!("failed to add '{name}': {e}")))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| StorageError::Archive(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| StorageError::Archive(e.to_string()))
}
