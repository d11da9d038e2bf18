//! Object storage for attachment files.
//!
//! Files are addressed two ways: by object path inside the bucket
//! (`{owner}/{millis}_{filename}`), and by the public URL saved on the
//! record. `public_url` and `storage_path_from_url` convert between the two
//! and are the only place either conversion happens.

pub mod rest;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;
use uuid::Uuid;

use crate::error::StorageError;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    fn bucket(&self) -> &str;

    /// Public URL for an object path in this bucket.
    fn public_url(&self, path: &str) -> String;

    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Delete all `paths` in one batch request.
    async fn remove(&self, paths: &[String]) -> Result<(), StorageError>;

    async fn download(&self, url: &str) -> Result<Bytes, StorageError>;
}

/// Object path for a newly uploaded file.
pub fn object_path(owner: Uuid, millis: i64, filename: &str) -> String {
    format!("{owner}/{millis}_{filename}")
}

/// `{base}/storage/v1/object/public/{bucket}/{path}` with each path segment
/// percent-encoded.
pub fn public_object_url(base: &str, bucket: &str, path: &str) -> String {
    let encoded: Vec<String> = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!(
        "{}/storage/v1/object/public/{}/{}",
        base.trim_end_matches('/'),
        urlencoding::encode(bucket),
        encoded.join("/")
    )
}

/// Recover the object path from a stored attachment URL.
///
/// The bucket segment right after `object/public` is preferred; otherwise the
/// first segment naming the bucket is used. Returns `None` when the URL does
/// not parse, the bucket is absent, or nothing follows it.
pub fn storage_path_from_url(url: &str, bucket: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segments: Vec<String> = parsed
        .path_segments()?
        .map(|segment| urlencoding::decode(segment).map(|s| s.into_owned()))
        .collect::<Result<_, _>>()
        .ok()?;

    let after_public = segments
        .windows(3)
        .position(|w| w[0] == "object" && w[1] == "public" && w[2] == bucket)
        .map(|i| i + 3);
    let start = match after_public {
        Some(start) => start,
        None => segments.iter().position(|s| s == bucket)? + 1,
    };

    let rest = segments.get(start..)?;
    if rest.is_empty() || rest.iter().all(|s| s.is_empty()) {
        return None;
    }
    Some(rest.join("/"))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{object_path, public_object_url, storage_path_from_url};

    const BASE: &str = "https://demo.supabase.co";

    #[test]
    fn resolves_path_after_public_bucket_segment() {
        let url = format!("{BASE}/storage/v1/object/public/attachments/u1/1700000000000_brief.pdf");
        assert_eq!(
            storage_path_from_url(&url, "attachments").as_deref(),
            Some("u1/1700000000000_brief.pdf")
        );
    }

    #[test]
    fn prefers_public_segment_when_owner_folder_shares_bucket_name() {
        let url = format!("{BASE}/storage/v1/object/public/attachments/attachments/a.pdf");
        assert_eq!(
            storage_path_from_url(&url, "attachments").as_deref(),
            Some("attachments/a.pdf")
        );
    }

    #[test]
    fn falls_back_to_first_bucket_segment() {
        let url = format!("{BASE}/storage/v1/object/sign/attachments/u1/a.pdf?token=abc");
        assert_eq!(
            storage_path_from_url(&url, "attachments").as_deref(),
            Some("u1/a.pdf")
        );
    }

    #[test]
    fn unresolvable_urls_yield_none() {
        let other_bucket = format!("{BASE}/storage/v1/object/public/other/a.pdf");
        assert_eq!(storage_path_from_url(&other_bucket, "attachments"), None);

        let bucket_only = format!("{BASE}/storage/v1/object/public/attachments/");
        assert_eq!(storage_path_from_url(&bucket_only, "attachments"), None);

        assert_eq!(storage_path_from_url("not a url", "attachments"), None);
    }

    #[test]
    fn public_url_round_trips_spaces_and_non_ascii() {
        let owner = Uuid::new_v4();
        for name in ["Tenancy Agreement (signed).pdf", "租約 副本.docx", "100%_final#2.txt"] {
            let path = object_path(owner, 1_700_000_000_000, name);
            let url = public_object_url(BASE, "attachments", &path);
            assert!(!url.contains(' '), "url must be encoded: {url}");
            assert_eq!(
                storage_path_from_url(&url, "attachments").as_deref(),
                Some(path.as_str()),
                "round trip failed for {name}"
            );
        }
    }

    #[test]
    fn object_path_prefixes_owner_and_timestamp() {
        let owner = Uuid::nil();
        assert_eq!(
            object_path(owner, 42, "a.pdf"),
            "00000000-0000-0000-0000-000000000000/42_a.pdf"
        );
    }
}
