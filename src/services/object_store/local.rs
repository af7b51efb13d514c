//! src/services/object_store/local.rs
//!
//! LocalObjectStore: an S3-like bucket store on local disk. Buckets are
//! directories beneath `base_path`, objects are sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`. Used for single-node
//! deployments and development setups that still want bucket semantics.

use super::{ObjectStoreClient, StoreError, StoreResult};
use async_trait::async_trait;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::{debug, instrument};
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    /// Base directory on disk where buckets live.
    pub base_path: PathBuf,
}

impl LocalObjectStore {
    /// Open a store rooted at `base_path`, creating the directory if needed.
    pub async fn open(base_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.contains("..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(StoreError::Backend(format!("invalid object key `{}`", key)));
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_bucket_name_safe(&self, name: &str) -> StoreResult<()> {
        let reject = |reason: &str| {
            Err(StoreError::InvalidBucketName {
                name: name.to_string(),
                reason: reason.into(),
            })
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return reject("must be between 3 and 63 characters");
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return reject("allowed characters are lowercase letters, digits, dots, and hyphens");
        }

        if name.starts_with('.')
            || name.ends_with('.')
            || name.starts_with('-')
            || name.ends_with('-')
        {
            return reject("must start and end with a lowercase letter or digit");
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return reject("cannot contain consecutive dots or dot-hyphen combinations");
        }

        if is_ipv4_like(name) {
            return reject("must not be formatted like an IP address");
        }

        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Two-level shard directories from MD5(bucket/key), lowercase hex.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn ensure_bucket_present(&self, bucket: &str) -> StoreResult<()> {
        self.ensure_bucket_name_safe(bucket)?;
        if fs::metadata(self.bucket_root(bucket)).await.is_ok_and(|m| m.is_dir()) {
            Ok(())
        } else {
            Err(StoreError::Backend(format!("bucket `{}` does not exist", bucket)))
        }
    }

    /// Remove one object file and prune the shard directories it leaves empty.
    async fn remove_object_file(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.ensure_key_safe(key)?;
        let file_path = self.object_path(bucket, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(bucket);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }

    /// Recursively remove empty directories up to (not including) `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> StoreResult<()> {
        let file_path = self.object_path(bucket, key);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&file_path, data).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn read_object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        fs::read(self.object_path(bucket, key)).await.ok()
    }
}

#[async_trait]
impl ObjectStoreClient for LocalObjectStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        self.ensure_bucket_name_safe(bucket)?;
        match fs::metadata(self.bucket_root(bucket)).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.ensure_bucket_name_safe(bucket)?;
        fs::create_dir_all(self.bucket_root(bucket)).await?;
        Ok(())
    }

    /// Copy through a temp file in the destination shard directory and
    /// rename into place, so a reader never sees a partial object.
    ///
    /// Only a missing source file is `NotFound`. Shard directories are shared
    /// between keys, so the copy path never prunes them: a concurrent copy
    /// into the same shard may be about to write there.
    #[instrument(skip(self), fields(backend = "local"))]
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<()> {
        self.ensure_key_safe(src_key)?;
        self.ensure_key_safe(dst_key)?;
        self.ensure_bucket_present(src_bucket).await?;
        self.ensure_bucket_present(dst_bucket).await?;

        let src_path = self.object_path(src_bucket, src_key);
        let mut src = match fs::File::open(&src_path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    bucket: src_bucket.to_string(),
                    key: src_key.to_string(),
                });
            }
            Err(err) => return Err(StoreError::Io(err)),
        };

        let dst_path = self.object_path(dst_bucket, dst_key);
        let parent = dst_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = async {
            let mut tmp = fs::File::create(&tmp_path).await?;
            tokio::io::copy(&mut src, &mut tmp).await?;
            tmp.sync_all().await?;
            fs::rename(&tmp_path, &dst_path).await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.ensure_bucket_present(bucket).await?;
        self.remove_object_file(bucket, key).await
    }

    #[instrument(skip(self, keys), fields(backend = "local", keys = keys.len()))]
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StoreResult<()> {
        self.ensure_bucket_present(bucket).await?;
        for key in keys {
            self.remove_object_file(bucket, key).await?;
        }
        Ok(())
    }
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
