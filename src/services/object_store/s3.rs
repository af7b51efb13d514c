//! S3-compatible object store backed by the AWS SDK.

use super::{ObjectStoreClient, StoreError, StoreResult};
use crate::config::S3Config;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{
    Client,
    config::http::HttpResponse,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types::{
        BucketLocationConstraint, CompletedMultipartUpload, CompletedPart,
        CreateBucketConfiguration, Delete, ObjectIdentifier,
    },
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, instrument, warn};

/// Characters left as-is in the key part of `CopySource`.
const COPY_SOURCE_KEY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Region that rejects an explicit location constraint on bucket creation.
const DEFAULT_REGION: &str = "us-east-1";

/// Largest object a single `CopyObject` request accepts.
const MAX_SINGLE_COPY_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Part size of multipart copies; 10 000 parts cover the 5 TiB object limit.
const MULTIPART_COPY_PART_SIZE: u64 = 512 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
    region: String,
    /// Objects larger than this are copied part by part.
    multipart_threshold: u64,
    part_size: u64,
}

impl S3ObjectStore {
    /// Build a client from the default AWS credential chain, pointed at a
    /// custom endpoint when one is configured.
    pub async fn connect(cfg: &S3Config) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(cfg.region.clone()));
        if let Some(endpoint) = &cfg.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(cfg.path_style)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            region: cfg.region.clone(),
            multipart_threshold: MAX_SINGLE_COPY_SIZE,
            part_size: MULTIPART_COPY_PART_SIZE,
        }
    }

    /// Size of the source object, or `None` when the HEAD request answered
    /// 404. HEAD responses carry no error code, so the copy request that
    /// follows tells a missing key from a missing bucket.
    async fn source_size(&self, bucket: &str, key: &str) -> StoreResult<Option<u64>> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(head) => Ok(Some(
                head.content_length()
                    .and_then(|len| u64::try_from(len).ok())
                    .unwrap_or_default(),
            )),
            Err(err) if status_of(&err) == Some(404) => Ok(None),
            Err(err) => Err(backend_error(err)),
        }
    }

    async fn single_copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<()> {
        self.client
            .copy_object()
            .copy_source(copy_source(src_bucket, src_key))
            .bucket(dst_bucket)
            .key(dst_key)
            .send()
            .await
            .map_err(|err| copy_error(err, src_bucket, src_key))?;
        Ok(())
    }

    /// `UploadPartCopy` in ranges of `part_size`; the upload is aborted when
    /// any part or the completion fails.
    async fn multipart_copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        size: u64,
    ) -> StoreResult<()> {
        let upload = self
            .client
            .create_multipart_upload()
            .bucket(dst_bucket)
            .key(dst_key)
            .send()
            .await
            .map_err(backend_error)?;
        let upload_id = upload
            .upload_id()
            .ok_or_else(|| StoreError::Backend("multipart upload without an upload id".into()))?
            .to_string();

        let copied = self
            .copy_parts(src_bucket, src_key, dst_bucket, dst_key, &upload_id, size)
            .await;
        let completed = match copied {
            Ok(parts) => self
                .client
                .complete_multipart_upload()
                .bucket(dst_bucket)
                .key(dst_key)
                .upload_id(&upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await
                .map(|_| ())
                .map_err(backend_error),
            Err(err) => Err(err),
        };

        if completed.is_err() {
            let aborted = self
                .client
                .abort_multipart_upload()
                .bucket(dst_bucket)
                .key(dst_key)
                .upload_id(&upload_id)
                .send()
                .await;
            if let Err(err) = aborted {
                warn!(
                    upload_id,
                    error = %DisplayErrorContext(&err),
                    "failed to abort multipart copy"
                );
            }
        }
        completed
    }

    async fn copy_parts(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        upload_id: &str,
        size: u64,
    ) -> StoreResult<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        for (part_number, first, last) in part_ranges(size, self.part_size) {
            let output = self
                .client
                .upload_part_copy()
                .bucket(dst_bucket)
                .key(dst_key)
                .upload_id(upload_id)
                .part_number(part_number)
                .copy_source(copy_source(src_bucket, src_key))
                .copy_source_range(format!("bytes={}-{}", first, last))
                .send()
                .await
                .map_err(|err| copy_error(err, src_bucket, src_key))?;
            let e_tag = output
                .copy_part_result()
                .and_then(|result| result.e_tag())
                .ok_or_else(|| {
                    StoreError::Backend(format!("part {} copied without an etag", part_number))
                })?;
            debug!(part_number, first, last, "copied part");
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(e_tag)
                    .build(),
            );
        }
        Ok(parts)
    }
}

/// HTTP status of a failed request, when a response was received at all.
fn status_of<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|raw| raw.status().as_u16())
}

fn backend_error<E>(err: SdkError<E, HttpResponse>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StoreError::Backend(DisplayErrorContext(&err).to_string())
}

/// A 404 on a copy request means the source key is gone, unless the error
/// code names a missing bucket.
fn copy_error<E>(err: SdkError<E, HttpResponse>, bucket: &str, key: &str) -> StoreError
where
    E: std::error::Error + ProvideErrorMetadata + Send + Sync + 'static,
{
    if status_of(&err) == Some(404) && err.code() != Some("NoSuchBucket") {
        StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    } else {
        backend_error(err)
    }
}

/// Inclusive byte ranges `(part_number, first, last)` covering `size` bytes.
fn part_ranges(size: u64, part_size: u64) -> Vec<(i32, u64, u64)> {
    let part_size = part_size.max(1);
    (0..size)
        .step_by(part_size as usize)
        .zip(1..)
        .map(|(first, part_number)| (part_number, first, (first + part_size).min(size) - 1))
        .collect()
}

/// The encoded `bucket/key` value of the `x-amz-copy-source` header.
fn copy_source(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, utf8_percent_encode(key, COPY_SOURCE_KEY))
}

#[async_trait]
impl ObjectStoreClient for S3ObjectStore {
    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if status_of(&err) == Some(404) => Ok(false),
            Err(err) => Err(backend_error(err)),
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request.send().await.map_err(backend_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<()> {
        match self.source_size(src_bucket, src_key).await? {
            Some(size) if size > self.multipart_threshold => {
                debug!(size, "copying in parts");
                self.multipart_copy(src_bucket, src_key, dst_bucket, dst_key, size)
                    .await
            }
            _ => {
                self.single_copy(src_bucket, src_key, dst_bucket, dst_key)
                    .await
            }
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        match self
            .client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if status_of(&err) == Some(404) && err.code() != Some("NoSuchBucket") => {
                debug!(key, "object already absent");
                Ok(())
            }
            Err(err) => Err(backend_error(err)),
        }
    }

    #[instrument(skip(self, keys), fields(backend = "s3", keys = keys.len()))]
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|err| StoreError::Backend(err.to_string()))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(backend_error)?;

        let failed = output
            .errors()
            .iter()
            .find(|err| err.code() != Some("NoSuchKey"));
        if let Some(err) = failed {
            return Err(StoreError::Backend(format!(
                "failed to delete `{}` from `{}`: {} {}",
                err.key().unwrap_or_default(),
                bucket,
                err.code().unwrap_or_default(),
                err.message().unwrap_or_default(),
            )));
        }
        Ok(())
    }
}
