//! Object store client
//!
//! Files up to [`MULTIPART_THRESHOLD`] go up in a single `PutObject`. Larger
//! files (multi-gigabyte weight shards) use a multipart upload, since S3
//! rejects single PUTs over 5 GiB.

use crate::error::{PackagerError, PackagerResult};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use std::path::Path;

const SERVICE: &str = "s3";

/// Files larger than this are uploaded in parts
pub const MULTIPART_THRESHOLD: u64 = 64 * 1024 * 1024;

/// Default part size; grows for files that would exceed [`MAX_PARTS`]
pub const MIN_PART_SIZE: u64 = 64 * 1024 * 1024;

/// S3 limit on parts per upload
pub const MAX_PARTS: u64 = 10_000;

/// Destination for artifact files
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Copy the bytes of `path` to `bucket/key`, replacing any existing object
    async fn upload_file(&self, path: &Path, bucket: &str, key: &str) -> PackagerResult<()>;
}

/// One part of a multipart upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    /// 1-based, as S3 numbers parts
    pub number: i32,
    pub offset: u64,
    pub length: u64,
}

/// Split `total` bytes into contiguous parts
///
/// Every part but the last is the same size, at least [`MIN_PART_SIZE`],
/// and there are never more than [`MAX_PARTS`].
pub fn plan_parts(total: u64) -> Vec<PartRange> {
    let part_size = MIN_PART_SIZE.max(total.div_ceil(MAX_PARTS));
    let mut parts = Vec::new();
    let mut offset = 0;
    let mut number = 1;
    while offset < total {
        let length = part_size.min(total - offset);
        parts.push(PartRange {
            number,
            offset,
            length,
        });
        offset += length;
        number += 1;
    }
    parts
}

/// Amazon S3 object store
pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    pub fn from_sdk_config(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: S3Client::new(sdk_config),
        }
    }

    async fn put_single(&self, path: &Path, bucket: &str, key: &str) -> PackagerResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| PackagerError::io(path, std::io::Error::other(e.to_string())))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| PackagerError::transport(SERVICE, DisplayErrorContext(e)))?;
        Ok(())
    }

    async fn put_multipart(&self, path: &Path, bucket: &str, key: &str, size: u64) -> PackagerResult<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| PackagerError::transport(SERVICE, DisplayErrorContext(e)))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| PackagerError::transport(SERVICE, "multipart upload returned no upload id"))?
            .to_string();

        match self.upload_parts(path, bucket, key, &upload_id, size).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| PackagerError::transport(SERVICE, DisplayErrorContext(e)))?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        key = %key,
                        upload_id = %upload_id,
                        error = %DisplayErrorContext(abort_err),
                        "Failed to abort multipart upload"
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        path: &Path,
        bucket: &str,
        key: &str,
        upload_id: &str,
        size: u64,
    ) -> PackagerResult<Vec<CompletedPart>> {
        let plan = plan_parts(size);
        let mut completed = Vec::with_capacity(plan.len());

        for part in plan {
            let body = ByteStream::read_from()
                .path(path)
                .offset(part.offset)
                .length(Length::Exact(part.length))
                .build()
                .await
                .map_err(|e| PackagerError::io(path, std::io::Error::other(e.to_string())))?;

            let out = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part.number)
                .body(body)
                .send()
                .await
                .map_err(|e| PackagerError::transport(SERVICE, DisplayErrorContext(e)))?;

            tracing::debug!(key = %key, part = part.number, bytes = part.length, "Uploaded part");
            completed.push(
                CompletedPart::builder()
                    .set_e_tag(out.e_tag().map(str::to_string))
                    .part_number(part.number)
                    .build(),
            );
        }

        Ok(completed)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn upload_file(&self, path: &Path, bucket: &str, key: &str) -> PackagerResult<()> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| PackagerError::io(path, e))?
            .len();

        if size > MULTIPART_THRESHOLD {
            self.put_multipart(path, bucket, key, size).await?;
        } else {
            self.put_single(path, bucket, key).await?;
        }

        tracing::debug!(bucket = %bucket, key = %key, bytes = size, "Uploaded object");
        Ok(())
    }
}

/// Shared AWS configuration for the S3 and SageMaker clients
pub async fn load_sdk_config(region: Option<String>) -> aws_config::SdkConfig {
    let loader = aws_config::defaults(BehaviorVersion::latest());
    match region {
        Some(region) => loader.region(aws_config::Region::new(region)).load().await,
        None => loader.load().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn assert_contiguous(parts: &[PartRange], total: u64) {
        let mut expected_offset = 0;
        for (i, part) in parts.iter().enumerate() {
            assert_eq!(part.number, i as i32 + 1);
            assert_eq!(part.offset, expected_offset);
            assert!(part.length > 0);
            expected_offset += part.length;
        }
        assert_eq!(expected_offset, total);
    }

    #[test]
    fn test_plan_parts_large_shard() {
        // ~8.7 GB shard, well above the single PUT limit
        let total = 8_700_000_000;
        let parts = plan_parts(total);

        assert_contiguous(&parts, total);
        assert_eq!(parts.len() as u64, total.div_ceil(MIN_PART_SIZE));
        assert!(parts.iter().all(|p| p.length <= MIN_PART_SIZE));
        assert!(parts.iter().rev().skip(1).all(|p| p.length == MIN_PART_SIZE));
    }

    #[test]
    fn test_plan_parts_exact_multiple() {
        let parts = plan_parts(3 * MIN_PART_SIZE);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].offset, 2 * MIN_PART_SIZE);
        assert_eq!(parts[2].length, MIN_PART_SIZE);
    }

    #[test]
    fn test_plan_parts_grows_part_size_past_limit() {
        let total = 1024 * GIB;
        let parts = plan_parts(total);

        assert_contiguous(&parts, total);
        assert!(parts.len() as u64 <= MAX_PARTS);
        assert!(parts[0].length > MIN_PART_SIZE);
    }

    #[test]
    fn test_plan_parts_small_and_empty() {
        assert!(plan_parts(0).is_empty());

        let parts = plan_parts(MULTIPART_THRESHOLD + 1);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].length, 1);
    }
}
