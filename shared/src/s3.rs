use crate::error::{HistoryError, Result};
use aws_sdk_s3::operation::delete_objects::DeleteObjectsOutput;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_smithy_http::byte_stream::ByteStream;
use aws_smithy_http::result::SdkError;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

static S3: OnceCell<aws_sdk_s3::Client> = OnceCell::const_new();

/// Client built from the ambient AWS environment, shared by every call.
pub async fn client() -> &'static aws_sdk_s3::Client {
    S3.get_or_init(|| async {
        let aws_config = aws_config::load_from_env().await;
        aws_sdk_s3::Client::new(&aws_config)
    })
    .await
}

pub async fn put_text(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    text: &str,
    content_type: &str,
) -> Result<()> {
    let body = ByteStream::from(text.as_bytes().to_vec());

    s3.put_object()
        .bucket(bucket)
        .key(key)
        .content_type(content_type)
        .body(body)
        .send()
        .await
        .map_err(HistoryError::s3)?;

    Ok(())
}

pub async fn get_from_json<T>(
    s3: &aws_sdk_s3::Client,
    bucket_name: &str,
    object_key: &str,
) -> Result<T>
where
    T: DeserializeOwned,
{
    let bytes = get_bytes(s3, bucket_name, object_key).await?;
    let obj = serde_json::from_slice(&bytes)?;

    Ok(obj)
}

pub async fn get_text(s3: &aws_sdk_s3::Client, bucket_name: &str, object_key: &str) -> Result<String> {
    let bytes = get_bytes(s3, bucket_name, object_key).await?;

    String::from_utf8(bytes).map_err(|e| HistoryError::S3(format!("{object_key}: {e}")))
}

async fn get_bytes(s3: &aws_sdk_s3::Client, bucket_name: &str, object_key: &str) -> Result<Vec<u8>> {
    let object = s3
        .get_object()
        .bucket(bucket_name)
        .key(object_key)
        .send()
        .await
        .map_err(HistoryError::s3)?;

    let bytes = object
        .body
        .collect()
        .await
        .map_err(HistoryError::s3)?
        .into_bytes();

    Ok(bytes.to_vec())
}

pub async fn exists(s3: &aws_sdk_s3::Client, bucket_name: &str, object_key: &str) -> Result<bool> {
    match s3
        .head_object()
        .bucket(bucket_name)
        .key(object_key)
        .send()
        .await
    {
        Ok(_) => Ok(true),
        Err(err) if is_not_found(&err) => Ok(false),
        Err(err) => Err(HistoryError::s3(err)),
    }
}

fn is_not_found<R>(err: &SdkError<HeadObjectError, R>) -> bool {
    matches!(err, SdkError::ServiceError(e) if e.err().is_not_found())
}

/// Keys of every object under `prefix`, following continuation tokens.
pub async fn list(s3: &aws_sdk_s3::Client, bucket_name: &str, prefix: &str) -> Result<Vec<String>> {
    let mut continuation_token = None;
    let mut keys = Vec::new();

    loop {
        let mut request = s3.list_objects_v2().bucket(bucket_name).prefix(prefix);

        if let Some(token) = &continuation_token {
            request = request.continuation_token(token);
        }

        let response = request.send().await.map_err(HistoryError::s3)?;

        if let Some(contents) = response.contents {
            keys.extend(contents.into_iter().filter_map(|o| o.key));
        }

        if response.is_truncated {
            continuation_token = response.next_continuation_token;
        } else {
            break;
        }
    }

    Ok(keys)
}

pub async fn delete_many(
    s3: &aws_sdk_s3::Client,
    bucket_name: &str,
    keys: &[String],
) -> Result<DeleteObjectsOutput> {
    let delete_objects: Vec<ObjectIdentifier> = keys
        .iter()
        .map(|key| ObjectIdentifier::builder().set_key(Some(key.clone())).build())
        .collect();

    let response = s3
        .delete_objects()
        .bucket(bucket_name)
        .delete(Delete::builder().set_objects(Some(delete_objects)).build())
        .send()
        .await
        .map_err(HistoryError::s3)?;

    Ok(response)
}
