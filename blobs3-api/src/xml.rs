// Copyright 2026 Blobs3 Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! S3-compatible XML bodies: responses are built by hand, the multipart
//! completion request is parsed with quick-xml.

use blobs3_core::{BucketRecord, Listing};
use chrono::{TimeZone, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::errors::ApiError;

/// Escape the five XML-special characters.
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// ISO-8601 timestamp from engine nanoseconds.
pub fn format_timestamp(nanos: u64) -> String {
    Utc.timestamp_nanos(nanos as i64)
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// HTTP date (`Last-Modified`) from engine nanoseconds.
pub fn format_http_date(nanos: u64) -> String {
    Utc.timestamp_nanos(nanos as i64)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// `<Error>` response body.
pub fn error_response(code: &str, message: &str, request_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
  <Code>{}</Code>
  <Message>{}</Message>
  <RequestId>{}</RequestId>
</Error>"#,
        escape_xml(code),
        escape_xml(message),
        escape_xml(request_id)
    )
}

/// `ListAllMyBucketsResult` response body.
pub fn list_buckets_response(buckets: &[BucketRecord]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Owner>
    <ID>blobs3-owner</ID>
    <DisplayName>blobs3</DisplayName>
  </Owner>
  <Buckets>
"#,
    );
    for bucket in buckets {
        xml.push_str(&format!(
            r#"    <Bucket>
      <Name>{}</Name>
      <CreationDate>{}</CreationDate>
    </Bucket>
"#,
            escape_xml(&bucket.name),
            format_timestamp(bucket.created_at)
        ));
    }
    xml.push_str(
        r#"  </Buckets>
</ListAllMyBucketsResult>"#,
    );
    xml
}

/// `ListBucketResult` response body.
pub fn list_objects_response(
    bucket: &str,
    prefix: &str,
    delimiter: Option<&str>,
    max_keys: usize,
    listing: &Listing,
) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>{}</Name>
  <Prefix>{}</Prefix>
  <MaxKeys>{}</MaxKeys>
  <KeyCount>{}</KeyCount>
  <IsTruncated>{}</IsTruncated>
"#,
        escape_xml(bucket),
        escape_xml(prefix),
        max_keys,
        listing.entries.len() + listing.common_prefixes.len(),
        listing.is_truncated
    );
    if let Some(d) = delimiter {
        xml.push_str(&format!("  <Delimiter>{}</Delimiter>\n", escape_xml(d)));
    }
    if let Some(token) = &listing.next_token {
        xml.push_str(&format!(
            "  <NextContinuationToken>{}</NextContinuationToken>\n",
            escape_xml(token)
        ));
    }
    for entry in &listing.entries {
        xml.push_str(&format!(
            r#"  <Contents>
    <Key>{}</Key>
    <LastModified>{}</LastModified>
    <ETag>{}</ETag>
    <Size>{}</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
"#,
            escape_xml(&entry.key),
            format_timestamp(entry.descriptor.modified_at),
            escape_xml(&entry.descriptor.etag),
            entry.descriptor.size
        ));
    }
    for common in &listing.common_prefixes {
        xml.push_str(&format!(
            r#"  <CommonPrefixes>
    <Prefix>{}</Prefix>
  </CommonPrefixes>
"#,
            escape_xml(common)
        ));
    }
    xml.push_str("</ListBucketResult>");
    xml
}

/// `InitiateMultipartUploadResult` response body.
pub fn initiate_multipart_response(bucket: &str, key: &str, upload_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<InitiateMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Bucket>{}</Bucket>
  <Key>{}</Key>
  <UploadId>{}</UploadId>
</InitiateMultipartUploadResult>"#,
        escape_xml(bucket),
        escape_xml(key),
        escape_xml(upload_id)
    )
}

/// `CompleteMultipartUploadResult` response body.
pub fn complete_multipart_response(bucket: &str, key: &str, etag: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<CompleteMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Location>/{}/{}</Location>
  <Bucket>{}</Bucket>
  <Key>{}</Key>
  <ETag>{}</ETag>
</CompleteMultipartUploadResult>"#,
        escape_xml(bucket),
        escape_xml(key),
        escape_xml(bucket),
        escape_xml(key),
        escape_xml(etag)
    )
}

/// `CopyObjectResult` response body.
pub fn copy_object_response(etag: &str, modified_nanos: u64) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<CopyObjectResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <ETag>{}</ETag>
  <LastModified>{}</LastModified>
</CopyObjectResult>"#,
        escape_xml(etag),
        format_timestamp(modified_nanos)
    )
}

/// Parse a `CompleteMultipartUpload` request body into its part numbers,
/// in document order.
pub fn parse_complete_request(body: &[u8]) -> Result<Vec<u32>, ApiError> {
    let text = std::str::from_utf8(body).map_err(|_| ApiError::MalformedXml)?;
    let mut reader = Reader::from_str(text);

    let mut part_numbers = Vec::new();
    let mut in_part_number = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"PartNumber" => {
                in_part_number = true;
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"PartNumber" => {
                in_part_number = false;
            }
            Ok(Event::Text(e)) if in_part_number => {
                let text = e.unescape().map_err(|_| ApiError::MalformedXml)?;
                let n: u32 = text.trim().parse().map_err(|_| ApiError::MalformedXml)?;
                part_numbers.push(n);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return Err(ApiError::MalformedXml),
        }
    }
    Ok(part_numbers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml(r#"a<b>&"c'"#), "a&lt;b&gt;&amp;&quot;c&apos;");
    }

    #[test]
    fn test_parse_complete_request() {
        let body = br#"<?xml version="1.0" encoding="UTF-8"?>
<CompleteMultipartUpload>
  <Part><PartNumber>2</PartNumber><ETag>"aa"</ETag></Part>
  <Part><PartNumber>1</PartNumber><ETag>"bb"</ETag></Part>
</CompleteMultipartUpload>"#;
        assert_eq!(parse_complete_request(body).unwrap(), vec![2, 1]);
    }

    #[test]
    fn test_parse_complete_request_rejects_garbage() {
        assert!(parse_complete_request(b"<Part><PartNumber>x</PartNumber></Part>").is_err());
        assert!(parse_complete_request(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_error_response_escapes_message() {
        let xml = error_response("InvalidArgument", "bad <key>", "req-1");
        assert!(xml.contains("bad &lt;key&gt;"));
        assert!(xml.contains("<Code>InvalidArgument</Code>"));
    }
}
