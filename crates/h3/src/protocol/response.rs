//! Response header handling
//!
//! A response head is `http::Response<()>`; on the wire its status travels in the
//! single `:status` pseudo-header field.

use bytes::BytesMut;
use http::{HeaderMap, Response, StatusCode, Version};

use crate::codec::qpack::encode_field_section;
use crate::ensure;
use crate::protocol::header::{sendable_fields, to_http_header};
use crate::protocol::{H3Error, HeaderField};

/// Response header before a body is attached.
pub type ResponseHead = Response<()>;

/// Writes `:status` followed by the sendable fields of `headers`, returning the
/// field section size.
pub fn encode_response_head(status: StatusCode, headers: &HeaderMap, dst: &mut BytesMut) -> u64 {
    let status = [(&b":status"[..], status.as_str().as_bytes())];
    encode_field_section(status.into_iter().chain(sendable_fields(headers)), dst)
}

/// Builds a response head from decoded fields.
pub fn response_head_from_fields(fields: &[HeaderField]) -> Result<ResponseHead, H3Error> {
    let mut status = None;
    let mut headers = HeaderMap::with_capacity(fields.len());

    for field in fields {
        if field.is_pseudo() {
            ensure!(headers.is_empty(), H3Error::message("pseudo-header field after regular field"));
            ensure!(field.name() == b":status", H3Error::message("unknown response pseudo-header"));
            ensure!(status.is_none(), H3Error::message("duplicate :status"));
            status = Some(StatusCode::from_bytes(field.value()).map_err(H3Error::message)?);
            continue;
        }

        let (name, value) = to_http_header(field)?;
        headers.append(name, value);
    }

    let mut response = Response::new(());
    *response.status_mut() = status.ok_or_else(|| H3Error::message("missing :status"))?;
    *response.version_mut() = Version::HTTP_3;
    *response.headers_mut() = headers;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::qpack::decode_field_section;
    use http::header::CONTENT_TYPE;

    #[test]
    fn status_uses_static_table() {
        let mut buf = BytesMut::new();
        encode_response_head(StatusCode::OK, &HeaderMap::new(), &mut buf);
        // prefix + indexed field line 25
        assert_eq!(&buf[..], &[0x00, 0x00, 0xC0 | 25]);
    }

    #[test]
    fn round_trip() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "text/plain".parse().unwrap());
        headers.insert("x-served-by", "micro-h3".parse().unwrap());

        let mut buf = BytesMut::new();
        encode_response_head(StatusCode::CREATED, &headers, &mut buf);

        let fields = decode_field_section(&buf).unwrap();
        let head = response_head_from_fields(&fields).unwrap();
        assert_eq!(head.status(), StatusCode::CREATED);
        assert_eq!(head.headers(), &headers);
    }

    #[test]
    fn malformed_responses() {
        assert!(response_head_from_fields(&[]).is_err());
        assert!(response_head_from_fields(&[HeaderField::new(":status", "abc")]).is_err());
        assert!(response_head_from_fields(&[HeaderField::new(":path", "/")]).is_err());
        assert!(
            response_head_from_fields(&[HeaderField::new(":status", "200"), HeaderField::new(":status", "204")])
                .is_err()
        );
        assert!(
            response_head_from_fields(&[HeaderField::new("server", "x"), HeaderField::new(":status", "200")]).is_err()
        );
    }
}
