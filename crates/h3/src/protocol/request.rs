//! Request header handling
//!
//! Maps a decoded request field section onto `http::Request<()>` and back. The
//! control data travels in pseudo-header fields, [RFC 9114 Section 4.3.1](https://www.rfc-editor.org/rfc/rfc9114.html#section-4.3.1):
//!
//! - `:method` always
//! - `:scheme` and `:path` except for CONNECT
//! - `:authority` optionally, and required for CONNECT
//!
//! Pseudo-header fields come first, at most once each; any other pseudo-header
//! makes the request malformed.

use bytes::BytesMut;
use http::request::Parts;
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderMap, Method, Request, Uri, Version};

use crate::codec::qpack::encode_field_section;
use crate::ensure;
use crate::protocol::header::{sendable_fields, to_http_header};
use crate::protocol::{H3Error, HeaderField};

/// A request header: method, uri and fields, without a body.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body, converting into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|_| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Writes this header as a QPACK field section into `dst`, returning the
    /// field section size.
    pub fn encode(&self, dst: &mut BytesMut) -> u64 {
        let uri = self.uri();
        let method = self.method();

        let mut pseudo: Vec<(&[u8], &[u8])> = Vec::with_capacity(4);
        pseudo.push((b":method", method.as_str().as_bytes()));
        if method != Method::CONNECT {
            pseudo.push((b":scheme", uri.scheme_str().unwrap_or("https").as_bytes()));
        }
        if let Some(authority) = uri.authority() {
            pseudo.push((b":authority", authority.as_str().as_bytes()));
        }
        if method != Method::CONNECT {
            let path = uri.path_and_query().map_or("/", PathAndQuery::as_str);
            pseudo.push((b":path", path.as_bytes()));
        }

        encode_field_section(pseudo.into_iter().chain(sendable_fields(self.headers())), dst)
    }
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

/// Builds a request header from decoded fields, validating the pseudo-headers.
impl TryFrom<&[HeaderField]> for RequestHeader {
    type Error = H3Error;

    fn try_from(fields: &[HeaderField]) -> Result<Self, Self::Error> {
        let mut method = None;
        let mut scheme = None;
        let mut authority = None;
        let mut path = None;

        let mut headers = HeaderMap::with_capacity(fields.len());
        let mut regular_seen = false;

        for field in fields {
            if !field.is_pseudo() {
                regular_seen = true;
                let (name, value) = to_http_header(field)?;
                headers.append(name, value);
                continue;
            }

            ensure!(!regular_seen, H3Error::message("pseudo-header field after regular field"));
            let slot = match field.name() {
                b":method" => &mut method,
                b":scheme" => &mut scheme,
                b":authority" => &mut authority,
                b":path" => &mut path,
                other => {
                    return Err(H3Error::message(format!("unknown pseudo-header {}", String::from_utf8_lossy(other))));
                }
            };
            ensure!(
                slot.is_none(),
                H3Error::message(format!("duplicate pseudo-header {}", String::from_utf8_lossy(field.name())))
            );
            *slot = Some(field.value());
        }

        let method = method.ok_or_else(|| H3Error::message("missing :method"))?;
        let method = Method::from_bytes(method).map_err(H3Error::message)?;

        let uri = if method == Method::CONNECT {
            ensure!(scheme.is_none() && path.is_none(), H3Error::message("CONNECT with :scheme or :path"));
            let authority = authority.ok_or_else(|| H3Error::message("CONNECT without :authority"))?;
            Uri::from(Authority::try_from(authority).map_err(H3Error::message)?)
        } else {
            let scheme = scheme.ok_or_else(|| H3Error::message("missing :scheme"))?;
            let path = path.ok_or_else(|| H3Error::message("missing :path"))?;
            ensure!(!path.is_empty(), H3Error::message("empty :path"));

            let path = PathAndQuery::try_from(path).map_err(H3Error::message)?;
            match authority {
                Some(authority) => Uri::builder()
                    .scheme(Scheme::try_from(scheme).map_err(H3Error::message)?)
                    .authority(Authority::try_from(authority).map_err(H3Error::message)?)
                    .path_and_query(path)
                    .build()
                    .map_err(H3Error::message)?,
                None => Uri::from(path),
            }
        };

        let mut request = Request::new(());
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.version_mut() = Version::HTTP_3;
        *request.headers_mut() = headers;

        Ok(Self { inner: request })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::qpack::decode_field_section;
    use crate::protocol::ErrorCode;
    use http::HeaderValue;

    fn fields(pairs: &[(&'static str, &'static str)]) -> Vec<HeaderField> {
        pairs.iter().map(|(name, value)| HeaderField::new(*name, *value)).collect()
    }

    #[test]
    fn from_browser_like_fields() {
        let fields = fields(&[
            (":method", "GET"),
            (":scheme", "https"),
            (":authority", "example.com:4433"),
            (":path", "/index/?a=1&b=2"),
            ("accept", "*/*"),
            ("user-agent", "curl/8.5.0"),
        ]);

        let header = RequestHeader::try_from(&fields[..]).unwrap();
        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.uri().scheme_str(), Some("https"));
        assert_eq!(header.uri().host(), Some("example.com"));
        assert_eq!(header.uri().port_u16(), Some(4433));
        assert_eq!(header.uri().path(), "/index/");
        assert_eq!(header.uri().query(), Some("a=1&b=2"));
        assert_eq!(header.as_ref().version(), Version::HTTP_3);
        assert_eq!(header.headers().len(), 2);
        assert_eq!(header.headers().get(http::header::ACCEPT), Some(&HeaderValue::from_static("*/*")));
    }

    #[test]
    fn without_authority() {
        let fields = fields(&[(":method", "POST"), (":scheme", "https"), (":path", "/upload")]);
        let header = RequestHeader::try_from(&fields[..]).unwrap();
        assert_eq!(header.method(), &Method::POST);
        assert_eq!(header.uri().path(), "/upload");
        assert_eq!(header.uri().host(), None);
    }

    #[test]
    fn connect_uses_authority_only() {
        let fields = fields(&[(":method", "CONNECT"), (":authority", "proxy.local:443")]);
        let header = RequestHeader::try_from(&fields[..]).unwrap();
        assert_eq!(header.uri().authority().map(Authority::as_str), Some("proxy.local:443"));

        let fields = self::fields(&[(":method", "CONNECT"), (":authority", "a:1"), (":path", "/")]);
        assert!(RequestHeader::try_from(&fields[..]).is_err());
    }

    #[test]
    fn malformed_requests() {
        let cases: Vec<Vec<HeaderField>> = vec![
            fields(&[(":scheme", "https"), (":path", "/")]),
            fields(&[(":method", "GET"), (":path", "/")]),
            fields(&[(":method", "GET"), (":scheme", "https")]),
            fields(&[(":method", "GET"), (":method", "GET"), (":scheme", "https"), (":path", "/")]),
            fields(&[(":method", "GET"), (":scheme", "https"), (":path", "/"), (":protocol", "x")]),
            fields(&[(":method", "GET"), ("accept", "*/*"), (":scheme", "https"), (":path", "/")]),
            fields(&[(":method", "GET"), (":scheme", "https"), (":path", "/"), ("connection", "close")]),
            fields(&[(":method", "GET"), (":scheme", "https"), (":path", "")]),
        ];

        for (i, case) in cases.iter().enumerate() {
            let err = RequestHeader::try_from(&case[..]).unwrap_err();
            assert_eq!(err.code(), ErrorCode::H3_MESSAGE_ERROR, "case {i}");
        }
    }

    #[test]
    fn encode_then_decode() {
        let request = Request::builder()
            .method(Method::GET)
            .uri("https://example.com/index.html")
            .header("accept", "*/*")
            .header("connection", "keep-alive")
            .body(())
            .unwrap();
        let header = RequestHeader::from(request);

        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        let decoded = decode_field_section(&buf).unwrap();
        assert_eq!(
            decoded,
            fields(&[
                (":method", "GET"),
                (":scheme", "https"),
                (":authority", "example.com"),
                (":path", "/index.html"),
                ("accept", "*/*"),
            ])
        );

        let parsed = RequestHeader::try_from(&decoded[..]).unwrap();
        assert_eq!(parsed.uri(), header.uri());
    }
}
