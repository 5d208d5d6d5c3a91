//! Request body encoding and response body decoding.

use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    StatusCode,
};
use serde_json::Value;
use tracing::warn;

use crate::error::ApiCallError;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Payload of an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Structured data. Sent as JSON, or url-encoded when the caller asks for
    /// `application/x-www-form-urlencoded`.
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for RequestBody {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl RequestBody {
    /// Encodes the body, filling in a `Content-Type` when the caller gave none.
    pub(crate) fn encode(self, headers: &mut HeaderMap) -> Result<Vec<u8>, ApiCallError> {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase());
        let default_content_type = match &self {
            Self::Json(_) => "application/json",
            Self::Text(_) => "text/plain",
            Self::Bytes(_) => "application/octet-stream",
        };

        let encoded = match self {
            Self::Json(value) if is_form(content_type.as_deref()) => {
                serde_urlencoded::to_string(&value)
                    .map_err(|err| ApiCallError::InvalidRequest(format!("form body: {err}")))?
                    .into_bytes()
            }
            Self::Json(value) => serde_json::to_vec(&value)
                .map_err(|err| ApiCallError::InvalidRequest(format!("json body: {err}")))?,
            Self::Text(text) => text.into_bytes(),
            Self::Bytes(bytes) => bytes,
        };

        if content_type.is_none() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(default_content_type));
        }
        Ok(encoded)
    }
}

fn is_form(content_type: Option<&str>) -> bool {
    content_type.map_or(false, |value| value.starts_with(FORM_URLENCODED))
}

/// Payload of a downstream response, decoded according to its `Content-Type`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl ResponseBody {
    pub(crate) fn decode(content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();

        if is_json(&content_type) {
            match serde_json::from_slice(&bytes) {
                Ok(value) => return Self::Json(value),
                Err(err) => {
                    warn!(message = "Response claims JSON but does not parse, returning text", error = %err);
                    return Self::Text(into_text(bytes));
                }
            }
        }
        if content_type.starts_with("text/") {
            return Self::Text(into_text(bytes));
        }
        Self::Bytes(bytes)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

fn is_json(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    mime == "application/json" || mime.ends_with("+json")
}

fn into_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

/// Result of a downstream call. Error statuses are returned here too.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: ResponseBody,
}

impl ApiResponse {
    /// The payload and numeric status code.
    pub fn into_parts(self) -> (ResponseBody, u16) {
        (self.body, self.status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn headers_with(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    #[test]
    fn json_defaults_to_application_json() {
        let mut headers = HeaderMap::new();
        let encoded = RequestBody::from(json!({"name": "Jane"}))
            .encode(&mut headers)
            .unwrap();
        assert_eq!(encoded, br#"{"name":"Jane"}"#);
        assert_eq!(headers[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn json_with_form_content_type_is_urlencoded() {
        let mut headers = headers_with("application/x-www-form-urlencoded");
        let encoded = RequestBody::from(json!({"name": "Jane Doe"}))
            .encode(&mut headers)
            .unwrap();
        assert_eq!(encoded, b"name=Jane+Doe");
        assert_eq!(headers[CONTENT_TYPE], "application/x-www-form-urlencoded");
    }

    #[test]
    fn nested_form_body_is_rejected() {
        let mut headers = headers_with("application/x-www-form-urlencoded");
        let err = RequestBody::from(json!({"user": {"name": "Jane"}}))
            .encode(&mut headers)
            .unwrap_err();
        assert!(matches!(err, ApiCallError::InvalidRequest(_)));
    }

    #[test]
    fn caller_content_type_is_kept() {
        let mut headers = headers_with("text/csv");
        let encoded = RequestBody::from("a,b\n1,2").encode(&mut headers).unwrap();
        assert_eq!(encoded, b"a,b\n1,2");
        assert_eq!(headers[CONTENT_TYPE], "text/csv");
    }

    #[test]
    fn raw_bodies_get_default_content_types() {
        let mut headers = HeaderMap::new();
        RequestBody::from("hi").encode(&mut headers).unwrap();
        assert_eq!(headers[CONTENT_TYPE], "text/plain");

        let mut headers = HeaderMap::new();
        RequestBody::from(vec![0u8, 1, 2]).encode(&mut headers).unwrap();
        assert_eq!(headers[CONTENT_TYPE], "application/octet-stream");
    }

    #[test]
    fn decodes_by_content_type() {
        let body = ResponseBody::decode(
            Some("application/json; charset=utf-8"),
            br#"{"key":"value"}"#.to_vec(),
        );
        assert_eq!(body, ResponseBody::Json(json!({"key": "value"})));

        let body = ResponseBody::decode(Some("application/problem+json"), br#"{"a":1}"#.to_vec());
        assert_eq!(body.as_json(), Some(&json!({"a": 1})));

        let body = ResponseBody::decode(Some("text/plain"), b"Hello, World!".to_vec());
        assert_eq!(body.as_text(), Some("Hello, World!"));

        let body = ResponseBody::decode(Some("application/octet-stream"), vec![0, 1, 2]);
        assert_eq!(body.as_bytes(), Some(&[0u8, 1, 2][..]));

        let body = ResponseBody::decode(None, vec![0xff]);
        assert_eq!(body, ResponseBody::Bytes(vec![0xff]));
    }

    #[test]
    fn unparsable_json_falls_back_to_text() {
        let body = ResponseBody::decode(Some("application/json"), b"oops".to_vec());
        assert_eq!(body, ResponseBody::Text("oops".into()));
    }
}
