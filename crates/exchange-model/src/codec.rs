//! Conversion between wire payloads and [`Body`] values.
//!
//! The host decodes each payload before handing it to a hook and encodes the
//! hook's result before it goes back on the wire. The representation is
//! chosen from the `Content-Type` media type, falling back on the bytes
//! themselves: anything that is not UTF-8 travels as base64.

use tracing::debug;

use crate::body::{Body, BodyError, BodyTag, FormBody};
use crate::fields::{Headers, Queries};

const FORM_MEDIA_TYPE: &str = "application/x-www-form-urlencoded";

/// Decode a wire payload into a [`Body`].
pub fn decode(content_type: Option<&str>, bytes: &[u8]) -> Body {
    let media = content_type.map(media_type);
    let media = media.as_deref();

    if media.is_some_and(is_binary) {
        return Body::from_bytes(bytes);
    }

    let Ok(text) = std::str::from_utf8(bytes) else {
        return Body::from_bytes(bytes);
    };

    match media {
        Some(mt) if is_json(mt) => match serde_json::from_str(text) {
            Ok(value) => Body::Json(value),
            Err(err) => {
                debug!(%err, media_type = mt, "JSON payload did not parse; keeping it as text");
                Body::PlainText(text.to_string())
            }
        },
        Some(FORM_MEDIA_TYPE) => Body::Form(FormBody::Fields(parse_form(text))),
        _ => Body::PlainText(text.to_string()),
    }
}

/// Encode a [`Body`] into wire bytes.
pub fn encode(body: &Body) -> Result<Vec<u8>, BodyError> {
    body.to_bytes()
}

/// The `Content-Type` a freshly tagged body should travel with.
pub fn content_type_for(tag: BodyTag) -> &'static str {
    match tag {
        BodyTag::Json => "application/json",
        BodyTag::Form => FORM_MEDIA_TYPE,
        BodyTag::PlainText => "text/plain; charset=utf-8",
        BodyTag::Base64 => "application/octet-stream",
    }
}

/// Bring `Content-Type` in line with a body whose tag changed from `before`.
///
/// Headers are left alone while the tag is unchanged, so a hook that edits a
/// JSON body keeps whatever vendor media type the server sent. Returns
/// whether the header was rewritten.
pub fn sync_content_type(headers: &mut Headers, before: BodyTag, body: &Body) -> bool {
    let after = body.tag();
    if after == before {
        return false;
    }
    headers.insert("Content-Type", content_type_for(after));
    true
}

pub(crate) fn parse_form(text: &str) -> Queries {
    url::form_urlencoded::parse(text.as_bytes())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect()
}

pub(crate) fn encode_form(fields: &Queries) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter())
        .finish()
}

/// Lower-cased media type without parameters (`text/html; charset=x` -> `text/html`).
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_json(media_type: &str) -> bool {
    media_type == "application/json" || media_type.ends_with("+json")
}

fn is_binary(media_type: &str) -> bool {
    media_type == "application/octet-stream"
        || media_type.starts_with("image/")
        || media_type.starts_with("audio/")
        || media_type.starts_with("video/")
        || media_type.starts_with("font/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_json_media_types() {
        let body = decode(Some("application/json; charset=utf-8"), br#"{"a":1}"#);
        assert_eq!(body, Body::Json(json!({"a": 1})));

        let vendor = decode(Some("application/vnd.api+json"), br#"[1]"#);
        assert_eq!(vendor, Body::Json(json!([1])));
    }

    #[test]
    fn malformed_json_falls_back_to_text() {
        let body = decode(Some("application/json"), b"{oops");
        assert_eq!(body, Body::PlainText("{oops".into()));
    }

    #[test]
    fn decodes_forms_into_fields() {
        let body = decode(Some("application/x-www-form-urlencoded"), b"name=Proxy+man&x=%2F");
        let Body::Form(FormBody::Fields(fields)) = body else {
            panic!("expected form fields");
        };
        assert_eq!(fields.get("name"), Some("Proxy man"));
        assert_eq!(fields.get("x"), Some("/"));
    }

    #[test]
    fn non_utf8_and_binary_types_become_base64() {
        let body = decode(Some("text/plain"), &[0xff, 0x00]);
        assert_eq!(body.tag(), BodyTag::Base64);

        let png = decode(Some("image/png"), b"looks like text");
        assert_eq!(png.tag(), BodyTag::Base64);
        assert_eq!(encode(&png).unwrap(), b"looks like text");
    }

    #[test]
    fn missing_content_type_is_text() {
        assert_eq!(decode(None, b"hello"), Body::PlainText("hello".into()));
    }

    #[test]
    fn json_round_trip_is_structurally_equal() {
        let original = json!({
            "data": [{"id": 1, "createdDate": "2020-01-15T10:00:00Z"}],
            "meta": {"page": 1, "tags": ["a", "b"], "next": null}
        });
        let wire = serde_json::to_vec(&original).unwrap();

        let decoded = decode(Some("application/json"), &wire);
        let re_encoded = encode(&decoded).unwrap();
        let decoded_again = decode(Some("application/json"), &re_encoded);

        assert_eq!(decoded, Body::Json(original));
        assert_eq!(decoded_again, decoded);
    }

    #[test]
    fn form_encoding_escapes_values() {
        let fields = Queries::from_pairs([("q", "a b&c")]);
        assert_eq!(encode_form(&fields), "q=a+b%26c");
    }

    #[test]
    fn content_type_follows_retag_only() {
        let mut headers = Headers::from_pairs([("Content-Type", "application/vnd.x+json")]);
        let json = Body::Json(json!({}));
        assert!(!sync_content_type(&mut headers, BodyTag::Json, &json));
        assert_eq!(headers.get("content-type"), Some("application/vnd.x+json"));

        let text = Body::PlainText("x".into());
        assert!(sync_content_type(&mut headers, BodyTag::Json, &text));
        assert_eq!(headers.get("content-type"), Some("text/plain; charset=utf-8"));
    }
}
