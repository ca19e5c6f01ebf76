use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec;
use crate::fields::Queries;

/// Discriminant of a [`Body`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyTag {
    Json,
    Form,
    PlainText,
    Base64,
}

impl fmt::Display for BodyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BodyTag::Json => "json",
            BodyTag::Form => "form",
            BodyTag::PlainText => "plain-text",
            BodyTag::Base64 => "base64",
        })
    }
}

/// A url-encoded form, either parsed into fields or kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormBody {
    Fields(Queries),
    Raw(String),
}

impl FormBody {
    /// The form as parsed fields, parsing a raw form if needed.
    pub fn to_fields(&self) -> Queries {
        match self {
            FormBody::Fields(fields) => fields.clone(),
            FormBody::Raw(raw) => codec::parse_form(raw),
        }
    }

    /// The form in `application/x-www-form-urlencoded` text.
    pub fn to_encoded(&self) -> String {
        match self {
            FormBody::Fields(fields) => codec::encode_form(fields),
            FormBody::Raw(raw) => raw.clone(),
        }
    }
}

/// Errors raised when a body value does not fit its representation.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("cannot store {found} in a {tag} body")]
    TagMismatch { tag: BodyTag, found: &'static str },

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("cannot convert a {from} body to {to}: {reason}")]
    Unconvertible {
        from: BodyTag,
        to: BodyTag,
        reason: String,
    },
}

/// The payload of a request or response.
///
/// Serialized with an explicit discriminant so a host or script always knows
/// which representation it holds:
///
/// ```json
/// { "type": "json", "value": { "data": [] } }
/// { "type": "plain-text", "value": "hello" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Body {
    /// A structured JSON value tree.
    Json(Value),
    /// A url-encoded form.
    Form(FormBody),
    /// UTF-8 text.
    PlainText(String),
    /// Opaque bytes carried as standard base64.
    Base64(String),
}

impl Default for Body {
    fn default() -> Self {
        Body::PlainText(String::new())
    }
}

impl Body {
    /// Wrap raw bytes as a base64 body.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Body::Base64(STANDARD.encode(bytes))
    }

    pub fn tag(&self) -> BodyTag {
        match self {
            Body::Json(_) => BodyTag::Json,
            Body::Form(_) => BodyTag::Form,
            Body::PlainText(_) => BodyTag::PlainText,
            Body::Base64(_) => BodyTag::Base64,
        }
    }

    pub fn as_json_mut(&mut self) -> Option<&mut Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Replace the payload with `value` while keeping the current tag.
    ///
    /// The value must fit the tag: any JSON value for `json`, an object of
    /// strings or a string for `form`, a string for `plain-text`, and a valid
    /// base64 string for `base64`. Anything else is rejected and the body is
    /// left untouched. Changing representation goes through [`Body::retag`].
    pub fn assign_value(&mut self, value: Value) -> Result<(), BodyError> {
        let tag = self.tag();
        let replacement = match (tag, value) {
            (BodyTag::Json, value) => Body::Json(value),
            (BodyTag::Form, Value::String(raw)) => Body::Form(FormBody::Raw(raw)),
            (BodyTag::Form, Value::Object(map)) => {
                let mut fields = Queries::new();
                for (name, value) in map {
                    match value {
                        Value::String(value) => {
                            fields.insert(name, value);
                        }
                        other => {
                            return Err(BodyError::TagMismatch {
                                tag,
                                found: shape_of(&other),
                            })
                        }
                    }
                }
                Body::Form(FormBody::Fields(fields))
            }
            (BodyTag::PlainText, Value::String(text)) => Body::PlainText(text),
            (BodyTag::Base64, Value::String(encoded)) => {
                STANDARD.decode(&encoded)?;
                Body::Base64(encoded)
            }
            (tag, other) => {
                return Err(BodyError::TagMismatch {
                    tag,
                    found: shape_of(&other),
                })
            }
        };
        *self = replacement;
        Ok(())
    }

    /// Convert to another representation.
    ///
    /// Text-like conversions go through the body's wire form, so
    /// `plain-text` to `json` parses the text and anything to `base64`
    /// encodes the wire bytes. Conversions that would lose structure fail.
    pub fn retag(&self, target: BodyTag) -> Result<Body, BodyError> {
        let from = self.tag();
        if from == target {
            return Ok(self.clone());
        }

        match (self, target) {
            (_, BodyTag::Base64) => Ok(Body::from_bytes(&self.to_bytes()?)),
            (Body::Json(value), BodyTag::Form) => {
                let Value::Object(map) = value else {
                    return Err(BodyError::Unconvertible {
                        from,
                        to: target,
                        reason: format!("expected an object, found {}", shape_of(value)),
                    });
                };
                let mut fields = Queries::new();
                for (name, value) in map {
                    let value = match value {
                        Value::String(s) => s.clone(),
                        Value::Number(_) | Value::Bool(_) => value.to_string(),
                        other => {
                            return Err(BodyError::Unconvertible {
                                from,
                                to: target,
                                reason: format!("field '{name}' is {}", shape_of(other)),
                            })
                        }
                    };
                    fields.insert(name.clone(), value);
                }
                Ok(Body::Form(FormBody::Fields(fields)))
            }
            (Body::Form(form), BodyTag::Json) => {
                let object = form
                    .to_fields()
                    .iter()
                    .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
                    .collect();
                Ok(Body::Json(Value::Object(object)))
            }
            (_, BodyTag::Json) => Ok(Body::Json(serde_json::from_str(&self.to_text()?)?)),
            (_, BodyTag::Form) => Ok(Body::Form(FormBody::Fields(codec::parse_form(
                &self.to_text()?,
            )))),
            (_, BodyTag::PlainText) => Ok(Body::PlainText(self.to_text()?)),
        }
    }

    /// The body's wire text. Fails for base64 payloads that are not UTF-8.
    pub fn to_text(&self) -> Result<String, BodyError> {
        match self {
            Body::Json(value) => Ok(value.to_string()),
            Body::Form(form) => Ok(form.to_encoded()),
            Body::PlainText(text) => Ok(text.clone()),
            Body::Base64(_) => String::from_utf8(self.to_bytes()?).map_err(|_| BodyError::NotUtf8),
        }
    }

    /// The body's wire bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BodyError> {
        match self {
            Body::Json(value) => Ok(serde_json::to_vec(value)?),
            Body::Form(form) => Ok(form.to_encoded().into_bytes()),
            Body::PlainText(text) => Ok(text.as_bytes().to_vec()),
            Body::Base64(encoded) => Ok(STANDARD.decode(encoded)?),
        }
    }
}

/// Short description of a JSON value's shape for error messages.
pub(crate) fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_kebab_case_tag() {
        let body = Body::PlainText("hi".into());
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, json!({"type": "plain-text", "value": "hi"}));

        let parsed: Body = serde_json::from_value(json!({"type": "json", "value": {"a": 1}})).unwrap();
        assert_eq!(parsed, Body::Json(json!({"a": 1})));
    }

    #[test]
    fn form_body_accepts_fields_or_raw() {
        let fields: Body =
            serde_json::from_value(json!({"type": "form", "value": {"a": "1"}})).unwrap();
        assert!(matches!(fields, Body::Form(FormBody::Fields(_))));

        let raw: Body = serde_json::from_value(json!({"type": "form", "value": "a=1&b=2"})).unwrap();
        assert_eq!(raw, Body::Form(FormBody::Raw("a=1&b=2".into())));
    }

    #[test]
    fn assign_keeps_tag_for_matching_shapes() {
        let mut body = Body::Json(json!({}));
        body.assign_value(json!({"new-key": "new-value"})).unwrap();
        assert_eq!(body, Body::Json(json!({"new-key": "new-value"})));

        let mut text = Body::PlainText(String::new());
        text.assign_value(json!("hello")).unwrap();
        assert_eq!(text, Body::PlainText("hello".into()));
    }

    #[test]
    fn assign_rejects_structured_value_on_plain_text() {
        let mut body = Body::PlainText("original".into());
        let err = body.assign_value(json!({"data": []})).unwrap_err();
        assert!(matches!(
            err,
            BodyError::TagMismatch {
                tag: BodyTag::PlainText,
                found: "an object"
            }
        ));
        assert_eq!(body, Body::PlainText("original".into()));
    }

    #[test]
    fn assign_rejects_bad_base64() {
        let mut body = Body::from_bytes(b"\x00\x01");
        let err = body.assign_value(json!("not base64!!")).unwrap_err();
        assert!(matches!(err, BodyError::InvalidBase64(_)));
    }

    #[test]
    fn assign_form_requires_string_fields() {
        let mut body = Body::Form(FormBody::Raw(String::new()));
        assert!(body.assign_value(json!({"page": 2})).is_err());
        body.assign_value(json!({"page": "2"})).unwrap();
        assert_eq!(body.retag(BodyTag::PlainText).unwrap(), Body::PlainText("page=2".into()));
    }

    #[test]
    fn retag_text_to_json_parses() {
        let body = Body::PlainText(r#"{"a":[1,2]}"#.into());
        assert_eq!(body.retag(BodyTag::Json).unwrap(), Body::Json(json!({"a": [1, 2]})));
        assert!(Body::PlainText("nope".into()).retag(BodyTag::Json).is_err());
    }

    #[test]
    fn retag_json_to_form_stringifies_scalars() {
        let body = Body::Json(json!({"name": "x", "n": 3, "ok": true}));
        let form = body.retag(BodyTag::Form).unwrap();
        let Body::Form(FormBody::Fields(fields)) = form else {
            panic!("expected form fields");
        };
        assert_eq!(fields.get("n"), Some("3"));
        assert_eq!(fields.get("ok"), Some("true"));

        let nested = Body::Json(json!({"a": {"b": 1}}));
        assert!(matches!(
            nested.retag(BodyTag::Form),
            Err(BodyError::Unconvertible { .. })
        ));
    }

    #[test]
    fn retag_through_base64_is_lossless_for_text() {
        let body = Body::PlainText("héllo".into());
        let encoded = body.retag(BodyTag::Base64).unwrap();
        assert_eq!(encoded.tag(), BodyTag::Base64);
        assert_eq!(encoded.retag(BodyTag::PlainText).unwrap(), body);
    }

    #[test]
    fn binary_base64_cannot_become_text() {
        let body = Body::from_bytes(&[0xff, 0xfe, 0x00]);
        assert!(matches!(body.to_text(), Err(BodyError::NotUtf8)));
    }
}
