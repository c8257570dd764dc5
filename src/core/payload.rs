//! Purpose: Decode one inline-base64 definition part and write it to disk.
//! Exports: `Part`, `PayloadType`, `DecodedPart`, `DefinitionEntry`, `PartStatus`, `PayloadDecoder`.
//! Role: Leaf of the decode stage; the definition decoder drives it part by part.
//! Invariants: Non-candidate parts are returned as their original JSON value, untouched.
//! Invariants: Any failure while decoding or writing a part keeps the original part.
//! Invariants: Written files always resolve under the decoder's output directory.

use std::fs;
use std::path::{Path, PathBuf};

use base64::alphabet;
use base64::engine::{Engine as _, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::paths::resolve_part_path;

const JSON_SUFFIX: &str = ".json";

/// Standard alphabet with padding; non-zero trailing bits in the last symbol are tolerated.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PayloadType {
    InlineBase64,
    #[serde(rename = "DecodedJSON")]
    DecodedJson,
    DecodedText,
    #[serde(untagged)]
    Other(String),
}

/// Typed view of one encoded part. Every field is optional in the source document;
/// a part that does not match this shape is passed through as-is.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(rename = "payloadType", default)]
    pub payload_type: Option<PayloadType>,
}

impl Part {
    /// True when the part is inline base64 with a non-empty payload.
    pub fn is_decode_candidate(&self) -> bool {
        self.payload_type == Some(PayloadType::InlineBase64)
            && self.payload.as_deref().is_some_and(|payload| !payload.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecodedPart {
    pub path: String,
    pub payload: Value,
    #[serde(rename = "payloadType")]
    pub payload_type: PayloadType,
}

/// One slot of a decoded definition's `parts` array.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DefinitionEntry {
    Decoded(DecodedPart),
    Original(Value),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PartStatus {
    Decoded,
    PassedThrough,
    Failed { path: Option<String>, reason: String },
}

/// Decode `part` in memory. Returns `Ok(None)` when the part is not a decode candidate.
pub fn decode_part(part: &Part) -> Result<Option<DecodedPart>, Error> {
    if !part.is_decode_candidate() {
        return Ok(None);
    }
    let Some(path) = part.path.as_deref() else {
        return Err(Error::new(ErrorKind::Decode).with_message("inline part has no path"));
    };
    let payload = part.payload.as_deref().unwrap_or_default();
    let bytes = decode_base64(payload).map_err(|err| err.with_path(path))?;
    let text = String::from_utf8(bytes).map_err(|err| {
        Error::new(ErrorKind::Decode)
            .with_message("payload is not valid utf-8")
            .with_path(path)
            .with_source(err)
    })?;

    if path.ends_with(JSON_SUFFIX) {
        let value: Value = serde_json::from_str(&text).map_err(|err| {
            Error::new(ErrorKind::Decode)
                .with_message("payload is not valid json")
                .with_path(path)
                .with_source(err)
        })?;
        Ok(Some(DecodedPart {
            path: path.to_string(),
            payload: value,
            payload_type: PayloadType::DecodedJson,
        }))
    } else {
        Ok(Some(DecodedPart {
            path: path.to_string(),
            payload: Value::String(text),
            payload_type: PayloadType::DecodedText,
        }))
    }
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, Error> {
    let result = if payload.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = payload
            .chars()
            .filter(|ch| !ch.is_ascii_whitespace())
            .collect();
        PAYLOAD_ENGINE.decode(compact)
    } else {
        PAYLOAD_ENGINE.decode(payload)
    };
    result.map_err(|err| {
        Error::new(ErrorKind::Decode)
            .with_message("payload is not valid base64")
            .with_source(err)
    })
}

/// Write a decoded part below `output_dir`; JSON pretty-printed, text verbatim.
pub fn write_decoded_part(output_dir: &Path, part: &DecodedPart) -> Result<PathBuf, Error> {
    let target = resolve_part_path(output_dir, &part.path)?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| Error::io(err, "failed to create part directory").with_path(parent))?;
    }
    let contents = match (&part.payload_type, &part.payload) {
        (PayloadType::DecodedText, Value::String(text)) => text.clone(),
        (_, value) => serde_json::to_string_pretty(value).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode decoded json")
                .with_path(&target)
                .with_source(err)
        })?,
    };
    fs::write(&target, contents)
        .map_err(|err| Error::io(err, "failed to write decoded part").with_path(&target))?;
    Ok(target)
}

/// Applies decode-and-write to raw part values for one item directory.
pub struct PayloadDecoder<'a> {
    output_dir: &'a Path,
}

impl<'a> PayloadDecoder<'a> {
    pub fn new(output_dir: &'a Path) -> Self {
        Self { output_dir }
    }

    pub fn apply(&self, raw: &Value) -> (DefinitionEntry, PartStatus) {
        let Ok(part) = serde_json::from_value::<Part>(raw.clone()) else {
            return (DefinitionEntry::Original(raw.clone()), PartStatus::PassedThrough);
        };
        let decoded = decode_part(&part).and_then(|decoded| match decoded {
            Some(decoded) => write_decoded_part(self.output_dir, &decoded).map(|written| {
                debug!(part = %decoded.path, file = %written.display(), "decoded part");
                Some(decoded)
            }),
            None => Ok(None),
        });
        match decoded {
            Ok(Some(decoded)) => (DefinitionEntry::Decoded(decoded), PartStatus::Decoded),
            Ok(None) => (DefinitionEntry::Original(raw.clone()), PartStatus::PassedThrough),
            Err(err) => {
                warn!(part = ?part.path, error = %err, "failed to decode part; keeping original");
                (
                    DefinitionEntry::Original(raw.clone()),
                    PartStatus::Failed {
                        path: part.path.clone(),
                        reason: err.to_string(),
                    },
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DefinitionEntry, Part, PartStatus, PayloadDecoder, PayloadType, decode_part,
    };
    use base64::{Engine as _, engine::general_purpose};
    use serde_json::{Value, json};

    fn encode(text: &str) -> String {
        general_purpose::STANDARD.encode(text)
    }

    #[test]
    fn payload_type_round_trips_known_and_unknown_kinds() {
        let inline: PayloadType = serde_json::from_value(json!("InlineBase64")).expect("inline");
        assert_eq!(inline, PayloadType::InlineBase64);
        let other: PayloadType = serde_json::from_value(json!("SomethingElse")).expect("other");
        assert_eq!(other, PayloadType::Other("SomethingElse".to_string()));
        assert_eq!(
            serde_json::to_value(PayloadType::DecodedJson).expect("encode"),
            json!("DecodedJSON")
        );
    }

    #[test]
    fn json_parts_decode_to_values() {
        let part = Part {
            path: Some("queryMetadata.json".to_string()),
            payload: Some(encode(r#"{"queriesMetadata":{"Sales":{"isHidden":true}}}"#)),
            payload_type: Some(PayloadType::InlineBase64),
        };
        let decoded = decode_part(&part).expect("decode").expect("candidate");
        assert_eq!(decoded.payload_type, PayloadType::DecodedJson);
        assert_eq!(decoded.payload["queriesMetadata"]["Sales"]["isHidden"], true);
    }

    #[test]
    fn wrapped_base64_is_accepted() {
        let encoded = encode("section Section1;\nshared Q = 1;");
        let (head, tail) = encoded.split_at(8);
        let part = Part {
            path: Some("mashup.pq".to_string()),
            payload: Some(format!("{head}\n{tail}")),
            payload_type: Some(PayloadType::InlineBase64),
        };
        let decoded = decode_part(&part).expect("decode").expect("candidate");
        assert_eq!(decoded.payload, Value::String("section Section1;\nshared Q = 1;".into()));
    }

    #[test]
    fn empty_or_foreign_parts_are_not_candidates() {
        let empty = Part {
            path: Some("mashup.pq".to_string()),
            payload: Some(String::new()),
            payload_type: Some(PayloadType::InlineBase64),
        };
        assert!(decode_part(&empty).expect("decode").is_none());

        let foreign = Part {
            path: Some("mashup.pq".to_string()),
            payload: Some(encode("x")),
            payload_type: Some(PayloadType::Other("Reference".to_string())),
        };
        assert!(decode_part(&foreign).expect("decode").is_none());
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        let part = Part {
            path: Some("mashup.pq".to_string()),
            payload: Some(general_purpose::STANDARD.encode([0xff, 0xfe, 0x00])),
            payload_type: Some(PayloadType::InlineBase64),
        };
        assert!(decode_part(&part).is_err());
    }

    #[test]
    fn apply_writes_text_and_keeps_passthrough_verbatim() {
        let temp = tempfile::tempdir().expect("tempdir");
        let decoder = PayloadDecoder::new(temp.path());

        let raw = json!({"path": "sub/mashup.pq", "payload": encode("let x = 1"), "payloadType": "InlineBase64"});
        let (entry, status) = decoder.apply(&raw);
        assert_eq!(status, PartStatus::Decoded);
        assert!(matches!(entry, DefinitionEntry::Decoded(_)));
        let written = std::fs::read(temp.path().join("sub").join("mashup.pq")).expect("read");
        assert_eq!(written, b"let x = 1");

        let passthrough = json!({"path": "x.bin", "payload": null, "payloadType": "Reference", "extra": 7});
        let (entry, status) = decoder.apply(&passthrough);
        assert_eq!(status, PartStatus::PassedThrough);
        assert_eq!(entry, DefinitionEntry::Original(passthrough));
    }

    #[test]
    fn apply_keeps_original_on_bad_json_or_escaping_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let decoder = PayloadDecoder::new(temp.path());

        let bad_json = json!({"path": "a.json", "payload": encode("{nope"), "payloadType": "InlineBase64"});
        let (entry, status) = decoder.apply(&bad_json);
        assert!(matches!(status, PartStatus::Failed { .. }));
        assert_eq!(entry, DefinitionEntry::Original(bad_json));

        let escaping = json!({"path": "../evil.pq", "payload": encode("x"), "payloadType": "InlineBase64"});
        let (entry, status) = decoder.apply(&escaping);
        assert!(matches!(status, PartStatus::Failed { .. }));
        assert_eq!(entry, DefinitionEntry::Original(escaping));
        assert!(!temp.path().parent().expect("parent").join("evil.pq").exists());
    }

    #[test]
    fn trailing_bits_in_last_symbol_are_tolerated() {
        let part = Part {
            path: Some("note.txt".to_string()),
            payload: Some("QR==".to_string()),
            payload_type: Some(PayloadType::InlineBase64),
        };
        let decoded = decode_part(&part).expect("decode").expect("candidate");
        assert_eq!(decoded.payload, Value::String("A".into()));
    }

    #[test]
    fn large_json_numbers_are_written_verbatim() {
        let temp = tempfile::tempdir().expect("tempdir");
        let decoder = PayloadDecoder::new(temp.path());

        let raw = json!({
            "path": "a.json",
            "payload": encode(r#"{"id": 12345678901234567890123, "f": 0.1}"#),
            "payloadType": "InlineBase64"
        });
        let (_, status) = decoder.apply(&raw);
        assert_eq!(status, PartStatus::Decoded);
        let written = std::fs::read_to_string(temp.path().join("a.json")).expect("read");
        assert_eq!(written, "{\n  \"id\": 12345678901234567890123,\n  \"f\": 0.1\n}");
    }
}
