//! # Decode Session
//!
//! Line-oriented decode requests in, single-line JSON responses out. A
//! request names a telegram in hex, an optional key, a driver (or `auto`)
//! and a frame format (or auto-detect). The session caches the live meter
//! per meter id so repeated telegrams from the same meter reuse the
//! resolved driver; a changed key evicts the cached meter.
//!
//! Requests are accepted in three content types, auto-detected per line:
//!
//! ```text
//! JSON: {"_":"decode","telegram":"<HEX>","key":"<HEX>","driver":"auto","format":"wmbus"}
//! XMQ:  decode{telegram=<HEX> key=<HEX> driver=auto format=wmbus}
//! XML:  <decode><telegram>HEX</telegram><key>HEX</key></decode>
//! ```
//!
//! Cache growth is unbounded within one session; callers that need
//! eviction implement it on top.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::frame::{check_mbus_frame, check_wmbus_frame, FrameStatus};
use crate::meters::registry::registry;
use crate::meters::{create_meter, Meter, MeterInfo};
use crate::telegram::{AboutTelegram, FrameFormat, Telegram};
use crate::util::hex::decode_telegram_hex;

/// One parsed decode request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecodeRequest {
    #[serde(rename = "_")]
    pub content_type: Option<String>,
    pub telegram: Option<String>,
    pub key: Option<String>,
    pub driver: Option<String>,
    pub format: Option<String>,
}

struct CachedMeter {
    meter: Meter,
    key: String,
}

/// Decoding state shared across requests: the per-meter cache.
#[derive(Default)]
pub struct DecoderSession {
    meter_cache: HashMap<String, CachedMeter>,
}

impl DecoderSession {
    pub fn new() -> DecoderSession {
        DecoderSession {
            meter_cache: HashMap::new(),
        }
    }

    pub fn cached_meters(&self) -> usize {
        self.meter_cache.len()
    }

    /// Decode one request line and render the response as one JSON line.
    pub fn decode_line(&mut self, line: &str) -> String {
        let request = match parse_request(line) {
            Ok(r) => r,
            Err(e) => return format_error(&e.to_string(), ""),
        };
        self.decode(&request)
    }

    /// Decode an already-parsed request.
    pub fn decode(&mut self, request: &DecodeRequest) -> String {
        let telegram_hex = match request.telegram.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => return format_error("missing 'telegram' field in decode request", ""),
        };

        let mut frame = match decode_telegram_hex(telegram_hex) {
            Ok(b) => b,
            Err(_) => return format_error(&DecodeError::InvalidHexString.to_string(), telegram_hex),
        };

        let key_hex = normalize_key(request.key.as_deref());
        let format = detect_format(request.format.as_deref(), &mut frame);

        // Parse the header once to learn the meter identity before the
        // meter (and its key) is resolved.
        let mut probe = Telegram::new(AboutTelegram::new(format), frame.clone());
        if probe.parse_header().is_err() {
            return format_error(&DecodeError::HeaderParse.to_string(), telegram_hex);
        }
        let meter_id = probe.id().to_string();

        let reuse = self
            .meter_cache
            .get(&meter_id)
            .map_or(false, |c| c.key == key_hex);

        if !reuse {
            let mut driver_name = request
                .driver
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| "auto".to_string());
            if driver_name == "auto" {
                driver_name = probe
                    .addresses
                    .last()
                    .and_then(|a| registry().pick_driver(a))
                    .map_or("unknown", |di| di.name)
                    .to_string();
            }

            let mi = MeterInfo {
                name: String::new(),
                id: meter_id.clone(),
                key: key_hex.clone(),
                driver_name,
            };
            let meter = match create_meter(&mi) {
                Ok(m) => m,
                Err(_) => return format_error(&DecodeError::CreateMeter.to_string(), telegram_hex),
            };
            self.meter_cache.insert(
                meter_id.clone(),
                CachedMeter {
                    meter,
                    key: key_hex.clone(),
                },
            );
        }

        let Some(cached) = self.meter_cache.get_mut(&meter_id) else {
            return format_error(&DecodeError::CreateMeter.to_string(), telegram_hex);
        };

        let (telegram, handled) = match cached.meter.handle_telegram(AboutTelegram::new(format), frame)
        {
            Ok(result) => result,
            Err(e) => {
                let msg = match e {
                    DecodeError::UnsupportedCi(_) => DecodeError::HeaderParse.to_string(),
                    other => other.to_string(),
                };
                return format_error(&msg, telegram_hex);
            }
        };

        let mut json = cached.meter.print_meter_json(&telegram);

        if !handled {
            if telegram.decryption_failed {
                json.insert(
                    "error".into(),
                    Value::String(DecodeError::DecryptionFailed.to_string()),
                );
            } else {
                json.insert(
                    "error".into(),
                    Value::String(DecodeError::DecodingFailed.to_string()),
                );
                json.insert("error_analyze".into(), Value::String(telegram.analyze()));
            }
            json.insert("telegram".into(), Value::String(telegram_hex.to_string()));
        } else {
            let content = telegram.content_bytes();
            let understood = telegram.understood_bytes();
            if content > 0 && understood < content {
                json.insert(
                    "warning".into(),
                    Value::String(format!(
                        "telegram only partially decoded ({understood} of {content} bytes)"
                    )),
                );
                json.insert("telegram".into(), Value::String(telegram_hex.to_string()));
            }
        }

        Value::Object(json).to_string()
    }
}

fn normalize_key(key: Option<&str>) -> String {
    match key {
        None | Some("") | Some("NOKEY") => String::new(),
        Some(k) => k.to_string(),
    }
}

/// Pick the frame format, trimming the wired M-Bus checksum and stop byte
/// when the envelope validates.
fn detect_format(format: Option<&str>, frame: &mut Vec<u8>) -> FrameFormat {
    match format {
        Some("wmbus") => FrameFormat::Wmbus,
        Some("mbus") => {
            trim_mbus_envelope(frame);
            FrameFormat::Mbus
        }
        _ => {
            // Auto-detect: wM-Bus is the common case, wired the fallback.
            // The request holds exactly one telegram, so the wM-Bus length
            // must cover the whole buffer; a wired frame whose 0x68 start
            // byte happens to read as a plausible length falls through.
            match check_wmbus_frame(frame) {
                FrameStatus::Full(slice) if slice.frame_length == frame.len() => {
                    FrameFormat::Wmbus
                }
                _ if trim_mbus_envelope(frame) => FrameFormat::Mbus,
                _ => FrameFormat::Wmbus,
            }
        }
    }
}

fn trim_mbus_envelope(frame: &mut Vec<u8>) -> bool {
    if let FrameStatus::Full(slice) = check_mbus_frame(frame) {
        frame.truncate(slice.payload_len);
        true
    } else {
        false
    }
}

fn format_error(message: &str, telegram_hex: &str) -> String {
    let mut map = Map::new();
    map.insert("error".into(), Value::String(message.to_string()));
    if !telegram_hex.is_empty() {
        map.insert("telegram".into(), Value::String(telegram_hex.to_string()));
    }
    Value::Object(map).to_string()
}

/// Parse one request line, auto-detecting JSON, XMQ or XML.
pub fn parse_request(line: &str) -> Result<DecodeRequest, DecodeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::InvalidRequest("empty line".into()));
    }
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .map_err(|e| DecodeError::InvalidRequest(e.to_string()));
    }
    if trimmed.starts_with('<') {
        return parse_xml_request(trimmed);
    }
    if trimmed.starts_with("decode{") && trimmed.ends_with('}') {
        return parse_xmq_request(trimmed);
    }
    Err(DecodeError::InvalidRequest(
        "expected JSON, XMQ or XML".into(),
    ))
}

fn parse_xml_request(line: &str) -> Result<DecodeRequest, DecodeError> {
    if !line.contains("<decode>") {
        return Err(DecodeError::InvalidRequest("expected <decode> element".into()));
    }
    Ok(DecodeRequest {
        content_type: Some("decode".into()),
        telegram: xml_tag(line, "telegram"),
        key: xml_tag(line, "key"),
        driver: xml_tag(line, "driver"),
        format: xml_tag(line, "format"),
    })
}

fn xml_tag(line: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = line.find(&open)? + open.len();
    let end = line[start..].find(&close)? + start;
    Some(line[start..end].trim().to_string())
}

fn parse_xmq_request(line: &str) -> Result<DecodeRequest, DecodeError> {
    let inner = &line["decode{".len()..line.len() - 1];
    let mut request = DecodeRequest {
        content_type: Some("decode".into()),
        ..Default::default()
    };
    for part in inner.split_whitespace() {
        let (k, v) = part
            .split_once('=')
            .ok_or_else(|| DecodeError::InvalidRequest(format!("expected key=value, got {part}")))?;
        match k {
            "telegram" => request.telegram = Some(v.to_string()),
            "key" => request.key = Some(v.to_string()),
            "driver" => request.driver = Some(v.to_string()),
            "format" => request.format = Some(v.to_string()),
            other => {
                return Err(DecodeError::InvalidRequest(format!(
                    "unknown field {other}"
                )))
            }
        }
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_request() {
        let r = parse_request(
            r#"{"_":"decode","telegram":"2A44","key":"NOKEY","driver":"auto","format":"wmbus"}"#,
        )
        .unwrap();
        assert_eq!(r.telegram.as_deref(), Some("2A44"));
        assert_eq!(r.key.as_deref(), Some("NOKEY"));
        assert_eq!(r.format.as_deref(), Some("wmbus"));
    }

    #[test]
    fn test_parse_xmq_request() {
        let r = parse_request("decode{telegram=2A44 key=NOKEY driver=auto format=wmbus}").unwrap();
        assert_eq!(r.telegram.as_deref(), Some("2A44"));
        assert_eq!(r.driver.as_deref(), Some("auto"));
    }

    #[test]
    fn test_parse_xml_request() {
        let r = parse_request(
            "<decode><telegram>2A44</telegram><key>NOKEY</key><driver>auto</driver></decode>",
        )
        .unwrap();
        assert_eq!(r.telegram.as_deref(), Some("2A44"));
        assert_eq!(r.key.as_deref(), Some("NOKEY"));
        assert!(r.format.is_none());
    }

    #[test]
    fn test_bad_requests() {
        assert!(parse_request("").is_err());
        assert!(parse_request("garbage").is_err());
        assert!(parse_request("{not json}").is_err());
    }

    #[test]
    fn test_invalid_hex_response() {
        let mut s = DecoderSession::new();
        let out = s.decode_line(r#"{"_":"decode","telegram":"XYZ"}"#);
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["error"], "invalid hex string");
    }

    #[test]
    fn test_missing_telegram_field() {
        let mut s = DecoderSession::new();
        let out = s.decode_line(r#"{"_":"decode","key":"NOKEY"}"#);
        let v: Value = serde_json::from_str(&out).unwrap();
        assert!(v["error"]
            .as_str()
            .unwrap()
            .contains("missing 'telegram' field"));
    }

    #[test]
    fn test_header_parse_error_echoes_telegram() {
        let mut s = DecoderSession::new();
        let out = s.decode_line(r#"{"_":"decode","telegram":"FF00112233"}"#);
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["error"], "failed to parse telegram header");
        assert_eq!(v["telegram"], "FF00112233");
    }
}
