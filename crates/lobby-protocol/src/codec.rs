//! Codec trait and the line-oriented text codec.
//!
//! A "codec" turns a [`Frame`] into the text sent over the socket and back.
//! Decoding is split in two: [`Codec::decode_header`] extracts only what is
//! needed to route a frame (type, id, error code), and
//! [`Codec::decode_payload`] parses the fields. Routing code decodes the
//! header first so a broken payload can still be attributed to the right
//! request.
//!
//! # Text format
//!
//! One frame per message, one `key: value` pair per line:
//!
//! ```text
//! type: partyInviteRequest
//! id: 12
//! friendID: u42
//! tags: [casual,eu-west]
//! ```
//!
//! List values are wrapped in `[` `]` and separated by `,`. A backslash
//! escapes `\`, newline (`\n`), carriage return (`\r`), and inside lists
//! also `,` `[` `]`. A plain string that starts with `[` has that bracket
//! escaped so it isn't read back as a list. `[]` is the empty list; a
//! list holding a single empty string is written `[\e]`.

use crate::{FieldValue, Fields, Frame, Header, MessageId, MessageType, ProtocolError};

const TYPE_KEY: &str = "type";
const ID_KEY: &str = "id";
const CODE_KEY: &str = "code";

/// The whole body of a list holding exactly one empty string.
const SINGLE_EMPTY_ITEM: &str = "\\e";

/// Converts frames to and from wire text.
///
/// - `Send + Sync + 'static` → the codec lives inside the lobby driver
///   task for as long as the lobby exists.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidField`] if a key can't be written.
    fn encode(&self, frame: &Frame) -> Result<String, ProtocolError>;

    /// Parses only the header block.
    ///
    /// # Errors
    /// Returns a header error ([`ProtocolError::is_header_error`]) if the
    /// type is missing or the id/code aren't numbers.
    fn decode_header(&self, text: &str) -> Result<Header, ProtocolError>;

    /// Parses only the payload fields.
    ///
    /// # Errors
    /// Returns [`ProtocolError::MalformedPayload`] for a line without a
    /// separator or with a bad escape.
    fn decode_payload(&self, text: &str) -> Result<Fields, ProtocolError>;

    /// Parses a whole frame, header first.
    fn decode(&self, text: &str) -> Result<Frame, ProtocolError> {
        let header = self.decode_header(text)?;
        let fields = self.decode_payload(text)?;
        Ok(Frame::from_parts(header, fields))
    }
}

// ---------------------------------------------------------------------------
// TextCodec
// ---------------------------------------------------------------------------

/// The lobby's newline-delimited `key: value` codec.
///
/// ## Example
///
/// ```rust
/// use lobby_protocol::{Codec, Fields, Frame, MessageId, MessageType, TextCodec};
///
/// let codec = TextCodec;
/// let frame = Frame::request(
///     MessageType::PartyCreateRequest,
///     MessageId(7),
///     Fields::new().with("members", vec!["u1", "u2"]),
/// );
///
/// let text = codec.encode(&frame).unwrap();
/// assert_eq!(text, "type: partyCreateRequest\nid: 7\nmembers: [u1,u2]");
/// assert_eq!(codec.decode(&text).unwrap(), frame);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn encode(&self, frame: &Frame) -> Result<String, ProtocolError> {
        let mut out = format!("{TYPE_KEY}: {}", frame.kind);
        if let Some(id) = frame.id {
            out.push_str(&format!("\n{ID_KEY}: {id}"));
        }
        if let Some(code) = frame.code {
            out.push_str(&format!("\n{CODE_KEY}: {code}"));
        }

        for (key, value) in frame.fields.iter() {
            validate_key(key)?;
            out.push('\n');
            out.push_str(key);
            out.push_str(": ");
            match value {
                FieldValue::Text(text) => escape_text(text, &mut out),
                FieldValue::List(items) if is_single_empty(items) => {
                    out.push('[');
                    out.push_str(SINGLE_EMPTY_ITEM);
                    out.push(']');
                }
                FieldValue::List(items) => {
                    out.push('[');
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        escape_into(item, true, &mut out);
                    }
                    out.push(']');
                }
            }
        }
        Ok(out)
    }

    fn decode_header(&self, text: &str) -> Result<Header, ProtocolError> {
        if text.trim().is_empty() {
            return Err(ProtocolError::Empty);
        }

        let mut kind = None;
        let mut id = None;
        let mut code = None;

        // Payload lines may be garbage; only well-formed header lines
        // matter here.
        for (key, value) in lines(text).filter_map(|(_, line)| split_line(line))
        {
            match key {
                TYPE_KEY if kind.is_none() => {
                    let value = value.trim();
                    if value.is_empty() {
                        return Err(ProtocolError::InvalidHeader {
                            key: TYPE_KEY,
                            value: value.to_string(),
                        });
                    }
                    kind = Some(MessageType::from_wire(value));
                }
                ID_KEY if id.is_none() => {
                    let parsed = value.trim().parse::<u64>().map_err(|_| {
                        ProtocolError::InvalidHeader {
                            key: ID_KEY,
                            value: value.to_string(),
                        }
                    })?;
                    id = Some(MessageId(parsed));
                }
                CODE_KEY if code.is_none() => {
                    let parsed = value.trim().parse::<i64>().map_err(|_| {
                        ProtocolError::InvalidHeader {
                            key: CODE_KEY,
                            value: value.to_string(),
                        }
                    })?;
                    code = Some(parsed);
                }
                _ => {}
            }
        }

        Ok(Header {
            kind: kind.ok_or(ProtocolError::MissingType)?,
            id,
            code,
        })
    }

    fn decode_payload(&self, text: &str) -> Result<Fields, ProtocolError> {
        let mut fields = Fields::new();

        for (line_no, line) in lines(text) {
            if line.is_empty() {
                continue;
            }
            let (key, raw) = split_line(line).ok_or_else(|| {
                ProtocolError::MalformedPayload {
                    line: line_no,
                    reason: "missing ':' separator".into(),
                }
            })?;
            if matches!(key, TYPE_KEY | ID_KEY | CODE_KEY) {
                continue;
            }

            let value = parse_value(raw).map_err(|reason| {
                ProtocolError::MalformedPayload {
                    line: line_no,
                    reason,
                }
            })?;
            fields.insert(key, value);
        }

        Ok(fields)
    }
}

// ---------------------------------------------------------------------------
// Line helpers
// ---------------------------------------------------------------------------

/// Yields `(1-based line number, line)` with any trailing `\r` removed.
fn lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split('\n')
        .enumerate()
        .map(|(i, line)| (i + 1, line.strip_suffix('\r').unwrap_or(line)))
}

/// Splits `key: value`. The single space after the colon is optional.
fn split_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.strip_prefix(' ').unwrap_or(value)))
}

fn validate_key(key: &str) -> Result<(), ProtocolError> {
    if key.is_empty() {
        return Err(ProtocolError::InvalidField("empty key".into()));
    }
    if key.contains([':', '\n', '\r']) || key.trim() != key {
        return Err(ProtocolError::InvalidField(format!(
            "key {key:?} can't be written on the wire"
        )));
    }
    if matches!(key, TYPE_KEY | ID_KEY | CODE_KEY) {
        return Err(ProtocolError::InvalidField(format!(
            "key {key:?} is reserved for the header"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Escaping
// ---------------------------------------------------------------------------

fn escape_text(text: &str, out: &mut String) {
    if text.starts_with('[') {
        out.push('\\');
    }
    escape_into(text, false, out);
}

fn escape_into(text: &str, in_list: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ',' | '[' | ']' if in_list => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
}

fn parse_value(raw: &str) -> Result<FieldValue, String> {
    match raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        Some(inner) if !ends_with_escape(inner) => {
            parse_list(inner).map(FieldValue::List)
        }
        _ => unescape(raw).map(FieldValue::Text),
    }
}

/// `true` if the closing bracket we stripped was actually escaped.
fn ends_with_escape(inner: &str) -> bool {
    inner.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn is_single_empty(items: &[String]) -> bool {
    matches!(items, [only] if only.is_empty())
}

fn parse_list(inner: &str) -> Result<Vec<String>, String> {
    match inner {
        "" => return Ok(Vec::new()),
        SINGLE_EMPTY_ITEM => return Ok(vec![String::new()]),
        _ => {}
    }

    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.push(unescape_char(chars.next())?),
            ',' => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);
    Ok(items)
}

fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(unescape_char(chars.next())?);
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

fn unescape_char(next: Option<char>) -> Result<char, String> {
    match next {
        Some('\\') => Ok('\\'),
        Some('n') => Ok('\n'),
        Some('r') => Ok('\r'),
        Some(c @ (',' | '[' | ']')) => Ok(c),
        Some(c) => Err(format!("unknown escape '\\{c}'")),
        None => Err("dangling escape at end of value".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TextCodec {
        TextCodec
    }

    // =====================================================================
    // encode()
    // =====================================================================

    #[test]
    fn test_encode_request_writes_header_then_fields() {
        let frame = Frame::request(
            MessageType::PartyInviteRequest,
            MessageId(12),
            Fields::new()
                .with("friendID", "u42")
                .with("tags", vec!["casual", "eu-west"]),
        );
        let text = codec().encode(&frame).unwrap();
        assert_eq!(
            text,
            "type: partyInviteRequest\nid: 12\nfriendID: u42\ntags: [casual,eu-west]"
        );
    }

    #[test]
    fn test_encode_notification_omits_id_and_code() {
        let frame =
            Frame::notification(MessageType::ConnectNotif, Fields::new());
        assert_eq!(codec().encode(&frame).unwrap(), "type: connectNotif");
    }

    #[test]
    fn test_encode_rejects_reserved_key() {
        let frame = Frame::request(
            MessageType::PartyInfoRequest,
            MessageId(1),
            Fields::new().with("id", "9"),
        );
        assert!(matches!(
            codec().encode(&frame),
            Err(ProtocolError::InvalidField(_))
        ));
    }

    #[test]
    fn test_encode_rejects_key_with_colon() {
        let frame = Frame::request(
            MessageType::PartyInfoRequest,
            MessageId(1),
            Fields::new().with("a:b", "x"),
        );
        assert!(codec().encode(&frame).is_err());
    }

    // =====================================================================
    // decode_header()
    // =====================================================================

    #[test]
    fn test_decode_header_response() {
        let header = codec()
            .decode_header("type: partyCreateResponse\nid: 7\ncode: 0\npartyID: p1")
            .unwrap();
        assert_eq!(header.kind, MessageType::PartyCreateResponse);
        assert_eq!(header.id, Some(MessageId(7)));
        assert_eq!(header.code, Some(0));
    }

    #[test]
    fn test_decode_header_survives_broken_payload() {
        // The payload line has no separator, but routing info is intact.
        let text = "type: partyInfoResponse\nid: 3\ncode: 0\nthis is garbage";
        let header = codec().decode_header(text).unwrap();
        assert_eq!(header.id, Some(MessageId(3)));

        let err = codec().decode_payload(text).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPayload { line: 4, .. }));
        assert!(!err.is_header_error());
    }

    #[test]
    fn test_decode_header_unknown_type_is_kept() {
        let header = codec().decode_header("type: fancyNewNotif").unwrap();
        assert_eq!(header.kind, MessageType::Unknown("fancyNewNotif".into()));
        assert_eq!(header.id, None);
    }

    #[test]
    fn test_decode_header_missing_type_is_error() {
        let err = codec().decode_header("id: 4\ncode: 0").unwrap_err();
        assert!(matches!(err, ProtocolError::MissingType));
        assert!(err.is_header_error());
    }

    #[test]
    fn test_decode_header_non_numeric_id_is_error() {
        let err = codec()
            .decode_header("type: partyInfoResponse\nid: seven")
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidHeader { key: "id", .. }
        ));
    }

    #[test]
    fn test_decode_header_empty_text_is_error() {
        assert!(matches!(
            codec().decode_header("  \n"),
            Err(ProtocolError::Empty)
        ));
    }

    #[test]
    fn test_decode_header_accepts_crlf_and_no_space() {
        let header = codec()
            .decode_header("type:partyJoinNotif\r\nid:5\r\n")
            .unwrap();
        assert_eq!(header.kind, MessageType::PartyJoinNotif);
        assert_eq!(header.id, Some(MessageId(5)));
    }

    // =====================================================================
    // decode_payload()
    // =====================================================================

    #[test]
    fn test_decode_payload_lists_and_text() {
        let fields = codec()
            .decode_payload(
                "type: partyInfoResponse\nid: 1\ncode: 0\npartyID: p1\nmembers: [u1,u2]\ninvitees: []",
            )
            .unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields.get_text("partyID"), Some("p1"));
        assert_eq!(
            fields.get_list("members").unwrap(),
            &["u1".to_string(), "u2".to_string()]
        );
        assert_eq!(fields.get_list("invitees").unwrap().len(), 0);
    }

    #[test]
    fn test_decode_payload_keeps_json_text_intact() {
        let fields = codec()
            .decode_payload("type: partyDataUpdateNotif\ncustom_attribute: {\"a\":1,\"b\":[1,2]}")
            .unwrap();
        assert_eq!(
            fields.get_text("custom_attribute"),
            Some("{\"a\":1,\"b\":[1,2]}")
        );
    }

    #[test]
    fn test_decode_payload_bad_escape_is_error() {
        let err = codec()
            .decode_payload("type: messageNotif\npayload: a\\qb")
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPayload { line: 2, .. }));
    }

    // =====================================================================
    // Round trips through escaping
    // =====================================================================

    #[test]
    fn test_round_trip_values_needing_escapes() {
        let frame = Frame::request(
            MessageType::PersonalChatRequest,
            MessageId(99),
            Fields::new()
                .with("payload", "line one\nline two: with colon \\ slash")
                .with("bracketed", "[not a list]")
                .with("tags", vec!["a,b", "[c]", "", "d\\"]),
        );
        let text = codec().encode(&frame).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert_eq!(codec().decode(&text).unwrap(), frame);
    }

    #[test]
    fn test_round_trip_every_string_and_list_shape() {
        fn list(items: &[&str]) -> FieldValue {
            FieldValue::List(items.iter().map(|s| s.to_string()).collect())
        }
        fn text(s: &str) -> FieldValue {
            FieldValue::Text(s.to_string())
        }
        let cases = [
            list(&[]),
            list(&[""]),
            list(&["", ""]),
            list(&["", "a"]),
            list(&["a", ""]),
            list(&["e"]),
            list(&["\\e"]),
            list(&["[", "]", ","]),
            list(&["trailing\\"]),
            list(&["multi\nline", "cr\r"]),
            text(""),
            text("[]"),
            text("[\\e]"),
            text("[leading bracket"),
            text("trailing\\"),
            text("\\"),
            text("embedded\nnewline\r\nand crlf"),
            text("key: value, [x]"),
        ];

        for (i, value) in cases.into_iter().enumerate() {
            let frame = Frame::request(
                MessageType::PartyInviteRequest,
                MessageId(i as u64 + 1),
                Fields::new().with("value", value.clone()),
            );
            let encoded = codec().encode(&frame).unwrap();
            assert_eq!(encoded.lines().count(), 3, "case {i}: {encoded:?}");
            assert_eq!(
                codec().decode(&encoded).unwrap(),
                frame,
                "case {i}: {value:?} encoded as {encoded:?}"
            );
        }
    }

    #[test]
    fn test_encode_single_empty_item_list_is_distinct_from_empty_list() {
        let encode = |items: Vec<&str>| {
            let frame = Frame::notification(
                MessageType::PartyChatNotif,
                Fields::new().with("tags", items),
            );
            codec().encode(&frame).unwrap()
        };
        assert_eq!(encode(vec![]), "type: partyChatNotif\ntags: []");
        assert_eq!(encode(vec![""]), "type: partyChatNotif\ntags: [\\e]");
    }

    #[test]
    fn test_round_trip_response_with_code() {
        let frame = Frame::response(
            MessageType::PartyCreateResponse,
            MessageId(7),
            11_232,
            Fields::new().with("partyID", "p1"),
        );
        let text = codec().encode(&frame).unwrap();
        assert_eq!(codec().decode(&text).unwrap(), frame);
    }
}
