//! Encoding normalization and byte-order helpers.
//!
//! Nothing here consults process-wide settings: the encoding of a document
//! is decided from its own bytes, and string ordering is plain byte order.

use std::borrow::Cow;
use std::cmp::Ordering;

use bstr::ByteSlice;

/// Normalize document bytes to UTF-8.
///
/// This function:
/// 1. Decodes UTF-16 input, recognized by its byte order mark or by a
///    `<?` in the first four bytes; the BOM is dropped
/// 2. Borrows the input unchanged when it is already valid UTF-8 (a BOM is
///    kept, so offsets into the result are offsets into the input)
/// 3. Otherwise decodes with the encoding named in the XML declaration
/// 4. Falls back to Windows-1252 (superset of ISO-8859-1)
///
/// Byte offsets reported by the parser always refer to the returned bytes.
pub fn normalize_encoding(bytes: &[u8]) -> Cow<'_, [u8]> {
    if let Some((encoding, bom_len)) = sniff_utf16(bytes) {
        let (decoded, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return Cow::Owned(decoded.into_owned().into_bytes());
    }

    if std::str::from_utf8(bytes).is_ok() {
        return Cow::Borrowed(bytes);
    }

    if let Some(label) = declared_encoding(bytes)
        && let Some(encoding) = encoding_rs::Encoding::for_label(label)
        && encoding != encoding_rs::UTF_8
        && encoding != encoding_rs::UTF_16LE
        && encoding != encoding_rs::UTF_16BE
    {
        let (decoded, _) = encoding.decode_without_bom_handling(bytes);
        return Cow::Owned(decoded.into_owned().into_bytes());
    }

    let (decoded, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
    Cow::Owned(decoded.into_owned().into_bytes())
}

/// UTF-16 flavour of `bytes` and the length of its BOM, if any.
fn sniff_utf16(bytes: &[u8]) -> Option<(&'static encoding_rs::Encoding, usize)> {
    match encoding_rs::Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) if encoding != encoding_rs::UTF_8 => Some((encoding, bom_len)),
        Some(_) => None,
        None if bytes.starts_with(b"<\0?\0") => Some((encoding_rs::UTF_16LE, 0)),
        None if bytes.starts_with(b"\0<\0?") => Some((encoding_rs::UTF_16BE, 0)),
        None => None,
    }
}

/// Read the `encoding="..."` label from a leading XML declaration.
pub fn declared_encoding(bytes: &[u8]) -> Option<&[u8]> {
    let head = bytes.trim_start_with(|c| c == '\u{feff}' || c.is_whitespace());
    if !head.starts_with(b"<?xml") {
        return None;
    }
    let decl = &head[..head.find(b"?>")?];
    let value = &decl[decl.find(b"encoding")? + b"encoding".len()..];
    let value = value.trim_start_with(char::is_whitespace);
    let value = value.strip_prefix(b"=")?.trim_start_with(char::is_whitespace);
    let quote = *value.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let value = &value[1..];
    let close = value.find_byte(quote)?;
    Some(&value[..close])
}

/// Compare two strings by the raw values of their UTF-8 bytes.
///
/// Used wherever the index build relies on a stable sort order.
pub fn byte_order(a: &str, b: &str) -> Ordering {
    a.as_bytes().cmp(b.as_bytes())
}

/// Collapse internal whitespace runs to single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Resolve XML entity references, keeping the raw text when it is malformed.
pub fn unescape_lossy(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::unescape(raw).unwrap_or(Cow::Borrowed(raw))
}
