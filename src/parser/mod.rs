//! Pure conversions from raw payload bytes into element records.

mod json;
mod text;

pub use json::parse_json;
pub use text::parse_text;

use crate::domain::{ContentKind, ElementRecord};
use crate::error::{Result, TleError};

/// Parse a payload with the parser matching its content kind.
pub fn parse_payload(kind: ContentKind, bytes: &[u8]) -> Result<Vec<ElementRecord>> {
    match kind {
        ContentKind::Json => parse_json(bytes),
        ContentKind::Text => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| TleError::malformed(1, format!("payload is not UTF-8: {e}")))?;
            parse_text(text)
        }
    }
}

/// Drop records whose display name marks them as debris.
pub fn filter_debris(records: Vec<ElementRecord>) -> Vec<ElementRecord> {
    records.into_iter().filter(|r| !r.is_debris()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_content_kind() {
        let text = "FENGYUN 1C\n1 29507U\n2 29507 ";
        let json = r#"[{"OBJECT_NAME":"FENGYUN 1C","TLE_LINE1":"1 29507U","TLE_LINE2":"2 29507 "}]"#;
        let a = parse_payload(ContentKind::Text, text.as_bytes()).unwrap();
        let b = parse_payload(ContentKind::Json, json.as_bytes()).unwrap();
        assert_eq!(a[0].name, b[0].name);
        assert_eq!(a[0].line1, b[0].line1);
    }

    #[test]
    fn test_non_utf8_text_is_malformed() {
        let err = parse_payload(ContentKind::Text, &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, TleError::MalformedRecord { line: 1, .. }));
    }

    #[test]
    fn test_filter_debris_keeps_intact_objects() {
        let text = "FENGYUN 1C DEB\n1 a\n2 a\nFENGYUN 1C\n1 b\n2 b\n1 c\n2 c";
        let kept = filter_debris(parse_text(text).unwrap());
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].name.as_deref(), Some("FENGYUN 1C"));
        assert!(kept[1].name.is_none());
    }
}
