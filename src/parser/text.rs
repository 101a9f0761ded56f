use tracing::debug;

use crate::constants::{LINE1_MARKER, LINE2_MARKER, NAME_ZERO_PREFIX};
use crate::domain::ElementRecord;
use crate::error::{Result, TleError};

/// Parse the line-oriented element-set format (2-line or 3-line records).
///
/// Lines are trimmed and blank lines dropped before numbering, so the line
/// numbers carried by `MalformedRecord` are 1-based positions among the
/// non-empty lines.
pub fn parse_text(text: &str) -> Result<Vec<ElementRecord>> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let mut records = Vec::new();
    // Last consumed line that was not part of a record; candidate display name
    let mut pending_name: Option<&str> = None;
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];
        if line.starts_with(LINE1_MARKER) {
            let line_no = idx + 1;
            let line2 = match lines.get(idx + 1) {
                Some(next) if next.starts_with(LINE2_MARKER) => *next,
                Some(_) => {
                    return Err(TleError::malformed(
                        line_no + 1,
                        "line 1 is not followed by a line 2",
                    ))
                }
                None => {
                    return Err(TleError::malformed(
                        line_no,
                        "dataset ends before line 2",
                    ))
                }
            };
            records.push(ElementRecord::new(pending_name.take().map(clean_name), line, line2));
            idx += 2;
        } else if line.starts_with(LINE2_MARKER) {
            // A line 2 with no line 1 in front of it; blame the line that should have been line 1
            let cited = if idx == 0 { 1 } else { idx };
            return Err(TleError::malformed(cited, "expected line 1 before line 2"));
        } else {
            pending_name = Some(line);
            idx += 1;
        }
    }

    if records.is_empty() {
        return Err(TleError::NoUsableRecords);
    }
    if pending_name.is_some() {
        return Err(TleError::malformed(lines.len() + 1, "dataset ends before line 1"));
    }
    debug!("parse_text: {} records from {} lines", records.len(), lines.len());
    Ok(records)
}

fn clean_name(raw: &str) -> String {
    raw.strip_prefix(NAME_ZERO_PREFIX).unwrap_or(raw).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISS_L1: &str = "1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9005";
    const ISS_L2: &str = "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391 12345";
    const HST_L1: &str = "1 20580U 90037B   24001.50000000  .00001234  00000-0  56789-4 0  9993";
    const HST_L2: &str = "2 20580  28.4699 288.8102 0002495 321.7771 171.5855 15.24000000 12345";

    #[test]
    fn test_three_line_records_keep_names_in_order() {
        let text = format!("ISS (ZARYA)\n{ISS_L1}\n{ISS_L2}\nHST\n{HST_L1}\n{HST_L2}\n");
        let records = parse_text(&text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], ElementRecord::new(Some("ISS (ZARYA)".into()), ISS_L1, ISS_L2));
        assert_eq!(records[1], ElementRecord::new(Some("HST".into()), HST_L1, HST_L2));
    }

    #[test]
    fn test_two_line_records_have_no_name() {
        let text = format!("{ISS_L1}\n{ISS_L2}\n{HST_L1}\n{HST_L2}");
        let records = parse_text(&text).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.name.is_none()));
        assert_eq!(records[1].line1, HST_L1);
    }

    #[test]
    fn test_mixed_forms_and_padding() {
        let text = format!("\r\n  {ISS_L1}  \r\n{ISS_L2}\r\n\r\n   HST   \n{HST_L1}\n{HST_L2}\n\n");
        let records = parse_text(&text).unwrap();
        assert_eq!(records[0].name, None);
        assert_eq!(records[0].line1, ISS_L1);
        assert_eq!(records[1].name.as_deref(), Some("HST"));
    }

    #[test]
    fn test_re_serialized_dataset_parses_identically() {
        let text = format!("ISS (ZARYA)\n{ISS_L1}\n{ISS_L2}\n{HST_L1}\n{HST_L2}\n");
        let first = parse_text(&text).unwrap();
        let rendered: String = first
            .iter()
            .map(|r| match &r.name {
                Some(n) => format!("{n}\n{}\n{}\n", r.line1, r.line2),
                None => format!("{}\n{}\n", r.line1, r.line2),
            })
            .collect();
        assert_eq!(parse_text(&rendered).unwrap(), first);
    }

    #[test]
    fn test_zero_prefixed_name_is_stripped() {
        let text = format!("0 ISS (ZARYA)\n{ISS_L1}\n{ISS_L2}");
        let records = parse_text(&text).unwrap();
        assert_eq!(records[0].name.as_deref(), Some("ISS (ZARYA)"));
    }

    #[test]
    fn test_missing_line1_marker_cites_first_line() {
        let err = parse_text("X 1\n2 2").unwrap_err();
        assert!(matches!(err, TleError::MalformedRecord { line: 1, .. }), "got {err:?}");
    }

    #[test]
    fn test_leading_line2_cites_line_one() {
        let err = parse_text("2 2\n1 1").unwrap_err();
        assert!(matches!(err, TleError::MalformedRecord { line: 1, .. }));
    }

    #[test]
    fn test_line1_followed_by_non_line2() {
        let text = format!("ISS\n{ISS_L1}\nHST\n{HST_L2}");
        let err = parse_text(&text).unwrap_err();
        assert!(matches!(err, TleError::MalformedRecord { line: 3, .. }), "got {err:?}");
    }

    #[test]
    fn test_truncated_tail_fails_instead_of_dropping() {
        let text = format!("ISS\n{ISS_L1}\n{ISS_L2}\nHST\n{HST_L1}\n");
        let err = parse_text(&text).unwrap_err();
        assert!(matches!(err, TleError::MalformedRecord { line: 5, .. }), "got {err:?}");
    }

    #[test]
    fn test_trailing_name_without_lines_fails() {
        let text = format!("ISS\n{ISS_L1}\n{ISS_L2}\nHST\n");
        let err = parse_text(&text).unwrap_err();
        assert!(matches!(err, TleError::MalformedRecord { line: 5, .. }), "got {err:?}");
    }

    #[test]
    fn test_no_records_is_not_usable() {
        assert_eq!(parse_text("No GP data found").unwrap_err(), TleError::NoUsableRecords);
        assert_eq!(parse_text("   \n\n").unwrap_err(), TleError::NoUsableRecords);
    }
}
