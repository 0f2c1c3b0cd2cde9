/// Finds `key=value` in a free-text payment note.
///
/// Notes are typed by humans and platforms alike, so the scan is tolerant: a
/// token may be preceded by the start of the note, whitespace, `,` or `;`;
/// keys are `[A-Za-z0-9_]+` compared case-insensitively; values are
/// `[A-Za-z0-9-]+`. The first matching key wins.
///
/// ```
/// use escrow_workflow::interfaces::webhook::note::find_key;
///
/// let note = "service_workflow: milestone_id=abc-123 service_id=def-456";
/// assert_eq!(find_key(note, "milestone_id"), Some("abc-123"));
/// ```
pub fn find_key<'a>(note: &'a str, key: &str) -> Option<&'a str> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let bytes = note.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        let at_boundary = start == 0 || matches!(bytes[start - 1], b' ' | b'\t' | b'\n' | b'\r' | b',' | b';');
        let key_len = bytes[start..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
            .count();

        if at_boundary && key_len > 0 && bytes.get(start + key_len) == Some(&b'=') {
            let value_start = start + key_len + 1;
            let value_len = bytes[value_start..]
                .iter()
                .take_while(|b| b.is_ascii_alphanumeric() || **b == b'-')
                .count();
            if value_len > 0 {
                if note[start..start + key_len].eq_ignore_ascii_case(key) {
                    return Some(&note[value_start..value_start + value_len]);
                }
                start = value_start + value_len;
                continue;
            }
        }

        start += key_len.max(1);
    }
    None
}

/// The note attached to payment requests so their settlement can be traced
/// back to a milestone.
pub fn payment_note(milestone_id: &str, service_id: &str) -> String {
    format!("service_workflow: milestone_id={milestone_id} service_id={service_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_key() {
        let note = "service_workflow: milestone_id=abc-123 service_id=def-456";
        assert_eq!(find_key(note, "milestone_id"), Some("abc-123"));
        assert_eq!(find_key(note, "service_id"), Some("def-456"));
        assert_eq!(find_key(note, "order_id"), None);
    }

    #[test]
    fn test_tolerates_punctuation() {
        let note = "hello,milestone_id=zzz;service_id=yyy other=xxx";
        assert_eq!(find_key(note, "milestone_id"), Some("zzz"));
        assert_eq!(find_key(note, "service_id"), Some("yyy"));
        assert_eq!(find_key(note, "other"), Some("xxx"));
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        assert_eq!(find_key("Milestone_ID=abc", "milestone_id"), Some("abc"));
        assert_eq!(find_key("milestone_id=abc", " MILESTONE_ID "), Some("abc"));
    }

    #[test]
    fn test_requires_boundary_before_key() {
        // `xmilestone_id` is a different key; `:` is not a boundary.
        assert_eq!(find_key("xmilestone_id=abc", "milestone_id"), None);
        assert_eq!(find_key("note:milestone_id=abc", "milestone_id"), None);
    }

    #[test]
    fn test_value_stops_at_foreign_characters() {
        assert_eq!(find_key("milestone_id=ab_c", "milestone_id"), Some("ab"));
        assert_eq!(find_key("milestone_id= abc", "milestone_id"), None);
        assert_eq!(find_key("milestone_id=", "milestone_id"), None);
        assert_eq!(find_key("anything", ""), None);
    }

    #[test]
    fn test_payment_note_is_scannable() {
        let note = payment_note("1f0c6b1e-aaaa-bbbb-cccc-0123456789ab", "s-1");
        assert_eq!(
            find_key(&note, "milestone_id"),
            Some("1f0c6b1e-aaaa-bbbb-cccc-0123456789ab")
        );
        assert_eq!(find_key(&note, "service_id"), Some("s-1"));
    }
}
