//! Exact substring matching and occurrence scoring.
//!
//! Matching is plain case-insensitive substring containment: a query that
//! is part of a longer word still matches. Case folding uses Rust's Unicode
//! lowercase mapping on both sides.

use crate::records::Record;

/// Trim and lowercase a raw query.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Whether title, content or incident number contains `normalized_query`.
///
/// `normalized_query` must already be lowercased (see [`normalize_query`]).
pub fn matches_query(record: &Record, normalized_query: &str) -> bool {
    record.title.to_lowercase().contains(normalized_query)
        || record.content.to_lowercase().contains(normalized_query)
        || record
            .incident_number()
            .map(|number| number.to_lowercase().contains(normalized_query))
            .unwrap_or(false)
}

/// Non-overlapping occurrences of `normalized_query` in `"{title} {content}"`.
pub fn occurrence_count(record: &Record, normalized_query: &str) -> usize {
    if normalized_query.is_empty() {
        return 0;
    }

    let haystack = format!("{} {}", record.title, record.content).to_lowercase();
    haystack.matches(normalized_query).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::FieldKey;

    fn record(title: &str, content: &str, incident_number: Option<&str>) -> Record {
        let mut record = Record {
            id: "1".to_string(),
            title: title.to_string(),
            content: content.to_string(),
            ..Default::default()
        };
        if let Some(number) = incident_number {
            record.fields.insert(FieldKey::IncidentNumber, number);
        }
        record
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Error EN Cuota \n"), "error en cuota");
        assert_eq!(normalize_query("   "), "");
    }

    #[test]
    fn test_matches_each_field() {
        let r = record("Payment error", "cuota failed", Some("INC-1"));
        assert!(matches_query(&r, "payment"));
        assert!(matches_query(&r, "cuota"));
        assert!(matches_query(&r, "inc-1"));
        assert!(!matches_query(&r, "login"));
    }

    #[test]
    fn test_other_fields_are_not_matched() {
        let mut r = record("t", "c", None);
        r.fields.insert(FieldKey::CausaRaiz, "timeout en base");
        assert!(!matches_query(&r, "timeout"));
    }

    #[test]
    fn test_substring_of_word_matches() {
        let r = record("", "reprocesamiento manual", None);
        assert!(matches_query(&r, "proces"));
    }

    #[test]
    fn test_unicode_case_folding() {
        let r = record("ERROR EN PAGARÉ", "", Some("ÑU-9"));
        assert!(matches_query(&r, &normalize_query("Pagaré")));
        assert!(matches_query(&r, &normalize_query("ñu-9")));
    }

    #[test]
    fn test_occurrence_count_is_non_overlapping() {
        let r = record("aaa", "", None);
        assert_eq!(occurrence_count(&r, "aa"), 1);
    }

    #[test]
    fn test_occurrence_count_spans_title_and_content() {
        let r = record("Error de pago", "otro error, error final", None);
        assert_eq!(occurrence_count(&r, "error"), 3);
    }

    #[test]
    fn test_occurrence_count_ignores_incident_number() {
        let r = record("", "", Some("INC-1"));
        assert_eq!(occurrence_count(&r, "inc-1"), 0);
    }
}
