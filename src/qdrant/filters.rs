//! Filter helpers for Qdrant queries.

use serde_json::{Value, json};

/// Payload field holding the tenant key.
pub const COOPERATIVE_FIELD: &str = "cooperative";
/// Payload field shared by every chunk of one document.
pub const FORM_ID_FIELD: &str = "form_id";

/// Must-match filter restricting a query to one cooperative.
///
/// Returns `None` for a blank cooperative; callers refuse to query without one.
pub fn cooperative_filter(cooperative: &str) -> Option<Value> {
    let cooperative = cooperative.trim();
    if cooperative.is_empty() {
        return None;
    }
    Some(json!({
        "must": [
            {
                "key": COOPERATIVE_FIELD,
                "match": { "value": cooperative }
            }
        ]
    }))
}

/// Filter selecting the chunks of one document inside one cooperative.
///
/// Returns `None` when either key is blank.
pub fn document_filter(cooperative: &str, form_id: &str) -> Option<Value> {
    let mut filter = cooperative_filter(cooperative)?;
    let form_id = form_id.trim();
    if form_id.is_empty() {
        return None;
    }
    filter["must"].as_array_mut()?.push(json!({
        "key": FORM_ID_FIELD,
        "match": { "value": form_id }
    }));
    Some(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_trimmed_cooperative() {
        assert_eq!(
            cooperative_filter(" north-coop ").expect("filter"),
            json!({
                "must": [
                    {
                        "key": "cooperative",
                        "match": { "value": "north-coop" }
                    }
                ]
            })
        );
    }

    #[test]
    fn blank_cooperative_has_no_filter() {
        assert!(cooperative_filter("   ").is_none());
    }

    #[test]
    fn document_filter_keeps_the_tenant_condition() {
        assert_eq!(
            document_filter("north", " form-1 ").expect("filter"),
            json!({
                "must": [
                    { "key": "cooperative", "match": { "value": "north" } },
                    { "key": "form_id", "match": { "value": "form-1" } }
                ]
            })
        );
        assert!(document_filter("", "form-1").is_none());
        assert!(document_filter("north", "  ").is_none());
    }
}
