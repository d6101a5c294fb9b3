use serde_json::{Map, Value};

/// Fields from `required` that are absent from `body`.
///
/// Presence-only: types and shapes are the handler's problem. An empty body
/// misses everything; an empty required set misses nothing.
pub fn missing_fields<'a>(body: &Map<String, Value>, required: &[&'a str]) -> Vec<&'a str> {
    if required.is_empty() {
        return Vec::new();
    }
    if body.is_empty() {
        return required.to_vec();
    }
    required
        .iter()
        .copied()
        .filter(|field| !body.contains_key(*field))
        .collect()
}

/// Serialized size of the body in whole kilobytes.
pub fn body_size_kb(body: &Map<String, Value>) -> usize {
    serde_json::to_string(body).map(|s| s.len() / 1024).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn empty_body_misses_every_required_field() {
        let missing = missing_fields(&Map::new(), &["email", "password"]);
        assert_eq!(missing, vec!["email", "password"]);
    }

    #[test]
    fn empty_required_set_always_passes() {
        assert!(missing_fields(&Map::new(), &[]).is_empty());
    }

    #[test]
    fn reports_only_the_absent_fields() {
        let body = obj(json!({"email": "a@b.c"}));
        assert_eq!(missing_fields(&body, &["email", "password"]), vec!["password"]);
    }

    #[test]
    fn present_fields_pass_regardless_of_value() {
        let body = obj(json!({"email": null, "password": ""}));
        assert!(missing_fields(&body, &["email", "password"]).is_empty());
    }

    #[test]
    fn size_is_serialized_length_in_kb() {
        let body = obj(json!({"blob": "x".repeat(3 * 1024)}));
        assert_eq!(body_size_kb(&body), 3);
        assert_eq!(body_size_kb(&Map::new()), 0);
    }
}
