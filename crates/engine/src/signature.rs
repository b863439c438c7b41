//! Content signatures for the idempotence ledger.
//!
//! A signature is the SHA-256 hex digest of the canonical JSON of a set of
//! issues or actions. `serde_json::Map` keeps keys sorted, so serializing a
//! `Value` is already canonical per element; elements are then sorted so
//! input order does not matter. Volatile fields are stripped first: issue
//! `detectedAt`, action `id` and `dependencies`.

use remedy_interchange::{ActionSpec, Issue};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn issue_signature(issues: &[Issue]) -> String {
    digest_set(issues, |v| {
        if let Value::Object(map) = v {
            map.remove("detectedAt");
        }
    })
}

pub fn action_signature(actions: &[ActionSpec]) -> String {
    digest_set(actions, |v| {
        if let Value::Object(map) = v {
            map.remove("id");
            if let Some(Value::Object(meta)) = map.get_mut("metadata") {
                meta.remove("dependencies");
            }
        }
    })
}

fn digest_set<T: Serialize>(items: &[T], strip: impl Fn(&mut Value)) -> String {
    let mut canonical: Vec<String> = items
        .iter()
        .map(|item| {
            // Our model types always serialize; Null only on a broken impl.
            let mut v = serde_json::to_value(item).unwrap_or(Value::Null);
            strip(&mut v);
            v.to_string()
        })
        .collect();
    canonical.sort();

    let mut hasher = Sha256::new();
    hasher.update(b"[");
    hasher.update(canonical.join(",").as_bytes());
    hasher.update(b"]");
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_interchange::ActionType;
    use serde_json::json;
    use time::macros::datetime;

    fn issue(rule: &str) -> Issue {
        Issue::new(rule, "error", format!("{} violated", rule))
    }

    #[test]
    fn issue_signature_ignores_order() {
        let a = [issue("r1"), issue("r2")];
        let b = [issue("r2"), issue("r1")];
        assert_eq!(issue_signature(&a), issue_signature(&b));
    }

    #[test]
    fn issue_signature_ignores_detection_time() {
        let mut early = issue("r1");
        early.detected_at = Some(datetime!(2026-01-01 00:00 UTC));
        let mut late = issue("r1");
        late.detected_at = Some(datetime!(2026-02-01 00:00 UTC));
        assert_eq!(issue_signature(&[early]), issue_signature(&[late]));
    }

    #[test]
    fn issue_signature_changes_with_content() {
        let mut changed = issue("r1");
        changed.details = json!({"field": "owner"});
        assert_ne!(issue_signature(&[issue("r1")]), issue_signature(&[changed]));
    }

    #[test]
    fn action_signature_ignores_ids_and_dependencies() {
        let a = ActionSpec::new("a1", ActionType::Patch, "int-1", "integration", 5)
            .with_payload(Some(json!(1)), Some(json!(2)));
        let b = ActionSpec::new("other-id", ActionType::Patch, "int-1", "integration", 5)
            .with_payload(Some(json!(1)), Some(json!(2)))
            .with_dependencies(["x"]);
        assert_eq!(action_signature(&[a.clone()]), action_signature(&[b]));

        let c = a.clone().with_reason("different reason");
        assert_ne!(action_signature(&[a]), action_signature(&[c]));
    }

    #[test]
    fn empty_sets_have_stable_signature() {
        let empty = issue_signature(&[]);
        assert_eq!(empty.len(), 64);
        assert_eq!(empty, action_signature(&[]));
    }
}
