//! Downstream endpoint for each action.
//!
//! Shared by the HTTP executor and the script export so both address the
//! same resources.

use remedy_interchange::{ActionSpec, ActionType};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: &'static str,
    /// Path relative to the API base, always starting with `/`.
    pub path: String,
}

pub fn route_for(action: &ActionSpec) -> Route {
    let target = &action.target;
    let mut path = format!("/{}/{}", target.resource_type, target.entity_id);
    if let Some(resource_id) = &target.resource_id {
        path.push('/');
        path.push_str(resource_id);
    }

    let method = match action.action_type {
        ActionType::Create => "POST",
        ActionType::Delete => "DELETE",
        ActionType::Patch | ActionType::ClearFlag => "PATCH",
        ActionType::Reconnect => {
            path.push_str("/reconnect");
            "POST"
        }
    };
    Route { method, path }
}

/// Request body for an action, or `None` for body-less requests.
pub fn request_body(action: &ActionSpec) -> Option<Value> {
    let payload = &action.payload;
    match action.action_type {
        ActionType::Delete => None,
        ActionType::Create | ActionType::Reconnect => payload.after.clone(),
        ActionType::Patch | ActionType::ClearFlag => {
            let mut body = json!({ "value": payload.after.clone().unwrap_or(Value::Null) });
            if let Some(path) = &action.target.path {
                body["path"] = Value::String(path.clone());
            }
            if let Some(diff) = &payload.diff {
                body["diff"] = diff.clone();
            }
            Some(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_delete_address_the_resource() {
        let create = ActionSpec::new("a1", ActionType::Create, "int-1", "webhooks", 5)
            .with_resource_id("wh-9")
            .with_payload(None, Some(json!({"url": "https://x"})));
        let r = route_for(&create);
        assert_eq!(r.method, "POST");
        assert_eq!(r.path, "/webhooks/int-1/wh-9");
        assert_eq!(request_body(&create), Some(json!({"url": "https://x"})));

        let delete = ActionSpec::new("a2", ActionType::Delete, "int-1", "webhooks", 5);
        assert_eq!(route_for(&delete).method, "DELETE");
        assert_eq!(request_body(&delete), None);
    }

    #[test]
    fn reconnect_has_its_own_endpoint() {
        let a = ActionSpec::new("a1", ActionType::Reconnect, "int-1", "integration", 5);
        assert_eq!(route_for(&a).path, "/integration/int-1/reconnect");
    }

    #[test]
    fn patch_body_carries_path() {
        let a = ActionSpec::new("a1", ActionType::ClearFlag, "int-1", "integration", 5)
            .with_path("flags.stale")
            .with_payload(Some(json!(true)), Some(json!(false)));
        assert_eq!(route_for(&a).method, "PATCH");
        assert_eq!(
            request_body(&a),
            Some(json!({"value": false, "path": "flags.stale"}))
        );
    }
}
