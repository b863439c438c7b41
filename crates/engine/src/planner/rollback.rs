use remedy_interchange::{ActionMetadata, ActionSpec, ActionType, ROLLBACK_PRIORITY};

/// Inverse actions for every rollbackable action, in reverse forward order.
pub(crate) fn rollback_plan(ordered: &[ActionSpec]) -> Vec<ActionSpec> {
    ordered
        .iter()
        .rev()
        .filter(|a| a.metadata.rollbackable)
        .map(inverse)
        .collect()
}

fn inverse(action: &ActionSpec) -> ActionSpec {
    let action_type = match action.action_type {
        ActionType::Create => ActionType::Delete,
        ActionType::Delete => ActionType::Create,
        ActionType::Patch => ActionType::Patch,
        ActionType::Reconnect => ActionType::Reconnect,
        // Restores the value the flag held before it was cleared.
        ActionType::ClearFlag => ActionType::Patch,
    };

    ActionSpec {
        id: format!("rollback-{}", action.id),
        action_type,
        target: action.target.clone(),
        payload: action.payload.swapped(),
        metadata: ActionMetadata {
            reason: format!("rollback of {}", action.id),
            priority: ROLLBACK_PRIORITY,
            dependencies: Vec::new(),
            retryable: action.metadata.retryable,
            rollbackable: false,
        },
    }
}
