//! Key layout of the persisted records.
//!
//! Every key is relative; [`crate::Namespaced`] adds the deployment prefix.

/// Routing rules (list of [`crate::RoutingRule`]).
pub const ROUTING_RULES: &str = "bugsnag:project-channel-mappings";

/// Chat user to error-tracker identity mappings.
pub const USER_MAPPINGS: &str = "bugsnag:user-mappings";

/// Active error registry walked by the reconciliation loop.
pub const ACTIVE_ERRORS: &str = "bugsnag:active-errors";

const CARD_MAPPING_PREFIX: &str = "bugsnag:error-post";

/// Key of the card mapping for one error.
pub fn card_mapping_key(project_id: &str, error_id: &str) -> String {
    format!("{CARD_MAPPING_PREFIX}:{project_id}:{error_id}")
}
