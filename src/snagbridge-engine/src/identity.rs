//! Chat user to error-tracker identity resolution.

use snagbridge_chat::ChatUser;
use snagbridge_store::UserMapping;

fn same_email(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Mapping for a chat user: by chat user id first, then by email.
pub fn resolve_chat_user<'a>(mappings: &'a [UserMapping], user: &ChatUser) -> Option<&'a UserMapping> {
    mappings
        .iter()
        .find(|m| !m.mm_user_id.trim().is_empty() && m.mm_user_id == user.id)
        .or_else(|| {
            mappings.iter().find(|m| {
                non_blank(m.bugsnag_email.as_ref()).is_some_and(|email| same_email(email, &user.email))
            })
        })
}

/// Identity to assign errors to: the external user id when present,
/// otherwise the external email.
pub fn assignee_identity(mapping: &UserMapping) -> Option<String> {
    non_blank(mapping.bugsnag_user_id.as_ref())
        .or_else(|| non_blank(mapping.bugsnag_email.as_ref()))
        .map(str::to_string)
}

/// Label of the external identity, used in audit notes.
pub fn identity_label(mapping: &UserMapping) -> String {
    assignee_identity(mapping).unwrap_or_else(|| mapping.mm_user_id.clone())
}

/// Chat user id for an error-tracker collaborator: by collaborator id
/// first, then by email.
pub fn chat_user_for_collaborator<'a>(
    mappings: &'a [UserMapping],
    collaborator_id: &str,
    email: &str,
) -> Option<&'a str> {
    let collaborator_id = collaborator_id.trim();
    let by_id = (!collaborator_id.is_empty())
        .then(|| {
            mappings
                .iter()
                .find(|m| non_blank(m.bugsnag_user_id.as_ref()) == Some(collaborator_id))
        })
        .flatten();

    by_id
        .or_else(|| {
            mappings.iter().find(|m| {
                non_blank(m.bugsnag_email.as_ref()).is_some_and(|e| same_email(e, email))
            })
        })
        .map(|m| m.mm_user_id.as_str())
        .filter(|id| !id.trim().is_empty())
}
