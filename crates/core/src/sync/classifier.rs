//! Conflict classification for failed replays.
//!
//! Classification is advisory. A machine-readable kind in the response body
//! wins; a keyword heuristic over the server's message is the fallback; the
//! status code decides last.
//!
//! Only the tag can turn an arbitrary 4xx into a conflict. The keyword
//! heuristic is consulted for 403/404/409/410 responses alone, so a plain
//! validation message that happens to say "already" or "conversion" stays a
//! validation failure.

use fieldsync_domain::{ConflictInfo, ConflictKind};
use serde_json::Value;

/// Outcome of classifying one failed response.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kind: ConflictKind,
    pub info: ConflictInfo,
    /// 403/404/409/410, or any status carrying a known conflict tag.
    pub conflict_shaped: bool,
}

const UNAUTHORIZED_PHRASES: &[&str] =
    &["permission", "not authorized", "unauthorized", "forbidden", "access denied"];
const DELETED_PHRASES: &[&str] = &["no longer exists", "not found", "deleted", "removed"];
const VERSION_PHRASES: &[&str] = &["changed since", "modified", "version", "stale"];
const DUPLICATE_PHRASES: &[&str] = &["already", "duplicate"];

/// Classify a non-2xx response.
pub fn classify(status: u16, body: Option<&Value>) -> Classification {
    let conflict_status = is_conflict_status(status);
    let tagged = body.and_then(kind_from_tag);
    let kind = tagged
        .or_else(|| body.filter(|_| conflict_status).and_then(kind_from_text))
        .unwrap_or_else(|| kind_from_status(status));

    Classification {
        kind,
        info: body.map(extract_info).unwrap_or_default(),
        conflict_shaped: conflict_status || tagged.is_some(),
    }
}

fn is_conflict_status(status: u16) -> bool {
    matches!(status, 403 | 404 | 409 | 410)
}

fn kind_from_tag(body: &Value) -> Option<ConflictKind> {
    let conflict = body.get("conflict");
    let candidates = [
        conflict.and_then(|c| c.get("kind")),
        conflict.filter(|c| c.is_string()),
        body.get("conflictKind"),
        body.get("code"),
    ];

    candidates.into_iter().flatten().filter_map(Value::as_str).find_map(parse_tag)
}

fn parse_tag(tag: &str) -> Option<ConflictKind> {
    let lowered = tag.trim().to_ascii_lowercase();
    let name = lowered.strip_prefix("conflict_").unwrap_or(&lowered);
    name.parse::<ConflictKind>().ok().filter(|kind| kind.is_known())
}

fn kind_from_text(body: &Value) -> Option<ConflictKind> {
    let text = message_fields(body).join(" ").to_lowercase();
    if text.is_empty() {
        return None;
    }

    let table = [
        (ConflictKind::Unauthorized, UNAUTHORIZED_PHRASES),
        (ConflictKind::Deleted, DELETED_PHRASES),
        (ConflictKind::Version, VERSION_PHRASES),
        (ConflictKind::Duplicate, DUPLICATE_PHRASES),
    ];
    table
        .into_iter()
        .find(|(_, phrases)| phrases.iter().any(|phrase| contains_phrase(&text, phrase)))
        .map(|(kind, _)| kind)
}

/// `phrase` occurs in `text` delimited by non-alphanumeric characters.
fn contains_phrase(text: &str, phrase: &str) -> bool {
    text.match_indices(phrase).any(|(start, matched)| {
        let before = text[..start].chars().next_back();
        let after = text[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn kind_from_status(status: u16) -> ConflictKind {
    match status {
        403 => ConflictKind::Unauthorized,
        404 | 410 => ConflictKind::Deleted,
        _ => ConflictKind::Unknown,
    }
}

/// Free-text fields a server may use to explain a rejection.
fn message_fields(body: &Value) -> Vec<&str> {
    let conflict = body.get("conflict");
    [
        body.get("message"),
        body.get("error"),
        body.get("error").and_then(|e| e.get("message")),
        body.get("detail"),
        conflict.and_then(|c| c.get("message")),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .collect()
}

fn extract_info(body: &Value) -> ConflictInfo {
    let scopes = [body.get("conflict").filter(|c| c.is_object()), Some(body)];

    ConflictInfo {
        actor: lookup(&scopes, &["actor", "by", "completedBy"]),
        at: lookup(&scopes, &["at", "timestamp", "completedAt"]),
        message: message_fields(body).first().map(|s| (*s).to_string()),
        detail: Some(body.clone()),
    }
}

/// First non-empty scalar under any of `keys`, nested conflict object first.
fn lookup(scopes: &[Option<&Value>], keys: &[&str]) -> Option<String> {
    scopes.iter().flatten().find_map(|scope| {
        keys.iter().find_map(|key| scope.get(*key).and_then(scalar_to_string))
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("name").and_then(scalar_to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tagged_kind_wins_over_text_and_status() {
        let body = json!({
            "conflict": { "kind": "duplicate", "actor": "Alice", "at": "2024-05-01T09:30:00Z" },
            "message": "Record not found"
        });
        let result = classify(404, Some(&body));
        assert_eq!(result.kind, ConflictKind::Duplicate);
        assert_eq!(result.info.actor.as_deref(), Some("Alice"));
        assert_eq!(result.info.at.as_deref(), Some("2024-05-01T09:30:00Z"));
        assert!(result.conflict_shaped);
    }

    #[test]
    fn accepts_conflict_kind_and_code_forms() {
        let body = json!({ "conflictKind": "VERSION" });
        assert_eq!(classify(409, Some(&body)).kind, ConflictKind::Version);

        let body = json!({ "code": "CONFLICT_DELETED" });
        assert_eq!(classify(422, Some(&body)).kind, ConflictKind::Deleted);

        let body = json!({ "conflict": "unauthorized" });
        assert_eq!(classify(409, Some(&body)).kind, ConflictKind::Unauthorized);
    }

    #[test]
    fn unrecognized_code_falls_through_to_text() {
        let body = json!({ "code": "E1234", "message": "Task already completed by Bob" });
        let result = classify(409, Some(&body));
        assert_eq!(result.kind, ConflictKind::Duplicate);
        assert_eq!(result.info.actor, None);
        assert_eq!(result.info.message.as_deref(), Some("Task already completed by Bob"));
    }

    #[test]
    fn text_heuristic_covers_each_kind() {
        let cases = [
            ("This stock count was modified by another user", ConflictKind::Version),
            ("Entry no longer exists", ConflictKind::Deleted),
            ("You do not have permission to close this task", ConflictKind::Unauthorized),
            ("Duplicate submission", ConflictKind::Duplicate),
        ];
        for (message, expected) in cases {
            let body = json!({ "error": message });
            assert_eq!(classify(409, Some(&body)).kind, expected, "{message}");
        }
    }

    #[test]
    fn status_fallback() {
        assert_eq!(classify(403, None).kind, ConflictKind::Unauthorized);
        assert_eq!(classify(404, None).kind, ConflictKind::Deleted);
        assert_eq!(classify(410, Some(&json!({}))).kind, ConflictKind::Deleted);

        let unknown = classify(409, None);
        assert_eq!(unknown.kind, ConflictKind::Unknown);
        assert!(unknown.conflict_shaped);
    }

    #[test]
    fn plain_validation_failure_is_not_conflict_shaped() {
        let body = json!({ "message": "quantity must be positive" });
        let result = classify(422, Some(&body));
        assert_eq!(result.kind, ConflictKind::Unknown);
        assert!(!result.conflict_shaped);
    }

    #[test]
    fn validation_wording_never_becomes_a_conflict() {
        let messages = [
            "Unit conversion failed for line 3",
            "Line 2 was already counted in this batch",
            "Field 'modified' is read-only",
            "Attachment removed from the request",
        ];
        for message in messages {
            for status in [400, 412, 422] {
                let result = classify(status, Some(&json!({ "message": message })));
                assert_eq!(result.kind, ConflictKind::Unknown, "{status} {message}");
                assert!(!result.conflict_shaped, "{status} {message}");
            }
        }
    }

    #[test]
    fn keywords_match_whole_words_only() {
        let body = json!({ "message": "Unit conversion failed" });
        assert_eq!(classify(409, Some(&body)).kind, ConflictKind::Unknown);

        let body = json!({ "message": "Stale version: reload and retry" });
        assert_eq!(classify(409, Some(&body)).kind, ConflictKind::Version);

        assert!(contains_phrase("record not found.", "not found"));
        assert!(!contains_phrase("unstaled", "stale"));
        assert!(!contains_phrase("alreadyish", "already"));
    }

    #[test]
    fn tagged_kind_on_validation_status_is_conflict_shaped() {
        let body = json!({ "code": "CONFLICT_VERSION", "message": "Unit conversion failed" });
        let result = classify(422, Some(&body));
        assert_eq!(result.kind, ConflictKind::Version);
        assert!(result.conflict_shaped);
    }

    #[test]
    fn extracts_actor_from_top_level_and_nested_names() {
        let body = json!({ "completedBy": { "name": "Alice" }, "completedAt": 1714555800 });
        let info = classify(409, Some(&body)).info;
        assert_eq!(info.actor.as_deref(), Some("Alice"));
        assert_eq!(info.at.as_deref(), Some("1714555800"));
        assert_eq!(info.detail, Some(body));
    }
}
