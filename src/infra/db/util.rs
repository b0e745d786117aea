use crate::domain::{BackendKind, StoreError};

pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        decode @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::Encode(_)) => StoreError::serialization(decode),
        sqlx::Error::Database(db) if db.code().as_deref().is_some_and(unrepresentable_text) => {
            StoreError::serialization(db)
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            StoreError::unavailable(BackendKind::Relational, "statement timed out")
        }
        other => StoreError::unavailable(BackendKind::Relational, other),
    }
}

/// SQLSTATEs Postgres raises for text it cannot store, such as a NUL
/// byte in a `text` column or a `\u0000` escape inside `jsonb`.
fn unrepresentable_text(code: &str) -> bool {
    matches!(code, "22021" | "22P05")
}

/// Escape `%`, `_` and `\` so a caller-supplied fragment matches literally
/// inside a `LIKE ... ESCAPE '\'` pattern.
pub fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len() + 4);
    for ch in fragment.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_like_metacharacters() {
        assert_eq!(escape_like("feeds_"), "feeds\\_");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn nul_byte_codes_are_not_outages() {
        assert!(unrepresentable_text("22P05"));
        assert!(unrepresentable_text("22021"));
        assert!(!unrepresentable_text("57014"));
        assert!(!unrepresentable_text("08006"));
    }

    #[test]
    fn pool_timeouts_map_to_unavailable() {
        let err = map_sqlx_error(sqlx::Error::PoolTimedOut);
        assert!(err.is_unavailable());
    }
}
