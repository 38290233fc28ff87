//! Key naming and pattern helpers
//!
//! Lock records live under `lock:{namespace}:{name}` so independent managers
//! sharing one store never collide.

use std::sync::LazyLock;

use crate::LOCK_KEY_PREFIX;

/// Lock names: non-empty, no whitespace or glob metacharacters
static VALID_NAME: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[a-zA-Z0-9_.:/@+-]+$").expect("Invalid regex pattern")
});

/// Namespaces may not contain the key separator
static VALID_NAMESPACE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[a-zA-Z0-9_.-]+$").expect("Invalid regex pattern"));

/// Validate a lock name
///
/// # Examples
///
/// ```
/// use leasehold_common::is_valid_name;
///
/// assert!(is_valid_name("invoice-batch-42"));
/// assert!(is_valid_name("tenant:acme/provision"));
/// assert!(!is_valid_name("with spaces"));
/// assert!(!is_valid_name("wild*card"));
/// assert!(!is_valid_name(""));
/// ```
pub fn is_valid_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

/// Validate a namespace
pub fn is_valid_namespace(namespace: &str) -> bool {
    VALID_NAMESPACE.is_match(namespace)
}

/// Build the store key for a lock name
///
/// ```
/// use leasehold_common::lock_key;
///
/// assert_eq!(lock_key("billing", "invoice-batch-42"), "lock:billing:invoice-batch-42");
/// ```
pub fn lock_key(namespace: &str, name: &str) -> String {
    format!("{}:{}:{}", LOCK_KEY_PREFIX, namespace, name)
}

/// Recover the lock name from a store key within `namespace`
pub fn name_from_key<'a>(namespace: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(LOCK_KEY_PREFIX)?
        .strip_prefix(':')?
        .strip_prefix(namespace)?
        .strip_prefix(':')
}

/// Glob match where `*` matches any sequence and `?` a single character.
/// Every other character matches literally.
pub fn glob_matches(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    expr.push('$');

    regex::Regex::new(&expr)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}
