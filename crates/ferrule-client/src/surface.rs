//! RPC surface derivation.
//!
//! The typed client an RPC library generates exposes a `send_<op>` /
//! `recv_<op>` pair per remote operation next to a few transport-internal
//! helpers. The operations a ferrule client exposes are exactly the
//! `send_` methods that are not one of those helpers.

use std::collections::HashSet;

const SEND_PREFIX: &str = "send_";

/// Transport-internal `send_` methods that are never remote operations.
pub const RESERVED: [&str; 3] = ["send_message", "send_oneway_message", "send_message_args"];

/// Derives the operation names from the methods of a generated client.
///
/// Declaration order is kept and duplicates are dropped.
///
/// # Example
///
/// ```
/// use ferrule_client::surface::derive_rpcs;
///
/// let methods = ["send_echo", "recv_echo", "send_message", "send_ping", "recv_ping"];
/// assert_eq!(derive_rpcs(methods), vec!["echo", "ping"]);
/// ```
pub fn derive_rpcs<I, S>(methods: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut rpcs = Vec::new();

    for method in methods {
        let method = method.as_ref();
        if RESERVED.contains(&method) {
            continue;
        }

        if let Some(op) = method.strip_prefix(SEND_PREFIX) {
            if !op.is_empty() && seen.insert(op.to_string()) {
                rpcs.push(op.to_string());
            }
        }
    }

    rpcs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_methods_are_excluded() {
        let methods = [
            "send_message",
            "send_oneway_message",
            "send_message_args",
            "send_get_user",
            "recv_get_user",
        ];
        assert_eq!(derive_rpcs(methods), vec!["get_user"]);
    }

    #[test]
    fn test_declaration_order_and_dedup() {
        let methods = ["send_b", "send_a", "send_b", "recv_a", "send_c"];
        assert_eq!(derive_rpcs(methods), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_empty_surface() {
        let methods: [&str; 2] = ["send_message", "recv_message"];
        assert!(derive_rpcs(methods).is_empty());
        assert!(derive_rpcs(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_bare_prefix_is_not_an_operation() {
        assert!(derive_rpcs(["send_"]).is_empty());
    }
}
