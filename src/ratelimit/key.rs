//! Rule key generation.

/// A key that scopes rule state to one client and one resource.
///
/// Renders as `client_token:resource`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    /// The client token
    pub client_token: String,
    /// The target resource
    pub resource: String,
}

impl RuleKey {
    /// Create a new rule key from a client token and resource.
    pub fn new(client_token: &str, resource: &str) -> Self {
        Self {
            client_token: client_token.to_string(),
            resource: resource.to_string(),
        }
    }

    /// Convert the rule key to its string representation.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.client_token, self.resource)
    }
}

impl std::fmt::Display for RuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.client_token, self.resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_key_to_string() {
        let key = RuleKey::new("client1", "api/resource1");
        assert_eq!(key.to_string_key(), "client1:api/resource1");
        assert_eq!(key.to_string(), "client1:api/resource1");
    }

    #[test]
    fn test_rule_key_equality() {
        assert_eq!(RuleKey::new("a", "b"), RuleKey::new("a", "b"));
        assert_ne!(RuleKey::new("a", "b"), RuleKey::new("b", "a"));
    }

    #[test]
    fn test_fields_stay_distinct_when_rendering_collides() {
        // "a:b" + "c" and "a" + "b:c" render the same but are different keys.
        let left = RuleKey::new("a:b", "c");
        let right = RuleKey::new("a", "b:c");
        assert_eq!(left.to_string_key(), right.to_string_key());
        assert_ne!(left, right);
    }
}
