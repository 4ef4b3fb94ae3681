/// Settings shared by every record parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Prefix of every location ID: `{namespace}:id={raw id}`.
    pub namespace: String,
    /// Reject records without an address.
    pub require_address: bool,
}

impl ParseOptions {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            require_address: true,
        }
    }

    pub fn allow_missing_address(mut self) -> Self {
        self.require_address = false;
        self
    }

    /// Build the namespaced ID for a raw record ID.
    pub fn location_id(&self, raw: &str) -> String {
        if self.namespace.is_empty() {
            raw.to_string()
        } else {
            format!("{}:id={}", self.namespace, raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_id() {
        assert_eq!(ParseOptions::new("wof").location_id("123"), "wof:id=123");
        assert_eq!(ParseOptions::new("").location_id("abc"), "abc");
    }
}
