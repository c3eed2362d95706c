//! Session configuration

/// Prefix of generated labels and temporaries
pub const DEFAULT_LABEL_PREFIX: &str = "___l";

/// Calls nested deeper than this fault the invocation
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Tunables of one interpreter session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Reject unknown variables and functions instead of treating them as
    /// opaque
    pub strict_names: bool,
    pub label_prefix: String,
    pub max_call_depth: usize,
    /// Style shell banners and errors
    pub color: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            strict_names: false,
            label_prefix: DEFAULT_LABEL_PREFIX.to_string(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            color: true,
        }
    }
}

impl SessionConfig {
    pub fn with_strict_names(mut self, strict: bool) -> Self {
        self.strict_names = strict;
        self
    }

    pub fn with_label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.label_prefix = prefix.into();
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_override_defaults() {
        let config = SessionConfig::default()
            .with_strict_names(true)
            .with_max_call_depth(8)
            .with_color(false);

        assert!(config.strict_names);
        assert_eq!(config.max_call_depth, 8);
        assert!(!config.color);
        assert_eq!(config.label_prefix, DEFAULT_LABEL_PREFIX);
    }
}
