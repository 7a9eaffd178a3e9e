//! The component currently installed in the fixture.

use crate::config::validate_components;
use crate::error::AppResult;
use std::fmt;

/// A named device under test.
///
/// The name keys the component's directory and is matched as a substring
/// when aggregation discovers repeat files, so it must be a single path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentUnderTest {
    name: String,
}

impl ComponentUnderTest {
    /// Validate and wrap a component name.
    pub fn new(name: impl Into<String>) -> AppResult<Self> {
        let name = name.into();
        validate_components(std::slice::from_ref(&name))?;
        Ok(Self { name })
    }

    /// Component identifier.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ComponentUnderTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_name() {
        let c = ComponentUnderTest::new("red_LED").unwrap();
        assert_eq!(c.name(), "red_LED");
        assert_eq!(c.to_string(), "red_LED");
        assert!(ComponentUnderTest::new("").is_err());
        assert!(ComponentUnderTest::new("a/b").is_err());
        // would split the sample-file header line
        assert!(ComponentUnderTest::new("red\nLED").is_err());
    }
}
