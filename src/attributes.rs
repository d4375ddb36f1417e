//! C++-style attributes, in the form `[[attr]]` or `[[attr(value)]]`.

use std::collections::BTreeMap;

use crate::error::{ParseError, ParseResult};

/// A set of attributes attached to a declaration or statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    attrs: BTreeMap<String, String>,
}

impl AttributeSet {
    /// Creates an empty attribute set.
    pub fn new() -> Self {
        AttributeSet::default()
    }

    /// Adds an attribute from the text between `[[` and `]]`, either a bare
    /// name or `name(value)`.
    pub fn add_from_str(&mut self, attr: &str) -> ParseResult<()> {
        if let Some(open) = attr.find('(') {
            let name = &attr[..open];
            let value = &attr[open + 1..];
            let value = value
                .strip_suffix(')')
                .ok_or_else(|| ParseError::new("invalid attribute specifier"))?;
            self.attrs.insert(name.to_string(), value.to_string());
        } else {
            self.attrs.insert(attr.to_string(), String::new());
        }
        Ok(())
    }

    /// Returns whether the named attribute is present.
    pub fn has(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    /// Returns the value of the named attribute, or `default` if absent.
    /// Attributes given without a value yield an empty string.
    pub fn value_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.attrs.get(key).map(String::as_str).unwrap_or(default)
    }

    /// Returns true if no attributes are set.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}
