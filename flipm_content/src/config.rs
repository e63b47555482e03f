//! Parser and serializer for the brace-delimited property language used by
//! `.material` and `.scene` files.
//!
//! ```text
//! material box
//! {
//!     technique
//!     {
//!         pass
//!         {
//!             defines = SKINNING
//!             vertexShader = res/shaders/textured.vert
//!         }
//!     }
//! }
//! ```
//!
//! A file is parsed into a tree of [`ConfigNode`]s which keeps the order of
//! properties and blocks so that it can be written back after being modified
//! (see [`ConfigNode::serialize`]).

mod parse;
mod transform;

use std::fmt::{self, Formatter};

pub use parse::{parse, ParseError};
pub use transform::DEFINE_SEPARATOR;

const INDENT: &str = "  ";

/// A `key = value` line in a block. A property with an empty key is a tombstone
/// and is skipped when the tree is serialized.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Property {
    pub key: String,
    pub value: String,
}

impl Property {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Returns `true` when the property was removed with [`ConfigNode::remove_property`].
    pub fn is_tombstone(&self) -> bool {
        self.key.is_empty()
    }
}

/// One block of a config file. The root of a parsed file has an empty header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigNode {
    /// Text in front of the opening brace, e.g. `material box : base`
    pub header: String,
    pub properties: Vec<Property>,
    pub children: Vec<ConfigNode>,
}

impl ConfigNode {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            ..Default::default()
        }
    }

    /// Returns the value of the first live property with the given key.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|property| !property.is_tombstone() && property.key == key)
            .map(|property| property.value.as_str())
    }

    /// Iterates over the children whose header satisfies `predicate`.
    pub fn children_where<'a>(&'a mut self, predicate: impl Fn(&str) -> bool + 'a) -> impl Iterator<Item = &'a mut ConfigNode> + 'a {
        self.children.iter_mut().filter(move |child| predicate(&child.header))
    }

    /// Writes the tree back into the property language.
    ///
    /// # Example
    ///
    /// ```rust
    /// use flipm_content::config::{self, ConfigNode, Property};
    /// let mut pass = ConfigNode::new("pass");
    /// pass.properties.push(Property::new("defines", "SKINNING"));
    /// let mut root = ConfigNode::default();
    /// root.children.push(pass);
    /// assert_eq!(root.serialize(), "pass {\n  defines = SKINNING\n}\n");
    /// assert_eq!(config::parse(&root.serialize()).unwrap(), root);
    /// ```
    pub fn serialize(&self) -> String {
        let mut output = String::new();
        self.serialize_into("", &mut output);
        output
    }

    fn serialize_into(&self, indent: &str, output: &mut String) {
        let start = output.len();
        for property in self.properties.iter().filter(|property| !property.is_tombstone()) {
            output.push_str(indent);
            output.push_str(&property.key);
            if !property.value.is_empty() {
                output.push_str(" = ");
                output.push_str(&property.value);
            }
            output.push('\n');
        }
        let child_indent = format!("{indent}{INDENT}");
        for child in &self.children {
            if output.len() > start {
                output.push('\n');
            }
            output.push_str(indent);
            output.push_str(&child.header);
            output.push_str(" {\n");
            child.serialize_into(&child_indent, output);
            output.push_str(indent);
            output.push_str("}\n");
        }
    }
}

impl fmt::Display for ConfigNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}
