//! Passes that modify a parsed config tree in place.

use super::{ConfigNode, Property};

/// Separator between the entries of a define string, e.g. `SKINNING; POINT_LIGHT_COUNT 2`
pub const DEFINE_SEPARATOR: &str = "; ";

impl ConfigNode {
    /// Removes `prefix` from every property value in the tree that starts with it.
    ///
    /// # Example
    ///
    /// ```rust
    /// use flipm_content::config::{ConfigNode, Property};
    /// let mut sampler = ConfigNode::new("sampler u_diffuseTexture");
    /// sampler.properties.push(Property::new("path", "/home/flipm/res/textures/box.png"));
    /// let mut root = ConfigNode::default();
    /// root.children.push(sampler);
    /// root.strip_prefix("/home/flipm/");
    /// assert_eq!(root.children[0].property("path"), Some("res/textures/box.png"));
    /// ```
    pub fn strip_prefix(&mut self, prefix: &str) {
        for property in &mut self.properties {
            if let Some(stripped) = property.value.strip_prefix(prefix) {
                property.value = stripped.to_owned();
            }
        }
        for child in &mut self.children {
            child.strip_prefix(prefix);
        }
    }

    /// Sets the value of every property with the given key or adds the property
    /// when there is none.
    pub fn replace_property(&mut self, key: &str, value: &str) {
        let mut found = false;
        for property in self.properties.iter_mut().filter(|property| property.key == key) {
            property.value = value.to_owned();
            found = true;
        }
        if !found {
            self.properties.push(Property::new(key, value));
        }
    }

    /// Appends `value` to every property with the given key, separated by
    /// [`DEFINE_SEPARATOR`], or adds the property when there is none.
    pub fn append_property(&mut self, key: &str, value: &str) {
        let mut found = false;
        for property in self.properties.iter_mut().filter(|property| property.key == key) {
            if !property.value.is_empty() {
                property.value.push_str(DEFINE_SEPARATOR);
            }
            property.value.push_str(value);
            found = true;
        }
        if !found {
            self.properties.push(Property::new(key, value));
        }
    }

    /// Turns every property with the given key into a tombstone. The entries stay
    /// in place but are not serialized.
    pub fn remove_property(&mut self, key: &str) {
        for property in self.properties.iter_mut().filter(|property| property.key == key) {
            property.key.clear();
        }
    }
}
