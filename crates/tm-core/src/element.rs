//! Element identity snapshots
//!
//! Host adapters observe DOM nodes and translate them into [`Element`]
//! records. The engine never touches a live document; it only sees these
//! immutable snapshots, including the ancestor chain needed for descendant
//! and child selector matching.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Snapshot of a document element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Lowercase tag name (e.g. "a", "button", "form")
    pub tag: String,

    /// The `id` attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The class list, in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,

    /// Remaining attributes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,

    /// Visible text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Resolved URL (`href` for links, `action` for forms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// The `target` attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Parent element, if captured by the adapter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<Element>>,
}

impl Element {
    /// Create an element with the given tag name
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_lowercase(),
            ..Default::default()
        }
    }

    /// Set the id attribute
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a class
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Set an attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the text content
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the target
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attach a parent element
    pub fn with_parent(mut self, parent: Element) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Space-separated class list, as `className` would read
    pub fn class_name(&self) -> String {
        self.classes.join(" ")
    }

    /// Look up an attribute, including the ones stored as dedicated fields
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match name {
            "id" => self.id.as_deref(),
            "href" | "action" => self.url.as_deref(),
            "target" => self.target.as_deref(),
            _ => self.attributes.get(name).map(String::as_str),
        }
    }

    /// Iterate over this element's ancestors, nearest first
    pub fn ancestors(&self) -> impl Iterator<Item = &Element> {
        std::iter::successors(self.parent.as_deref(), |e| e.parent.as_deref())
    }

    /// Stable key identifying this element (id if present, otherwise its descriptor path)
    pub fn identity_key(&self) -> String {
        match &self.id {
            Some(id) => format!("#{}", id),
            None => {
                let mut path: Vec<String> = self.ancestors().map(|e| e.to_string()).collect();
                path.reverse();
                path.push(self.to_string());
                path.join(" > ")
            }
        }
    }
}

impl fmt::Display for Element {
    /// Selector-like descriptor: `tag#id.class1.class2`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)?;
        if let Some(id) = &self.id {
            write!(f, "#{}", id)?;
        }
        for class in &self.classes {
            write!(f, ".{}", class)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor() {
        let el = Element::new("A").with_id("buy").with_class("btn").with_class("primary");
        assert_eq!(el.to_string(), "a#buy.btn.primary");
        assert_eq!(el.class_name(), "btn primary");
    }

    #[test]
    fn test_identity_key_without_id_uses_path() {
        let el = Element::new("span")
            .with_class("label")
            .with_parent(Element::new("div").with_class("card"));
        assert_eq!(el.identity_key(), "div.card > span.label");

        let with_id = Element::new("div").with_id("hero");
        assert_eq!(with_id.identity_key(), "#hero");
    }

    #[test]
    fn test_attribute_aliases() {
        let el = Element::new("a")
            .with_url("https://example.com")
            .with_attr("data-sku", "42");
        assert_eq!(el.attribute("href"), Some("https://example.com"));
        assert_eq!(el.attribute("data-sku"), Some("42"));
        assert_eq!(el.attribute("title"), None);
    }
}
