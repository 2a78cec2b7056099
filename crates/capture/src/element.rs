//! Element identification.
//!
//! Heatmap cells and event targets must name an element the same way, so
//! both go through [`element_identifier`].

use engine_core::limits::MAX_ELEMENT_ID_LEN;
use engine_core::EventTarget;
use serde::{Deserialize, Serialize};

/// Maximum class tokens used in a class-based identifier.
const MAX_CLASS_TOKENS: usize = 3;

/// Host-side description of a DOM element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Tag name, any case
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    /// 1-based position among its parent's children
    #[serde(default = "default_sibling_index")]
    pub sibling_index: usize,
}

fn default_sibling_index() -> usize {
    1
}

impl ElementInfo {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: None,
            classes: Vec::new(),
            sibling_index: 1,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classes = classes.into_iter().map(Into::into).collect();
        self
    }

    pub fn at_index(mut self, sibling_index: usize) -> Self {
        self.sibling_index = sibling_index;
        self
    }

    /// Lowercased tag, `unknown` when the host sent none.
    pub fn element_type(&self) -> String {
        let tag = self.tag.trim();
        if tag.is_empty() {
            "unknown".to_string()
        } else {
            tag.to_lowercase()
        }
    }

    /// Event target descriptor for this element.
    pub fn target(&self) -> EventTarget {
        EventTarget {
            element: element_identifier(self),
            element_type: self.element_type(),
        }
    }
}

/// Stable identifier: `#id`, else `.first.three.classes`, else
/// `tag:nth-child(n)`.
pub fn element_identifier(element: &ElementInfo) -> String {
    let id = element
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    let identifier = if let Some(id) = id {
        format!("#{}", id)
    } else {
        let classes: Vec<&str> = element
            .classes
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .take(MAX_CLASS_TOKENS)
            .collect();

        if classes.is_empty() {
            format!(
                "{}:nth-child({})",
                element.element_type(),
                element.sibling_index.max(1)
            )
        } else {
            format!(".{}", classes.join("."))
        }
    };

    truncate_chars(identifier, MAX_ELEMENT_ID_LEN)
}

fn truncate_chars(s: String, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_wins() {
        let el = ElementInfo::new("BUTTON")
            .with_id("download-cv")
            .with_classes(["btn", "primary"]);
        assert_eq!(element_identifier(&el), "#download-cv");
        assert_eq!(el.target().element_type, "button");
    }

    #[test]
    fn test_classes_limited_to_three() {
        let el = ElementInfo::new("div").with_classes(["card", "", "shadow", "hover", "wide"]);
        assert_eq!(element_identifier(&el), ".card.shadow.hover");
    }

    #[test]
    fn test_tag_and_index_fallback() {
        let el = ElementInfo::new("LI").with_id("  ").at_index(4);
        assert_eq!(element_identifier(&el), "li:nth-child(4)");
    }

    #[test]
    fn test_long_identifiers_are_truncated() {
        let el = ElementInfo::new("a").with_id("x".repeat(400));
        assert_eq!(element_identifier(&el).chars().count(), MAX_ELEMENT_ID_LEN);
    }
}
