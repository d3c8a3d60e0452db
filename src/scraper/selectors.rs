// selectors.rs
use ::scraper::{ElementRef, Html, Selector};

use crate::config::{FieldSelection, Selection};
use crate::domain::Value;
use crate::errors::{EtlError, Result};

/// `tag.c1, tag.c2`: the tag carrying any of the classes. No classes means
/// the bare tag.
pub fn css_for(tag: &str, classes: &[String]) -> String {
    if classes.is_empty() {
        return tag.to_string();
    }
    classes
        .iter()
        .map(|c| format!("{tag}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn compile(tag: &str, classes: &[String]) -> Result<Selector> {
    let css = css_for(tag, classes);
    Selector::parse(&css).map_err(|e| EtlError::selector(css.clone(), e.to_string()))
}

pub fn compile_selection(selection: &Selection) -> Result<Selector> {
    compile(&selection.tag, &selection.classes)
}

/// A compiled extraction field.
pub struct FieldSelector {
    pub name: String,
    selector: Selector,
    first_only: bool,
}

impl FieldSelector {
    pub fn new(field: &FieldSelection) -> Result<Self> {
        Ok(Self {
            name: field.name.clone(),
            selector: compile(&field.tag, &field.classes)?,
            first_only: field.first_only,
        })
    }

    /// Null when nothing matches, the first text for `first_only` fields,
    /// otherwise the list of texts in document order.
    pub fn extract(&self, document: &Html) -> Value {
        let mut texts: Vec<String> = document.select(&self.selector).map(inner_text).collect();
        if texts.is_empty() {
            Value::Null
        } else if self.first_only {
            Value::Text(texts.swap_remove(0))
        } else {
            Value::List(texts)
        }
    }
}

/// Joined inner text of an element, trimmed.
pub fn inner_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
