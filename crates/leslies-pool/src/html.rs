use scraper::{ElementRef, Html, Selector};

use crate::error::ParseError;

/// A tag that must carry every one of `classes`.
#[derive(Debug, Clone, Copy)]
pub struct ClassQuery {
    tag: &'static str,
    classes: &'static [&'static str],
}

impl ClassQuery {
    pub const fn new(tag: &'static str, classes: &'static [&'static str]) -> Self {
        Self { tag, classes }
    }

    pub const fn tag(tag: &'static str) -> Self {
        Self { tag, classes: &[] }
    }

    pub fn css(&self) -> String {
        let mut css = String::from(self.tag);
        for class in self.classes {
            css.push('.');
            css.push_str(class);
        }
        css
    }

    pub fn selector(&self) -> Result<Selector, ParseError> {
        let css = self.css();
        Selector::parse(&css).map_err(|e| ParseError::Selector(format!("{css}: {e}")))
    }

    /// First match anywhere in the document.
    pub fn first_in<'a>(&self, document: &'a Html) -> Result<Option<ElementRef<'a>>, ParseError> {
        Ok(document.select(&self.selector()?).next())
    }

    /// First match among the descendants of `scope`.
    pub fn first<'a>(&self, scope: ElementRef<'a>) -> Result<Option<ElementRef<'a>>, ParseError> {
        Ok(scope.select(&self.selector()?).next())
    }

    /// Every match among the descendants of `scope`, in document order.
    pub fn all<'a>(&self, scope: ElementRef<'a>) -> Result<Vec<ElementRef<'a>>, ParseError> {
        Ok(scope.select(&self.selector()?).collect())
    }
}

/// Concatenated, trimmed text content of an element.
pub fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_owned()
}
