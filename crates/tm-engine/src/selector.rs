//! Element selector matching
//!
//! A small CSS selector subset evaluated against [`Element`] snapshots:
//! comma-separated lists, descendant (` `) and child (`>`) combinators, and
//! compound selectors built from a tag name or `*`, `#id`, `.class` and
//! attribute tests (`[attr]`, `[attr=v]`, `[attr^=v]`, `[attr$=v]`,
//! `[attr*=v]`).

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tm_core::Element;

/// Selector parse failure
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid selector at {position}: {message}")]
pub struct SelectorError {
    pub position: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
enum AttrOp {
    Exists,
    Equals(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

#[derive(Debug, Clone, PartialEq)]
struct AttrTest {
    name: String,
    op: AttrOp,
}

impl AttrTest {
    fn matches(&self, element: &Element) -> bool {
        let Some(value) = attribute(element, &self.name) else {
            return false;
        };
        match &self.op {
            AttrOp::Exists => true,
            AttrOp::Equals(v) => value == v.as_str(),
            AttrOp::Prefix(v) => !v.is_empty() && value.starts_with(v.as_str()),
            AttrOp::Suffix(v) => !v.is_empty() && value.ends_with(v.as_str()),
            AttrOp::Contains(v) => !v.is_empty() && value.contains(v.as_str()),
        }
    }
}

fn attribute<'a>(element: &'a Element, name: &str) -> Option<Cow<'a, str>> {
    if name == "class" {
        return (!element.classes.is_empty()).then(|| Cow::Owned(element.class_name()));
    }
    element.attribute(name).map(Cow::Borrowed)
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    /// `None` matches any tag
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttrTest>,
}

impl Compound {
    fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|c| element.classes.contains(c))
            && self.attributes.iter().all(|a| a.matches(element))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

/// One compound plus its relation to the compound on its left
#[derive(Debug, Clone, PartialEq)]
struct Step {
    compound: Compound,
    combinator: Option<Combinator>,
}

/// A selector without commas, stored right to left
#[derive(Debug, Clone, PartialEq)]
struct Complex {
    steps: Vec<Step>,
}

impl Complex {
    fn matches(&self, element: &Element) -> bool {
        self.match_from(0, element)
    }

    fn match_from(&self, idx: usize, element: &Element) -> bool {
        let step = &self.steps[idx];
        if !step.compound.matches(element) {
            return false;
        }
        if idx + 1 == self.steps.len() {
            return true;
        }
        match step.combinator {
            Some(Combinator::Child) => element
                .parent
                .as_deref()
                .map(|parent| self.match_from(idx + 1, parent))
                .unwrap_or(false),
            Some(Combinator::Descendant) | None => element
                .ancestors()
                .any(|ancestor| self.match_from(idx + 1, ancestor)),
        }
    }
}

/// A parsed, comma-separated selector list
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList {
    source: String,
    selectors: Vec<Complex>,
}

impl SelectorList {
    /// Parse a selector list
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let selectors = Parser::new(source).parse_list()?;
        Ok(Self {
            source: source.trim().to_string(),
            selectors,
        })
    }

    /// Whether the element matches any selector of the list
    pub fn matches(&self, element: &Element) -> bool {
        self.selectors.iter().any(|s| s.matches(element))
    }
}

impl FromStr for SelectorList {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SelectorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> SelectorError {
        SelectorError {
            position: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().map(char::is_whitespace).unwrap_or(false) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<Vec<Complex>, SelectorError> {
        let mut list = Vec::new();
        loop {
            self.skip_whitespace();
            list.push(self.parse_complex()?);
            self.skip_whitespace();
            match self.peek() {
                None => return Ok(list),
                Some(',') => self.pos += 1,
                Some(c) => return Err(self.error(format!("unexpected '{}'", c))),
            }
        }
    }

    fn parse_complex(&mut self) -> Result<Complex, SelectorError> {
        // Parsed left to right, reversed at the end
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();

        loop {
            let had_space = self.skip_whitespace();
            let combinator = match self.peek() {
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    Combinator::Child
                }
                Some(',') | None => break,
                Some(_) if had_space => Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected '{}'", c))),
            };
            combinators.push(combinator);
            compounds.push(self.parse_compound()?);
        }

        let mut steps = Vec::with_capacity(compounds.len());
        for (i, compound) in compounds.into_iter().enumerate().rev() {
            let combinator = i.checked_sub(1).map(|j| combinators[j]);
            steps.push(Step {
                compound,
                combinator,
            });
        }
        Ok(Complex { steps })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let start = self.pos;

        if self.eat('*') {
            // Universal selector, no tag restriction
        } else if self.peek().map(is_ident_char).unwrap_or(false) {
            compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.parse_ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attributes.push(self.parse_attribute()?);
                }
                _ => break,
            }
        }

        if self.pos == start {
            return Err(self.error("expected a selector"));
        }
        Ok(compound)
    }

    fn parse_attribute(&mut self) -> Result<AttrTest, SelectorError> {
        self.skip_whitespace();
        let name = self.parse_ident()?;
        self.skip_whitespace();

        let op = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrTest {
                    name,
                    op: AttrOp::Exists,
                });
            }
            Some('=') => {
                self.pos += 1;
                '='
            }
            Some(c @ ('^' | '$' | '*')) => {
                self.pos += 1;
                if !self.eat('=') {
                    return Err(self.error("expected '='"));
                }
                c
            }
            _ => return Err(self.error("expected ']' or an operator")),
        };

        self.skip_whitespace();
        let value = self.parse_value()?;
        self.skip_whitespace();
        if !self.eat(']') {
            return Err(self.error("expected ']'"));
        }

        let op = match op {
            '^' => AttrOp::Prefix(value),
            '$' => AttrOp::Suffix(value),
            '*' => AttrOp::Contains(value),
            _ => AttrOp::Equals(value),
        };
        Ok(AttrTest { name, op })
    }

    fn parse_value(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c == quote {
                        let value: String = self.chars[start..self.pos].iter().collect();
                        self.pos += 1;
                        return Ok(value);
                    }
                    self.pos += 1;
                }
                Err(self.error("unterminated string"))
            }
            _ => self.parse_ident(),
        }
    }

    fn parse_ident(&mut self) -> Result<String, SelectorError> {
        let start = self.pos;
        while self.peek().map(is_ident_char).unwrap_or(false) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected an identifier"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy_button() -> Element {
        Element::new("button")
            .with_id("buy")
            .with_class("btn")
            .with_class("primary")
            .with_attr("data-sku", "SKU-42")
            .with_parent(
                Element::new("div")
                    .with_class("product")
                    .with_parent(Element::new("main").with_id("content")),
            )
    }

    fn matches(selector: &str, element: &Element) -> bool {
        SelectorList::parse(selector).unwrap().matches(element)
    }

    #[test]
    fn test_compound_selectors() {
        let el = buy_button();
        assert!(matches("button", &el));
        assert!(matches("BUTTON#buy.btn", &el));
        assert!(matches("*.primary", &el));
        assert!(!matches("a.btn", &el));
        assert!(!matches(".btn.secondary", &el));
        assert!(!matches("#sell", &el));
    }

    #[test]
    fn test_attribute_selectors() {
        let el = buy_button();
        assert!(matches("[data-sku]", &el));
        assert!(matches("[data-sku=SKU-42]", &el));
        assert!(matches("[data-sku^='SKU']", &el));
        assert!(matches("[data-sku$=\"42\"]", &el));
        assert!(matches("[data-sku*=U-4]", &el));
        assert!(matches("[class*=prim]", &el));
        assert!(!matches("[data-color]", &el));
    }

    #[test]
    fn test_combinators() {
        let el = buy_button();
        assert!(matches("div.product > button", &el));
        assert!(matches("main button", &el));
        assert!(matches("#content .product > #buy", &el));
        assert!(!matches("main > button", &el));
        assert!(!matches("section button", &el));
    }

    #[test]
    fn test_selector_list() {
        let el = buy_button();
        assert!(matches("a.nav, button.primary", &el));
        assert!(!matches("a.nav, form", &el));
    }

    #[test]
    fn test_invalid_selectors() {
        assert!(SelectorList::parse("").is_err());
        assert!(SelectorList::parse("div >").is_err());
        assert!(SelectorList::parse("[data-sku").is_err());
        assert!(SelectorList::parse("a,,b").is_err());
        assert!(SelectorList::parse("div:hover").is_err());
    }
}
