//! CLIXML element tree.
//!
//! The serializer and deserializer operate on this tree, not on strings;
//! rendering and parsing live here. CLIXML is a small, fixed subset of
//! XML — elements, attributes, character data, entity references — so the
//! codec carries its own reader/writer the same way it carries its own
//! binary framing, instead of pulling in a general XML stack.

use crate::error::{PsrpError, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: Option<String>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    pub fn with_text(tag: impl Into<String>, text: impl Into<String>) -> Self {
        let mut element = Self::new(tag);
        element.text = Some(text.into());
        element
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value.into(),
            None => self.attributes.push((name, value.into())),
        }
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Element text, treating an absent text node as the empty string.
    pub fn text_content(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Render the tree as compact XML (no declaration, no whitespace).
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape_attribute(value, out);
            out.push('"');
        }

        if self.children.is_empty() && self.text.is_none() {
            out.push_str(" />");
            return;
        }

        out.push('>');
        if let Some(text) = &self.text {
            escape_text(text, out);
        }
        for child in &self.children {
            child.write_into(out);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }

    /// Parse one document: an optional XML declaration and comments around
    /// a single root element.
    pub fn parse(input: &str) -> Result<Element> {
        let chars: Vec<char> = input.chars().collect();
        let mut parser = Parser { chars, pos: 0 };

        parser.skip_misc()?;
        let root = parser.parse_element()?;
        parser.skip_misc()?;
        if parser.pos != parser.chars.len() {
            return Err(parser.error("content after the root element"));
        }
        Ok(root)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn error(&self, message: &str) -> PsrpError {
        PsrpError::MalformedXml(format!("{message} at offset {}", self.pos))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn starts_with(&self, pattern: &str) -> bool {
        self.chars[self.pos..]
            .iter()
            .zip(pattern.chars())
            .filter(|(a, b)| **a == *b)
            .count()
            == pattern.chars().count()
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{c}'")))
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Skip whitespace, an XML declaration, and comments.
    fn skip_misc(&mut self) -> Result<()> {
        loop {
            self.skip_whitespace();
            if self.starts_with("<?") {
                self.skip_until("?>")?;
            } else if self.starts_with("<!--") {
                self.skip_until("-->")?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_until(&mut self, terminator: &str) -> Result<()> {
        while self.pos < self.chars.len() {
            if self.starts_with(terminator) {
                self.pos += terminator.chars().count();
                return Ok(());
            }
            self.pos += 1;
        }
        Err(self.error(&format!("unterminated construct, expected '{terminator}'")))
    }

    fn read_name(&mut self) -> Result<String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.'))
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected a name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_element(&mut self) -> Result<Element> {
        self.expect('<')?;
        let tag = self.read_name()?;
        let mut element = Element::new(tag);

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('/') => {
                    self.pos += 1;
                    self.expect('>')?;
                    return Ok(element);
                }
                Some('>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let name = self.read_name()?;
                    self.skip_whitespace();
                    self.expect('=')?;
                    self.skip_whitespace();
                    let value = self.read_quoted()?;
                    element.set_attribute(name, value);
                }
                None => return Err(self.error("unterminated start tag")),
            }
        }

        let mut text = String::new();
        loop {
            if self.starts_with("</") {
                self.pos += 2;
                let close = self.read_name()?;
                self.skip_whitespace();
                self.expect('>')?;
                if close != element.tag {
                    return Err(self.error(&format!(
                        "mismatched close tag '{close}' for '{}'",
                        element.tag
                    )));
                }
                break;
            } else if self.starts_with("<!--") {
                self.skip_until("-->")?;
            } else if self.peek() == Some('<') {
                element.children.push(self.parse_element()?);
            } else if self.peek().is_some() {
                let start = self.pos;
                while self.peek().is_some_and(|c| c != '<') {
                    self.pos += 1;
                }
                let raw: String = self.chars[start..self.pos].iter().collect();
                text.push_str(&decode_entities(&raw, self.pos)?);
            } else {
                return Err(self.error(&format!("unterminated element '{}'", element.tag)));
            }
        }

        // CLIXML never mixes text and child elements; surrounding
        // whitespace around children is formatting, not data.
        if element.children.is_empty() && !text.is_empty() {
            element.text = Some(text);
        }
        Ok(element)
    }

    fn read_quoted(&mut self) -> Result<String> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected a quoted attribute value")),
        };
        self.pos += 1;

        let start = self.pos;
        while self.peek().is_some_and(|c| c != quote) {
            self.pos += 1;
        }
        if self.peek() != Some(quote) {
            return Err(self.error("unterminated attribute value"));
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        self.pos += 1;
        decode_entities(&raw, self.pos)
    }
}

fn decode_entities(raw: &str, offset: usize) -> Result<String> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let semi = rest
            .find(';')
            .ok_or_else(|| PsrpError::MalformedXml(format!(
                "unterminated entity near offset {offset}"
            )))?;
        let entity = &rest[1..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse))
                    .transpose()
                    .ok()
                    .flatten()
                    .ok_or_else(|| {
                        PsrpError::MalformedXml(format!("unknown entity '&{entity};'"))
                    })?;
                let c = char::from_u32(code).ok_or_else(|| {
                    PsrpError::MalformedXml(format!("invalid character reference '&{entity};'"))
                })?;
                out.push(c);
            }
        }
        rest = &rest[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
