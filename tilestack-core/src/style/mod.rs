//! MapCSS-style rules controlling what is stored and how it is built.
//!
//! A stylesheet is a list of rules `selector[, selector] { name: value; }`.
//! Selectors name a subject (`node`, `way`, `area`, `canvas` or `*`), an
//! optional zoom filter (`|z15`, `|z14-16`) and tag conditions (`[key]`,
//! `[!key]`, `[key=value]`, `[key!=value]`). When several rules match, later
//! declarations override earlier ones.

mod parser;
mod selector;

use std::collections::BTreeMap;
use std::io;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use thiserror::Error;

use crate::Element;
use parser::{Rule, parse_rules};

/// Errors raised while loading a stylesheet.
#[derive(Debug, Error)]
pub enum StyleError {
    /// The stylesheet file could not be read.
    #[error("failed to read stylesheet {path}: {source}")]
    Io {
        /// Location of the stylesheet.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The stylesheet text is malformed.
    #[error("stylesheet line {line}: {message}")]
    Parse {
        /// One-based line of the offending text.
        line: usize,
        /// Human-readable description.
        message: String,
    },
}

/// Parsed stylesheet.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use tilestack_core::{Element, Stylesheet, Tags};
///
/// let sheet: Stylesheet = "area|z14-[building] { builder: building; height: 12 }"
///     .parse()
///     .expect("valid stylesheet");
/// let tags = Tags::from([("building".to_owned(), "yes".to_owned())]);
/// let ring = vec![
///     Coord { x: 0.0, y: 0.0 },
///     Coord { x: 0.001, y: 0.0 },
///     Coord { x: 0.001, y: 0.001 },
///     Coord { x: 0.0, y: 0.0 },
/// ];
/// let element = Element::from_coordinates(1, ring, tags).expect("valid element");
///
/// let style = sheet.style_for(&element, 15).expect("rule matches");
/// assert_eq!(style.number("height"), Some(12.0));
/// assert!(sheet.style_for(&element, 13).is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    rules: Vec<Rule>,
}

impl Stylesheet {
    /// Read and parse a stylesheet from disk.
    pub fn from_path(path: &Utf8Path) -> Result<Self, StyleError> {
        let text = tilestack_fs::read_to_string(path).map_err(|source| StyleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    /// Number of rules in the stylesheet.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Combined declarations of every rule matching `element` at `lod`.
    ///
    /// Returns `None` when no rule matches, meaning the element is not
    /// represented at that level.
    pub fn style_for(&self, element: &Element, lod: u8) -> Option<Style> {
        let kind = element.geometry.kind();
        self.merge(|rule| {
            rule.selectors
                .iter()
                .any(|selector| selector.matches_element(kind, &element.tags, lod))
        })
    }

    /// Combined `canvas` declarations at `lod`; empty when none apply.
    pub fn canvas(&self, lod: u8) -> Style {
        self.merge(|rule| rule.selectors.iter().any(|selector| selector.matches_canvas(lod)))
            .unwrap_or_default()
    }

    fn merge(&self, mut applies: impl FnMut(&Rule) -> bool) -> Option<Style> {
        let mut style: Option<Style> = None;
        for rule in self.rules.iter().filter(|rule| applies(rule)) {
            let target = style.get_or_insert_with(Style::default);
            for (name, value) in &rule.declarations {
                target.declarations.insert(name.clone(), value.clone());
            }
        }
        style
    }
}

impl FromStr for Stylesheet {
    type Err = StyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            rules: parse_rules(s)?,
        })
    }
}

/// Resolved declarations for one element or canvas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Style {
    declarations: BTreeMap<String, String>,
}

impl Style {
    /// Raw declaration value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.declarations.get(name).map(String::as_str)
    }

    /// Declaration parsed as a number. A trailing `m` unit is accepted.
    pub fn number(&self, name: &str) -> Option<f64> {
        let value = self.get(name)?;
        value.strip_suffix('m').unwrap_or(value).trim().parse().ok()
    }

    /// Declaration parsed as an `#rrggbb` or `#rgb` colour, packed as
    /// `0xRRGGBB`.
    pub fn colour(&self, name: &str) -> Option<u32> {
        parse_colour(self.get(name)?)
    }

    /// Whether no declarations apply.
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

fn parse_colour(value: &str) -> Option<u32> {
    let hex = value.strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        6 => u32::from_str_radix(hex, 16).ok(),
        3 => {
            let doubled: String = hex.chars().flat_map(|c| [c, c]).collect();
            u32::from_str_radix(&doubled, 16).ok()
        }
        _ => None,
    }
}
