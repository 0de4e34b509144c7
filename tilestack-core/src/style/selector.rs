//! Rule selectors and their matching logic.

use crate::{GeometryKind, Tags};

/// What a selector applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Subject {
    Node,
    Way,
    Area,
    Canvas,
    Any,
}

impl Subject {
    pub(crate) fn parse(word: &str) -> Option<Self> {
        match word {
            "node" => Some(Self::Node),
            "way" => Some(Self::Way),
            "area" => Some(Self::Area),
            "canvas" => Some(Self::Canvas),
            "*" => Some(Self::Any),
            _ => None,
        }
    }

    const fn accepts(self, kind: GeometryKind) -> bool {
        match self {
            Self::Node => matches!(kind, GeometryKind::Point),
            Self::Way => matches!(kind, GeometryKind::Line | GeometryKind::Area),
            Self::Area => matches!(kind, GeometryKind::Area),
            Self::Canvas => false,
            Self::Any => true,
        }
    }
}

/// Tag test inside square brackets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Condition {
    Present(String),
    Absent(String),
    Equals(String, String),
    NotEquals(String, String),
}

impl Condition {
    fn holds(&self, tags: &Tags) -> bool {
        match self {
            Self::Present(key) => tags.contains_key(key),
            Self::Absent(key) => !tags.contains_key(key),
            Self::Equals(key, value) => tags.get(key) == Some(value),
            Self::NotEquals(key, value) => tags.get(key) != Some(value),
        }
    }
}

/// One comma-separated selector of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Selector {
    pub(crate) subject: Subject,
    pub(crate) zoom: Option<(u8, u8)>,
    pub(crate) conditions: Vec<Condition>,
}

impl Selector {
    fn zoom_accepts(&self, lod: u8) -> bool {
        self.zoom
            .is_none_or(|(minimum, maximum)| (minimum..=maximum).contains(&lod))
    }

    pub(crate) fn matches_element(&self, kind: GeometryKind, tags: &Tags, lod: u8) -> bool {
        self.subject.accepts(kind)
            && self.zoom_accepts(lod)
            && self.conditions.iter().all(|condition| condition.holds(tags))
    }

    pub(crate) fn matches_canvas(&self, lod: u8) -> bool {
        self.subject == Subject::Canvas && self.zoom_accepts(lod)
    }
}
