//! Parser for the MapCSS subset understood by [`super::Stylesheet`].

use super::StyleError;
use super::selector::{Condition, Selector, Subject};
use crate::quadkey::MAX_LEVEL_OF_DETAIL;

/// One `selectors { declarations }` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rule {
    pub(crate) selectors: Vec<Selector>,
    pub(crate) declarations: Vec<(String, String)>,
}

pub(crate) fn parse_rules(source: &str) -> Result<Vec<Rule>, StyleError> {
    let text = strip_comments(source)?;
    let mut rules = Vec::new();
    let mut rest = text.as_str();
    let mut line = 1;

    while !rest.trim().is_empty() {
        let header_line = line + leading_newlines(rest);
        let Some((header, after_open)) = rest.split_once('{') else {
            return Err(parse_error(header_line, "expected '{' after selector"));
        };
        if header.contains('}') {
            return Err(parse_error(header_line, "unexpected '}'"));
        }
        line += newlines(header);
        let Some((body, after_close)) = after_open.split_once('}') else {
            return Err(parse_error(line, "unclosed rule block"));
        };
        if body.contains('{') {
            return Err(parse_error(line, "nested blocks are not supported"));
        }

        rules.push(Rule {
            selectors: parse_selectors(header, header_line)?,
            declarations: parse_declarations(body, line)?,
        });
        line += newlines(body);
        rest = after_close;
    }

    Ok(rules)
}

fn strip_comments(source: &str) -> Result<String, StyleError> {
    let mut output = String::with_capacity(source.len());
    let mut rest = source;
    let mut line = 1;
    while let Some((before, after)) = rest.split_once("/*") {
        output.push_str(before);
        line += newlines(before);
        let Some((comment, tail)) = after.split_once("*/") else {
            return Err(parse_error(line, "unterminated comment"));
        };
        // Keep line numbers stable for later errors.
        output.extend(comment.chars().filter(|c| *c == '\n'));
        line += newlines(comment);
        rest = tail;
    }
    output.push_str(rest);
    Ok(output)
}

fn parse_selectors(header: &str, line: usize) -> Result<Vec<Selector>, StyleError> {
    header
        .split(',')
        .map(|text| parse_selector(text.trim(), line))
        .collect()
}

fn parse_selector(text: &str, line: usize) -> Result<Selector, StyleError> {
    if text.is_empty() {
        return Err(parse_error(line, "empty selector"));
    }
    let subject_end = text
        .find(|c: char| c == '|' || c == '[' || c.is_whitespace())
        .unwrap_or(text.len());
    let (word, mut rest) = text.split_at(subject_end);
    let subject = Subject::parse(word)
        .ok_or_else(|| parse_error(line, &format!("unknown selector subject '{word}'")))?;

    let mut zoom = None;
    if let Some(spec) = rest.strip_prefix("|z") {
        let end = spec.find('[').unwrap_or(spec.len());
        let (range, tail) = spec.split_at(end);
        zoom = Some(parse_zoom(range.trim(), line)?);
        rest = tail;
    }

    let mut conditions = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let Some(inner) = rest.strip_prefix('[') else {
            return Err(parse_error(line, &format!("unexpected selector text '{rest}'")));
        };
        let Some((condition, tail)) = inner.split_once(']') else {
            return Err(parse_error(line, "unclosed condition"));
        };
        conditions.push(parse_condition(condition, line)?);
        rest = tail;
    }

    Ok(Selector {
        subject,
        zoom,
        conditions,
    })
}

fn parse_zoom(spec: &str, line: usize) -> Result<(u8, u8), StyleError> {
    let level = |value: &str, fallback: u8| -> Result<u8, StyleError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(fallback);
        }
        value
            .parse::<u8>()
            .map_err(|_| parse_error(line, &format!("invalid zoom level '{value}'")))
    };

    let (minimum, maximum) = match spec.split_once('-') {
        Some((low, high)) => (level(low, 0)?, level(high, MAX_LEVEL_OF_DETAIL)?),
        None if spec.is_empty() => return Err(parse_error(line, "missing zoom level")),
        None => {
            let exact = level(spec, 0)?;
            (exact, exact)
        }
    };
    if minimum > maximum {
        return Err(parse_error(
            line,
            &format!("zoom range {minimum}-{maximum} is empty"),
        ));
    }
    Ok((minimum, maximum))
}

fn parse_condition(text: &str, line: usize) -> Result<Condition, StyleError> {
    let text = text.trim();
    let condition = if let Some(key) = text.strip_prefix('!') {
        Condition::Absent(unquote(key))
    } else if let Some((key, value)) = text.split_once("!=") {
        Condition::NotEquals(unquote(key), unquote(value))
    } else if let Some((key, value)) = text.split_once('=') {
        Condition::Equals(unquote(key), unquote(value))
    } else {
        Condition::Present(unquote(text))
    };

    let key = match &condition {
        Condition::Present(key)
        | Condition::Absent(key)
        | Condition::Equals(key, _)
        | Condition::NotEquals(key, _) => key,
    };
    if key.is_empty() {
        return Err(parse_error(line, "condition without a tag key"));
    }
    Ok(condition)
}

fn parse_declarations(body: &str, line: usize) -> Result<Vec<(String, String)>, StyleError> {
    let mut declarations = Vec::new();
    let mut current = line;
    for statement in body.split(';') {
        let statement_line = current + leading_newlines(statement);
        current += newlines(statement);
        if statement.trim().is_empty() {
            continue;
        }
        let Some((name, value)) = statement.split_once(':') else {
            return Err(parse_error(
                statement_line,
                &format!("declaration '{}' lacks ':'", statement.trim()),
            ));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(parse_error(statement_line, "declaration without a name"));
        }
        declarations.push((name.to_ascii_lowercase(), unquote(value)));
    }
    Ok(declarations)
}

fn unquote(text: &str) -> String {
    let trimmed = text.trim();
    ['"', '\'']
        .iter()
        .find_map(|quote| {
            trimmed
                .strip_prefix(*quote)
                .and_then(|inner| inner.strip_suffix(*quote))
        })
        .unwrap_or(trimmed)
        .to_owned()
}

fn newlines(text: &str) -> usize {
    text.matches('\n').count()
}

fn leading_newlines(text: &str) -> usize {
    text.chars()
        .take_while(|c| c.is_whitespace())
        .filter(|c| *c == '\n')
        .count()
}

fn parse_error(line: usize, message: &str) -> StyleError {
    StyleError::Parse {
        line,
        message: message.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn parses_selectors_zoom_and_conditions() {
        let rules = parse_rules("way|z14-16[highway][!tunnel], area[building=yes] { width: 4; }")
            .expect("parse");
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.selectors.len(), 2);
        assert_eq!(rule.selectors[0].subject, Subject::Way);
        assert_eq!(rule.selectors[0].zoom, Some((14, 16)));
        assert_eq!(
            rule.selectors[0].conditions,
            vec![
                Condition::Present("highway".into()),
                Condition::Absent("tunnel".into())
            ]
        );
        assert_eq!(
            rule.selectors[1].conditions,
            vec![Condition::Equals("building".into(), "yes".into())]
        );
        assert_eq!(rule.declarations, vec![("width".into(), "4".into())]);
    }

    #[rstest]
    #[case("node|z15 {}", (15, 15))]
    #[case("node|z12- {}", (12, MAX_LEVEL_OF_DETAIL))]
    #[case("node|z-9 {}", (0, 9))]
    fn zoom_forms_are_understood(#[case] source: &str, #[case] expected: (u8, u8)) {
        let rules = parse_rules(source).expect("parse");
        assert_eq!(rules[0].selectors[0].zoom, Some(expected));
    }

    #[rstest]
    fn comments_are_ignored() {
        let rules = parse_rules("/* roads */\nway[highway] { /* wide */ width: 6 }").expect("parse");
        assert_eq!(rules[0].declarations, vec![("width".into(), "6".into())]);
    }

    #[rstest]
    fn quoted_values_are_unwrapped() {
        let rules = parse_rules("node[name=\"Old Mill\"] { text: 'label'; }").expect("parse");
        assert_eq!(
            rules[0].selectors[0].conditions,
            vec![Condition::Equals("name".into(), "Old Mill".into())]
        );
        assert_eq!(rules[0].declarations, vec![("text".into(), "label".into())]);
    }

    #[rstest]
    #[case("way { width 4; }", 1)]
    #[case("node {}\n\nrelation { }", 3)]
    #[case("node {}\nway[highway { }", 2)]
    #[case("way { width: 4;", 1)]
    #[case("node|z16-14 {}", 1)]
    #[case("/* open", 1)]
    #[case("node {}\nstray", 2)]
    fn reports_the_offending_line(#[case] source: &str, #[case] expected_line: usize) {
        let err = parse_rules(source).expect_err("invalid stylesheet");
        let StyleError::Parse { line, .. } = &err else {
            panic!("expected parse error, got {err:?}");
        };
        assert_eq!(*line, expected_line);
    }
}
