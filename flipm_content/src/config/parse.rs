use flipm_shared::thiserror;

use super::{ConfigNode, Property};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Opening brace at offset {0} is never closed")]
    UnclosedBrace(usize),
    #[error("Closing brace at offset {0} has no opening brace")]
    UnexpectedClosingBrace(usize),
}

/// Position of a balanced `{ ... }` pair relative to the text it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    open: usize,
    close: usize,
}

/// Parses the text of a config file into a tree whose root has an empty header.
///
/// # Example
///
/// ```rust
/// use flipm_content::config;
/// let root = config::parse("scene\n{\n  path = res/box.gpb\n}").unwrap();
/// assert_eq!(root.children[0].header, "scene");
/// assert_eq!(root.children[0].property("path"), Some("res/box.gpb"));
/// ```
pub fn parse(text: &str) -> Result<ConfigNode, ParseError> {
    let normalized = normalize(text);
    parse_block(&normalized, 0)
}

/// Trims the text, drops carriage returns and moves braces that are on their own line
/// to the end of the line in front of them so that every block header is the last
/// line before its brace.
///
/// A brace after a blank line is not moved. It opens a block without header, which is
/// how such a block is serialized after properties.
fn normalize(text: &str) -> String {
    let text = text.trim().replace('\r', "");
    let mut normalized = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(index) = rest.find('\n') {
        normalized.push_str(&rest[..index]);
        let next_line = &rest[index + 1..];
        let after_indent = next_line.trim_start_matches([' ', '\t']);
        if let Some(after_brace) = after_indent.strip_prefix('{') {
            normalized.push_str(" {");
            rest = after_brace;
        } else {
            normalized.push('\n');
            rest = &rest[index + 1..];
        }
    }
    normalized.push_str(rest);
    normalized
}

/// Parses the content of one block. `offset` is the position of `text` in the
/// normalized input and only used for error messages.
fn parse_block(text: &str, offset: usize) -> Result<ConfigNode, ParseError> {
    let mut node = ConfigNode::default();
    let mut rest = text;
    let mut rest_offset = offset;
    while !rest.is_empty() {
        let Some(span) = find_balanced(rest, rest_offset)? else {
            node.properties.extend(parse_properties(rest, rest_offset)?);
            break;
        };

        let pre = &rest[..span.open];
        let body = &rest[span.open + 1..span.close];
        let post = &rest[span.close + 1..];
        if let Some(index) = pre.find('}') {
            return Err(ParseError::UnexpectedClosingBrace(rest_offset + index));
        }

        let (property_lines, header) = pre.rsplit_once('\n').unwrap_or(("", pre));
        node.properties.extend(parse_properties(property_lines, rest_offset)?);

        let mut child = parse_block(body, rest_offset + span.open + 1)?;
        child.header = header.trim().to_owned();
        node.children.push(child);

        let post_offset = rest_offset + span.close + 1;
        if post.contains('{') {
            rest = post;
            rest_offset = post_offset;
        } else {
            node.properties.extend(parse_properties(post, post_offset)?);
            rest = "";
        }
    }
    Ok(node)
}

/// Finds the first opening brace and its matching closing brace.
fn find_balanced(text: &str, offset: usize) -> Result<Option<Span>, ParseError> {
    let Some(open) = text.find('{') else {
        return Ok(None);
    };
    let mut depth = 0usize;
    for (index, byte) in text.bytes().enumerate().skip(open) {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(Span { open, close: index }));
                }
            }
            _ => {}
        }
    }
    Err(ParseError::UnclosedBrace(offset + open))
}

/// Parses `key = value` lines. Only the first `=` separates key and value.
fn parse_properties(text: &str, offset: usize) -> Result<Vec<Property>, ParseError> {
    if let Some(index) = text.find('}') {
        return Err(ParseError::UnexpectedClosingBrace(offset + index));
    }
    let properties = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once('=') {
            Some((key, value)) => Property::new(key.trim(), value.trim()),
            None => Property::new(line, ""),
        })
        .collect();
    Ok(properties)
}

#[cfg(test)]
mod tests {
    use flipm_shared::indoc::indoc;

    use super::*;

    #[test]
    fn properties_only() {
        let root = parse("a = 1\n\n  b=2  \nflag\nc = x = y").unwrap();
        assert_eq!(root.header, "");
        assert!(root.children.is_empty());
        assert_eq!(
            root.properties,
            vec![
                Property::new("a", "1"),
                Property::new("b", "2"),
                Property::new("flag", ""),
                Property::new("c", "x = y"),
            ]
        );
    }

    #[test]
    fn brace_on_next_line() {
        assert_eq!(normalize("a\n{\nb\n}\r\n"), "a {\nb\n}");
        assert_eq!(normalize("  a\n   {\n}  "), "a {\n}");
        assert_eq!(normalize("a\n\t{\n}"), "a {\n}");
    }

    #[test]
    fn brace_after_blank_line_opens_block_without_header() {
        assert_eq!(normalize("k = v\n\n {\n}"), "k = v\n {\n}");

        let root = parse("k = v\n\n{\n  inner = 1\n}").unwrap();
        assert_eq!(root.properties, vec![Property::new("k", "v")]);
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].header, "");
        assert_eq!(root.children[0].property("inner"), Some("1"));
    }

    #[test]
    fn nested_blocks() {
        let root = parse(indoc! {"
            material m : base
            {
                technique
                {
                    pass 0
                    {
                        defines = A
                    }
                }
            }
        "})
        .unwrap();
        let material = &root.children[0];
        assert_eq!(material.header, "material m : base");
        let technique = &material.children[0];
        assert_eq!(technique.header, "technique");
        let pass = &technique.children[0];
        assert_eq!(pass.header, "pass 0");
        assert_eq!(pass.property("defines"), Some("A"));
    }

    #[test]
    fn properties_around_blocks_keep_order() {
        let root = parse(indoc! {"
            first = 1
            second = 2
            block {
                inner = 3
            }
            third = 4
        "})
        .unwrap();
        assert_eq!(
            root.properties,
            vec![Property::new("first", "1"), Property::new("second", "2"), Property::new("third", "4")]
        );
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].properties, vec![Property::new("inner", "3")]);
    }

    #[test]
    fn properties_between_blocks() {
        let root = parse("a {\n}\nbetween = 1\nb {\n}\nafter = 2").unwrap();
        let headers = root.children.iter().map(|child| child.header.as_str()).collect::<Vec<_>>();
        assert_eq!(headers, vec!["a", "b"]);
        assert_eq!(root.properties, vec![Property::new("between", "1"), Property::new("after", "2")]);
    }

    #[test]
    fn block_without_header() {
        let root = parse("{\nkey = value\n}").unwrap();
        assert_eq!(root.children[0].header, "");
        assert_eq!(root.children[0].property("key"), Some("value"));
    }

    #[test]
    fn balanced_span_skips_inner_braces() {
        assert_eq!(find_balanced("x { a { } b } { }", 0), Ok(Some(Span { open: 2, close: 12 })));
        assert_eq!(find_balanced("no braces", 0), Ok(None));
    }

    #[test]
    fn unclosed_brace() {
        assert_eq!(parse("a {\nb {\n}"), Err(ParseError::UnclosedBrace(2)));
    }

    #[test]
    fn stray_closing_brace() {
        assert_eq!(parse("a = 1\n}"), Err(ParseError::UnexpectedClosingBrace(6)));
        assert!(matches!(parse("a {\n}\n}\nb {\n}"), Err(ParseError::UnexpectedClosingBrace(_))));
    }

    #[test]
    fn empty_input() {
        assert_eq!(parse("").unwrap(), ConfigNode::default());
        assert_eq!(parse(" \n\r\n ").unwrap(), ConfigNode::default());
    }
}
