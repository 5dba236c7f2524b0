//! Prompt templates.
//!
//! Templates are written in a small handlebars subset and parsed once, when a
//! flow is registered, into an ordered list of [`Segment`]s that has already
//! been checked against the flow's input shape:
//!
//! - `{{name}}` / `{{{name}}}`: the text of a text field
//! - `{{media url=name}}`: attach an image field as media
//! - `{{#each name}} ... {{this}} ... {{/each}}`: repeat the body once per
//!   element of a list field, in list order

use lostfound_core::{FieldKind, Shape};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Field(String),
    Media(String),
    Each { field: String, body: Vec<BodySegment> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySegment {
    Text(String),
    Item,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unterminated tag at byte {0}")]
    Unterminated(usize),
    #[error("unsupported tag '{0}'")]
    UnknownTag(String),
    #[error("each block over '{0}' is never closed")]
    UnclosedEach(String),
    #[error("'/each' without a matching '#each'")]
    StrayClose,
    #[error("each blocks cannot be nested")]
    NestedEach,
    #[error("'this' is only valid inside an each block")]
    ThisOutsideEach,
    #[error("'{0}' cannot be used inside an each block")]
    FieldInEach(String),
    #[error("template references unknown field '{0}'")]
    UnknownField(String),
    #[error("{usage} needs {expected}, but field '{field}' is {actual}")]
    KindMismatch {
        field: String,
        usage: &'static str,
        expected: FieldKind,
        actual: FieldKind,
    },
}

/// A parsed template whose field references all exist in its input shape
/// with the kind their directive needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn new(source: &str, input: &Shape) -> Result<Self, TemplateError> {
        let segments = parse(source)?;
        for segment in &segments {
            match segment {
                Segment::Text(_) => {}
                Segment::Field(name) => check_kind(input, name, FieldKind::Text, "text substitution")?,
                Segment::Media(name) => {
                    check_kind(input, name, FieldKind::ImageDataUri, "media attachment")?
                }
                Segment::Each { field, .. } => {
                    check_kind(input, field, FieldKind::TextList, "each block")?
                }
            }
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

fn check_kind(
    input: &Shape,
    name: &str,
    expected: FieldKind,
    usage: &'static str,
) -> Result<(), TemplateError> {
    let spec = input
        .field(name)
        .ok_or_else(|| TemplateError::UnknownField(name.to_string()))?;
    if spec.kind != expected {
        return Err(TemplateError::KindMismatch {
            field: name.to_string(),
            usage,
            expected,
            actual: spec.kind,
        });
    }
    Ok(())
}

enum Tag<'a> {
    Var(&'a str),
    Media(&'a str),
    OpenEach(&'a str),
    CloseEach,
    This,
}

fn classify(inner: &str) -> Result<Tag<'_>, TemplateError> {
    let unknown = || TemplateError::UnknownTag(inner.to_string());

    if let Some(rest) = inner.strip_prefix("#each") {
        let name = rest.trim();
        return if is_identifier(name) {
            Ok(Tag::OpenEach(name))
        } else {
            Err(unknown())
        };
    }
    if inner == "/each" {
        return Ok(Tag::CloseEach);
    }
    if let Some(rest) = inner.strip_prefix("media") {
        let name = rest.trim().strip_prefix("url=").ok_or_else(unknown)?;
        return if is_identifier(name) {
            Ok(Tag::Media(name))
        } else {
            Err(unknown())
        };
    }
    if inner == "this" {
        return Ok(Tag::This);
    }
    if is_identifier(inner) {
        return Ok(Tag::Var(inner));
    }
    Err(unknown())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse template source into segments without checking field references.
pub fn parse(source: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut open: Option<(String, Vec<BodySegment>)> = None;
    let mut pos = 0;

    while let Some(offset) = source[pos..].find("{{") {
        let start = pos + offset;
        push_text(&mut segments, &mut open, &source[pos..start]);

        let (open_len, close) = if source[start..].starts_with("{{{") {
            (3, "}}}")
        } else {
            (2, "}}")
        };
        let inner_start = start + open_len;
        let inner_len = source[inner_start..]
            .find(close)
            .ok_or(TemplateError::Unterminated(start))?;
        let inner = source[inner_start..inner_start + inner_len].trim();
        pos = inner_start + inner_len + close.len();

        let in_each = open.is_some();
        match classify(inner)? {
            Tag::Var(name) if in_each => return Err(TemplateError::FieldInEach(name.to_string())),
            Tag::Var(name) => segments.push(Segment::Field(name.to_string())),
            Tag::Media(name) if in_each => {
                return Err(TemplateError::FieldInEach(format!("media url={name}")))
            }
            Tag::Media(name) => segments.push(Segment::Media(name.to_string())),
            Tag::OpenEach(_) if in_each => return Err(TemplateError::NestedEach),
            Tag::OpenEach(name) => open = Some((name.to_string(), Vec::new())),
            Tag::CloseEach => {
                let (field, body) = open.take().ok_or(TemplateError::StrayClose)?;
                segments.push(Segment::Each { field, body });
            }
            Tag::This => match open.as_mut() {
                Some((_, body)) => body.push(BodySegment::Item),
                None => return Err(TemplateError::ThisOutsideEach),
            },
        }
    }
    push_text(&mut segments, &mut open, &source[pos..]);

    if let Some((field, _)) = open {
        return Err(TemplateError::UnclosedEach(field));
    }
    Ok(segments)
}

fn push_text(
    segments: &mut Vec<Segment>,
    open: &mut Option<(String, Vec<BodySegment>)>,
    text: &str,
) {
    if text.is_empty() {
        return;
    }
    match open {
        Some((_, body)) => match body.last_mut() {
            Some(BodySegment::Text(prev)) => prev.push_str(text),
            _ => body.push(BodySegment::Text(text.to_string())),
        },
        None => match segments.last_mut() {
            Some(Segment::Text(prev)) => prev.push_str(text),
            _ => segments.push(Segment::Text(text.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matching_input() -> Shape {
        Shape::new()
            .required("photoDataUri", FieldKind::ImageDataUri, "")
            .required("lostItemDescriptions", FieldKind::TextList, "")
    }

    #[test]
    fn parses_all_directives() {
        let segments =
            parse("Items:\n{{#each items}}- {{{this}}}\n{{/each}}Desc: {{ description }} {{media url=photo}}")
                .unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Text("Items:\n".into()),
                Segment::Each {
                    field: "items".into(),
                    body: vec![
                        BodySegment::Text("- ".into()),
                        BodySegment::Item,
                        BodySegment::Text("\n".into()),
                    ],
                },
                Segment::Text("Desc: ".into()),
                Segment::Field("description".into()),
                Segment::Text(" ".into()),
                Segment::Media("photo".into()),
            ]
        );
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(parse("a {{name"), Err(TemplateError::Unterminated(2)));
        assert_eq!(parse("{{> partial}}"), Err(TemplateError::UnknownTag("> partial".into())));
        assert_eq!(parse("{{#each xs}}x"), Err(TemplateError::UnclosedEach("xs".into())));
        assert_eq!(parse("{{/each}}"), Err(TemplateError::StrayClose));
        assert_eq!(parse("{{this}}"), Err(TemplateError::ThisOutsideEach));
        assert_eq!(
            parse("{{#each a}}{{#each b}}{{/each}}{{/each}}"),
            Err(TemplateError::NestedEach)
        );
        assert_eq!(
            parse("{{#each a}}{{name}}{{/each}}"),
            Err(TemplateError::FieldInEach("name".into()))
        );
    }

    #[test]
    fn resolves_against_shape() {
        let template = Template::new(
            "{{#each lostItemDescriptions}}- {{this}}\n{{/each}}{{media url=photoDataUri}}",
            &matching_input(),
        )
        .unwrap();
        assert_eq!(template.segments().len(), 2);
    }

    #[test]
    fn rejects_unknown_field_at_registration() {
        assert_eq!(
            Template::new("{{media url=photo}}", &matching_input()),
            Err(TemplateError::UnknownField("photo".into()))
        );
    }

    #[test]
    fn rejects_wrong_directive_for_kind() {
        let err = Template::new("{{photoDataUri}}", &matching_input()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::KindMismatch {
                field: "photoDataUri".into(),
                usage: "text substitution",
                expected: FieldKind::Text,
                actual: FieldKind::ImageDataUri,
            }
        );
        assert!(matches!(
            Template::new("{{#each photoDataUri}}{{/each}}", &matching_input()),
            Err(TemplateError::KindMismatch { usage: "each block", .. })
        ));
    }
}
