//! Spec parsing: classifying each entry key as wired or constant, and
//! tokenizing placeholder strings into [`ResolvedValue`] trees.

use std::mem::discriminant;

use colored::Colorize;
use indexmap::IndexMap;

use crate::{
    sigil::PlaceholderSigil,
    value::{MapKey, Primitive, ResolvedValue, SpecValue, TemplatePart},
};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    MissingModule,
    MalformedFactory,
    IllegalSymbol,
    EmptyReference,
    UnmatchedBrace,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

/// A spec key classified as a constructor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiredKey {
    pub module: String,
    pub type_name: String,
    pub factory: Option<String>,
    pub name: String,
}

/// Either a wired invocation or a plain constant, as determined purely
/// from the key's grammar (`SPEC_FULL.md` §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyKind {
    Wired(WiredKey),
    Constant(String),
}

/// Classify a spec key: `"module.path.Type name[.factory]"` is wired,
/// anything else (no top-level space, or a type-path with no dot) is a
/// constant name.
pub fn classify_key(key: &str) -> Result<KeyKind, Error> {
    let Some((type_path, name_part)) = key.rsplit_once(' ') else {
        return Ok(KeyKind::Constant(key.to_string()));
    };

    if !type_path.contains('.') {
        return Err(Error {
            kind: ErrorKind::MissingModule,
            message: format!("type path `{type_path}` in key `{key}` has no module component"),
        });
    }

    let (module, type_name) = type_path.rsplit_once('.').unwrap();

    let mut name_pieces = name_part.splitn(3, '.');
    let name = name_pieces.next().unwrap_or_default().to_string();
    let factory = name_pieces.next().map(|s| s.to_string());
    if name_pieces.next().is_some() {
        return Err(Error {
            kind: ErrorKind::MalformedFactory,
            message: format!("name part `{name_part}` in key `{key}` has more than one factory dot"),
        });
    }

    Ok(KeyKind::Wired(WiredKey {
        module: module.to_string(),
        type_name: type_name.to_string(),
        factory,
        name,
    }))
}

#[derive(Debug, Clone)]
enum TokenizerState {
    Copying(String),
    CopyingKey(String),
    SigilFound,
}

/// Tokenize a raw spec string into placeholder parts. A string that is
/// a single whole-string placeholder resolves to `Ref`; a string with
/// no placeholders resolves to `Literal`; anything else resolves to
/// `Template`.
fn tokenize_placeholder_string(s: &str) -> Result<Vec<TemplatePart>, Error> {
    let mut parts: Vec<TemplatePart> = vec![];
    let mut state = TokenizerState::Copying(String::new());
    let mut prev_state = state.clone();

    for ch in s.chars() {
        if discriminant(&prev_state) != discriminant(&state) {
            log::trace!(
                "{}: {}",
                "[tokenize_placeholder_string]".bold(),
                format!("state {:?}", prev_state).dimmed()
            );
        }
        prev_state = state.clone();

        match state {
            TokenizerState::Copying(ref mut buffer) => match PlaceholderSigil::from(ch) {
                PlaceholderSigil::RefOpen => {
                    if !buffer.is_empty() {
                        parts.push(TemplatePart::Literal(buffer.clone()));
                    }
                    state = TokenizerState::SigilFound;
                }
                PlaceholderSigil::RefClose => {
                    return Err(Error {
                        kind: ErrorKind::UnmatchedBrace,
                        message: format!("unmatched `}}` in `{s}`"),
                    });
                }
                PlaceholderSigil::Non(_) => buffer.push(ch),
            },
            TokenizerState::SigilFound => match PlaceholderSigil::from(ch) {
                PlaceholderSigil::RefOpen => {
                    return Err(Error {
                        kind: ErrorKind::IllegalSymbol,
                        message: format!("duplicate `{{` in `{s}`"),
                    });
                }
                PlaceholderSigil::RefClose => {
                    return Err(Error {
                        kind: ErrorKind::EmptyReference,
                        message: format!("empty placeholder `{{}}` in `{s}`"),
                    });
                }
                PlaceholderSigil::Non(_) => {
                    state = TokenizerState::CopyingKey(String::from(ch));
                }
            },
            TokenizerState::CopyingKey(ref mut buffer_key) => match PlaceholderSigil::from(ch) {
                PlaceholderSigil::RefClose => {
                    parts.push(TemplatePart::Placeholder(buffer_key.clone()));
                    state = TokenizerState::Copying(String::new());
                }
                PlaceholderSigil::RefOpen => {
                    return Err(Error {
                        kind: ErrorKind::IllegalSymbol,
                        message: format!("nested `{{` inside placeholder in `{s}`"),
                    });
                }
                PlaceholderSigil::Non(ch) => buffer_key.push(ch),
            },
        }
    }

    match state {
        TokenizerState::Copying(buffer) => {
            if !buffer.is_empty() {
                parts.push(TemplatePart::Literal(buffer));
            }
        }
        TokenizerState::SigilFound | TokenizerState::CopyingKey(_) => {
            return Err(Error {
                kind: ErrorKind::UnmatchedBrace,
                message: format!("unterminated `{{` in `{s}`"),
            });
        }
    }

    Ok(parts)
}

/// Classify a tokenized string: whole-string reference, plain literal,
/// or a template with embedded placeholders.
fn classify_parts(parts: Vec<TemplatePart>) -> ResolvedValue {
    if parts.is_empty() {
        return ResolvedValue::Literal(String::new());
    }
    if parts.len() == 1 {
        match parts.into_iter().next().unwrap() {
            TemplatePart::Placeholder(name) => return ResolvedValue::Ref(name),
            TemplatePart::Literal(s) => return ResolvedValue::Literal(s),
        }
    }
    ResolvedValue::Template(parts)
}

/// Resolve a string value into a `Ref`, `Literal`, or `Template`.
pub fn resolve_string(s: &str) -> Result<ResolvedValue, Error> {
    let parts = tokenize_placeholder_string(s)?;
    Ok(classify_parts(parts))
}

/// Recursively resolve a [`SpecValue`] tree into a [`ResolvedValue`]
/// tree, tokenizing every string leaf along the way.
pub fn resolve_value(value: &SpecValue) -> Result<ResolvedValue, Error> {
    Ok(match value {
        SpecValue::Primitive(p) => ResolvedValue::Primitive(p.clone()),
        SpecValue::Str(s) => resolve_string(s)?,
        SpecValue::Seq(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_value(item)?);
            }
            ResolvedValue::Seq(out)
        }
        SpecValue::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_value(item)?);
            }
            ResolvedValue::Tuple(out)
        }
        SpecValue::Map(map) => {
            let mut out = IndexMap::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), resolve_value(value)?);
            }
            ResolvedValue::Map(out)
        }
    })
}

/// Load a whole spec from a TOML document: the root must be a table,
/// whose entries become the raw `name -> SpecValue` map fed to
/// [`crate::graph::Graph::build`]. TOML has no integer-keyed tables, so
/// a spec authored this way only ever produces keyword arguments; mixed
/// positional/keyword invocation still works for specs built
/// programmatically or from a format that carries integer keys.
pub fn spec_from_toml(text: &str) -> Result<IndexMap<String, SpecValue>, Error> {
    let doc: toml::Value = toml::from_str(text).map_err(|e| Error {
        kind: ErrorKind::IllegalSymbol,
        message: format!("invalid toml: {e}"),
    })?;
    let toml::Value::Table(table) = doc else {
        return Err(Error {
            kind: ErrorKind::IllegalSymbol,
            message: "spec root must be a table".to_string(),
        });
    };
    let mut out = IndexMap::with_capacity(table.len());
    for (key, value) in table {
        out.insert(key, spec_value_from_toml(value));
    }
    Ok(out)
}

fn spec_value_from_toml(value: toml::Value) -> SpecValue {
    match value {
        toml::Value::String(s) => SpecValue::Str(s),
        toml::Value::Integer(i) => SpecValue::Primitive(Primitive::Int(i)),
        toml::Value::Float(f) => SpecValue::Primitive(Primitive::Float(f)),
        toml::Value::Boolean(b) => SpecValue::Primitive(Primitive::Bool(b)),
        toml::Value::Datetime(dt) => SpecValue::Str(dt.to_string()),
        toml::Value::Array(items) => {
            SpecValue::Seq(items.into_iter().map(spec_value_from_toml).collect())
        }
        toml::Value::Table(map) => SpecValue::Map(
            map.into_iter()
                .map(|(k, v)| (MapKey::Str(k), spec_value_from_toml(v)))
                .collect(),
        ),
    }
}

/// Convenience constructor for tests and demos: build a `SpecValue::Map`
/// from `(key, value)` pairs in declaration order.
pub fn map_of(pairs: Vec<(MapKey, SpecValue)>) -> SpecValue {
    SpecValue::Map(pairs.into_iter().collect())
}

pub fn str_val(s: impl Into<String>) -> SpecValue {
    SpecValue::Str(s.into())
}

pub fn int_val(i: i64) -> SpecValue {
    SpecValue::Primitive(Primitive::Int(i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_constant_key() {
        assert_eq!(
            classify_key("host").unwrap(),
            KeyKind::Constant("host".to_string())
        );
    }

    #[test]
    fn classify_wired_key() {
        let KeyKind::Wired(w) = classify_key("m.Date d").unwrap() else {
            panic!("expected wired key")
        };
        assert_eq!(w.module, "m");
        assert_eq!(w.type_name, "Date");
        assert_eq!(w.name, "d");
        assert_eq!(w.factory, None);
    }

    #[test]
    fn classify_wired_key_with_factory() {
        let KeyKind::Wired(w) = classify_key("pkg.mod.Widget w.build").unwrap() else {
            panic!("expected wired key")
        };
        assert_eq!(w.module, "pkg.mod");
        assert_eq!(w.type_name, "Widget");
        assert_eq!(w.name, "w");
        assert_eq!(w.factory.as_deref(), Some("build"));
    }

    #[test]
    fn classify_missing_module_errors() {
        let err = classify_key("Widget w").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingModule);
    }

    #[test]
    fn classify_malformed_factory_errors() {
        let err = classify_key("m.Widget w.a.b").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedFactory);
    }

    #[test]
    fn resolve_whole_string_ref() {
        assert_eq!(resolve_string("{inner}").unwrap(), ResolvedValue::Ref("inner".into()));
    }

    #[test]
    fn resolve_plain_literal() {
        assert_eq!(
            resolve_string("example.com").unwrap(),
            ResolvedValue::Literal("example.com".into())
        );
    }

    #[test]
    fn resolve_template() {
        let resolved = resolve_string("http://{host}:{port}").unwrap();
        assert_eq!(
            resolved,
            ResolvedValue::Template(vec![
                TemplatePart::Literal("http://".into()),
                TemplatePart::Placeholder("host".into()),
                TemplatePart::Literal(":".into()),
                TemplatePart::Placeholder("port".into()),
            ])
        );
    }

    #[test]
    fn resolve_empty_reference_errors() {
        let err = resolve_string("foo{}bar").unwrap_err();
        assert_eq!(err.kind, ErrorKind::EmptyReference);
    }

    #[test]
    fn resolve_unmatched_open_brace_errors() {
        let err = resolve_string("foo{bar").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnmatchedBrace);
    }

    #[test]
    fn resolve_unmatched_close_brace_errors() {
        let err = resolve_string("foo}bar").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnmatchedBrace);
    }
}
