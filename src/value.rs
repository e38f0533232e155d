//! Value trees: the shape of spec input (`SpecValue`) and the shape of a
//! parsed argument tree with placeholders resolved into `Ref` markers
//! (`ResolvedValue`).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A scalar the container can embed directly in an argument tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Primitive {
    Nil,
    Ellipsis,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex { re: f64, im: f64 },
    Bytes(Vec<u8>),
    String(String),
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Nil => write!(f, "None"),
            Primitive::Ellipsis => write!(f, "..."),
            Primitive::Bool(b) => write!(f, "{b}"),
            Primitive::Int(i) => write!(f, "{i}"),
            Primitive::Float(v) => write!(f, "{v}"),
            Primitive::Complex { re, im } => write!(f, "({re}+{im}j)"),
            Primitive::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Primitive::String(s) => write!(f, "{s}"),
        }
    }
}

/// A map key: spec mappings may be keyed by position (for positional
/// constructor arguments) or by name (for keyword arguments).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    Int(u64),
    Str(String),
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Int(i) => write!(f, "{i}"),
            MapKey::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Input-side value tree, as authored in a spec.
#[derive(Clone, Debug, PartialEq)]
pub enum SpecValue {
    Primitive(Primitive),
    /// A raw string, not yet classified as a whole-string reference,
    /// a template, or a plain literal. The spec parser turns this into
    /// the matching `ResolvedValue` variant.
    Str(String),
    Seq(Vec<SpecValue>),
    Tuple(Vec<SpecValue>),
    Map(IndexMap<MapKey, SpecValue>),
}

/// Post-parse value tree: every whole-string placeholder has become a
/// `Ref`, every string with embedded placeholders has become a
/// `Template`.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedValue {
    Primitive(Primitive),
    /// A literal string with no placeholders.
    Literal(String),
    /// `"{name}"` standalone — resolves to the named entry's instance.
    Ref(String),
    /// A string with one or more embedded `{name}` placeholders,
    /// interleaved with literal spans.
    Template(Vec<TemplatePart>),
    Seq(Vec<ResolvedValue>),
    Tuple(Vec<ResolvedValue>),
    Map(IndexMap<MapKey, ResolvedValue>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Placeholder(String),
}

impl ResolvedValue {
    /// Names referenced anywhere in this tree, for dependency-graph
    /// construction.
    pub fn referenced_names(&self, out: &mut Vec<String>) {
        match self {
            ResolvedValue::Ref(name) => out.push(name.clone()),
            ResolvedValue::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Placeholder(name) = part {
                        out.push(name.clone());
                    }
                }
            }
            ResolvedValue::Seq(items) | ResolvedValue::Tuple(items) => {
                for item in items {
                    item.referenced_names(out);
                }
            }
            ResolvedValue::Map(map) => {
                for value in map.values() {
                    value.referenced_names(out);
                }
            }
            ResolvedValue::Primitive(_) | ResolvedValue::Literal(_) => {}
        }
    }
}

/// Splits a mapping's entries into ascending positional arguments and
/// keyword arguments, the normalization described for constructor
/// invocation.
pub fn split_args(data: &ResolvedValue) -> (Vec<ResolvedValue>, IndexMap<String, ResolvedValue>) {
    match data {
        ResolvedValue::Map(map) => {
            let mut positional: Vec<(u64, ResolvedValue)> = Vec::new();
            let mut keyword = IndexMap::new();
            for (key, value) in map {
                match key {
                    MapKey::Int(i) => positional.push((*i, value.clone())),
                    MapKey::Str(s) => {
                        keyword.insert(s.clone(), value.clone());
                    }
                }
            }
            positional.sort_by_key(|(i, _)| *i);
            (positional.into_iter().map(|(_, v)| v).collect(), keyword)
        }
        ResolvedValue::Seq(items) | ResolvedValue::Tuple(items) => (items.clone(), IndexMap::new()),
        scalar => (vec![scalar.clone()], IndexMap::new()),
    }
}

/// The concrete, fully-resolved runtime form of a constant or template
/// value (as opposed to a wired entry's instance, which is an opaque
/// host-provided `Arc<dyn Any + Send + Sync>`). Constant entries always
/// store one of these behind their cache slot.
#[derive(Clone)]
pub enum RuntimeValue {
    Primitive(Primitive),
    Seq(Vec<Arc<dyn Any + Send + Sync>>),
    Map(IndexMap<MapKey, Arc<dyn Any + Send + Sync>>),
}

/// Best-effort string form of any cached value, for template
/// interpolation: primitives use their `Display` impl; anything else
/// (a wired entry's host instance) falls back to `describe`.
pub fn display_cached(
    value: &Arc<dyn Any + Send + Sync>,
    describe: impl FnOnce(&Arc<dyn Any + Send + Sync>) -> String,
) -> String {
    if let Some(runtime) = value.downcast_ref::<RuntimeValue>() {
        if let RuntimeValue::Primitive(p) = runtime {
            return p.to_string();
        }
    }
    describe(value)
}
