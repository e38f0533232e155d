//! # wireframe
//!
//! A declarative object-graph container: you hand it a spec (a flat
//! string-keyed map — usually loaded from TOML) describing constructor
//! calls and constant values, and it wires up, resolves, and memoizes
//! the whole graph for you.
//!
//! Keys come in two shapes. `"module.Type name"` (optionally
//! `"module.Type.factory name"`) declares a constructed entry: `module`
//! and `Type` name a [`Constructor`] registered against a
//! [`TypeResolver`], and the value is its constructor arguments. Any
//! other key is a constant — a plain value, or a string containing
//! `{other_entry}` placeholders that get resolved (and, if they ever
//! touch a constructed entry, promoted to build lazily rather than
//! eagerly).
//!
//! ```text
//! [m.Greeting hello]
//! name = "world"
//!
//! greeting_label = "say hello to {name}"
//! ```
//!
//! Feed that map plus a [`TypeResolver`] that knows how to build
//! `m.Greeting` into [`Container::new`], then pull entries out through
//! [`Container::get`] or a named [`Accessor`]. Constants resolve once,
//! up front, in dependency order; constructed entries build lazily on
//! first access and are cached from then on. A sibling [`AsyncAccessors`]
//! namespace offloads the (synchronous, potentially blocking) build onto
//! a worker thread for callers on a cooperative scheduler.
//!
//! The [`compiler`] module can turn an already-analyzed [`graph::Graph`]
//! into Rust source with one named method per entry, for callers who'd
//! rather not look things up by string at all.

pub mod accessor;
pub mod compiler;
pub mod concurrency;
pub mod container;
pub mod error;
pub mod graph;
pub mod registry;
mod sigil;
pub mod skeleton;
pub mod spec;
pub mod value;

pub use accessor::{Accessor, AsyncAccessors};
pub use container::{Container, ContainerOptions};
pub use error::WiringError;
pub use registry::{Constructor, StaticRegistry, TypeResolver};
pub use value::{MapKey, Primitive, ResolvedValue, SpecValue};
