//! The instantiation engine: `Container::new` eagerly resolves
//! constants in topological order, and `Container::get`/the accessor
//! surface lazily builds wired entries on first access, memoizing the
//! result. See `SPEC_FULL.md` §4.4.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexmap::IndexMap;

use crate::concurrency::{self, LockTable};
use crate::error::WiringError;
use crate::graph::{Entry, Graph};
use crate::registry::TypeResolver;
use crate::skeleton::{self, Skeleton};
use crate::value::{display_cached, MapKey, Primitive, ResolvedValue, RuntimeValue, SpecValue, TemplatePart};

/// Construction-time knobs, mirroring the teacher's builder-style
/// config structs.
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    pub thread_safe: bool,
    pub max_lock_attempts: usize,
    pub lock_retry_sleep: Duration,
    pub allow_partial: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        ContainerOptions {
            thread_safe: false,
            max_lock_attempts: 10,
            lock_retry_sleep: Duration::from_millis(10),
            allow_partial: false,
        }
    }
}

enum Cached {
    Value(Arc<dyn Any + Send + Sync>),
    Partial(Arc<Skeleton>),
}

pub struct Container {
    graph: Graph,
    resolver: Arc<dyn TypeResolver>,
    options: ContainerOptions,
    values: Mutex<HashMap<String, Cached>>,
    locks: LockTable,
}

impl Container {
    pub fn new(
        raw: &IndexMap<String, SpecValue>,
        resolver: Arc<dyn TypeResolver>,
        options: ContainerOptions,
    ) -> Result<Container, WiringError> {
        log::debug!("building container from {} spec entries", raw.len());
        let graph = Graph::build(raw, options.allow_partial)?;

        let mut values: HashMap<String, Cached> = HashMap::new();
        for name in &graph.constant_order {
            let Some(Entry::Constant(resolved)) = graph.entries.get(name) else {
                continue;
            };
            log::trace!("eagerly resolving constant `{name}`");
            let value = resolve_eager(name, resolved, &values)?;
            values.insert(name.clone(), Cached::Value(value));
        }

        let locks = LockTable::new(options.max_lock_attempts, options.lock_retry_sleep);

        Ok(Container {
            graph,
            resolver,
            options,
            values: Mutex::new(values),
            locks,
        })
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    /// Public accessor entry point: unknown names fail with
    /// `UnknownAttribute`, not `UnknownPlaceholder` (that variant is
    /// reserved for placeholders encountered mid-resolution).
    pub fn get(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
        if !self.graph.entries.contains_key(name) {
            return Err(WiringError::UnknownAttribute {
                name: name.to_string(),
            });
        }
        self.build(name)
    }

    /// A named, reusable synchronous accessor handle, the `container.
    /// <name>()` surface described in `SPEC_FULL.md` §4.7.
    pub fn accessor(&self, name: &str) -> Result<crate::accessor::Accessor<'_>, WiringError> {
        if !self.graph.entries.contains_key(name) {
            return Err(WiringError::UnknownAttribute {
                name: name.to_string(),
            });
        }
        Ok(crate::accessor::Accessor::new(self, name))
    }

    /// The async-accessor namespace, `container.r#async.<name>()`. The
    /// container must already be behind an `Arc` since the offloaded
    /// worker closure needs to own its share of it across the await.
    pub fn into_async_accessors(self: Arc<Self>) -> crate::accessor::AsyncAccessors {
        crate::accessor::AsyncAccessors::new(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.graph.entries.contains_key(name)
    }

    fn peek_finalized(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        match self.values.lock().unwrap().get(name) {
            Some(Cached::Value(v)) => Some(v.clone()),
            _ => None,
        }
    }

    fn peek_skeleton(&self, name: &str) -> Option<Arc<Skeleton>> {
        match self.values.lock().unwrap().get(name) {
            Some(Cached::Partial(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn publish_value(&self, name: &str, value: Arc<dyn Any + Send + Sync>) {
        self.values
            .lock()
            .unwrap()
            .insert(name.to_string(), Cached::Value(value));
    }

    fn publish_skeleton(&self, name: &str, skeleton: Arc<Skeleton>) {
        self.values
            .lock()
            .unwrap()
            .insert(name.to_string(), Cached::Partial(skeleton));
    }

    fn remove_entry(&self, name: &str) {
        self.values.lock().unwrap().remove(name);
    }

    /// Resolves a `Ref` encountered while building `referrer`: fails
    /// fast with `UnknownPlaceholder` if the name was never declared,
    /// otherwise recursively builds it.
    fn resolve_ref(
        &self,
        referrer: &str,
        name: &str,
    ) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
        if !self.graph.entries.contains_key(name) {
            return Err(WiringError::UnknownPlaceholder {
                name: referrer.to_string(),
                placeholder: name.to_string(),
            });
        }
        self.build(name)
    }

    fn build(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
        loop {
            if let Some(v) = self.peek_finalized(name) {
                return Ok(v);
            }
            if let Some(skel) = self.peek_skeleton(name) {
                match skel.wait() {
                    Ok(()) => continue,
                    Err(err) => return Err(WiringError::PartialConstruction {
                        name: name.to_string(),
                        reason: err.to_string(),
                        cause: None,
                    }),
                }
            }
            break;
        }

        if concurrency::is_resolving(name) {
            if !self.options.allow_partial {
                return Err(WiringError::CircularWiring {
                    path: concurrency::resolving_path(name),
                });
            }
            return self.spawn_skeleton(name);
        }

        concurrency::push_resolving(name);
        // `thread_safe = false` takes the source's "simple direct
        // instantiation" path: no per-entry/global lock dance, just
        // build once under the resolving-stack's cycle protection. The
        // two-tier optimistic/global protocol only has a reason to
        // exist when more than one task may race to build the same
        // name.
        let result = if self.options.thread_safe {
            self.locks.with_entry_lock(
                name,
                || self.peek_finalized(name),
                || self.build_uncached(name),
            )
        } else {
            self.build_uncached(name)
        };
        concurrency::pop_resolving();
        result
    }

    fn spawn_skeleton(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
        let Some(Entry::Wired(w)) = self.graph.entries.get(name) else {
            return Err(WiringError::CircularWiring {
                path: concurrency::resolving_path(name),
            });
        };
        let ctor = self
            .resolver
            .resolve(&w.module, &w.type_name, w.factory.as_deref())
            .map_err(|e| WiringError::wiring(name, GenericCause(e)))?;
        let skeleton = Arc::new(Skeleton::allocate(name, ctor.as_ref())?);
        self.publish_skeleton(name, skeleton.clone());
        Ok(skeleton.instance.clone())
    }

    fn build_uncached(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
        let entry = self
            .graph
            .entries
            .get(name)
            .expect("build_uncached called for a declared name")
            .clone();

        match entry {
            Entry::Constant(_) => {
                // Eagerly resolved at construction time; reaching here
                // means a bug in the construction-order bookkeeping.
                unreachable!("non-promoted constant `{name}` was not resolved eagerly")
            }
            Entry::SyntheticConstant(resolved) => {
                log::trace!("lazily interpolating promoted constant `{name}`");
                let value = self.interpolate(name, &resolved)?;
                self.publish_value(name, value.clone());
                Ok(value)
            }
            Entry::Wired(w) => {
                log::debug!("instantiating `{}.{}` for `{name}`", w.module, w.type_name);
                let ctor = self
                    .resolver
                    .resolve(&w.module, &w.type_name, w.factory.as_deref())
                    .map_err(|e| WiringError::wiring(name, GenericCause(e)))?;

                let (pos_tree, kw_tree) = crate::value::split_args(&w.data);
                let mut pos = Vec::with_capacity(pos_tree.len());
                for item in &pos_tree {
                    pos.push(self.resolve_tree(name, item)?);
                }
                let mut kw = IndexMap::with_capacity(kw_tree.len());
                for (key, value) in &kw_tree {
                    kw.insert(key.clone(), self.resolve_tree(name, value)?);
                }

                if let Some(skeleton) = self.peek_skeleton(name) {
                    match skeleton::finalize_against_skeleton(name, ctor.as_ref(), &skeleton, pos, kw) {
                        Ok(instance) => {
                            self.publish_value(name, instance.clone());
                            Ok(instance)
                        }
                        Err(err) => {
                            self.remove_entry(name);
                            Err(err)
                        }
                    }
                } else {
                    match ctor.construct(pos, kw) {
                        Ok(instance) => {
                            self.publish_value(name, instance.clone());
                            Ok(instance)
                        }
                        Err(cause) => Err(WiringError::wiring(name, GenericCause(cause))),
                    }
                }
            }
        }
    }

    /// Resolves a fully general argument-tree node, recursively
    /// building any `Ref`s it contains.
    fn resolve_tree(
        &self,
        referrer: &str,
        value: &ResolvedValue,
    ) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
        Ok(match value {
            ResolvedValue::Primitive(p) => Arc::new(RuntimeValue::Primitive(p.clone())),
            ResolvedValue::Literal(s) => {
                Arc::new(RuntimeValue::Primitive(Primitive::String(s.clone())))
            }
            ResolvedValue::Ref(name) => self.resolve_ref(referrer, name)?,
            ResolvedValue::Template(parts) => {
                Arc::new(RuntimeValue::Primitive(Primitive::String(
                    self.render_template(referrer, parts)?,
                )))
            }
            ResolvedValue::Seq(items) | ResolvedValue::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve_tree(referrer, item)?);
                }
                Arc::new(RuntimeValue::Seq(out))
            }
            ResolvedValue::Map(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), self.resolve_tree(referrer, value)?);
                }
                Arc::new(RuntimeValue::Map(out))
            }
        })
    }

    fn render_template(&self, referrer: &str, parts: &[TemplatePart]) -> Result<String, WiringError> {
        let mut out = String::new();
        for part in parts {
            match part {
                TemplatePart::Literal(s) => out.push_str(s),
                TemplatePart::Placeholder(name) => {
                    let value = self.resolve_ref(referrer, name)?;
                    out.push_str(&self.describe_named(name, &value));
                }
            }
        }
        Ok(out)
    }

    fn interpolate(&self, name: &str, resolved: &ResolvedValue) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
        match resolved {
            ResolvedValue::Ref(r) => self.resolve_ref(name, r),
            ResolvedValue::Template(parts) => Ok(Arc::new(RuntimeValue::Primitive(Primitive::String(
                self.render_template(name, parts)?,
            )))),
            other => self.resolve_tree(name, other),
        }
    }

    /// Best-effort string form of `value`, the result of resolving
    /// `name`, for template interpolation (`SPEC_FULL.md` §9's
    /// stringification open question): primitives use `Display`;
    /// wired instances defer to their constructor's `describe`.
    fn describe_named(&self, name: &str, value: &Arc<dyn Any + Send + Sync>) -> String {
        if let Some(RuntimeValue::Primitive(p)) = value.downcast_ref::<RuntimeValue>() {
            return p.to_string();
        }
        if let Some(Entry::Wired(w)) = self.graph.entries.get(name) {
            if let Ok(ctor) = self
                .resolver
                .resolve(&w.module, &w.type_name, w.factory.as_deref())
            {
                return ctor.describe(value);
            }
        }
        "<object>".to_string()
    }
}

/// Eagerly resolve a non-promoted constant against previously resolved
/// constants. Never triggers a wired build: by the auto-promotion
/// fixpoint, a non-promoted constant cannot transitively reference a
/// wired entry.
fn resolve_eager(
    name: &str,
    value: &ResolvedValue,
    values: &HashMap<String, Cached>,
) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
    let lookup = |n: &str| -> Option<Arc<dyn Any + Send + Sync>> {
        match values.get(n) {
            Some(Cached::Value(v)) => Some(v.clone()),
            _ => None,
        }
    };

    Ok(match value {
        ResolvedValue::Primitive(p) => Arc::new(RuntimeValue::Primitive(p.clone())),
        ResolvedValue::Literal(s) => Arc::new(RuntimeValue::Primitive(Primitive::String(s.clone()))),
        ResolvedValue::Ref(r) => lookup(r).ok_or_else(|| WiringError::UnknownPlaceholder {
            name: name.to_string(),
            placeholder: r.clone(),
        })?,
        ResolvedValue::Template(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    TemplatePart::Literal(s) => out.push_str(s),
                    TemplatePart::Placeholder(r) => {
                        let v = lookup(r).ok_or_else(|| WiringError::UnknownPlaceholder {
                            name: name.to_string(),
                            placeholder: r.clone(),
                        })?;
                        out.push_str(&display_cached(&v, |_| "<object>".to_string()));
                    }
                }
            }
            Arc::new(RuntimeValue::Primitive(Primitive::String(out)))
        }
        ResolvedValue::Seq(items) | ResolvedValue::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_eager(name, item, values)?);
            }
            Arc::new(RuntimeValue::Seq(out))
        }
        ResolvedValue::Map(map) => {
            let mut out: IndexMap<MapKey, Arc<dyn Any + Send + Sync>> = IndexMap::with_capacity(map.len());
            for (key, v) in map {
                out.insert(key.clone(), resolve_eager(name, v, values)?);
            }
            Arc::new(RuntimeValue::Map(out))
        }
    })
}

/// Wraps a boxed host-constructor error so it can carry a `'static`
/// bound into `WiringError::Wiring`'s source chain.
#[derive(Debug)]
struct GenericCause(Box<dyn std::error::Error + Send + Sync>);

impl std::fmt::Display for GenericCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for GenericCause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}
