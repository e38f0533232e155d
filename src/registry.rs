//! The host-supplied type registry: maps `(module, type, factory?)`
//! triples to callable constructors. This is the one collaborator the
//! container does not implement itself — analogous to dynamic import
//! resolution in a reflective host, reinterpreted here as a trait
//! object lookup.

use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;

/// A single constructor for one `(module, type, factory?)` triple.
pub trait Constructor: Send + Sync {
    /// Build an instance from normalized positional and keyword
    /// arguments (already placeholder-resolved).
    fn construct(
        &self,
        pos: Vec<Arc<dyn Any + Send + Sync>>,
        kw: IndexMap<String, Arc<dyn Any + Send + Sync>>,
    ) -> Result<Arc<dyn Any + Send + Sync>, Box<dyn std::error::Error + Send + Sync>>;

    /// Allocate an empty, independently-mutable skeleton of this type
    /// for cycle recovery (`allowPartial`). Types that cannot support
    /// being filled in after allocation return `None`, the default —
    /// such a type simply cannot participate in a constructor-level
    /// cycle, and attempting to build one under `allowPartial` fails
    /// with `PartialConstruction`.
    fn skeleton(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }

    /// Populate a previously-allocated skeleton in place. Only called
    /// for constructors whose `skeleton()` returned `Some`.
    fn init_skeleton(
        &self,
        _skeleton: &Arc<dyn Any + Send + Sync>,
        _pos: Vec<Arc<dyn Any + Send + Sync>>,
        _kw: IndexMap<String, Arc<dyn Any + Send + Sync>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err("type does not support skeleton initialization".into())
    }

    /// Renders a constructed instance for string interpolation in an
    /// auto-promoted constant's template. Defaults to a fixed
    /// placeholder, since an arbitrary host type has no guaranteed
    /// stringification.
    fn describe(&self, _instance: &Arc<dyn Any + Send + Sync>) -> String {
        "<object>".to_string()
    }
}

/// Resolves `(module, type, factory?)` to a [`Constructor`].
pub trait TypeResolver: Send + Sync {
    fn resolve(
        &self,
        module: &str,
        type_name: &str,
        factory: Option<&str>,
    ) -> Result<Arc<dyn Constructor>, Box<dyn std::error::Error + Send + Sync>>;
}

/// A `TypeResolver` built from a fixed, pre-registered map — the
/// common case for host applications that know their wiring surface
/// ahead of time.
#[derive(Default)]
pub struct StaticRegistry {
    entries: IndexMap<(String, String, Option<String>), Arc<dyn Constructor>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn register(
        &mut self,
        module: impl Into<String>,
        type_name: impl Into<String>,
        factory: Option<&str>,
        constructor: Arc<dyn Constructor>,
    ) -> &mut Self {
        self.entries.insert(
            (module.into(), type_name.into(), factory.map(str::to_string)),
            constructor,
        );
        self
    }
}

impl TypeResolver for StaticRegistry {
    fn resolve(
        &self,
        module: &str,
        type_name: &str,
        factory: Option<&str>,
    ) -> Result<Arc<dyn Constructor>, Box<dyn std::error::Error + Send + Sync>> {
        let key = (module.to_string(), type_name.to_string(), factory.map(str::to_string));
        self.entries
            .get(&key)
            .cloned()
            .ok_or_else(|| format!("no constructor registered for {module}.{type_name}{}",
                factory.map(|f| format!(".{f}")).unwrap_or_default()).into())
    }
}
