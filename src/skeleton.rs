//! Cycle recovery: when a constructor indirectly re-enters its own
//! name, an uninitialized "skeleton" instance is published under that
//! name so the back-edge resolves to the same object, and is finalized
//! once the outer build completes. See `SPEC_FULL.md` §4.6.
//!
//! Rust has no `__new__`-style allocation hook, so unlike a reflective
//! host, the constructor itself must cooperate: a type that wants to
//! participate in cycle recovery provides `Constructor::skeleton` (an
//! empty, independently-mutable cell) and `Constructor::init_skeleton`
//! (fills that cell in place). A constructor that doesn't override
//! these can never be skeletonized, matching "types that forbid
//! uninitialized allocation" in the design notes.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::concurrency::Notify;
use crate::error::WiringError;
use crate::registry::Constructor;

pub struct Skeleton {
    pub instance: Arc<dyn Any + Send + Sync>,
    partial: AtomicBool,
    notify: Notify,
}

impl Skeleton {
    /// Allocate an empty skeleton for `name` from `ctor`, or fail if
    /// the type doesn't support it.
    pub fn allocate(name: &str, ctor: &dyn Constructor) -> Result<Skeleton, WiringError> {
        match ctor.skeleton() {
            Some(instance) => Ok(Skeleton {
                instance,
                partial: AtomicBool::new(true),
                notify: Notify::new(),
            }),
            None => Err(WiringError::PartialConstruction {
                name: name.to_string(),
                reason: "type does not support skeleton allocation".to_string(),
                cause: None,
            }),
        }
    }

    pub fn is_partial(&self) -> bool {
        self.partial.load(Ordering::SeqCst)
    }

    fn finalize_ok(&self) {
        self.partial.store(false, Ordering::SeqCst);
        self.notify.signal(Ok(()));
    }

    fn finalize_err(&self, err: Arc<WiringError>) {
        self.partial.store(false, Ordering::SeqCst);
        self.notify.signal(Err(err));
    }

    /// Blocks until finalized, re-raising the recorded failure if any.
    pub fn wait(&self) -> Result<(), Arc<WiringError>> {
        self.notify.wait()
    }
}

/// Runs the outer constructor call against an already-published
/// skeleton (the inner re-entrant build returned it) instead of
/// producing a fresh instance: `Constructor::init_skeleton` fills the
/// skeleton in place. On success the skeleton is finalized and its
/// instance returned; on failure the skeleton is finalized with the
/// recorded error, which is returned to the caller, who is responsible
/// for removing it from the cache.
pub fn finalize_against_skeleton(
    name: &str,
    ctor: &dyn Constructor,
    skeleton: &Skeleton,
    pos: Vec<Arc<dyn Any + Send + Sync>>,
    kw: IndexMap<String, Arc<dyn Any + Send + Sync>>,
) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
    match ctor.init_skeleton(&skeleton.instance, pos, kw) {
        Ok(()) => {
            skeleton.finalize_ok();
            Ok(skeleton.instance.clone())
        }
        Err(cause) => {
            let reason = cause.to_string();
            let err = WiringError::PartialConstruction {
                name: name.to_string(),
                reason: reason.clone(),
                cause: None,
            };
            let recorded = WiringError::PartialConstruction {
                name: name.to_string(),
                reason,
                cause: None,
            };
            skeleton.finalize_err(Arc::new(recorded));
            Err(err)
        }
    }
}
