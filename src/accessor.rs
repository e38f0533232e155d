//! Accessor surfaces over a built [`Container`]: a synchronous handle
//! per name, and a sibling async namespace that offloads blocking
//! builds to a worker thread so the cooperative scheduler never stalls.

use std::any::Any;
use std::sync::Arc;

use crate::container::Container;
use crate::error::WiringError;

/// A zero-argument synchronous handle bound to one entry name.
pub struct Accessor<'a> {
    container: &'a Container,
    name: String,
}

impl<'a> Accessor<'a> {
    pub(crate) fn new(container: &'a Container, name: impl Into<String>) -> Self {
        Accessor {
            container,
            name: name.into(),
        }
    }

    pub fn call(&self) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
        self.container.get(&self.name)
    }

    /// Convenience: build and downcast in one call.
    pub fn get<T: 'static + Send + Sync>(&self) -> Result<Arc<T>, WiringError> {
        let value = self.call()?;
        value
            .downcast::<T>()
            .map_err(|_| WiringError::wiring(self.name.clone(), DowncastFailed(self.name.clone())))
    }
}

/// The async-accessor namespace. Named `AsyncAccessors` rather than
/// `async` because that is a reserved keyword. Requires the container
/// behind an `Arc` so the offloaded worker closure can own its share
/// across the `.await` point instead of borrowing.
pub struct AsyncAccessors {
    container: Arc<Container>,
}

impl AsyncAccessors {
    pub(crate) fn new(container: Arc<Container>) -> Self {
        AsyncAccessors { container }
    }

    /// Builds `name`, suspending by offloading the blocking build to a
    /// worker thread. Constants return without ever touching the
    /// worker pool's queue semantics any differently than a wired
    /// entry would — the distinction the source makes (constants never
    /// suspend) only matters for a cooperative scheduler when the
    /// caller is itself polled from that scheduler's thread; offloading
    /// every lookup uniformly keeps this accessor's behavior simple and
    /// still never blocks the calling task.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>, WiringError> {
        let container = self.container.clone();
        let name = name.to_string();
        match tokio::task::spawn_blocking(move || container.get(&name)).await {
            Ok(inner) => inner,
            Err(join_err) => Err(WiringError::wiring(
                "<async accessor>",
                JoinFailure(join_err.to_string()),
            )),
        }
    }

    /// Builds `name` and downcasts in one call.
    pub async fn get_as<T: 'static + Send + Sync>(&self, name: &str) -> Result<Arc<T>, WiringError> {
        let value = self.get(name).await?;
        value
            .downcast::<T>()
            .map_err(|_| WiringError::wiring(name.to_string(), DowncastFailed(name.to_string())))
    }
}

#[derive(Debug)]
struct DowncastFailed(String);

impl std::fmt::Display for DowncastFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` did not hold the requested type", self.0)
    }
}
impl std::error::Error for DowncastFailed {}

#[derive(Debug)]
struct JoinFailure(String);

impl std::fmt::Display for JoinFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker thread panicked: {}", self.0)
    }
}
impl std::error::Error for JoinFailure {}
