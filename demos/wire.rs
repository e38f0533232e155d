//! Minimal illustrative binary: wires a TOML spec through the public
//! `wireframe` API against a couple of toy constructors, then prints
//! the requested entries.
//!
//! Usage: `wire <spec.toml> <entry> [entry...]`

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use wireframe::registry::{Constructor, StaticRegistry};
use wireframe::value::display_cached;
use wireframe::{Container, ContainerOptions};

fn greeting_from(kw: &IndexMap<String, Arc<dyn Any + Send + Sync>>) -> String {
    let who = kw
        .get("name")
        .map(|v| display_cached(v, |_| "<object>".to_string()))
        .unwrap_or_else(|| "world".to_string());
    format!("Hello, {who}!")
}

fn greeting_describe(instance: &Arc<dyn Any + Send + Sync>) -> String {
    instance
        .downcast_ref::<String>()
        .cloned()
        .unwrap_or_else(|| "<greeting>".to_string())
}

struct Greeting;

impl Constructor for Greeting {
    fn construct(
        &self,
        _pos: Vec<Arc<dyn Any + Send + Sync>>,
        kw: IndexMap<String, Arc<dyn Any + Send + Sync>>,
    ) -> Result<Arc<dyn Any + Send + Sync>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Arc::new(greeting_from(&kw)))
    }

    fn describe(&self, instance: &Arc<dyn Any + Send + Sync>) -> String {
        greeting_describe(instance)
    }
}

/// Registered under the `.build` factory name, to exercise
/// factory-qualified keys (`"demo.Greeting g.build"`).
struct GreetingFactory;

impl Constructor for GreetingFactory {
    fn construct(
        &self,
        _pos: Vec<Arc<dyn Any + Send + Sync>>,
        kw: IndexMap<String, Arc<dyn Any + Send + Sync>>,
    ) -> Result<Arc<dyn Any + Send + Sync>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Arc::new(greeting_from(&kw)))
    }

    fn describe(&self, instance: &Arc<dyn Any + Send + Sync>) -> String {
        greeting_describe(instance)
    }
}

fn print_entry(container: &Container, name: &str) {
    match container.get(name) {
        Ok(value) => {
            let rendered = display_cached(&value, |v| {
                v.downcast_ref::<String>()
                    .cloned()
                    .unwrap_or_else(|| "<object>".to_string())
            });
            println!("{name} = {rendered}");
        }
        Err(err) => eprintln!("{name}: {err}"),
    }
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(spec_path) = args.next() else {
        eprintln!("usage: wire <spec.toml> <entry> [entry...]");
        std::process::exit(2);
    };
    let entries: Vec<String> = args.collect();

    log::info!("loading spec from {spec_path}");
    let text = match std::fs::read_to_string(Path::new(&spec_path)) {
        Ok(t) => t,
        Err(err) => {
            eprintln!("failed to read {spec_path}: {err}");
            std::process::exit(1);
        }
    };

    let raw = match wireframe::spec::spec_from_toml(&text) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("failed to parse spec: {err}");
            std::process::exit(1);
        }
    };

    let mut registry = StaticRegistry::new();
    registry.register("demo", "Greeting", None, Arc::new(Greeting));
    registry.register("demo", "Greeting", Some("build"), Arc::new(GreetingFactory));

    let container = match Container::new(&raw, Arc::new(registry), ContainerOptions::default()) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("failed to build container: {err}");
            std::process::exit(1);
        }
    };

    log::info!("container built, resolving {} entries", entries.len());
    for name in &entries {
        print_entry(&container, name);
    }
}
