//! Dependency graph construction: classifying every spec entry, building
//! the name→deps map, detecting cycles, and computing auto-promotion of
//! constants that transitively reference wired entries.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::{
    error::WiringError,
    spec::{classify_key, resolve_value, KeyKind},
    value::{ResolvedValue, SpecValue},
};

/// A parsed constructor-invocation entry.
#[derive(Debug, Clone)]
pub struct WiredEntry {
    pub module: String,
    pub type_name: String,
    pub factory: Option<String>,
    pub data: ResolvedValue,
}

/// One parsed spec entry, after key classification and auto-promotion.
#[derive(Debug, Clone)]
pub enum Entry {
    Wired(WiredEntry),
    /// A constant that never transitively references a wired entry:
    /// resolved eagerly, once, in topological order.
    Constant(ResolvedValue),
    /// A constant auto-promoted because it transitively references a
    /// wired entry: resolved lazily like a wired entry, via string
    /// interpolation instead of a constructor call.
    SyntheticConstant(ResolvedValue),
}

/// A fully parsed, analyzed spec: every entry classified, the
/// dependency graph validated acyclic (for constants) and a
/// topological build order recorded.
#[derive(Debug, Clone)]
pub struct Graph {
    pub entries: IndexMap<String, Entry>,
    /// Topological order in which eagerly-resolved constants must be
    /// computed. Wired/synthetic entries build lazily and are not
    /// included here.
    pub constant_order: Vec<String>,
}

fn deps_of(value: &ResolvedValue) -> Vec<String> {
    let mut out = Vec::new();
    value.referenced_names(&mut out);
    out
}

impl Graph {
    /// Parse and analyze a raw spec (insertion-ordered key → value map).
    ///
    /// `allow_partial` gates only cycles made entirely of wired entries
    /// (no constant on the cycle): with `allow_partial = false` such a
    /// cycle is a construction-time `CircularWiring` error; with
    /// `allow_partial = true` it is deferred to the skeleton-recovery
    /// protocol at build time. A cycle that passes through a constant
    /// is always a construction error, since constants resolve eagerly
    /// and have no skeleton to recover through.
    pub fn build(raw: &IndexMap<String, SpecValue>, allow_partial: bool) -> Result<Graph, WiringError> {
        let mut entries: IndexMap<String, Entry> = IndexMap::new();

        for (key, value) in raw {
            let kind = classify_key(key).map_err(|e| WiringError::MalformedKey {
                src: miette::NamedSource::new("spec", key.clone()),
                span: vec![],
                reason: e.message,
                key: key.clone(),
            })?;
            let resolved = resolve_value(value).map_err(|e| WiringError::MalformedKey {
                src: miette::NamedSource::new("spec", key.clone()),
                span: vec![],
                reason: e.message,
                key: key.clone(),
            })?;

            let name = match &kind {
                KeyKind::Wired(w) => w.name.clone(),
                KeyKind::Constant(name) => name.clone(),
            };

            if entries.contains_key(&name) {
                return Err(WiringError::MalformedKey {
                    src: miette::NamedSource::new("spec", key.clone()),
                    span: vec![],
                    reason: format!("duplicate entry name `{name}`"),
                    key: key.clone(),
                });
            }

            let entry = match kind {
                KeyKind::Wired(w) => Entry::Wired(WiredEntry {
                    module: w.module,
                    type_name: w.type_name,
                    factory: w.factory,
                    data: resolved,
                }),
                KeyKind::Constant(_) => Entry::Constant(resolved),
            };

            entries.insert(name, entry);
        }

        let deps: HashMap<String, Vec<String>> = entries
            .iter()
            .map(|(name, entry)| {
                let d = match entry {
                    Entry::Wired(w) => deps_of(&w.data),
                    Entry::Constant(v) | Entry::SyntheticConstant(v) => deps_of(v),
                };
                (name.clone(), d)
            })
            .collect();

        detect_static_cycles(&entries, &deps, allow_partial)?;
        let promoted = compute_auto_promotion(&entries, &deps);

        for name in &promoted {
            if let Some(Entry::Constant(v)) = entries.get(name) {
                let v = v.clone();
                entries.insert(name.clone(), Entry::SyntheticConstant(v));
            }
        }

        let constant_order = topological_order_for_constants(&entries, &deps)?;

        Ok(Graph {
            entries,
            constant_order,
        })
    }
}

/// Walks the dependency graph over *every* entry (wired and constant
/// alike) looking for cycles, via a standard DFS with an explicit
/// recursion stack. A cycle that touches at least one constant is
/// always a construction error: constants resolve eagerly, in
/// topological order, and have no skeleton to stand in for them while
/// they're incomplete. A cycle made entirely of wired entries is only
/// an error when `allow_partial` is false; when it's true, it's left
/// for `container.rs`'s skeleton-recovery protocol to resolve lazily at
/// build time (see `SPEC_FULL.md` §4.6).
fn detect_static_cycles(
    entries: &IndexMap<String, Entry>,
    deps: &HashMap<String, Vec<String>>,
    allow_partial: bool,
) -> Result<(), WiringError> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut in_stack: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = Vec::new();

    for name in entries.keys() {
        if !visited.contains(name) {
            visit_for_cycle(
                name,
                entries,
                deps,
                allow_partial,
                &mut visited,
                &mut in_stack,
                &mut stack,
            )?;
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn visit_for_cycle(
    node: &str,
    entries: &IndexMap<String, Entry>,
    deps: &HashMap<String, Vec<String>>,
    allow_partial: bool,
    visited: &mut HashSet<String>,
    in_stack: &mut HashSet<String>,
    stack: &mut Vec<String>,
) -> Result<(), WiringError> {
    if in_stack.contains(node) {
        let start = stack
            .iter()
            .position(|n| n == node)
            .expect("node marked in_stack must be on the stack");
        let mut path: Vec<String> = stack[start..].to_vec();
        path.push(node.to_string());

        let all_wired = path
            .iter()
            .all(|n| matches!(entries.get(n), Some(Entry::Wired(_))));
        if all_wired && allow_partial {
            return Ok(());
        }
        return Err(WiringError::CircularWiring { path });
    }
    if visited.contains(node) {
        return Ok(());
    }

    visited.insert(node.to_string());
    in_stack.insert(node.to_string());
    stack.push(node.to_string());

    if let Some(current_deps) = deps.get(node) {
        for dep in current_deps {
            if entries.contains_key(dep) {
                visit_for_cycle(dep, entries, deps, allow_partial, visited, in_stack, stack)?;
            }
        }
    }

    stack.pop();
    in_stack.remove(node);
    Ok(())
}

fn compute_auto_promotion(
    entries: &IndexMap<String, Entry>,
    deps: &HashMap<String, Vec<String>>,
) -> HashSet<String> {
    let wired: HashSet<String> = entries
        .iter()
        .filter(|(_, e)| matches!(e, Entry::Wired(_)))
        .map(|(n, _)| n.clone())
        .collect();

    let mut promoted: HashSet<String> = entries
        .iter()
        .filter_map(|(name, entry)| match entry {
            Entry::Constant(_) => {
                let d = deps.get(name).cloned().unwrap_or_default();
                if d.iter().any(|dep| wired.contains(dep)) {
                    Some(name.clone())
                } else {
                    None
                }
            }
            _ => None,
        })
        .collect();

    loop {
        let mut progressed = false;
        for (name, entry) in entries {
            if !matches!(entry, Entry::Constant(_)) || promoted.contains(name) {
                continue;
            }
            let d = deps.get(name).cloned().unwrap_or_default();
            if d.iter().any(|dep| promoted.contains(dep)) {
                promoted.insert(name.clone());
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    promoted
}

/// Topological order for eagerly-resolved constants only (wired and
/// synthetic-constant entries are excluded — they resolve lazily on
/// first access). Kahn's algorithm; any node left with nonzero
/// in-degree after the main pass indicates a cycle, found by DFS to
/// report the offending path.
fn topological_order_for_constants(
    entries: &IndexMap<String, Entry>,
    deps: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>, WiringError> {
    let constants: Vec<String> = entries
        .iter()
        .filter(|(_, e)| matches!(e, Entry::Constant(_)))
        .map(|(n, _)| n.clone())
        .collect();
    let constant_set: HashSet<&String> = constants.iter().collect();

    let mut in_degree: HashMap<String, usize> = constants.iter().map(|n| (n.clone(), 0)).collect();
    let mut edges: HashMap<String, Vec<String>> = constants.iter().map(|n| (n.clone(), vec![])).collect();

    for name in &constants {
        for dep in deps.get(name).into_iter().flatten() {
            if constant_set.contains(dep) {
                edges.get_mut(dep).unwrap().push(name.clone());
                *in_degree.get_mut(name).unwrap() += 1;
            }
        }
    }

    let mut queue: Vec<String> = constants
        .iter()
        .filter(|n| in_degree[*n] == 0)
        .cloned()
        .collect();
    let mut order = Vec::with_capacity(constants.len());

    while let Some(name) = queue.pop() {
        order.push(name.clone());
        for next in &edges[&name] {
            let d = in_degree.get_mut(next).unwrap();
            *d -= 1;
            if *d == 0 {
                queue.push(next.clone());
            }
        }
    }

    if order.len() != constants.len() {
        let remaining: Vec<String> = constants
            .into_iter()
            .filter(|n| !order.contains(n))
            .collect();
        return Err(WiringError::CircularWiring { path: remaining });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{int_val, map_of, str_val};
    use crate::value::MapKey;

    fn spec(pairs: Vec<(&str, SpecValue)>) -> IndexMap<String, SpecValue> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn s1_basic_wired_entry() {
        let raw = spec(vec![(
            "m.Date d",
            map_of(vec![
                (MapKey::Str("year".into()), int_val(2003)),
                (MapKey::Str("month".into()), int_val(12)),
                (MapKey::Str("day".into()), int_val(13)),
            ]),
        )]);
        let graph = Graph::build(&raw, false).unwrap();
        assert!(matches!(graph.entries.get("d"), Some(Entry::Wired(_))));
    }

    #[test]
    fn s3_template_constant_not_promoted() {
        let raw = spec(vec![
            ("host", str_val("example.com")),
            ("url", str_val("http://{host}:{port}")),
            ("port", int_val(8080)),
        ]);
        let graph = Graph::build(&raw, false).unwrap();
        assert!(matches!(graph.entries.get("url"), Some(Entry::Constant(_))));
        assert!(graph.constant_order.contains(&"url".to_string()));
    }

    #[test]
    fn s4_auto_promoted_constant() {
        let raw = spec(vec![
            ("m.H h", map_of(vec![])),
            ("label", str_val("h is {h}")),
        ]);
        let graph = Graph::build(&raw, false).unwrap();
        assert!(matches!(
            graph.entries.get("label"),
            Some(Entry::SyntheticConstant(_))
        ));
        assert!(!graph.constant_order.contains(&"label".to_string()));
    }

    #[test]
    fn s5_static_cycle_between_constant_and_wired() {
        let raw = spec(vec![
            ("c", str_val("{w}")),
            ("m.A w", map_of(vec![(MapKey::Str("b".into()), str_val("{c}"))])),
        ]);
        let err = Graph::build(&raw, false).unwrap_err();
        assert!(matches!(err, WiringError::CircularWiring { .. }));
    }

    #[test]
    fn wired_to_wired_cycle_fails_construction_without_allow_partial() {
        let raw = spec(vec![
            ("m.A a", map_of(vec![(MapKey::Str("b".into()), str_val("{b}"))])),
            ("m.B b", map_of(vec![(MapKey::Str("a".into()), str_val("{a}"))])),
        ]);
        let err = Graph::build(&raw, false).unwrap_err();
        assert!(matches!(err, WiringError::CircularWiring { .. }));
    }

    #[test]
    fn wired_to_wired_cycle_deferred_with_allow_partial() {
        let raw = spec(vec![
            ("m.A a", map_of(vec![(MapKey::Str("b".into()), str_val("{b}"))])),
            ("m.B b", map_of(vec![(MapKey::Str("a".into()), str_val("{a}"))])),
        ]);
        // Pure wired<->wired cycle with allowPartial: not a construction
        // error, deferred to build time's skeleton-recovery protocol.
        let graph = Graph::build(&raw, true).unwrap();
        assert!(matches!(graph.entries.get("a"), Some(Entry::Wired(_))));
    }

    #[test]
    fn no_false_positive_for_external_placeholder() {
        let raw = spec(vec![
            ("a", str_val("{b}")),
            ("m.A c", map_of(vec![(MapKey::Str("b".into()), str_val("foo"))])),
        ]);
        // `a` references `b`, which is not declared anywhere: this is
        // not a construction-time cycle (nothing links back to `a`); it
        // surfaces as UnknownPlaceholder only when `a` is resolved.
        let graph = Graph::build(&raw, false).unwrap();
        assert!(matches!(graph.entries.get("a"), Some(Entry::Constant(_))));
    }
}
