//! Cycle detection over the resolved dependency adjacency.
//!
//! Iterative depth-first search with three node colors, so very deep graphs
//! cannot exhaust the call stack. Traversal order is deterministic: roots in
//! path order, children in declaration order.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{PlanError, PlanResult};
use crate::graph::resolver::DependencyMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Not visited yet.
    White,
    /// On the current DFS path.
    Gray,
    /// Fully explored.
    Black,
}

/// Fail with [`PlanError::CircularDependency`] if `deps` contains a cycle.
///
/// The reported app is the node whose revisit closed the cycle, so it always
/// lies on the cycle. O(V + E).
pub fn detect_cycles(deps: &DependencyMap) -> PlanResult<()> {
    let mut color: HashMap<&Path, Color> = HashMap::new();

    for root in deps.keys() {
        if color.get(root.as_path()).copied().unwrap_or(Color::White) != Color::White {
            continue;
        }

        // (node, index of the next child to visit)
        let mut stack: Vec<(&Path, usize)> = vec![(root.as_path(), 0)];
        color.insert(root.as_path(), Color::Gray);

        while let Some(top) = stack.last_mut() {
            let (node, next) = (top.0, top.1);
            top.1 += 1;

            let children = deps.get(node).map(Vec::as_slice).unwrap_or(&[]);
            match children.get(next) {
                Some(dep) => {
                    let child = dep.resolved.as_path();
                    match color.get(child).copied().unwrap_or(Color::White) {
                        Color::Gray => {
                            return Err(PlanError::CircularDependency {
                                app: child.to_path_buf(),
                            })
                        }
                        Color::Black => {}
                        Color::White => {
                            color.insert(child, Color::Gray);
                            stack.push((child, 0));
                        }
                    }
                }
                None => {
                    color.insert(node, Color::Black);
                    stack.pop();
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DependencySpec;
    use crate::graph::resolver::ResolvedDependency;
    use std::path::PathBuf;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyMap {
        edges
            .iter()
            .map(|(owner, deps)| {
                let resolved = deps
                    .iter()
                    .map(|d| ResolvedDependency {
                        owner: PathBuf::from(owner),
                        spec: DependencySpec::parse(d),
                        resolved: PathBuf::from(d),
                    })
                    .collect();
                (PathBuf::from(owner), resolved)
            })
            .collect()
    }

    #[test]
    fn acyclic_diamond_passes() {
        let deps = graph(&[
            ("/a", &["/b", "/c"]),
            ("/b", &["/d"]),
            ("/c", &["/d"]),
            ("/d", &[]),
        ]);
        assert!(detect_cycles(&deps).is_ok());
    }

    #[test]
    fn back_edge_names_node_on_cycle() {
        let deps = graph(&[("/a", &["/b"]), ("/b", &["/c"]), ("/c", &["/a"]), ("/x", &["/a"])]);
        match detect_cycles(&deps) {
            Err(PlanError::CircularDependency { app }) => {
                assert!(["/a", "/b", "/c"].iter().any(|p| app == Path::new(p)));
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[test]
    fn dependency_only_nodes_are_leaves() {
        let deps = graph(&[("/a", &["/libs/ui"]), ("/b", &["/libs/ui", "/a"])]);
        assert!(detect_cycles(&deps).is_ok());
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let names: Vec<String> = (0..50_000).map(|i| format!("/n{i}")).collect();
        let mut deps = DependencyMap::new();
        for pair in names.windows(2) {
            deps.insert(
                PathBuf::from(&pair[0]),
                vec![ResolvedDependency {
                    owner: PathBuf::from(&pair[0]),
                    spec: DependencySpec::parse(&pair[1]),
                    resolved: PathBuf::from(&pair[1]),
                }],
            );
        }
        assert!(detect_cycles(&deps).is_ok());
    }
}
