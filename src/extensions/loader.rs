use super::manifest::Manifest;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("dependency cycle detected among extensions: {0:?}")]
    Cycle(Vec<String>),
}

/// Result of resolving a set of extension manifests.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Load order: a topological sort of the satisfiable subgraph.
    pub order: Vec<String>,
    /// `(extension, missing_required_dependency)` pairs for extensions
    /// that could not be loaded. Reported, not fatal.
    pub unloadable: Vec<(String, String)>,
}

/// Whether `dep` is present in `manifests` with a version satisfying its
/// declared constraint. A malformed declared or required version string
/// is treated as non-satisfying rather than panicking.
fn dependency_satisfied(manifests: &HashMap<String, Manifest>, dep: &super::manifest::ExtDependency) -> bool {
    let Some(found) = manifests.get(&dep.name) else {
        return false;
    };
    let Some(req) = &dep.version_req else {
        return true;
    };
    match (semver::VersionReq::parse(req), semver::Version::parse(&found.version)) {
        (Ok(req), Ok(version)) => req.matches(&version),
        _ => false,
    }
}

/// Resolves `manifests` into a load order.
///
/// Builds a `dep -> dependent` graph. An optional dependency edge is
/// included only when the dependency is present with a satisfying
/// version; a missing or version-mismatched optional dependency is
/// silently dropped. A missing or version-mismatched required dependency
/// marks the dependent unloadable and excludes it (and everything that in
/// turn depends on it) from the graph before the topological sort, so a
/// cycle can only be reported among extensions that are otherwise
/// satisfiable.
pub fn resolve(manifests: &HashMap<String, Manifest>) -> Result<Resolution, LoaderError> {
    let mut unloadable: Vec<(String, String)> = Vec::new();
    let mut excluded: HashSet<String> = HashSet::new();

    for (name, manifest) in manifests {
        for dep in &manifest.ext_dependencies {
            if !dep.optional && !dependency_satisfied(manifests, dep) {
                unloadable.push((name.clone(), dep.name.clone()));
                excluded.insert(name.clone());
            }
        }
    }

    // Propagate exclusion to transitive dependents: anything requiring an
    // excluded extension is itself unloadable.
    loop {
        let mut added = false;
        for (name, manifest) in manifests {
            if excluded.contains(name) {
                continue;
            }
            for dep in &manifest.ext_dependencies {
                if !dep.optional && excluded.contains(&dep.name) {
                    unloadable.push((name.clone(), dep.name.clone()));
                    excluded.insert(name.clone());
                    added = true;
                    break;
                }
            }
        }
        if !added {
            break;
        }
    }

    let live: Vec<&String> = manifests.keys().filter(|n| !excluded.contains(*n)).collect();
    let live_set: HashSet<&str> = live.iter().map(|s| s.as_str()).collect();

    let mut indegree: HashMap<&str, usize> = live.iter().map(|n| (n.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = live.iter().map(|n| (n.as_str(), Vec::new())).collect();

    for name in &live {
        let manifest = &manifests[name.as_str()];
        for dep in &manifest.ext_dependencies {
            if live_set.contains(dep.name.as_str()) && dependency_satisfied(manifests, dep) {
                dependents.get_mut(dep.name.as_str()).unwrap().push(name.as_str());
                *indegree.get_mut(name.as_str()).unwrap() += 1;
            }
        }
    }

    // Kahn's algorithm: process names in a stable (sorted) order among
    // equal in-degree ties so resolution is deterministic.
    let mut ready_sorted: Vec<&str> = indegree
        .iter()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(&name, _)| name)
        .collect();
    ready_sorted.sort_unstable();
    let mut queue: VecDeque<&str> = ready_sorted.into_iter().collect();

    let mut order = Vec::with_capacity(live.len());
    while let Some(name) = queue.pop_front() {
        order.push(name.to_string());
        let mut unlocked = Vec::new();
        for &dependent in &dependents[name] {
            let deg = indegree.get_mut(dependent).unwrap();
            *deg -= 1;
            if *deg == 0 {
                unlocked.push(dependent);
            }
        }
        unlocked.sort_unstable();
        for dependent in unlocked {
            queue.push_back(dependent);
        }
    }

    if order.len() != live.len() {
        let remaining: Vec<String> = live
            .iter()
            .filter(|n| !order.contains(&n.to_string()))
            .map(|n| n.to_string())
            .collect();
        return Err(LoaderError::Cycle(remaining));
    }

    Ok(Resolution { order, unloadable })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::manifest::ExtDependency;

    fn manifest(name: &str, deps: Vec<(&str, bool)>) -> Manifest {
        Manifest {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
            ext_dependencies: deps
                .into_iter()
                .map(|(dep, optional)| ExtDependency { name: dep.to_string(), optional, version_req: None })
                .collect(),
            pip_dependencies: vec![],
            apt_dependencies: vec![],
        }
    }

    #[test]
    fn required_and_optional_dependency_order() {
        let mut manifests = HashMap::new();
        manifests.insert("e1".into(), manifest("e1", vec![]));
        manifests.insert("e2".into(), manifest("e2", vec![("e1", true)]));
        manifests.insert("e3".into(), manifest("e3", vec![("e1", false)]));
        let resolution = resolve(&manifests).unwrap();
        assert!(resolution.unloadable.is_empty());
        let pos = |n: &str| resolution.order.iter().position(|x| x == n).unwrap();
        assert!(pos("e1") < pos("e2"));
        assert!(pos("e1") < pos("e3"));
    }

    #[test]
    fn missing_required_dependency_marks_unloadable() {
        let mut manifests = HashMap::new();
        manifests.insert("e2".into(), manifest("e2", vec![("e1", true)]));
        manifests.insert("e3".into(), manifest("e3", vec![("e1", false)]));
        let resolution = resolve(&manifests).unwrap();
        assert_eq!(resolution.unloadable, vec![("e3".to_string(), "e1".to_string())]);
        assert_eq!(resolution.order, vec!["e2".to_string()]);
    }

    #[test]
    fn unsatisfied_version_requirement_marks_unloadable() {
        let mut manifests = HashMap::new();
        manifests.insert("e1".into(), manifest("e1", vec![]));
        let mut e2 = manifest("e2", vec![]);
        e2.ext_dependencies.push(ExtDependency {
            name: "e1".to_string(),
            optional: false,
            version_req: Some("^2".to_string()),
        });
        manifests.insert("e2".into(), e2);

        let resolution = resolve(&manifests).unwrap();
        assert_eq!(resolution.unloadable, vec![("e2".to_string(), "e1".to_string())]);
        assert_eq!(resolution.order, vec!["e1".to_string()]);
    }

    #[test]
    fn cycle_is_detected() {
        let mut manifests = HashMap::new();
        manifests.insert("a".into(), manifest("a", vec![("b", false)]));
        manifests.insert("b".into(), manifest("b", vec![("a", false)]));
        let err = resolve(&manifests).unwrap_err();
        match err {
            LoaderError::Cycle(mut names) => {
                names.sort();
                assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
            }
        }
    }
}
