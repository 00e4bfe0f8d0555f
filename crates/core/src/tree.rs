//! Namespace trees and the flattener.
//!
//! Modules group their endpoints in nested namespaces:
//!
//! ```text
//! wallet
//! ├── assets
//! │   ├── list    GET  /assets
//! │   └── create  POST /assets
//! └── transactions
//!     └── create  POST /transactions
//! ```
//!
//! Flattening walks the tree depth-first and joins keys with `.`
//! (`wallet.transactions.create`). The first key of a route is its module key
//! and becomes the HTTP base path (`/wallet`); deeper keys only address the
//! route. The same flat list feeds the mounting adapter and the manifest.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::controller::{ControllerSpec, Method};
use crate::error::ComposeError;
use crate::path::{PathPattern, Segment};

pub const SEPARATOR: char = '.';

#[derive(Debug, Clone)]
pub enum RouterNode {
    Leaf(Arc<ControllerSpec>),
    Namespace(Namespace),
}

impl RouterNode {
    /// Structural equality; leaves compare by identity.
    pub fn same_shape(&self, other: &RouterNode) -> bool {
        match (self, other) {
            (RouterNode::Leaf(a), RouterNode::Leaf(b)) => Arc::ptr_eq(a, b),
            (RouterNode::Namespace(a), RouterNode::Namespace(b)) => a.same_shape(b),
            _ => false,
        }
    }

    pub fn as_namespace(&self) -> Option<&Namespace> {
        match self {
            RouterNode::Namespace(ns) => Some(ns),
            RouterNode::Leaf(_) => None,
        }
    }
}

impl From<ControllerSpec> for RouterNode {
    fn from(value: ControllerSpec) -> Self {
        RouterNode::Leaf(Arc::new(value))
    }
}

impl From<Namespace> for RouterNode {
    fn from(value: Namespace) -> Self {
        RouterNode::Namespace(value)
    }
}

/// Insertion-ordered group of named nodes.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    entries: Vec<(String, RouterNode)>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, key: impl Into<String>, spec: ControllerSpec) -> Self {
        self.entry(key, RouterNode::from(spec))
    }

    pub fn nest(self, key: impl Into<String>, namespace: Namespace) -> Self {
        self.entry(key, RouterNode::Namespace(namespace))
    }

    /// Append without checking; duplicates are reported by [`Namespace::flatten`].
    pub fn entry(mut self, key: impl Into<String>, node: RouterNode) -> Self {
        self.entries.push((key.into(), node));
        self
    }

    /// Add a subtree under a new key.
    pub fn merge(&mut self, key: impl Into<String>, node: RouterNode) -> Result<(), ComposeError> {
        let key = key.into();
        validate_key(&key)?;
        if self.get(&key).is_some() {
            return Err(ComposeError::KeyCollision(key));
        }
        self.entries.push((key, node));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&RouterNode> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, n)| n)
    }

    pub fn entries(&self) -> &[(String, RouterNode)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn same_shape(&self, other: &Namespace) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|((ka, a), (kb, b))| ka == kb && a.same_shape(b))
    }

    /// Copy of the tree without namespaces that hold no leaves.
    pub fn pruned(&self) -> Namespace {
        let entries = self
            .entries
            .iter()
            .filter_map(|(key, node)| match node {
                RouterNode::Leaf(_) => Some((key.clone(), node.clone())),
                RouterNode::Namespace(ns) => {
                    let ns = ns.pruned();
                    (!ns.is_empty()).then(|| (key.clone(), RouterNode::Namespace(ns)))
                }
            })
            .collect();
        Namespace { entries }
    }

    /// Depth-first flattening into addressable routes.
    pub fn flatten(&self) -> Result<FlatRoutes, ComposeError> {
        let mut routes = Vec::new();
        let mut prefix = Vec::new();
        walk(self, &mut prefix, &mut routes)?;

        check_unique(&routes)?;
        Ok(FlatRoutes { routes })
    }
}

fn check_unique(routes: &[FlatRoute]) -> Result<(), ComposeError> {
    let mut keys = HashSet::with_capacity(routes.len());
    let mut endpoints: HashMap<(Method, Vec<String>), &FlatRoute> = HashMap::with_capacity(routes.len());
    // Parameter name at each parameter position, keyed by the erased prefix.
    let mut params: HashMap<Vec<String>, (String, &FlatRoute)> = HashMap::new();
    for route in routes {
        if !keys.insert(route.key.as_str()) {
            return Err(ComposeError::KeyCollision(route.key.clone()));
        }
        let full = route.full_path();
        let shape = erased(full.segments());

        let endpoint = (route.spec.method(), shape);
        if let Some(first) = endpoints.get(&endpoint) {
            return Err(ComposeError::DuplicateRoute {
                method: endpoint.0.to_string(),
                path: full.to_string(),
                first: first.key.clone(),
                second: route.key.clone(),
            });
        }

        // The router tree holds one name per parameter position, whatever the method.
        for (i, segment) in full.segments().iter().enumerate() {
            let Segment::Param(name) = segment else {
                continue;
            };
            let prefix = endpoint.1[..=i].to_vec();
            match params.get(&prefix) {
                Some((seen, first)) if seen != name => {
                    return Err(ComposeError::ConflictingParams {
                        first: first.key.clone(),
                        first_path: first.full_path().to_string(),
                        second: route.key.clone(),
                        second_path: full.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    params.insert(prefix, (name.clone(), route));
                }
            }
        }
        endpoints.insert(endpoint, route);
    }

    // A root-level route may not claim a module's base segment: the module's
    // sub-router owns everything below it.
    let bases: HashSet<&PathPattern> = routes
        .iter()
        .filter(|r| !r.base.is_root())
        .map(|r| &r.base)
        .collect();
    for route in routes.iter().filter(|r| r.base.is_root()) {
        if let Some(Segment::Literal(first)) = route.spec.path().segments().first() {
            if let Some(base) = bases.iter().find(|b| matches!(b.segments(), [Segment::Literal(s)] if s == first)) {
                return Err(ComposeError::ShadowedBase {
                    key: route.key.clone(),
                    base: base.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Path segments with parameter names erased (`/assets/:id` and `/assets/:name` match).
fn erased(segments: &[Segment]) -> Vec<String> {
    segments
        .iter()
        .map(|s| match s {
            Segment::Literal(l) => l.clone(),
            Segment::Param(_) => ":".to_string(),
            Segment::Wildcard(_) => "*".to_string(),
        })
        .collect()
}

fn walk(ns: &Namespace, prefix: &mut Vec<String>, out: &mut Vec<FlatRoute>) -> Result<(), ComposeError> {
    for (key, node) in &ns.entries {
        validate_key(key)?;
        prefix.push(key.clone());
        match node {
            RouterNode::Leaf(spec) => {
                let base = if prefix.len() > 1 {
                    module_base(&prefix[0])
                } else {
                    PathPattern::root()
                };
                out.push(FlatRoute {
                    key: prefix.join(&SEPARATOR.to_string()),
                    base,
                    spec: spec.clone(),
                });
            }
            RouterNode::Namespace(child) => walk(child, prefix, out)?,
        }
        prefix.pop();
    }
    Ok(())
}

fn module_base(key: &str) -> PathPattern {
    // Keys are validated as plain literal segments, so this cannot fail.
    PathPattern::parse(&format!("/{key}")).unwrap_or_else(|_| PathPattern::root())
}

/// Keys become URL segments and dot-path components.
fn validate_key(key: &str) -> Result<(), ComposeError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '$');
    if valid {
        Ok(())
    } else {
        Err(ComposeError::InvalidKey(key.to_string()))
    }
}

/// One addressable route.
#[derive(Debug, Clone)]
pub struct FlatRoute {
    /// Dot-joined path from the root (`wallet.transactions.create`).
    pub key: String,
    /// HTTP prefix shared by every route of the module (`/wallet`).
    pub base: PathPattern,
    pub spec: Arc<ControllerSpec>,
}

impl FlatRoute {
    pub fn full_path(&self) -> PathPattern {
        self.base.join(self.spec.path())
    }
}

/// Flattened tree, in depth-first declaration order.
#[derive(Debug, Clone, Default)]
pub struct FlatRoutes {
    routes: Vec<FlatRoute>,
}

impl FlatRoutes {
    pub fn iter(&self) -> impl Iterator<Item = &FlatRoute> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&FlatRoute> {
        self.routes.iter().find(|r| r.key == key)
    }

    /// Routes grouped by base path, groups and members in declaration order.
    pub fn by_base(&self) -> Vec<(PathPattern, Vec<&FlatRoute>)> {
        let mut groups: Vec<(PathPattern, Vec<&FlatRoute>)> = Vec::new();
        for route in &self.routes {
            match groups.iter_mut().find(|(base, _)| *base == route.base) {
                Some((_, members)) => members.push(route),
                None => groups.push((route.base.clone(), vec![route])),
            }
        }
        groups
    }

    /// Rebuild the namespace tree from the joined keys.
    pub fn nest(&self) -> Namespace {
        let mut root = Namespace::new();
        for route in &self.routes {
            let parts: Vec<&str> = route.key.split(SEPARATOR).collect();
            insert(&mut root, &parts, route.spec.clone());
        }
        root
    }
}

fn insert(ns: &mut Namespace, parts: &[&str], spec: Arc<ControllerSpec>) {
    let Some((head, rest)) = parts.split_first() else {
        return;
    };
    if rest.is_empty() {
        ns.entries.push((head.to_string(), RouterNode::Leaf(spec)));
        return;
    }
    let idx = match ns
        .entries
        .iter()
        .position(|(k, n)| k == head && matches!(n, RouterNode::Namespace(_)))
    {
        Some(idx) => idx,
        None => {
            ns.entries
                .push((head.to_string(), RouterNode::Namespace(Namespace::new())));
            ns.entries.len() - 1
        }
    };
    if let RouterNode::Namespace(child) = &mut ns.entries[idx].1 {
        insert(child, rest, spec);
    }
}
