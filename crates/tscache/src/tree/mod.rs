//! CacheTree - hierarchical namespace/structure/instance store.
//!
//! ```text
//! root
//! └── namespace            (no payload)
//!     └── structure        (payload: StructureDefinition)
//!         └── instance     (payload: OrderedTimeseries, leaf)
//! ```
//!
//! Every mutation validates identifiers and existence first and then applies
//! a single change, so a failed call leaves the tree untouched. Parents own
//! their children outright; renames detach a node and re-attach it under the
//! new key with its subtree and payload intact.

pub mod structure;

use crate::error::{CacheError, Result};
use crate::series::{OrderedTimeseries, Points, Timestamp};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

pub use structure::{canonicalize, StructureDefinition};

/// The kind of identifier or node an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Depth-1 grouping node.
    Namespace,
    /// Depth-2 node carrying a structure definition.
    Structure,
    /// Depth-3 leaf carrying a timeseries.
    Instance,
    /// The attribute list of a structure.
    Definition,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Namespace => "namespace",
            Self::Structure => "structure",
            Self::Instance => "instance",
            Self::Definition => "structure definition",
        };
        f.write_str(name)
    }
}

impl NodeKind {
    fn pattern(self) -> &'static Regex {
        static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
        static DEFINITION: OnceLock<Regex> = OnceLock::new();
        static INSTANCE: OnceLock<Regex> = OnceLock::new();

        match self {
            Self::Namespace | Self::Structure => IDENTIFIER.get_or_init(|| {
                Regex::new(r"^[A-Za-z0-9_]+$").expect("static identifier pattern")
            }),
            Self::Definition => DEFINITION.get_or_init(|| {
                Regex::new(r"^[A-Za-z0-9_,]+$").expect("static definition pattern")
            }),
            Self::Instance => INSTANCE.get_or_init(|| {
                Regex::new(r"^[A-Za-z0-9_,=]+$").expect("static instance pattern")
            }),
        }
    }

    /// Checks `id` against the character class of this kind.
    ///
    /// Definitions must additionally have no empty attribute names.
    pub fn validate(self, id: &str) -> Result<()> {
        let valid = self.pattern().is_match(id)
            && (self != Self::Definition || id.split(',').all(|name| !name.is_empty()));
        if valid {
            Ok(())
        } else {
            Err(CacheError::InvalidIdentifier {
                kind: self,
                id: id.to_string(),
            })
        }
    }
}

/// Payload carried by structure and instance nodes.
#[derive(Debug, Clone)]
pub enum Payload<V> {
    /// Structure node payload.
    Structure(StructureDefinition),
    /// Instance leaf payload.
    Timeseries(OrderedTimeseries<V>),
}

/// A named tree node with unbounded fan-out.
#[derive(Debug, Clone)]
pub struct Node<V> {
    name: String,
    payload: Option<Payload<V>>,
    children: HashMap<String, Node<V>>,
}

impl<V> Node<V> {
    fn new(name: impl Into<String>, payload: Option<Payload<V>>) -> Self {
        Self {
            name: name.into(),
            payload,
            children: HashMap::new(),
        }
    }

    /// Returns the node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the node payload, if any.
    pub fn payload(&self) -> Option<&Payload<V>> {
        self.payload.as_ref()
    }

    /// Returns the child with the given name.
    pub fn child(&self, name: &str) -> Option<&Node<V>> {
        self.children.get(name)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut Node<V>> {
        self.children.get_mut(name)
    }

    fn has_child(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    fn sorted_child_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.children.keys().cloned().collect();
        names.sort();
        names
    }

    fn attach(&mut self, node: Node<V>) {
        self.children.insert(node.name.clone(), node);
    }

    fn detach(&mut self, name: &str) -> Option<Node<V>> {
        self.children.remove(name)
    }

    /// Detaches `old` and re-attaches it as `new`. Returns false if `old` is absent.
    fn rename_child(&mut self, old: &str, new: &str) -> bool {
        let Some(mut node) = self.detach(old) else {
            return false;
        };
        node.name = new.to_string();
        if let Some(Payload::Structure(definition)) = node.payload.as_mut() {
            definition.rename(new);
        }
        self.attach(node);
        true
    }

    fn definition(&self) -> Option<&StructureDefinition> {
        match self.payload.as_ref()? {
            Payload::Structure(definition) => Some(definition),
            Payload::Timeseries(_) => None,
        }
    }

    fn series(&self) -> Option<&OrderedTimeseries<V>> {
        match self.payload.as_ref()? {
            Payload::Timeseries(series) => Some(series),
            Payload::Structure(_) => None,
        }
    }

    fn series_mut(&mut self) -> Option<&mut OrderedTimeseries<V>> {
        match self.payload.as_mut()? {
            Payload::Timeseries(series) => Some(series),
            Payload::Structure(_) => None,
        }
    }
}

fn structure_path(namespace: &str, structure: &str) -> String {
    format!("{namespace}.{structure}")
}

fn instance_path(namespace: &str, structure: &str, instance: &str) -> String {
    format!("{namespace}.{structure}.{instance}")
}

/// Hierarchical store of namespaces, structures and structure instances.
#[derive(Debug, Clone)]
pub struct CacheTree<V> {
    root: Node<V>,
}

impl<V> Default for CacheTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CacheTree<V> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            root: Node::new("", None),
        }
    }

    /// Returns the unnamed root node.
    pub fn root(&self) -> &Node<V> {
        &self.root
    }

    // ---------------------------------------------------------------------
    // Namespaces
    // ---------------------------------------------------------------------

    /// Adds an empty namespace.
    ///
    /// # Errors
    ///
    /// - `CacheError::InvalidIdentifier` unless `id` matches `[A-Za-z0-9_]+`
    /// - `CacheError::AlreadyExists` if the namespace exists
    pub fn add_namespace(&mut self, id: &str) -> Result<()> {
        NodeKind::Namespace.validate(id)?;
        if self.root.has_child(id) {
            return Err(CacheError::AlreadyExists {
                kind: NodeKind::Namespace,
                name: id.to_string(),
            });
        }

        self.root.attach(Node::new(id, None));
        debug!("Added namespace {}", id);
        Ok(())
    }

    /// Renames a namespace, keeping all structures and instances below it.
    pub fn rename_namespace(&mut self, old: &str, new: &str) -> Result<()> {
        NodeKind::Namespace.validate(old)?;
        self.namespace(old)?;
        NodeKind::Namespace.validate(new)?;
        if self.root.has_child(new) {
            return Err(CacheError::AlreadyExists {
                kind: NodeKind::Namespace,
                name: new.to_string(),
            });
        }

        self.root.rename_child(old, new);
        debug!("Renamed namespace {} to {}", old, new);
        Ok(())
    }

    /// Removes a namespace and everything beneath it.
    pub fn remove_namespace(&mut self, id: &str) -> Result<()> {
        NodeKind::Namespace.validate(id)?;
        let removed = self.root.detach(id).ok_or_else(|| CacheError::NotFound {
            kind: NodeKind::Namespace,
            name: id.to_string(),
        })?;

        debug!(
            "Removed namespace {} with {} structures",
            id,
            removed.children.len()
        );
        Ok(())
    }

    /// Returns the namespace names in sorted order.
    pub fn namespaces(&self) -> Vec<String> {
        self.root.sorted_child_names()
    }

    /// Returns true if the namespace exists.
    pub fn has_namespace(&self, id: &str) -> bool {
        self.root.has_child(id)
    }

    fn namespace(&self, id: &str) -> Result<&Node<V>> {
        self.root.child(id).ok_or_else(|| CacheError::NotFound {
            kind: NodeKind::Namespace,
            name: id.to_string(),
        })
    }

    fn namespace_mut(&mut self, id: &str) -> Result<&mut Node<V>> {
        self.root.child_mut(id).ok_or_else(|| CacheError::NotFound {
            kind: NodeKind::Namespace,
            name: id.to_string(),
        })
    }

    // ---------------------------------------------------------------------
    // Structures
    // ---------------------------------------------------------------------

    /// Adds a structure with an immutable attribute definition.
    ///
    /// # Errors
    ///
    /// - `CacheError::NotFound` if the namespace is missing
    /// - `CacheError::InvalidIdentifier` for a bad structure id or definition
    /// - `CacheError::AlreadyExists` if the structure exists in the namespace
    pub fn add_structure(&mut self, namespace: &str, id: &str, definition: &str) -> Result<()> {
        let ns = self.namespace_mut(namespace)?;
        NodeKind::Structure.validate(id)?;
        if ns.has_child(id) {
            return Err(CacheError::AlreadyExists {
                kind: NodeKind::Structure,
                name: structure_path(namespace, id),
            });
        }
        NodeKind::Definition.validate(definition)?;

        let definition = StructureDefinition::new(id, definition);
        debug!(
            "Added structure {} ({})",
            structure_path(namespace, id),
            definition.canonical()
        );
        ns.attach(Node::new(id, Some(Payload::Structure(definition))));
        Ok(())
    }

    /// Renames a structure. Its definition and instances are kept.
    pub fn rename_structure(&mut self, namespace: &str, old: &str, new: &str) -> Result<()> {
        let ns = self.namespace_mut(namespace)?;
        NodeKind::Structure.validate(old)?;
        if !ns.has_child(old) {
            return Err(CacheError::NotFound {
                kind: NodeKind::Structure,
                name: structure_path(namespace, old),
            });
        }
        NodeKind::Structure.validate(new)?;
        if ns.has_child(new) {
            return Err(CacheError::AlreadyExists {
                kind: NodeKind::Structure,
                name: structure_path(namespace, new),
            });
        }

        ns.rename_child(old, new);
        debug!(
            "Renamed structure {} to {}",
            structure_path(namespace, old),
            new
        );
        Ok(())
    }

    /// Removes a structure and all of its instances.
    pub fn remove_structure(&mut self, namespace: &str, id: &str) -> Result<()> {
        let ns = self.namespace_mut(namespace)?;
        NodeKind::Structure.validate(id)?;
        let removed = ns.detach(id).ok_or_else(|| CacheError::NotFound {
            kind: NodeKind::Structure,
            name: structure_path(namespace, id),
        })?;

        debug!(
            "Removed structure {} with {} instances",
            structure_path(namespace, id),
            removed.children.len()
        );
        Ok(())
    }

    /// Returns the definitions of all structures in a namespace, sorted by name.
    pub fn structures(&self, namespace: &str) -> Result<Vec<StructureDefinition>> {
        let ns = self.namespace(namespace)?;
        let definitions = ns
            .sorted_child_names()
            .iter()
            .filter_map(|name| ns.child(name)?.definition().cloned())
            .collect();
        Ok(definitions)
    }

    /// Returns the definition of one structure.
    pub fn structure_definition(&self, namespace: &str, id: &str) -> Result<&StructureDefinition> {
        self.structure(namespace, id)?
            .definition()
            .ok_or_else(|| CacheError::NotFound {
                kind: NodeKind::Structure,
                name: structure_path(namespace, id),
            })
    }

    fn structure(&self, namespace: &str, id: &str) -> Result<&Node<V>> {
        self.namespace(namespace)?
            .child(id)
            .ok_or_else(|| CacheError::NotFound {
                kind: NodeKind::Structure,
                name: structure_path(namespace, id),
            })
    }

    fn structure_mut(&mut self, namespace: &str, id: &str) -> Result<&mut Node<V>> {
        self.namespace_mut(namespace)?
            .child_mut(id)
            .ok_or_else(|| CacheError::NotFound {
                kind: NodeKind::Structure,
                name: structure_path(namespace, id),
            })
    }

    // ---------------------------------------------------------------------
    // Structure instances
    // ---------------------------------------------------------------------

    /// Adds an instance leaf holding `series` (empty if `None`).
    ///
    /// # Errors
    ///
    /// - `CacheError::NotFound` if the namespace or structure is missing
    /// - `CacheError::InvalidIdentifier` unless the key matches `[A-Za-z0-9_,=]+`
    /// - `CacheError::AlreadyExists` if the instance exists
    /// - `CacheError::StructureMismatch` if the key's attributes differ from the definition
    pub fn add_structure_instance(
        &mut self,
        namespace: &str,
        structure: &str,
        instance: &str,
        series: Option<OrderedTimeseries<V>>,
    ) -> Result<()> {
        let st = self.structure_mut(namespace, structure)?;
        NodeKind::Instance.validate(instance)?;
        if st.has_child(instance) {
            return Err(CacheError::AlreadyExists {
                kind: NodeKind::Instance,
                name: instance_path(namespace, structure, instance),
            });
        }

        let definition = st.definition().ok_or_else(|| CacheError::NotFound {
            kind: NodeKind::Structure,
            name: structure_path(namespace, structure),
        })?;
        if !definition.matches(instance) {
            return Err(CacheError::StructureMismatch {
                instance: instance.to_string(),
                definition: definition.canonical(),
            });
        }

        let series = series.unwrap_or_default();
        debug!(
            "Added instance {} with {} points",
            instance_path(namespace, structure, instance),
            series.size()
        );
        st.attach(Node::new(instance, Some(Payload::Timeseries(series))));
        Ok(())
    }

    /// Removes an instance and its timeseries.
    pub fn remove_structure_instance(
        &mut self,
        namespace: &str,
        structure: &str,
        instance: &str,
    ) -> Result<()> {
        let st = self.structure_mut(namespace, structure)?;
        NodeKind::Instance.validate(instance)?;
        st.detach(instance).ok_or_else(|| CacheError::NotFound {
            kind: NodeKind::Instance,
            name: instance_path(namespace, structure, instance),
        })?;

        debug!(
            "Removed instance {}",
            instance_path(namespace, structure, instance)
        );
        Ok(())
    }

    /// Returns the instance keys of a structure in sorted order.
    pub fn instances(&self, namespace: &str, structure: &str) -> Result<Vec<String>> {
        Ok(self.structure(namespace, structure)?.sorted_child_names())
    }

    // ---------------------------------------------------------------------
    // Timeseries access
    // ---------------------------------------------------------------------

    /// Returns the timeseries of an instance.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::PathNotFound` if any path segment is missing.
    pub fn get_timeseries(
        &self,
        namespace: &str,
        structure: &str,
        instance: &str,
    ) -> Result<&OrderedTimeseries<V>> {
        self.root
            .child(namespace)
            .and_then(|ns| ns.child(structure))
            .and_then(|st| st.child(instance))
            .and_then(Node::series)
            .ok_or_else(|| CacheError::PathNotFound(instance_path(namespace, structure, instance)))
    }

    /// Applies `f` to the timeseries of an instance.
    ///
    /// The closure's own validation decides whether the series changes; the
    /// tree shape is never modified.
    pub fn update_timeseries<T>(
        &mut self,
        namespace: &str,
        structure: &str,
        instance: &str,
        f: impl FnOnce(&mut OrderedTimeseries<V>) -> Result<T>,
    ) -> Result<T> {
        let series = self
            .root
            .child_mut(namespace)
            .and_then(|ns| ns.child_mut(structure))
            .and_then(|st| st.child_mut(instance))
            .and_then(Node::series_mut)
            .ok_or_else(|| {
                CacheError::PathNotFound(instance_path(namespace, structure, instance))
            })?;
        f(series)
    }
}

impl<V: Clone> CacheTree<V> {
    /// Returns the points of an instance in `[from, to]`.
    pub fn get_timeseries_between(
        &self,
        namespace: &str,
        structure: &str,
        instance: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Points<V>> {
        Ok(self
            .get_timeseries(namespace, structure, instance)?
            .range_between(from, to))
    }

    /// Returns the points of an instance in `[from, last]`.
    pub fn get_timeseries_from(
        &self,
        namespace: &str,
        structure: &str,
        instance: &str,
        from: Timestamp,
    ) -> Result<Points<V>> {
        self.get_timeseries(namespace, structure, instance)?
            .range_from(from)
    }

    /// Returns the points of an instance in `[first, to]`.
    pub fn get_timeseries_to(
        &self,
        namespace: &str,
        structure: &str,
        instance: &str,
        to: Timestamp,
    ) -> Result<Points<V>> {
        self.get_timeseries(namespace, structure, instance)?
            .range_to(to)
    }
}
