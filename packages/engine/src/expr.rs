//! Deferred expression nodes.
//!
//! A [`Node`] describes a server-side computation without running it.
//! Nodes are immutable and cheap to clone (reference counted), so one
//! intermediate result (a composite, a polygon) can feed any number of
//! downstream expressions. Identical subtrees are emitted once when the
//! graph is serialized (see [`crate::serialize`]).

use std::collections::BTreeMap;
use std::sync::Arc;

/// A node in a deferred computation graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node(Arc<NodeKind>);

/// The shape of a [`Node`].
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A JSON literal.
    Constant(serde_json::Value),
    /// An ordered list of nodes.
    Array(Vec<Node>),
    /// A string-keyed map of nodes.
    Dictionary(BTreeMap<String, Node>),
    /// A call to a named engine algorithm.
    Invocation {
        /// Algorithm name.
        function: String,
        /// Named arguments.
        arguments: BTreeMap<String, Node>,
    },
}

impl Node {
    /// A literal value.
    #[must_use]
    pub fn constant(value: impl Into<serde_json::Value>) -> Self {
        Self(Arc::new(NodeKind::Constant(value.into())))
    }

    /// The JSON `null` literal.
    #[must_use]
    pub fn null() -> Self {
        Self::constant(serde_json::Value::Null)
    }

    /// An array of nodes.
    #[must_use]
    pub fn array(items: impl IntoIterator<Item = Self>) -> Self {
        Self(Arc::new(NodeKind::Array(items.into_iter().collect())))
    }

    /// A dictionary of nodes.
    #[must_use]
    pub fn dictionary<K: Into<String>>(entries: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self(Arc::new(NodeKind::Dictionary(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    /// A call to `function` with named arguments.
    #[must_use]
    pub fn invoke<'a>(
        function: impl Into<String>,
        arguments: impl IntoIterator<Item = (&'a str, Self)>,
    ) -> Self {
        Self(Arc::new(NodeKind::Invocation {
            function: function.into(),
            arguments: arguments
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }))
    }

    /// Returns the node's shape.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.0
    }

    /// Returns the algorithm name if this node is an invocation.
    #[must_use]
    pub fn function_name(&self) -> Option<&str> {
        match self.kind() {
            NodeKind::Invocation { function, .. } => Some(function),
            _ => None,
        }
    }

    /// Returns a named argument if this node is an invocation.
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&Self> {
        match self.kind() {
            NodeKind::Invocation { arguments, .. } => arguments.get(name),
            _ => None,
        }
    }

    /// Returns the literal if this node is a constant.
    #[must_use]
    pub fn as_constant(&self) -> Option<&serde_json::Value> {
        match self.kind() {
            NodeKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Returns direct children in a stable order.
    fn children(&self) -> Vec<&Self> {
        match self.kind() {
            NodeKind::Constant(_) => Vec::new(),
            NodeKind::Array(items) => items.iter().collect(),
            NodeKind::Dictionary(entries) => entries.values().collect(),
            NodeKind::Invocation { arguments, .. } => arguments.values().collect(),
        }
    }

    /// Visits every node reachable from this one (depth first, parents
    /// before children). Shared subtrees are visited once per path.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Self)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Returns every invocation of `function` reachable from this node.
    #[must_use]
    pub fn find_invocations(&self, function: &str) -> Vec<&Self> {
        let mut found = Vec::new();
        self.walk(&mut |node| {
            if node.function_name() == Some(function) {
                found.push(node);
            }
        });
        found
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Self::constant(value)
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Self::constant(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Self::constant(value)
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Self::constant(value)
    }
}
