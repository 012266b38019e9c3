//! Flattens a [`Node`] tree into the engine's wire [`Expression`] format.
//!
//! Every function invocation is hoisted into the expression's value
//! table and referenced by id; constants, arrays and dictionaries stay
//! inline. Structurally identical invocations share one id, so a
//! composite used by five downstream reductions is sent once.
//!
//! Ids are assigned in post-order (arguments before the call that uses
//! them) and argument maps are sorted, which makes the output a pure
//! function of the graph: building the same graph twice produces
//! byte-identical JSON and the same [`digest`].

use std::collections::{BTreeMap, HashMap};

use greenspace_engine_models::{Expression, ValueNode};
use sha2::{Digest as _, Sha256};

use crate::expr::{Node, NodeKind};

/// Serializes `root` into an [`Expression`].
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if a node cannot be encoded as JSON.
pub fn to_expression(root: &Node) -> Result<Expression, serde_json::Error> {
    let mut state = Flattener::default();
    let top = state.visit(root)?;

    let result = match top {
        ValueNode::ValueReference(id) => id,
        inline => state.intern(inline)?,
    };

    Ok(Expression {
        values: state.values,
        result,
    })
}

/// Returns the hex SHA-256 of the expression's canonical JSON encoding.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if the expression cannot be encoded.
pub fn digest(expression: &Expression) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(expression)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[derive(Default)]
struct Flattener {
    values: BTreeMap<String, ValueNode>,
    /// Canonical JSON of an interned node -> its id.
    ids: HashMap<String, String>,
}

impl Flattener {
    fn visit(&mut self, node: &Node) -> Result<ValueNode, serde_json::Error> {
        match node.kind() {
            NodeKind::Constant(value) => Ok(ValueNode::ConstantValue(value.clone())),
            NodeKind::Array(items) => Ok(ValueNode::ArrayValue {
                values: items
                    .iter()
                    .map(|item| self.visit(item))
                    .collect::<Result<_, _>>()?,
            }),
            NodeKind::Dictionary(entries) => Ok(ValueNode::DictionaryValue {
                values: self.visit_map(entries)?,
            }),
            NodeKind::Invocation {
                function,
                arguments,
            } => {
                let call = ValueNode::FunctionInvocationValue {
                    function_name: function.clone(),
                    arguments: self.visit_map(arguments)?,
                };
                Ok(ValueNode::ValueReference(self.intern(call)?))
            }
        }
    }

    fn visit_map(
        &mut self,
        entries: &BTreeMap<String, Node>,
    ) -> Result<BTreeMap<String, ValueNode>, serde_json::Error> {
        entries
            .iter()
            .map(|(key, value)| -> Result<_, serde_json::Error> {
                Ok((key.clone(), self.visit(value)?))
            })
            .collect()
    }

    /// Stores `node` in the value table, reusing the id of an identical
    /// node if one was stored before.
    fn intern(&mut self, node: ValueNode) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_string(&node)?;
        if let Some(id) = self.ids.get(&canonical) {
            return Ok(id.clone());
        }

        let id = self.values.len().to_string();
        self.values.insert(id.clone(), node);
        self.ids.insert(canonical, id.clone());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landsat() -> Node {
        Node::invoke(
            "ImageCollection.load",
            [("id", Node::from("LANDSAT/LC08/C02/T1"))],
        )
    }

    #[test]
    fn shared_subgraphs_are_emitted_once() {
        let mosaic = Node::invoke("ImageCollection.mosaic", [("collection", landsat())]);
        // Two independent clones of the same structure.
        let a = Node::invoke("Image.not", [("value", mosaic.clone())]);
        let b = Node::invoke("Image.not", [("value", mosaic)]);
        let both = Node::invoke("Image.multiply", [("image1", a), ("image2", b)]);

        let expr = to_expression(&both).unwrap();

        // load, mosaic, not, multiply
        assert_eq!(expr.values.len(), 4);
        assert_eq!(expr.result, "3");
        assert!(matches!(
            &expr.values["0"],
            ValueNode::FunctionInvocationValue { function_name, .. }
                if function_name == "ImageCollection.load"
        ));
    }

    #[test]
    fn inline_root_is_hoisted() {
        let root = Node::dictionary([("count", Node::invoke("Collection.size", [("collection", landsat())]))]);
        let expr = to_expression(&root).unwrap();

        assert!(matches!(
            &expr.values[&expr.result],
            ValueNode::DictionaryValue { values } if values.contains_key("count")
        ));
    }

    #[test]
    fn serialization_is_deterministic() {
        let build = || {
            Node::invoke(
                "Image.clip",
                [
                    ("input", Node::invoke("ImageCollection.mosaic", [("collection", landsat())])),
                    (
                        "geometry",
                        Node::invoke(
                            "GeometryConstructors.Point",
                            [("coordinates", Node::array([Node::from(1.5), Node::from(2.5)]))],
                        ),
                    ),
                ],
            )
        };

        let first = to_expression(&build()).unwrap();
        let second = to_expression(&build()).unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(digest(&first).unwrap(), digest(&second).unwrap());
        assert_eq!(digest(&first).unwrap().len(), 64);
    }

    #[test]
    fn different_graphs_have_different_digests() {
        let a = to_expression(&landsat()).unwrap();
        let b = to_expression(&Node::invoke(
            "ImageCollection.load",
            [("id", Node::from("LANDSAT/LC09/C02/T1"))],
        ))
        .unwrap();

        assert_ne!(digest(&a).unwrap(), digest(&b).unwrap());
    }
}
