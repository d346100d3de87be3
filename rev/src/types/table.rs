//! Per-node type annotations

use super::Type;
use crate::ast::NodeId;
use std::collections::HashMap;

/// Side table mapping each expression node to its resolved type.
/// Entries are written once and never changed afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeTable {
    types: HashMap<NodeId, Type>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the type of `id`. Returns false if the node was already
    /// annotated, in which case the first annotation is kept.
    pub fn record(&mut self, id: NodeId, ty: Type) -> bool {
        use std::collections::hash_map::Entry;
        match self.types.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(ty);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&Type> {
        self.types.get(&id)
    }

    /// Merge another table in; existing entries win
    pub fn extend(&mut self, other: TypeTable) {
        for (id, ty) in other.types {
            self.record(id, ty);
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
