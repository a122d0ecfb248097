//! Grammatical types
//!
//! Types of the factorization grammar are nominal tags: they carry a display
//! name and a set of base types, and nothing else. They only serve to match
//! the return type of a primitive against the input types of another one.
//!
//! Types are minted by a [`TypeRegistry`] and referred to through stable
//! [`TypeId`] indices. A type is a subtype of itself and of every base it
//! inherits, transitively. A primitive that accepts `T` also accepts any
//! subtype of `T`.
use std::collections::BTreeSet;

use log::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A stable reference to a type stored inside a [`TypeRegistry`].
///
/// Identifiers are tagged with the registry that minted them, so an id from
/// another registry is never mistaken for a local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId {
    registry: Uuid,
    index: u32,
}

impl TypeId {
    /// Index of the type inside its registry.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

#[derive(Debug, Clone)]
struct TypeEntry {
    name: String,
    bases: Vec<TypeId>,
    /// Reflexive-transitive closure of `bases`, the type itself included.
    ancestors: BTreeSet<TypeId>,
}

/// A registry minting nominal grammar types.
///
/// Example:
///
/// ```rust
/// # use hygrammar::types::TypeRegistry;
/// let mut reg = TypeRegistry::new();
/// let tensor = reg.new_type(Some("Tensor"), &[]).unwrap();
/// let matrix = reg.new_type(Some("Matrix"), &[tensor]).unwrap();
/// assert!(reg.is_subtype(matrix, tensor));
/// assert!(!reg.is_subtype(tensor, matrix));
/// assert_eq!(reg.name(matrix), Some("Matrix"));
/// ```
///
/// Clones share the identity of the original: ids minted before the clone
/// are valid in both.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    id: Uuid,
    entries: Vec<TypeEntry>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            entries: Vec::new(),
        }
    }

    fn make_id(&self, index: usize) -> TypeId {
        TypeId {
            registry: self.id,
            index: index as u32,
        }
    }

    /// Mint a fresh nominal type.
    ///
    /// When `name` is `None`, a globally unique name of the form
    /// `type<hex>` is generated. Every base must have been minted by this
    /// registry.
    pub fn new_type(&mut self, name: Option<&str>, bases: &[TypeId]) -> Result<TypeId> {
        let mut ancestors = BTreeSet::new();
        for base in bases {
            let entry = self.entry(*base).ok_or(Error::UnknownType(*base))?;
            ancestors.extend(entry.ancestors.iter().copied());
        }

        let id = self.make_id(self.entries.len());
        ancestors.insert(id);

        let name = match name {
            Some(name) => name.to_string(),
            None => format!("type{}", Uuid::new_v4().simple()),
        };

        debug!(
            "New grammatical type `{}` registered as {} with bases [{}].",
            name,
            id,
            bases
                .iter()
                .map(|b| self.fmt(*b).to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        self.entries.push(TypeEntry {
            name,
            bases: bases.to_vec(),
            ancestors,
        });
        Ok(id)
    }

    fn entry(&self, id: TypeId) -> Option<&TypeEntry> {
        if id.registry != self.id {
            return None;
        }
        self.entries.get(id.index())
    }

    /// Whether `id` was minted by this registry.
    pub fn contains(&self, id: TypeId) -> bool {
        self.entry(id).is_some()
    }

    /// Display name of a type.
    pub fn name(&self, id: TypeId) -> Option<&str> {
        self.entry(id).map(|e| e.name.as_str())
    }

    /// Direct bases of a type.
    pub fn bases(&self, id: TypeId) -> &[TypeId] {
        self.entry(id).map(|e| e.bases.as_slice()).unwrap_or_default()
    }

    /// All types `id` is a subtype of, itself included, in ascending order.
    pub fn ancestors(&self, id: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        self.entry(id).into_iter().flat_map(|e| e.ancestors.iter().copied())
    }

    /// Whether `sub` is `sup` or inherits from it (transitively).
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        self.entry(sub).is_some_and(|e| e.ancestors.contains(&sup))
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over every registered type id.
    pub fn iter(&self) -> impl Iterator<Item = TypeId> + '_ {
        (0..self.entries.len()).map(|i| self.make_id(i))
    }

    /// Format a given [`TypeId`] using this registry.
    pub fn fmt(&self, id: TypeId) -> impl std::fmt::Display + '_ {
        struct Fmt<'a> {
            registry: &'a TypeRegistry,
            id: TypeId,
        }

        impl std::fmt::Display for Fmt<'_> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self.registry.name(self.id) {
                    Some(name) => f.write_str(name),
                    None => write!(f, "<unknown type {}>", self.id),
                }
            }
        }

        Fmt { registry: self, id }
    }
}
