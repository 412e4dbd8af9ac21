//! List indexed by both numeric id and name

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::error::{Error, Result};

/// Entry that can be stored in a [`SearchableList`]
pub trait Keyed {
    type Id: Copy + Eq + Hash + fmt::LowerHex + fmt::Debug;

    fn id(&self) -> Self::Id;
    fn name(&self) -> &str;
}

/// Insertion-ordered list with unique ids and unique names
#[derive(Debug, Clone)]
pub struct SearchableList<T: Keyed> {
    items: Vec<T>,
    by_id: HashMap<T::Id, usize>,
    by_name: HashMap<String, usize>,
}

impl<T: Keyed> Default for SearchableList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }
}

impl<T: Keyed> SearchableList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item; a duplicate id or name is rejected and the list is left unchanged
    pub fn add(&mut self, item: T) -> Result<()> {
        if let Some(&existing) = self.by_id.get(&item.id()) {
            return Err(Error::schema(format!(
                "duplicate id 0x{:x}: '{}' conflicts with '{}'",
                item.id(),
                item.name(),
                self.items[existing].name()
            )));
        }
        if self.by_name.contains_key(item.name()) {
            return Err(Error::schema(format!(
                "duplicate name '{}' (id 0x{:x})",
                item.name(),
                item.id()
            )));
        }

        let index = self.items.len();
        self.by_id.insert(item.id(), index);
        self.by_name.insert(item.name().to_string(), index);
        self.items.push(item);
        Ok(())
    }

    pub fn by_id(&self, id: T::Id) -> Option<&T> {
        self.by_id.get(&id).map(|&i| &self.items[i])
    }

    pub fn by_name(&self, name: &str) -> Option<&T> {
        self.by_name.get(name).map(|&i| &self.items[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a, T: Keyed> IntoIterator for &'a SearchableList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
