//! Registry Key Structures
//!
//! Keys are hierarchical containers that hold values and subkeys. Names are
//! compared case-insensitively and keep the case they were created with.
//!
//! Keys live in a [`KeyPool`] and refer to each other by index. Freeing a
//! key bumps its generation, so handles still pointing at the slot can tell
//! that their key was deleted.

use crate::path::Subpath;
use crate::value::PropertyValue;

bitflags::bitflags! {
    /// Key flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeyFlags: u32 {
        /// Key is in use
        const IN_USE = 0x0001;
        /// Key is volatile (not persisted)
        const VOLATILE = 0x0002;
        /// Key is a hive root
        const HIVE_ROOT = 0x0020;
        /// Key has been modified
        const DIRTY = 0x0040;
        /// Hive root loaded from a file
        const MOUNTED = 0x0080;
    }
}

/// A named value stored under a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub name: String,
    pub data: PropertyValue,
}

/// Registry key node
#[derive(Debug, Clone, Default)]
pub struct KeyNode {
    pub name: String,
    pub flags: KeyFlags,
    /// Parent key index (`None` for a store root)
    pub parent: Option<usize>,
    /// Bumped each time the slot is freed
    pub generation: u32,
    pub subkeys: Vec<usize>,
    pub values: Vec<KeyValue>,
}

impl KeyNode {
    pub fn new(name: &str, parent: Option<usize>, flags: KeyFlags) -> Self {
        Self {
            name: name.to_string(),
            flags: flags | KeyFlags::IN_USE,
            parent,
            ..Self::default()
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.flags.contains(KeyFlags::IN_USE)
    }

    pub fn is_volatile(&self) -> bool {
        self.flags.contains(KeyFlags::VOLATILE)
    }

    pub fn is_hive_root(&self) -> bool {
        self.flags.contains(KeyFlags::HIVE_ROOT)
    }

    /// Add a value, replacing one with the same name
    pub fn set_value(&mut self, name: &str, data: PropertyValue) {
        self.flags |= KeyFlags::DIRTY;
        match self.find_value_mut(name) {
            Some(existing) => existing.data = data,
            None => self.values.push(KeyValue {
                name: name.to_string(),
                data,
            }),
        }
    }

    /// Remove a value by name
    pub fn remove_value(&mut self, name: &str) -> bool {
        let before = self.values.len();
        self.values.retain(|v| !v.name.eq_ignore_ascii_case(name));
        let removed = self.values.len() != before;
        if removed {
            self.flags |= KeyFlags::DIRTY;
        }
        removed
    }

    /// Find a value by name
    pub fn find_value(&self, name: &str) -> Option<&KeyValue> {
        self.values.iter().find(|v| v.name.eq_ignore_ascii_case(name))
    }

    pub fn find_value_mut(&mut self, name: &str) -> Option<&mut KeyValue> {
        self.values.iter_mut().find(|v| v.name.eq_ignore_ascii_case(name))
    }
}

/// Detached copy of a key subtree
///
/// Used to snapshot a subtree before merging it elsewhere and to hold the
/// contents of hive files that are not mounted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyTree {
    pub values: Vec<KeyValue>,
    pub subkeys: Vec<(String, KeyTree)>,
}

impl KeyTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: &str, data: PropertyValue) -> Self {
        self.values.push(KeyValue {
            name: name.to_string(),
            data,
        });
        self
    }

    pub fn subkey(mut self, name: &str, tree: KeyTree) -> Self {
        self.subkeys.push((name.to_string(), tree));
        self
    }

    /// Number of keys in the tree, this one included
    pub fn key_count(&self) -> usize {
        1 + self.subkeys.iter().map(|(_, t)| t.key_count()).sum::<usize>()
    }
}

// ============================================================================
// Key Pool
// ============================================================================

/// Growable pool of key nodes with slot reuse
#[derive(Debug, Default)]
pub struct KeyPool {
    keys: Vec<KeyNode>,
    free: Vec<usize>,
}

impl KeyPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a key from the pool
    pub fn allocate(&mut self, node: KeyNode) -> usize {
        match self.free.pop() {
            Some(index) => {
                let generation = self.keys[index].generation;
                self.keys[index] = KeyNode { generation, ..node };
                index
            }
            None => {
                self.keys.push(node);
                self.keys.len() - 1
            }
        }
    }

    /// Free a key back to the pool
    fn free_one(&mut self, index: usize) {
        if let Some(key) = self.keys.get_mut(index) {
            let generation = key.generation.wrapping_add(1);
            *key = KeyNode {
                generation,
                ..KeyNode::default()
            };
            self.free.push(index);
        }
    }

    /// Get a key by index
    pub fn get(&self, index: usize) -> Option<&KeyNode> {
        self.keys.get(index).filter(|k| k.is_in_use())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut KeyNode> {
        self.keys.get_mut(index).filter(|k| k.is_in_use())
    }

    /// Whether `index` still holds the key of `generation`
    pub fn is_live(&self, index: usize, generation: u32) -> bool {
        self.get(index).is_some_and(|k| k.generation == generation)
    }

    /// Find a direct subkey by name
    pub fn find_subkey(&self, parent: usize, name: &str) -> Option<usize> {
        let parent = self.get(parent)?;
        parent
            .subkeys
            .iter()
            .copied()
            .find(|&idx| self.get(idx).is_some_and(|k| k.name.eq_ignore_ascii_case(name)))
    }

    /// Walk `subpath` down from `start`
    pub fn lookup(&self, start: usize, subpath: &Subpath) -> Option<usize> {
        subpath
            .segments()
            .try_fold(start, |current, segment| self.find_subkey(current, segment))
    }

    /// Create a subkey under a parent
    pub fn add_subkey(&mut self, parent: usize, name: &str, flags: KeyFlags) -> Option<usize> {
        self.get(parent)?;
        let index = self.allocate(KeyNode::new(name, Some(parent), flags));
        let parent = self.get_mut(parent)?;
        parent.subkeys.push(index);
        parent.flags |= KeyFlags::DIRTY;
        Some(index)
    }

    /// Detach and free a key with its whole subtree
    pub fn free_subtree(&mut self, index: usize) {
        let parent = self.get(index).and_then(|k| k.parent);
        if let Some(parent) = parent.and_then(|p| self.get_mut(p)) {
            parent.subkeys.retain(|&s| s != index);
            parent.flags |= KeyFlags::DIRTY;
        }

        let mut pending = vec![index];
        while let Some(current) = pending.pop() {
            if let Some(key) = self.get(current) {
                pending.extend(key.subkeys.iter().copied());
            }
            self.free_one(current);
        }
    }

    /// Fully qualified name, segments joined from the store root down
    pub fn full_name(&self, index: usize) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = Some(index);
        while let Some(idx) = current {
            let key = self.get(idx)?;
            segments.push(key.name.as_str());
            current = key.parent;
        }
        segments.reverse();
        Some(segments.join("\\"))
    }

    /// Whether `index` lies in the subtree rooted at `ancestor`
    pub fn is_within(&self, index: usize, ancestor: usize) -> bool {
        let mut current = Some(index);
        while let Some(idx) = current {
            if idx == ancestor {
                return true;
            }
            current = self.get(idx).and_then(|k| k.parent);
        }
        false
    }

    /// Copy out the subtree rooted at `index`
    pub fn snapshot(&self, index: usize) -> Option<KeyTree> {
        let key = self.get(index)?;
        let mut tree = KeyTree {
            values: key.values.clone(),
            subkeys: Vec::with_capacity(key.subkeys.len()),
        };
        for &child in &key.subkeys {
            if let (Some(node), Some(subtree)) = (self.get(child), self.snapshot(child)) {
                tree.subkeys.push((node.name.clone(), subtree));
            }
        }
        Some(tree)
    }

    /// Merge a tree into `index`
    ///
    /// Same-named values are overwritten, same-named subkeys merged, and
    /// entries that only exist under `index` are left alone. New subkeys
    /// inherit the volatility of their parent.
    pub fn merge(&mut self, index: usize, tree: &KeyTree) -> Option<()> {
        let key = self.get_mut(index)?;
        for value in &tree.values {
            key.set_value(&value.name, value.data.clone());
        }
        let inherited = key.flags & KeyFlags::VOLATILE;

        for (name, subtree) in &tree.subkeys {
            let child = match self.find_subkey(index, name) {
                Some(existing) => existing,
                None => self.add_subkey(index, name, inherited)?,
            };
            self.merge(child, subtree)?;
        }
        Some(())
    }

    /// Number of keys in use
    pub fn len(&self) -> usize {
        self.keys.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
