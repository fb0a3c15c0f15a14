//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd Team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # Zidef Field Tree Module
//!
//! Assembles flat `(path, value, guard)` placements into a nested field tree
//! for the CUE generator. Paths sharing a prefix share nodes, so the tree
//! shape depends only on the set of paths; insertion order decides child
//! order and nothing else.
//!
//! ## Path Grammar
//!
//! - `spec.replicas`: plain fields
//! - `spec.containers[0].image`: `containers` becomes an array node with an
//!   index child `0`
//! - `metadata.labels[app.oam.dev/name]`: a quoted map-key child under
//!   `labels`; dots inside brackets do not split

use indexmap::IndexMap;

use crate::errors::Result;
use crate::expr::{ZiCondition, ZiValue};
use crate::path::{ZiFieldPath, ZiPathAccess};
use crate::render::ZiOutputOp;

/// Child address inside a [`ZiFieldNode`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ZiChildKey {
    Field(String),
    Index(usize),
    MapKey(String),
}

/// A guarded value attached to a node.
#[derive(Clone, Debug, PartialEq)]
pub struct ZiGuarded<T> {
    pub guard: Option<ZiCondition>,
    pub value: T,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ZiPatchKey {
    pub guard: Option<ZiCondition>,
    pub key: String,
    pub elements: Vec<ZiValue>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZiFieldNode {
    values: Vec<ZiGuarded<ZiValue>>,
    children: IndexMap<ZiChildKey, ZiFieldNode>,
    array: bool,
    spreads: Vec<ZiGuarded<ZiValue>>,
    for_each: Option<ZiGuarded<ZiValue>>,
    patch_key: Option<ZiPatchKey>,
}

impl ZiFieldNode {
    pub fn values(&self) -> &[ZiGuarded<ZiValue>] {
        &self.values
    }

    pub fn children(&self) -> &IndexMap<ZiChildKey, ZiFieldNode> {
        &self.children
    }

    pub fn child(&self, key: &ZiChildKey) -> Option<&ZiFieldNode> {
        self.children.get(key)
    }

    pub fn is_array(&self) -> bool {
        self.array
    }

    pub fn spreads(&self) -> &[ZiGuarded<ZiValue>] {
        &self.spreads
    }

    pub fn for_each(&self) -> Option<&ZiGuarded<ZiValue>> {
        self.for_each.as_ref()
    }

    pub fn patch_key(&self) -> Option<&ZiPatchKey> {
        self.patch_key.as_ref()
    }

    /// True when the node carries nothing but its children.
    pub fn is_plain(&self) -> bool {
        self.values.is_empty()
            && self.spreads.is_empty()
            && self.for_each.is_none()
            && self.patch_key.is_none()
            && !self.array
    }

    /// Values with the guard under which each one is the last write that
    /// applies. A later write's guard is negated into every earlier guard and
    /// values shadowed by a later unguarded write are dropped, so at most one
    /// of the returned guards holds for any input.
    pub fn last_writes(&self) -> Vec<ZiGuarded<&ZiValue>> {
        let mut out = Vec::new();
        for (index, slot) in self.values.iter().enumerate() {
            let later = &self.values[index + 1..];
            if later.iter().any(|slot| slot.guard.is_none()) {
                continue;
            }
            let mut parts: Vec<ZiCondition> = slot.guard.iter().cloned().collect();
            parts.extend(later.iter().filter_map(|slot| slot.guard.clone()).map(ZiCondition::negate));
            let guard = match parts.len() {
                0 | 1 => parts.pop(),
                _ => Some(ZiCondition::And(parts)),
            };
            out.push(ZiGuarded {
                guard,
                value: &slot.value,
            });
        }
        out
    }

    /// A repeated guard moves to the end, keeping values in write order.
    fn set_value(&mut self, guard: Option<ZiCondition>, value: ZiValue) {
        self.values.retain(|slot| slot.guard != guard);
        self.values.push(ZiGuarded { guard, value });
    }

    fn child_mut(&mut self, key: ZiChildKey) -> &mut ZiFieldNode {
        self.children.entry(key).or_default()
    }
}

/// Nested field tree with a record-shaped root.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZiFieldTree {
    root: ZiFieldNode,
}

impl ZiFieldTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from output operations, folding nested `IfBlock` guards
    /// into each placement with `And`.
    pub fn build(ops: &[ZiOutputOp]) -> Result<Self> {
        let mut tree = Self::new();
        tree.add_ops(ops, None)?;
        log::debug!("assembled field tree with {} top-level field(s)", tree.root.children.len());
        Ok(tree)
    }

    fn add_ops(&mut self, ops: &[ZiOutputOp], outer: Option<&ZiCondition>) -> Result<()> {
        for op in ops {
            let scoped = |guard: Option<&ZiCondition>| ZiCondition::combine(outer.cloned(), guard.cloned());
            match op {
                ZiOutputOp::Set { path, value } => self.insert(path, value.clone(), scoped(None))?,
                ZiOutputOp::SetIf { path, value, guard } => self.insert(path, value.clone(), scoped(Some(guard)))?,
                ZiOutputOp::SpreadIf { path, value, guard } => {
                    self.insert_spread(path, value.clone(), scoped(guard.as_ref()))?
                }
                ZiOutputOp::ForEach { path, source, guard } => {
                    self.insert_for_each(path, source.clone(), scoped(guard.as_ref()))?
                }
                ZiOutputOp::PatchKey {
                    path,
                    key,
                    elements,
                    guard,
                } => self.insert_patch_key(path, key, elements.clone(), scoped(guard.as_ref()))?,
                ZiOutputOp::IfBlock { guard, ops } => {
                    let combined = scoped(Some(guard));
                    self.add_ops(ops, combined.as_ref())?;
                }
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &ZiFieldNode {
        &self.root
    }

    /// Places `value` at `path`. An identical guard replaces the earlier value.
    pub fn insert(&mut self, path: &str, value: ZiValue, guard: Option<ZiCondition>) -> Result<()> {
        self.node_mut(path)?.set_value(guard, value);
        Ok(())
    }

    /// Embeds a record-valued expression into the node at `path`.
    /// An empty path targets the root.
    pub fn insert_spread(&mut self, path: &str, value: ZiValue, guard: Option<ZiCondition>) -> Result<()> {
        let node = self.node_or_root(path)?;
        if !node.spreads.iter().any(|s| s.guard == guard && s.value == value) {
            node.spreads.push(ZiGuarded { guard, value });
        }
        Ok(())
    }

    pub fn insert_for_each(&mut self, path: &str, source: ZiValue, guard: Option<ZiCondition>) -> Result<()> {
        self.node_or_root(path)?.for_each = Some(ZiGuarded { guard, value: source });
        Ok(())
    }

    pub fn insert_patch_key(
        &mut self,
        path: &str,
        key: &str,
        elements: Vec<ZiValue>,
        guard: Option<ZiCondition>,
    ) -> Result<()> {
        self.node_mut(path)?.patch_key = Some(ZiPatchKey {
            guard,
            key: key.to_string(),
            elements,
        });
        Ok(())
    }

    /// Node at `path`, if one was created.
    pub fn node(&self, path: &str) -> Option<&ZiFieldNode> {
        let path = ZiFieldPath::parse(path).ok()?;
        let mut current = &self.root;
        for segment in path.segments() {
            current = current.children.get(&ZiChildKey::Field(segment.name.clone()))?;
            current = match &segment.access {
                ZiPathAccess::Field => current,
                ZiPathAccess::Index(index) => current.children.get(&ZiChildKey::Index(*index))?,
                ZiPathAccess::Key(key) => current.children.get(&ZiChildKey::MapKey(key.clone()))?,
            };
        }
        Some(current)
    }

    fn node_or_root(&mut self, path: &str) -> Result<&mut ZiFieldNode> {
        if path.is_empty() {
            Ok(&mut self.root)
        } else {
            self.node_mut(path)
        }
    }

    fn node_mut(&mut self, path: &str) -> Result<&mut ZiFieldNode> {
        let path = ZiFieldPath::parse(path)?;
        let mut current = &mut self.root;
        for segment in path.segments() {
            current = current.child_mut(ZiChildKey::Field(segment.name.clone()));
            current = match &segment.access {
                ZiPathAccess::Field => current,
                ZiPathAccess::Index(index) => {
                    current.array = true;
                    current.child_mut(ZiChildKey::Index(*index))
                }
                ZiPathAccess::Key(key) => current.child_mut(ZiChildKey::MapKey(key.clone())),
            };
        }
        Ok(current)
    }
}
