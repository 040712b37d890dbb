//! Category forests and family (descendant closure) resolution.
//!
//! Categories are loaded per profile into a [`CategoryForest`]: an arena of
//! nodes indexed by id, with explicit parent and children index lists.
//! Items only reach a category through their source, so filters widen a
//! category id to its family before matching sources.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;

use crate::app::{Result, TubeshelfError};
use crate::domain::{Category, CategoryUpdate, NewCategory};
use crate::store::Store;

/// Nesting materialised below each root by [`CategoryService::tree`].
pub const DEFAULT_TREE_DEPTH: usize = 2;

#[derive(Debug, Clone)]
struct Node {
    category: Category,
    parent: Option<usize>,
    children: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryForest {
    nodes: Vec<Node>,
    index: HashMap<i64, usize>,
    roots: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTree {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryTree>,
}

impl CategoryForest {
    /// Build a forest. Roots are categories without a parent; a category
    /// whose parent is not among `categories` is unreachable from any root.
    pub fn new(categories: Vec<Category>) -> Self {
        let mut forest = Self::default();

        for category in categories {
            forest.index.insert(category.id, forest.nodes.len());
            forest.nodes.push(Node {
                category,
                parent: None,
                children: Vec::new(),
            });
        }

        for idx in 0..forest.nodes.len() {
            match forest.nodes[idx].category.parent_id {
                None => forest.roots.push(idx),
                Some(parent_id) => {
                    if let Some(&parent) = forest.index.get(&parent_id) {
                        forest.nodes[idx].parent = Some(parent);
                        forest.nodes[parent].children.push(idx);
                    }
                }
            }
        }

        forest
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: i64) -> Option<&Category> {
        self.index.get(&id).map(|&idx| &self.nodes[idx].category)
    }

    /// The category itself plus every transitive descendant.
    ///
    /// Unknown ids yield a singleton containing just the id.
    pub fn family_ids(&self, id: i64) -> BTreeSet<i64> {
        let mut family = BTreeSet::new();
        family.insert(id);

        let Some(&start) = self.index.get(&id) else {
            return family;
        };

        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            for &child in &self.nodes[idx].children {
                if family.insert(self.nodes[child].category.id) {
                    stack.push(child);
                }
            }
        }

        family
    }

    /// True when `ancestor` lies on the parent chain of `id` (or is `id`).
    pub fn is_descendant_or_self(&self, id: i64, ancestor: i64) -> bool {
        let Some(mut idx) = self.index.get(&id).copied() else {
            return id == ancestor;
        };

        let mut steps = 0;
        loop {
            if self.nodes[idx].category.id == ancestor {
                return true;
            }
            match self.nodes[idx].parent {
                // Bounded walk keeps corrupted parent chains from looping
                Some(parent) if steps < self.nodes.len() => {
                    idx = parent;
                    steps += 1;
                }
                _ => return false,
            }
        }
    }

    /// Reject moving `id` under `new_parent` when that would form a cycle.
    pub fn validate_reparent(&self, id: i64, new_parent: i64) -> Result<()> {
        if self.is_descendant_or_self(new_parent, id) {
            return Err(TubeshelfError::Cycle {
                category_id: id,
                parent_id: new_parent,
            });
        }
        Ok(())
    }

    /// Nested trees under every root, `depth` levels deep.
    pub fn trees(&self, depth: usize) -> Vec<CategoryTree> {
        self.roots
            .iter()
            .map(|&root| self.subtree(root, depth))
            .collect()
    }

    fn subtree(&self, idx: usize, depth: usize) -> CategoryTree {
        let node = &self.nodes[idx];
        let children = if depth == 0 {
            Vec::new()
        } else {
            node.children
                .iter()
                .map(|&child| self.subtree(child, depth - 1))
                .collect()
        };

        CategoryTree {
            category: node.category.clone(),
            children,
        }
    }
}

pub struct CategoryService<S> {
    store: Arc<S>,
}

impl<S: Store> CategoryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Active categories of a profile.
    pub fn forest(&self, profile_id: i64) -> Result<CategoryForest> {
        Ok(CategoryForest::new(
            self.store.get_categories(profile_id, false)?,
        ))
    }

    pub fn tree(&self, profile_id: i64) -> Result<Vec<CategoryTree>> {
        self.tree_with_depth(profile_id, DEFAULT_TREE_DEPTH)
    }

    pub fn tree_with_depth(&self, profile_id: i64, depth: usize) -> Result<Vec<CategoryTree>> {
        Ok(self.forest(profile_id)?.trees(depth))
    }

    /// Family of a category within its profile's active forest.
    pub fn family_ids(&self, category_id: i64) -> Result<BTreeSet<i64>> {
        match self.store.get_category(category_id)? {
            Some(category) => Ok(self.forest(category.profile_id)?.family_ids(category_id)),
            None => Ok(BTreeSet::from([category_id])),
        }
    }

    pub fn create_category(
        &self,
        profile_id: i64,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<Category> {
        if let Some(parent_id) = parent_id {
            self.owned_category(profile_id, parent_id)?;
        }

        let id = self.store.add_category(&NewCategory {
            name: name.to_string(),
            parent_id,
            profile_id,
        })?;

        self.store
            .get_category(id)?
            .ok_or(TubeshelfError::CategoryNotFound(id))
    }

    pub fn update_category(
        &self,
        profile_id: i64,
        id: i64,
        update: &CategoryUpdate,
    ) -> Result<Category> {
        self.owned_category(profile_id, id)?;

        if let Some(Some(parent_id)) = update.parent_id {
            self.owned_category(profile_id, parent_id)?;
            // Inactive categories still count: re-activation must not expose a cycle
            let forest = CategoryForest::new(self.store.get_categories(profile_id, true)?);
            forest.validate_reparent(id, parent_id)?;
        }

        self.store.update_category(id, update)?;
        self.store
            .get_category(id)?
            .ok_or(TubeshelfError::CategoryNotFound(id))
    }

    /// Soft removal; sources and items are kept.
    pub fn remove_category(&self, profile_id: i64, id: i64) -> Result<()> {
        self.owned_category(profile_id, id)?;
        self.store.set_category_active(id, false)
    }

    fn owned_category(&self, profile_id: i64, id: i64) -> Result<Category> {
        let category = self
            .store
            .get_category(id)?
            .ok_or(TubeshelfError::CategoryNotFound(id))?;
        if category.profile_id != profile_id {
            return Err(TubeshelfError::ProfileMismatch {
                category_id: id,
                profile_id,
            });
        }
        Ok(category)
    }
}
