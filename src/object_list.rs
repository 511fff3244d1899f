//! Typed child lists kept in lockstep with the children of a tree node.
//!
//! A [`SyncedChildList`] observes one node and owns one wrapper object per
//! child the [`ChildFactory`] accepts, in the children's order. Mutating
//! calls (`remove`, `move_to`, ...) only change the tree; the list itself is
//! updated by the notifications those tree changes raise. External edits,
//! undo and redo therefore reach the list through the same path.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use itertools::Itertools;
use tracing::{debug, instrument, trace};

use crate::config::Settings;
use crate::errors::TreeResult;
use crate::event::{ListenerId, TreeEvent, TreeListener};
use crate::identifier::Identifier;
use crate::precondition;
use crate::tree::ValueTree;
use crate::undo::UndoManager;

/// A typed view constructed from exactly one tree node.
pub trait TreeObject {
    fn tree(&self) -> &ValueTree;
}

/// Decides which children a list represents and how to wrap them.
///
/// Both functions are pure: they look at a single node and must not touch
/// the list.
pub trait ChildFactory {
    type Object: TreeObject;

    fn is_valid_as_child(node: &ValueTree) -> bool;

    /// Returning `None` for a node accepted by `is_valid_as_child` is a
    /// programming error once the list is populated.
    fn create_object(node: &ValueTree) -> Option<Self::Object>;
}

/// Reactions to membership and order changes. All default to no-ops.
pub trait ListHooks<T> {
    /// Called after `object` has been inserted.
    fn object_added(&self, _object: &T) {}

    /// Called after `object` has left the list, before it is dropped.
    fn object_removed(&self, _object: &T) {}

    /// Called after the list has been re-sorted.
    fn object_order_changed(&self, _old_index: usize, _new_index: usize) {}
}

impl<T> ListHooks<T> for () {}

pub struct SyncedChildList<F: ChildFactory, H = ()> {
    node: ValueTree,
    undo: Option<UndoManager>,
    hooks: H,
    objects: RefCell<Vec<Rc<F::Object>>>,
    populated: Cell<bool>,
    listener: Cell<Option<ListenerId>>,
    _factory: PhantomData<fn() -> F>,
}

impl<F: ChildFactory, H> fmt::Debug for SyncedChildList<F, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedChildList")
            .field("node", &self.node)
            .field("objects", &self.objects.borrow().len())
            .field("populated", &self.populated.get())
            .finish()
    }
}

impl<F, H> SyncedChildList<F, H>
where
    F: ChildFactory + 'static,
    H: ListHooks<F::Object> + 'static,
{
    /// Creates an empty list observing `node`. Call [`Self::rebuild`] next.
    pub fn new(node: ValueTree, hooks: H, undo: Option<UndoManager>) -> TreeResult<Rc<Self>> {
        let list = Rc::new(Self {
            node,
            undo,
            hooks,
            objects: RefCell::new(Vec::new()),
            populated: Cell::new(false),
            listener: Cell::new(None),
            _factory: PhantomData,
        });
        let weak: Weak<dyn TreeListener> = Rc::downgrade(&list) as Weak<dyn TreeListener>;
        let id = list.node.add_listener(weak)?;
        list.listener.set(Some(id));
        Ok(list)
    }

    /// Observes the first child of `parent` with type `kind`, creating it
    /// when missing.
    pub fn attach(
        kind: impl Into<Identifier>,
        parent: &ValueTree,
        hooks: H,
        undo: Option<UndoManager>,
    ) -> TreeResult<Rc<Self>> {
        let node = parent.get_or_create_child_with_type(kind, undo.as_ref())?;
        Self::new(node, hooks, undo)
    }

    /// [`Self::new`] followed by [`Self::rebuild`] as configured.
    pub fn build(
        node: ValueTree,
        hooks: H,
        undo: Option<UndoManager>,
        settings: &Settings,
    ) -> TreeResult<Rc<Self>> {
        let list = Self::new(node, hooks, undo)?;
        list.rebuild(settings.delete_invalid_children)?;
        Ok(list)
    }
}

impl<F, H> SyncedChildList<F, H>
where
    F: ChildFactory,
    H: ListHooks<F::Object>,
{
    /// Populates the list from the node's current children.
    ///
    /// Must be called exactly once, while the list is empty. Children the
    /// factory rejects are removed from the tree (last first) when
    /// `delete_invalid_nodes` is set, and left in place otherwise.
    #[instrument(level = "debug", skip(self), fields(node = ?self.node))]
    pub fn rebuild(&self, delete_invalid_nodes: bool) -> TreeResult<()> {
        if !precondition!(
            !self.populated.get() && self.objects.borrow().is_empty(),
            "rebuild must only be called once, on an empty list"
        ) {
            return Ok(());
        }
        self.populated.set(true);

        let mut invalid = Vec::new();
        {
            let mut objects = self.objects.borrow_mut();
            for (index, child) in self.node.children().iter().enumerate() {
                let object = if F::is_valid_as_child(child) {
                    F::create_object(child)
                } else {
                    None
                };
                match object {
                    Some(object) => objects.push(Rc::new(object)),
                    None => invalid.push(index),
                }
            }
            debug!(objects = objects.len(), invalid = invalid.len(), "list populated");
        }

        if delete_invalid_nodes {
            for index in invalid.into_iter().sorted_unstable_by(|a, b| b.cmp(a)) {
                self.node.remove_child(index, self.undo.as_ref())?;
            }
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.objects.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.borrow().is_empty()
    }

    /// Object at `index`. Out of range is a caller bug: it fails a
    /// precondition and yields `None`.
    pub fn get(&self, index: usize) -> Option<Rc<F::Object>> {
        let objects = self.objects.borrow();
        if !precondition!(
            index < objects.len(),
            "index {} out of range for list of {} objects",
            index,
            objects.len()
        ) {
            return None;
        }
        Some(Rc::clone(&objects[index]))
    }

    /// The objects in order. The list keeps ownership; do not hold the
    /// handles past the object's removal.
    pub fn list(&self) -> Vec<Rc<F::Object>> {
        self.objects.borrow().clone()
    }

    /// Position of `object` in the list, compared by identity.
    pub fn index_of(&self, object: &F::Object) -> Option<usize> {
        self.objects
            .borrow()
            .iter()
            .position(|o| std::ptr::eq(Rc::as_ptr(o), object))
    }

    pub fn node(&self) -> &ValueTree {
        &self.node
    }

    pub fn undo_manager(&self) -> Option<&UndoManager> {
        self.undo.as_ref()
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// True for direct children of this list's node that the factory accepts.
    pub fn is_child_tree(&self, node: &ValueTree) -> bool {
        F::is_valid_as_child(node) && node.parent() == self.node
    }

    /// Orders two objects by the position of their nodes in the tree.
    pub fn compare_elements(&self, first: &F::Object, second: &F::Object) -> Ordering {
        self.node
            .index_of(first.tree())
            .cmp(&self.node.index_of(second.tree()))
    }

    /// Removes the object's node from the tree; the list follows via the
    /// removal notification.
    pub fn remove(&self, object: &F::Object) -> TreeResult<()> {
        self.node.remove_child_tree(object.tree(), self.undo.as_ref())
    }

    pub fn remove_at(&self, index: usize) -> TreeResult<()> {
        match self.get(index) {
            Some(object) => self.remove(&object),
            None => Ok(()),
        }
    }

    /// Removes every child of the node, including ones the list does not
    /// represent.
    pub fn remove_all(&self) -> TreeResult<()> {
        self.node.remove_all_children(self.undo.as_ref())
    }

    /// Removes the objects one by one from the front, so every removal
    /// raises its own notification.
    #[instrument(level = "debug", skip(self), fields(node = ?self.node))]
    pub fn clear(&self) -> TreeResult<()> {
        loop {
            let first = self.objects.borrow().first().cloned();
            let Some(first) = first else {
                break;
            };
            let before = self.count();
            self.remove(&first)?;
            if !precondition!(
                self.count() < before,
                "removing an object did not shrink the list"
            ) {
                break;
            }
        }
        Ok(())
    }

    /// Drops every object without touching the tree. No hooks fire.
    pub fn free_objects(&self) {
        let objects = std::mem::take(&mut *self.objects.borrow_mut());
        debug!(objects = objects.len(), "freeing objects");
        drop(objects);
    }

    /// Moves the object at `old_index` to `new_index`. Out-of-range or
    /// equal indexes are ignored.
    pub fn move_to(&self, old_index: usize, new_index: usize) -> TreeResult<()> {
        let (from, to) = {
            let objects = self.objects.borrow();
            let n = objects.len();
            if old_index >= n || new_index >= n || old_index == new_index {
                return Ok(());
            }
            (
                self.node.index_of(objects[old_index].tree()),
                self.node.index_of(objects[new_index].tree()),
            )
        };
        match (from, to) {
            (Some(from), Some(to)) => self.node.move_child(from, to, self.undo.as_ref()),
            _ => Ok(()),
        }
    }

    pub fn move_up(&self, index: usize) -> TreeResult<()> {
        if index < 1 || index >= self.count() {
            return Ok(());
        }
        self.move_to(index, index - 1)
    }

    pub fn move_down(&self, index: usize) -> TreeResult<()> {
        if index >= self.count().saturating_sub(1) {
            return Ok(());
        }
        self.move_to(index, index + 1)
    }

    pub fn move_object_up(&self, object: &F::Object) -> TreeResult<()> {
        match self.index_of(object) {
            Some(index) => self.move_up(index),
            None => Ok(()),
        }
    }

    pub fn move_object_down(&self, object: &F::Object) -> TreeResult<()> {
        match self.index_of(object) {
            Some(index) => self.move_down(index),
            None => Ok(()),
        }
    }

    fn child_added(&self, child: &ValueTree) {
        if !self.is_child_tree(child) {
            return;
        }
        let Some(index) = self.node.index_of(child) else {
            return;
        };
        let Some(object) = F::create_object(child) else {
            precondition!(false, "factory produced no object for a valid child");
            return;
        };
        let object = Rc::new(object);
        {
            let mut objects = self.objects.borrow_mut();
            if index + 1 == self.node.num_children() {
                objects.push(Rc::clone(&object));
            } else {
                let position =
                    objects.partition_point(|o| self.node.index_of(o.tree()) < Some(index));
                objects.insert(position, Rc::clone(&object));
            }
        }
        trace!(index, "object added");
        self.hooks.object_added(&object);
    }

    fn child_removed(&self, parent: &ValueTree, child: &ValueTree) {
        if *parent != self.node {
            return;
        }
        let removed = {
            let mut objects = self.objects.borrow_mut();
            match objects.iter().position(|o| o.tree() == child) {
                Some(position) => objects.remove(position),
                None => return,
            }
        };
        trace!("object removed");
        self.hooks.object_removed(&removed);
    }

    fn child_order_changed(&self, child: &ValueTree, old_index: usize, new_index: usize) {
        if child.parent() != self.node {
            return;
        }
        self.objects
            .borrow_mut()
            .sort_by_cached_key(|o| self.node.index_of(o.tree()));
        trace!(old_index, new_index, "objects re-sorted");
        self.hooks.object_order_changed(old_index, new_index);
    }
}

impl<F, H> TreeListener for SyncedChildList<F, H>
where
    F: ChildFactory,
    H: ListHooks<F::Object>,
{
    fn tree_changed(&self, event: &TreeEvent) {
        // Until rebuild runs, its scan picks up whatever changed.
        if !self.populated.get() {
            return;
        }
        match event {
            TreeEvent::ChildAdded { child, .. } => self.child_added(child),
            TreeEvent::ChildRemoved { parent, child, .. } => self.child_removed(parent, child),
            TreeEvent::ChildOrderChanged {
                child,
                old_index,
                new_index,
                ..
            } => self.child_order_changed(child, *old_index, *new_index),
            TreeEvent::PropertyChanged { .. } => {}
        }
    }
}

impl<F: ChildFactory, H> Drop for SyncedChildList<F, H> {
    fn drop(&mut self) {
        if let Some(id) = self.listener.get() {
            self.node.remove_listener(id);
        }
        if std::thread::panicking() {
            return;
        }
        let remaining = self.objects.get_mut().len();
        precondition!(
            remaining == 0,
            "list dropped with {} objects; call clear() or free_objects() first",
            remaining
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        tree: ValueTree,
    }

    impl TreeObject for Item {
        fn tree(&self) -> &ValueTree {
            &self.tree
        }
    }

    struct Items;

    impl ChildFactory for Items {
        type Object = Item;

        fn is_valid_as_child(node: &ValueTree) -> bool {
            node.has_type("item")
        }

        fn create_object(node: &ValueTree) -> Option<Item> {
            Some(Item { tree: node.clone() })
        }
    }

    #[test]
    fn given_empty_populated_list_when_child_appended_then_object_pushed() {
        let root = ValueTree::new("items");
        let list = SyncedChildList::<Items>::new(root.clone(), (), None).unwrap();
        list.rebuild(true).unwrap();

        root.append_child(&ValueTree::new("item"), None).unwrap();

        assert_eq!(list.count(), 1);
        list.free_objects();
    }

    #[test]
    fn given_child_added_before_rebuild_when_rebuilding_then_object_listed_once() {
        let root = ValueTree::new("items");
        let list = SyncedChildList::<Items>::new(root.clone(), (), None).unwrap();

        root.append_child(&ValueTree::new("item"), None).unwrap();
        assert_eq!(list.count(), 0);
        list.rebuild(true).unwrap();

        assert_eq!(list.count(), 1);
        list.free_objects();
    }

    #[test]
    fn given_two_objects_when_comparing_then_tree_order_wins() {
        let root = ValueTree::new("items");
        root.append_child(&ValueTree::new("item"), None).unwrap();
        root.append_child(&ValueTree::new("item"), None).unwrap();
        let list = SyncedChildList::<Items>::build(root, (), None, &Settings::default()).unwrap();

        let (a, b) = (list.get(0).unwrap(), list.get(1).unwrap());

        assert_eq!(list.compare_elements(&a, &b), Ordering::Less);
        assert_eq!(list.compare_elements(&b, &a), Ordering::Greater);
        assert_eq!(list.compare_elements(&a, &a), Ordering::Equal);
        list.free_objects();
    }

    #[test]
    fn given_dropped_list_when_mutating_tree_then_listener_gone() {
        let root = ValueTree::new("items");
        let list = SyncedChildList::<Items>::new(root.clone(), (), None).unwrap();
        assert_eq!(root.num_listeners(), 1);

        drop(list);

        assert_eq!(root.num_listeners(), 0);
        root.append_child(&ValueTree::new("item"), None).unwrap();
    }
}
