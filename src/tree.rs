//! Observable value tree.
//!
//! A [`ValueTree`] is a cheap handle to a reference-counted node. Nodes own
//! their children and point weakly at their parent, so a detached subtree
//! stays alive exactly as long as someone (a handle, an undo action, a list
//! wrapper) still holds it. Every mutation raises a [`TreeEvent`] that is
//! delivered synchronously to the listeners of the changed node and of all
//! its ancestors.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use generational_arena::Arena;
use tracing::{debug, instrument, trace};

use crate::errors::{TreeError, TreeResult};
use crate::event::{ListenerId, TreeEvent, TreeListener};
use crate::identifier::Identifier;
use crate::undo::{TreeAction, UndoManager};
use crate::var::Var;

type NodeRef = Rc<RefCell<Node>>;
type WeakNodeRef = Weak<RefCell<Node>>;

struct Node {
    kind: Identifier,
    properties: BTreeMap<Identifier, Var>,
    parent: WeakNodeRef,
    children: Vec<NodeRef>,
    listeners: Arena<Weak<dyn TreeListener>>,
}

/// Handle to a node of an observable tree.
///
/// Equality is identity: two handles are equal when they point at the same
/// node (or are both invalid).
#[derive(Clone, Default)]
pub struct ValueTree {
    node: Option<NodeRef>,
}

impl PartialEq for ValueTree {
    fn eq(&self, other: &Self) -> bool {
        match (&self.node, &other.node) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for ValueTree {}

impl fmt::Debug for ValueTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Some(node) => {
                let n = node.borrow();
                f.debug_struct("ValueTree")
                    .field("type", &n.kind.as_str())
                    .field("properties", &n.properties.len())
                    .field("children", &n.children.len())
                    .finish()
            }
            None => f.write_str("ValueTree(invalid)"),
        }
    }
}

impl ValueTree {
    pub fn new(kind: impl Into<Identifier>) -> Self {
        let node = Node {
            kind: kind.into(),
            properties: BTreeMap::new(),
            parent: Weak::new(),
            children: Vec::new(),
            listeners: Arena::new(),
        };
        Self {
            node: Some(Rc::new(RefCell::new(node))),
        }
    }

    /// A handle that refers to no node.
    pub fn invalid() -> Self {
        Self { node: None }
    }

    fn from_node(node: NodeRef) -> Self {
        Self { node: Some(node) }
    }

    fn node(&self) -> TreeResult<&NodeRef> {
        self.node.as_ref().ok_or(TreeError::InvalidNode)
    }

    fn kind_or_empty(&self) -> Identifier {
        self.get_type().unwrap_or_else(|| Identifier::from(""))
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub fn is_valid(&self) -> bool {
        self.node.is_some()
    }

    pub fn get_type(&self) -> Option<Identifier> {
        self.node.as_ref().map(|n| n.borrow().kind.clone())
    }

    pub fn has_type(&self, kind: &str) -> bool {
        self.node
            .as_ref()
            .is_some_and(|n| n.borrow().kind == kind)
    }

    /// Parent node, or an invalid handle for roots and detached nodes.
    pub fn parent(&self) -> ValueTree {
        self.node
            .as_ref()
            .and_then(|n| n.borrow().parent.upgrade())
            .map(ValueTree::from_node)
            .unwrap_or_default()
    }

    pub fn num_children(&self) -> usize {
        self.node.as_ref().map_or(0, |n| n.borrow().children.len())
    }

    /// Child at `index`, or an invalid handle when out of range.
    pub fn child(&self, index: usize) -> ValueTree {
        self.node
            .as_ref()
            .and_then(|n| n.borrow().children.get(index).cloned())
            .map(ValueTree::from_node)
            .unwrap_or_default()
    }

    pub fn children(&self) -> Vec<ValueTree> {
        self.node.as_ref().map_or_else(Vec::new, |n| {
            n.borrow()
                .children
                .iter()
                .cloned()
                .map(ValueTree::from_node)
                .collect()
        })
    }

    /// Position of `child` among this node's direct children.
    pub fn index_of(&self, child: &ValueTree) -> Option<usize> {
        let (node, child_node) = (self.node.as_ref()?, child.node.as_ref()?);
        node.borrow()
            .children
            .iter()
            .position(|c| Rc::ptr_eq(c, child_node))
    }

    /// First direct child with the given type.
    pub fn child_with_type(&self, kind: &str) -> ValueTree {
        self.node
            .as_ref()
            .and_then(|n| {
                n.borrow()
                    .children
                    .iter()
                    .find(|c| c.borrow().kind == kind)
                    .cloned()
            })
            .map(ValueTree::from_node)
            .unwrap_or_default()
    }

    /// True if `possible_ancestor` is this node's parent, grandparent, ...
    pub fn is_a_child_of(&self, possible_ancestor: &ValueTree) -> bool {
        let mut current = self.parent();
        while current.is_valid() {
            if current == *possible_ancestor {
                return true;
            }
            current = current.parent();
        }
        false
    }

    pub fn property(&self, name: &str) -> Option<Var> {
        self.node
            .as_ref()
            .and_then(|n| n.borrow().properties.get(&Identifier::from(name)).cloned())
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    pub fn num_properties(&self) -> usize {
        self.node.as_ref().map_or(0, |n| n.borrow().properties.len())
    }

    /// Property names and values, ordered by name.
    pub fn properties(&self) -> Vec<(Identifier, Var)> {
        self.node.as_ref().map_or_else(Vec::new, |n| {
            n.borrow()
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    /// Sets a property; setting an identical value raises no event.
    pub fn set_property(
        &self,
        name: impl Into<Identifier>,
        value: impl Into<Var>,
        undo: Option<&UndoManager>,
    ) -> TreeResult<()> {
        let name = name.into();
        let value = value.into();
        self.node()?;
        let old = self.property(name.as_str());
        if old.as_ref() == Some(&value) {
            return Ok(());
        }
        self.route(
            TreeAction::SetProperty {
                tree: self.clone(),
                name,
                old,
                new: Some(value),
            },
            undo,
        )
    }

    pub fn remove_property(&self, name: &str, undo: Option<&UndoManager>) -> TreeResult<()> {
        self.node()?;
        let Some(old) = self.property(name) else {
            return Ok(());
        };
        self.route(
            TreeAction::SetProperty {
                tree: self.clone(),
                name: Identifier::from(name),
                old: Some(old),
                new: None,
            },
            undo,
        )
    }

    /// Inserts `child` at `index`; `None` or an index past the end appends.
    pub fn add_child(
        &self,
        child: &ValueTree,
        index: Option<usize>,
        undo: Option<&UndoManager>,
    ) -> TreeResult<()> {
        let len = self.node()?.borrow().children.len();
        let index = index.map_or(len, |i| i.min(len));
        self.route(
            TreeAction::AddChild {
                parent: self.clone(),
                child: child.clone(),
                index,
            },
            undo,
        )
    }

    pub fn append_child(&self, child: &ValueTree, undo: Option<&UndoManager>) -> TreeResult<()> {
        self.add_child(child, None, undo)
    }

    /// Detaches and returns the child at `index`.
    pub fn remove_child(&self, index: usize, undo: Option<&UndoManager>) -> TreeResult<ValueTree> {
        let len = self.node()?.borrow().children.len();
        if index >= len {
            return Err(TreeError::ChildIndexOutOfRange { index, len });
        }
        let child = self.child(index);
        self.route(
            TreeAction::RemoveChild {
                parent: self.clone(),
                child: child.clone(),
                index,
            },
            undo,
        )?;
        Ok(child)
    }

    pub fn remove_child_tree(&self, child: &ValueTree, undo: Option<&UndoManager>) -> TreeResult<()> {
        self.node()?;
        let index = self
            .index_of(child)
            .ok_or_else(|| TreeError::NotAChild(child.kind_or_empty()))?;
        self.remove_child(index, undo).map(|_| ())
    }

    /// Removes every child, last first, raising one event per child.
    #[instrument(level = "debug", skip(self, undo), fields(kind = %self.kind_or_empty()))]
    pub fn remove_all_children(&self, undo: Option<&UndoManager>) -> TreeResult<()> {
        while let Some(last) = self.num_children().checked_sub(1) {
            self.remove_child(last, undo)?;
        }
        Ok(())
    }

    /// Moves the child at `old_index` so that it ends up at `new_index`.
    pub fn move_child(
        &self,
        old_index: usize,
        new_index: usize,
        undo: Option<&UndoManager>,
    ) -> TreeResult<()> {
        let len = self.node()?.borrow().children.len();
        for index in [old_index, new_index] {
            if index >= len {
                return Err(TreeError::ChildIndexOutOfRange { index, len });
            }
        }
        if old_index == new_index {
            return Ok(());
        }
        self.route(
            TreeAction::MoveChild {
                parent: self.clone(),
                old_index,
                new_index,
            },
            undo,
        )
    }

    /// First child with `kind`, created and appended when missing.
    pub fn get_or_create_child_with_type(
        &self,
        kind: impl Into<Identifier>,
        undo: Option<&UndoManager>,
    ) -> TreeResult<ValueTree> {
        let kind = kind.into();
        let existing = self.child_with_type(kind.as_str());
        if existing.is_valid() {
            return Ok(existing);
        }
        let child = ValueTree::new(kind);
        self.append_child(&child, undo)?;
        Ok(child)
    }

    fn route(&self, action: TreeAction, undo: Option<&UndoManager>) -> TreeResult<()> {
        match undo {
            Some(undo) => undo.perform(action),
            None => action.perform(),
        }
    }

    // ---------------------------------------------------------------
    // Unrecorded primitives, used by TreeAction
    // ---------------------------------------------------------------

    pub(crate) fn set_property_raw(&self, name: &Identifier, value: Option<Var>) -> TreeResult<()> {
        let node = self.node()?;
        {
            let mut n = node.borrow_mut();
            match value {
                Some(v) => {
                    n.properties.insert(name.clone(), v);
                }
                None => {
                    n.properties.remove(name);
                }
            }
        }
        trace!(kind = %self.kind_or_empty(), property = %name, "property changed");
        self.dispatch(TreeEvent::PropertyChanged {
            tree: self.clone(),
            property: name.clone(),
        });
        Ok(())
    }

    pub(crate) fn insert_child_raw(&self, child: &ValueTree, index: usize) -> TreeResult<()> {
        let node = self.node()?;
        let child_node = child.node()?;
        if child.parent().is_valid() {
            return Err(TreeError::AlreadyHasParent(child.kind_or_empty()));
        }
        if self == child || self.is_a_child_of(child) {
            return Err(TreeError::WouldCreateCycle(child.kind_or_empty()));
        }
        let index = {
            let mut n = node.borrow_mut();
            let index = index.min(n.children.len());
            n.children.insert(index, Rc::clone(child_node));
            index
        };
        child_node.borrow_mut().parent = Rc::downgrade(node);
        debug!(parent = %self.kind_or_empty(), child = %child.kind_or_empty(), index, "child added");
        self.dispatch(TreeEvent::ChildAdded {
            parent: self.clone(),
            child: child.clone(),
        });
        Ok(())
    }

    pub(crate) fn remove_child_raw(&self, index: usize) -> TreeResult<ValueTree> {
        let node = self.node()?;
        let removed = {
            let mut n = node.borrow_mut();
            let len = n.children.len();
            if index >= len {
                return Err(TreeError::ChildIndexOutOfRange { index, len });
            }
            n.children.remove(index)
        };
        removed.borrow_mut().parent = Weak::new();
        let child = ValueTree::from_node(removed);
        debug!(parent = %self.kind_or_empty(), child = %child.kind_or_empty(), index, "child removed");
        self.dispatch(TreeEvent::ChildRemoved {
            parent: self.clone(),
            child: child.clone(),
            index,
        });
        Ok(child)
    }

    pub(crate) fn move_child_raw(&self, old_index: usize, new_index: usize) -> TreeResult<()> {
        let node = self.node()?;
        let moved = {
            let mut n = node.borrow_mut();
            let len = n.children.len();
            for index in [old_index, new_index] {
                if index >= len {
                    return Err(TreeError::ChildIndexOutOfRange { index, len });
                }
            }
            let moved = n.children.remove(old_index);
            n.children.insert(new_index, Rc::clone(&moved));
            moved
        };
        debug!(parent = %self.kind_or_empty(), old_index, new_index, "child moved");
        self.dispatch(TreeEvent::ChildOrderChanged {
            parent: self.clone(),
            child: ValueTree::from_node(moved),
            old_index,
            new_index,
        });
        Ok(())
    }

    // ---------------------------------------------------------------
    // Listeners
    // ---------------------------------------------------------------

    /// Registers a listener for this node and its subtree. The tree only
    /// keeps a weak reference; dropped listeners are pruned lazily.
    pub fn add_listener(&self, listener: Weak<dyn TreeListener>) -> TreeResult<ListenerId> {
        let node = self.node()?;
        let index = node.borrow_mut().listeners.insert(listener);
        Ok(ListenerId(index))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.node
            .as_ref()
            .is_some_and(|n| n.borrow_mut().listeners.remove(id.0).is_some())
    }

    pub fn num_listeners(&self) -> usize {
        self.node.as_ref().map_or(0, |n| {
            n.borrow()
                .listeners
                .iter()
                .filter(|(_, l)| l.strong_count() > 0)
                .count()
        })
    }

    /// Listeners of the event origin first, then of each ancestor.
    fn collect_listeners(&self) -> Vec<Rc<dyn TreeListener>> {
        let mut listeners = Vec::new();
        let mut current = self.node.clone();
        while let Some(node) = current {
            let mut n = node.borrow_mut();
            n.listeners.retain(|_, l| l.strong_count() > 0);
            listeners.extend(n.listeners.iter().filter_map(|(_, l)| l.upgrade()));
            current = n.parent.upgrade();
        }
        listeners
    }

    fn dispatch(&self, event: TreeEvent) {
        let listeners = self.collect_listeners();
        trace!(listeners = listeners.len(), "dispatching {:?}", event);
        for listener in listeners {
            listener.tree_changed(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    impl TreeListener for Recorder {
        fn tree_changed(&self, event: &TreeEvent) {
            let line = match event {
                TreeEvent::PropertyChanged { property, .. } => format!("prop:{}", property),
                TreeEvent::ChildAdded { child, .. } => {
                    format!("add:{}", child.get_type().unwrap())
                }
                TreeEvent::ChildRemoved { index, .. } => format!("remove:{}", index),
                TreeEvent::ChildOrderChanged {
                    old_index,
                    new_index,
                    ..
                } => format!("move:{}->{}", old_index, new_index),
            };
            self.events.borrow_mut().push(line);
        }
    }

    fn recorder_on(tree: &ValueTree) -> Rc<Recorder> {
        let recorder = Rc::new(Recorder::default());
        let weak: Weak<dyn TreeListener> = Rc::downgrade(&recorder) as Weak<dyn TreeListener>;
        tree.add_listener(weak).unwrap();
        recorder
    }

    #[test]
    fn given_children_when_moving_then_order_and_event_follow() {
        let root = ValueTree::new("root");
        for name in ["a", "b", "c"] {
            root.append_child(&ValueTree::new(name), None).unwrap();
        }
        let recorder = recorder_on(&root);

        root.move_child(0, 2, None).unwrap();

        let types: Vec<_> = root.children().iter().map(|c| c.get_type().unwrap()).collect();
        assert_eq!(types, vec!["b", "c", "a"]);
        assert_eq!(*recorder.events.borrow(), vec!["move:0->2"]);
    }

    #[test]
    fn given_grandchild_change_when_dispatching_then_ancestor_listener_notified() {
        let root = ValueTree::new("root");
        let child = ValueTree::new("child");
        root.append_child(&child, None).unwrap();
        let recorder = recorder_on(&root);

        child.append_child(&ValueTree::new("leaf"), None).unwrap();
        child.set_property("gain", 0.5, None).unwrap();

        assert_eq!(*recorder.events.borrow(), vec!["add:leaf", "prop:gain"]);
    }

    #[test]
    fn given_same_property_value_when_setting_then_no_event() {
        let tree = ValueTree::new("t");
        tree.set_property("name", "x", None).unwrap();
        let recorder = recorder_on(&tree);

        tree.set_property("name", "x", None).unwrap();

        assert!(recorder.events.borrow().is_empty());
    }

    #[test]
    fn given_attached_child_when_adding_elsewhere_then_already_has_parent() {
        let a = ValueTree::new("a");
        let b = ValueTree::new("b");
        let child = ValueTree::new("child");
        a.append_child(&child, None).unwrap();

        let err = b.append_child(&child, None).unwrap_err();
        assert!(matches!(err, TreeError::AlreadyHasParent(_)));
    }

    #[test]
    fn given_ancestor_when_adding_as_child_then_would_create_cycle() {
        let root = ValueTree::new("root");
        let child = ValueTree::new("child");
        root.append_child(&child, None).unwrap();

        let err = child.append_child(&root, None).unwrap_err();
        assert!(matches!(err, TreeError::WouldCreateCycle(_)));
        assert!(matches!(
            root.append_child(&root, None).unwrap_err(),
            TreeError::WouldCreateCycle(_)
        ));
    }

    #[test]
    fn given_removed_child_when_querying_then_detached_but_alive() {
        let root = ValueTree::new("root");
        let child = ValueTree::new("child");
        child.set_property("id", 7, None).unwrap();
        root.append_child(&child, None).unwrap();

        let removed = root.remove_child(0, None).unwrap();

        assert_eq!(removed, child);
        assert!(!removed.parent().is_valid());
        assert_eq!(removed.property("id"), Some(Var::Int(7)));
        assert_eq!(root.num_children(), 0);
    }

    #[test]
    fn given_dropped_listener_when_dispatching_then_pruned() {
        let root = ValueTree::new("root");
        let recorder = recorder_on(&root);
        assert_eq!(root.num_listeners(), 1);
        drop(recorder);

        root.append_child(&ValueTree::new("x"), None).unwrap();

        assert_eq!(root.num_listeners(), 0);
    }

    #[test]
    fn given_invalid_tree_when_mutating_then_invalid_node_error() {
        let tree = ValueTree::invalid();
        assert!(matches!(
            tree.append_child(&ValueTree::new("x"), None),
            Err(TreeError::InvalidNode)
        ));
        assert_eq!(tree.num_children(), 0);
        assert!(!tree.child(0).is_valid());
    }
}
