//! Change notifications raised by [`ValueTree`] mutations.

use generational_arena::Index;

use crate::identifier::Identifier;
use crate::tree::ValueTree;

/// A single change to a tree, delivered after the change has been applied.
#[derive(Debug, Clone)]
pub enum TreeEvent {
    PropertyChanged {
        tree: ValueTree,
        property: Identifier,
    },
    ChildAdded {
        parent: ValueTree,
        child: ValueTree,
    },
    /// `index` is the position the child occupied before removal.
    ChildRemoved {
        parent: ValueTree,
        child: ValueTree,
        index: usize,
    },
    ChildOrderChanged {
        parent: ValueTree,
        child: ValueTree,
        old_index: usize,
        new_index: usize,
    },
}

impl TreeEvent {
    /// The node whose listeners (and ancestors' listeners) receive this event.
    pub fn origin(&self) -> &ValueTree {
        match self {
            TreeEvent::PropertyChanged { tree, .. } => tree,
            TreeEvent::ChildAdded { parent, .. }
            | TreeEvent::ChildRemoved { parent, .. }
            | TreeEvent::ChildOrderChanged { parent, .. } => parent,
        }
    }
}

/// Receives events for a node and its whole subtree.
///
/// Calls are synchronous and serial. A listener must not mutate the tree
/// from inside `tree_changed`.
pub trait TreeListener {
    fn tree_changed(&self, event: &TreeEvent);
}

/// Handle returned by [`ValueTree::add_listener`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(pub(crate) Index);
