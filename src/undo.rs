//! Undo/redo history for tree mutations.
//!
//! Mutations routed through an [`UndoManager`] are applied immediately and
//! recorded in the current transaction. Undo and redo replay the recorded
//! actions through the unrecorded tree primitives, so they raise the same
//! notifications as the original mutations.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, instrument, warn};

use crate::config::UndoSettings;
use crate::errors::{TreeError, TreeResult};
use crate::identifier::Identifier;
use crate::tree::ValueTree;
use crate::var::Var;

/// A single reversible tree mutation.
#[derive(Debug, Clone)]
pub enum TreeAction {
    /// `None` as `new` removes the property, `None` as `old` means it was absent.
    SetProperty {
        tree: ValueTree,
        name: Identifier,
        old: Option<Var>,
        new: Option<Var>,
    },
    AddChild {
        parent: ValueTree,
        child: ValueTree,
        index: usize,
    },
    RemoveChild {
        parent: ValueTree,
        child: ValueTree,
        index: usize,
    },
    MoveChild {
        parent: ValueTree,
        old_index: usize,
        new_index: usize,
    },
}

impl TreeAction {
    pub fn perform(&self) -> TreeResult<()> {
        match self {
            TreeAction::SetProperty { tree, name, new, .. } => tree.set_property_raw(name, new.clone()),
            TreeAction::AddChild {
                parent,
                child,
                index,
            } => parent.insert_child_raw(child, *index),
            TreeAction::RemoveChild { parent, index, .. } => {
                parent.remove_child_raw(*index).map(|_| ())
            }
            TreeAction::MoveChild {
                parent,
                old_index,
                new_index,
            } => parent.move_child_raw(*old_index, *new_index),
        }
    }

    pub fn undo(&self) -> TreeResult<()> {
        match self {
            TreeAction::SetProperty { tree, name, old, .. } => tree.set_property_raw(name, old.clone()),
            TreeAction::AddChild { parent, child, .. } => {
                let index = parent.index_of(child).ok_or_else(|| {
                    TreeError::NotAChild(child.get_type().unwrap_or_else(|| Identifier::from("")))
                })?;
                parent.remove_child_raw(index).map(|_| ())
            }
            TreeAction::RemoveChild {
                parent,
                child,
                index,
            } => parent.insert_child_raw(child, *index),
            TreeAction::MoveChild {
                parent,
                old_index,
                new_index,
            } => parent.move_child_raw(*new_index, *old_index),
        }
    }
}

struct Transaction {
    name: String,
    actions: Vec<TreeAction>,
}

#[derive(Default)]
struct UndoState {
    undo_stack: Vec<Transaction>,
    redo_stack: Vec<Transaction>,
    /// Name for the transaction opened by the next recorded action.
    next_name: Option<String>,
    /// 0 keeps every transaction.
    max_transactions: usize,
}

impl UndoState {
    fn record(&mut self, action: TreeAction) {
        self.redo_stack.clear();
        let name = self.next_name.take();
        if name.is_none() {
            if let Some(current) = self.undo_stack.last_mut() {
                current.actions.push(action);
                return;
            }
        }
        self.undo_stack.push(Transaction {
            name: name.unwrap_or_default(),
            actions: vec![action],
        });
        if self.max_transactions > 0 && self.undo_stack.len() > self.max_transactions {
            let excess = self.undo_stack.len() - self.max_transactions;
            self.undo_stack.drain(..excess);
        }
    }
}

/// Shared handle to an undo history. Clones refer to the same history.
#[derive(Clone, Default)]
pub struct UndoManager {
    state: Rc<RefCell<UndoState>>,
}

impl fmt::Debug for UndoManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("UndoManager")
            .field("undo", &state.undo_stack.len())
            .field("redo", &state.redo_stack.len())
            .field("max_transactions", &state.max_transactions)
            .finish()
    }
}

impl PartialEq for UndoManager {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl UndoManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: &UndoSettings) -> Self {
        let manager = Self::default();
        manager.state.borrow_mut().max_transactions = settings.max_transactions;
        manager
    }

    /// Starts a new transaction; the next performed action opens it.
    pub fn begin_new_transaction(&self, name: impl Into<String>) {
        self.state.borrow_mut().next_name = Some(name.into());
    }

    /// Applies `action` and records it. Failed actions are not recorded.
    pub fn perform(&self, action: TreeAction) -> TreeResult<()> {
        action.perform()?;
        self.state.borrow_mut().record(action);
        Ok(())
    }

    /// Reverts the most recent transaction. Returns false if there was none.
    ///
    /// If an action cannot be reverted the tree no longer matches the
    /// history, so the whole history is cleared before the error is returned.
    #[instrument(level = "debug", skip(self))]
    pub fn undo(&self) -> TreeResult<bool> {
        let Some(transaction) = self.state.borrow_mut().undo_stack.pop() else {
            return Ok(false);
        };
        debug!(name = %transaction.name, actions = transaction.actions.len(), "undo");
        for action in transaction.actions.iter().rev() {
            if let Err(e) = action.undo() {
                warn!(name = %transaction.name, error = %e, "undo failed, clearing history");
                self.clear_history();
                return Err(e);
            }
        }
        let mut state = self.state.borrow_mut();
        state.redo_stack.push(transaction);
        state.next_name = Some(String::new());
        Ok(true)
    }

    /// Re-applies the most recently undone transaction. Failure clears the
    /// history, as for [`UndoManager::undo`].
    #[instrument(level = "debug", skip(self))]
    pub fn redo(&self) -> TreeResult<bool> {
        let Some(transaction) = self.state.borrow_mut().redo_stack.pop() else {
            return Ok(false);
        };
        debug!(name = %transaction.name, actions = transaction.actions.len(), "redo");
        for action in &transaction.actions {
            if let Err(e) = action.perform() {
                warn!(name = %transaction.name, error = %e, "redo failed, clearing history");
                self.clear_history();
                return Err(e);
            }
        }
        let mut state = self.state.borrow_mut();
        state.undo_stack.push(transaction);
        state.next_name = Some(String::new());
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.state.borrow().undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.state.borrow().redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.state.borrow().undo_stack.last().map(|t| t.name.clone())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.state.borrow().redo_stack.last().map(|t| t.name.clone())
    }

    pub fn num_transactions(&self) -> usize {
        self.state.borrow().undo_stack.len()
    }

    pub fn clear_history(&self) {
        let mut state = self.state.borrow_mut();
        state.undo_stack.clear();
        state.redo_stack.clear();
        state.next_name = None;
    }
}
