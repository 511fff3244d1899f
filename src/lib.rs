//! Typed child lists kept in lockstep with an observable value tree.
//!
//! [`ValueTree`] is a small observable tree: typed nodes with properties and
//! ordered children that report every change to registered listeners.
//! [`SyncedChildList`] observes one node and mirrors the children a
//! [`ChildFactory`] accepts as strongly-typed objects. Mutations can be
//! routed through an [`UndoManager`]; the list follows undo and redo through
//! the same notifications.

#[doc(hidden)]
pub use tracing;

pub mod macros;

pub mod config;
pub mod errors;
pub mod event;
pub mod identifier;
pub mod object_list;
pub mod snapshot;
pub mod tree;
pub mod tree_traits;
pub mod undo;
pub mod util;
pub mod var;

pub use config::{Settings, UndoSettings};
pub use errors::{TreeError, TreeResult};
pub use event::{ListenerId, TreeEvent, TreeListener};
pub use identifier::Identifier;
pub use object_list::{ChildFactory, ListHooks, SyncedChildList, TreeObject};
pub use snapshot::TreeSnapshot;
pub use tree::ValueTree;
pub use tree_traits::TreeNodeConvert;
pub use undo::{TreeAction, UndoManager};
pub use var::Var;
