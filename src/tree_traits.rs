use itertools::Itertools;
use termtree::Tree;
use tracing::instrument;

use crate::tree::ValueTree;

pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;
}

/// One line per node: the type followed by `key=value` properties.
fn node_label(tree: &ValueTree) -> String {
    let kind = tree.get_type().map(|t| t.to_string()).unwrap_or_default();
    let properties = tree
        .properties()
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .join(" ");
    if properties.is_empty() {
        kind
    } else {
        format!("{} {}", kind, properties)
    }
}

impl TreeNodeConvert for ValueTree {
    #[instrument(level = "trace")]
    fn to_tree_string(&self) -> Tree<String> {
        if !self.is_valid() {
            return Tree::new("Empty tree".to_string());
        }
        let leaves: Vec<_> = self.children().iter().map(|c| c.to_tree_string()).collect();
        Tree::new(node_label(self)).with_leaves(leaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_nested_tree_when_rendering_then_lists_types_and_properties() {
        let root = ValueTree::new("session");
        let track = ValueTree::new("track");
        track.set_property("name", "drums", None).unwrap();
        root.append_child(&track, None).unwrap();
        track.append_child(&ValueTree::new("clip"), None).unwrap();

        let rendered = root.to_tree_string().to_string();

        assert!(rendered.starts_with("session\n"));
        assert!(rendered.contains("track name=drums"));
        assert!(rendered.contains("clip"));
    }

    #[test]
    fn given_invalid_tree_when_rendering_then_empty_tree() {
        assert_eq!(
            ValueTree::invalid().to_tree_string().to_string().trim(),
            "Empty tree"
        );
    }
}
