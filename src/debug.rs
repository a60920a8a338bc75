use core::{fmt, ptr::NonNull};
use std::collections::VecDeque;

use crate::{links, AvlTree, Links, TreeNode};

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
    T::Key: fmt::Display,
{
    /// Writes the tree as a Graphviz digraph named `name`.
    ///
    /// Nodes are labelled `key:rank/size`, and missing children are drawn as points. Nodes of equal
    /// depth share a rank in the layout.
    pub fn dotgraph<W: fmt::Write>(&self, name: &str, mut w: W) -> fmt::Result {
        let Some(root) = self.root else {
            return write!(w, "digraph \"graph-{name}\" {{}}");
        };

        enum Item<T: ?Sized> {
            Node(NonNull<T>),
            Missing(u32),
        }

        let mut queue = VecDeque::new();
        queue.push_back(Item::Node(root));

        writeln!(w, "digraph \"graph-{name}\" {{")?;

        let mut missing = 0;
        let mut edges = String::new();

        while !queue.is_empty() {
            write!(w, "  {{rank=same; ")?;

            for _ in 0..queue.len() {
                let node = match queue.pop_front() {
                    Some(Item::Node(node)) => node,
                    Some(Item::Missing(id)) => {
                        write!(w, "\"{name}-missing{id}\" [shape=point]; ")?;
                        continue;
                    }
                    None => break,
                };

                let key = unsafe { node.as_ref().key() };
                let (rank, size) = unsafe { (links(node).rank().get(), links(node).size()) };
                write!(w, "\"{name}-{key}\" [label=\"{key}:{rank}/{size}\"]; ")?;

                for child in unsafe { [links(node).left(), links(node).right()] } {
                    match child {
                        Some(child) => {
                            let child_key = unsafe { child.as_ref().key() };
                            fmt::Write::write_fmt(
                                &mut edges,
                                format_args!("  \"{name}-{key}\" -> \"{name}-{child_key}\";\n"),
                            )?;
                            queue.push_back(Item::Node(child));
                        }

                        None => {
                            fmt::Write::write_fmt(
                                &mut edges,
                                format_args!("  \"{name}-{key}\" -> \"{name}-missing{missing}\";\n"),
                            )?;
                            queue.push_back(Item::Missing(missing));
                            missing += 1;
                        }
                    }
                }
            }

            writeln!(w, "}}")?;
        }

        w.write_str(&edges)?;
        w.write_str("}\n")
    }
}
