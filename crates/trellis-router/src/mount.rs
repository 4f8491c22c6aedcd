//! The mount tree.
//!
//! Handlers are mounted under prefix templates, either directly or through
//! nested lists of children. Mounting a handler creates a branch for the
//! prefix whose leaves are the routes the handler declares.

use std::sync::Arc;

use crate::action::{Action, HandlerRef, MethodMap};
use crate::error::Result;
use crate::template;

/// Something that can be mounted under a prefix.
#[derive(Debug, Clone)]
pub enum Mountable {
    /// A handler and the routes it declares.
    Handler(HandlerRef),
    /// Nested `(prefix, target)` pairs.
    Children(Vec<(String, Mountable)>),
}

impl Mountable {
    /// Mounts handler type `A`.
    pub fn handler<A: Action>() -> Self {
        Self::Handler(HandlerRef::of::<A>())
    }

    /// Mounts a list of children.
    pub fn children<I, S>(children: I) -> Self
    where
        I: IntoIterator<Item = (S, Mountable)>,
        S: Into<String>,
    {
        Self::Children(
            children
                .into_iter()
                .map(|(prefix, target)| (prefix.into(), target))
                .collect(),
        )
    }
}

impl From<HandlerRef> for Mountable {
    fn from(handler: HandlerRef) -> Self {
        Self::Handler(handler)
    }
}

/// A node of the mount tree.
#[derive(Debug, Clone)]
pub enum MountNode {
    /// A prefix and the nodes mounted under it.
    Branch {
        prefix: String,
        children: Vec<MountNode>,
    },
    /// A route served by a handler. `route` is its position in
    /// [`HandlerRef::mapping`].
    Leaf {
        template: String,
        handler: HandlerRef,
        route: usize,
        methods: Arc<MethodMap>,
    },
}

impl MountNode {
    /// Builds the subtree for `target` mounted at `prefix`, checking the
    /// syntax of every template on the way.
    pub fn build(prefix: &str, target: Mountable) -> Result<Self> {
        template::validate(prefix)?;
        let children = match target {
            Mountable::Handler(handler) => handler
                .mapping()
                .iter()
                .enumerate()
                .map(|(route, entry)| {
                    template::validate(&entry.template)?;
                    Ok(Self::Leaf {
                        template: entry.template.clone(),
                        handler: handler.clone(),
                        route,
                        methods: entry.methods.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Mountable::Children(list) => list
                .into_iter()
                .map(|(prefix, target)| Self::build(&prefix, target))
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(Self::Branch {
            prefix: prefix.to_string(),
            children,
        })
    }

    /// Number of leaves below this node.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Branch { children, .. } => children.iter().map(Self::leaf_count).sum(),
            Self::Leaf { .. } => 1,
        }
    }

    fn walk(&self, base: &str, visitor: &mut dyn FnMut(MountEvent<'_>)) {
        match self {
            Self::Branch { prefix, children } => {
                visitor(MountEvent::Enter { base, prefix });
                let inner = format!("{base}{prefix}");
                for child in children {
                    child.walk(&inner, visitor);
                }
                visitor(MountEvent::Exit { base, prefix });
            }
            Self::Leaf {
                template,
                handler,
                route,
                methods,
            } => visitor(MountEvent::Leaf {
                base,
                template,
                handler,
                route: *route,
                methods,
            }),
        }
    }
}

/// Traversal event. `base` is the accumulated prefix of the parent.
#[derive(Debug, Clone, Copy)]
pub enum MountEvent<'a> {
    /// Before a branch's children.
    Enter { base: &'a str, prefix: &'a str },
    /// A route; its full template is `base` followed by `template`.
    Leaf {
        base: &'a str,
        template: &'a str,
        handler: &'a HandlerRef,
        route: usize,
        methods: &'a Arc<MethodMap>,
    },
    /// After a branch's children.
    Exit { base: &'a str, prefix: &'a str },
}

/// A mounted route, as listed by [`MountTree::mappings`].
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
    /// Full path template.
    pub path: String,
    /// The serving handler.
    pub handler: HandlerRef,
    /// Verbs served at `path`.
    pub methods: Arc<MethodMap>,
}

/// Ordered list of top-level mounts.
#[derive(Debug, Clone, Default)]
pub struct MountTree {
    roots: Vec<MountNode>,
}

impl MountTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts `target` at `prefix`.
    pub fn mount(&mut self, prefix: &str, target: impl Into<Mountable>) -> Result<&mut Self> {
        let node = MountNode::build(prefix, target.into())?;
        self.roots.push(node);
        Ok(self)
    }

    /// Appends an already built subtree.
    pub fn push(&mut self, node: MountNode) {
        self.roots.push(node);
    }

    /// Depth-first, pre-order traversal.
    pub fn traverse(&self, visitor: &mut dyn FnMut(MountEvent<'_>)) {
        for root in &self.roots {
            root.walk("", visitor);
        }
    }

    /// Every route with its full template, in traversal order.
    pub fn mappings(&self) -> Vec<RouteEntry> {
        let mut entries = Vec::new();
        self.traverse(&mut |event| {
            if let MountEvent::Leaf {
                base,
                template,
                handler,
                methods,
                ..
            } = event
            {
                entries.push(RouteEntry {
                    path: format!("{base}{template}"),
                    handler: handler.clone(),
                    methods: methods.clone(),
                });
            }
        });
        entries
    }

    /// Number of routes.
    pub fn leaf_count(&self) -> usize {
        self.roots.iter().map(MountNode::leaf_count).sum()
    }

    /// True when nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
