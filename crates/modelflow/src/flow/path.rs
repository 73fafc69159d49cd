// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Path algebra - head/tail lenses over the flow graph
//!
//! A [`Path`] is a view of the acyclic apply subgraph between a single head
//! and a single tail node, each with at most one apply input/output. Paths
//! come in two modes: a [`Mode::Channel`] passes data through its tail and
//! can be extended; a [`Mode::Closure`] terminates in training sinks and
//! cannot. Paths are immutable value objects: `extend` and `copy` build new
//! paths.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::flow::node::Node;
use crate::flow::port::{Port, Publishable};

/// Path variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Tail publishes to apply ports (or nothing); extendable
    Channel,
    /// Tail publishes to training sinks only; terminal
    Closure,
}

/// Apply path between a head and a tail node.
#[derive(Clone, Debug, PartialEq)]
pub struct Path {
    head: Node,
    tail: Node,
    mode: Mode,
}

/// Visitor over all nodes of a path in pre-order.
///
/// The traversal descends into apply successors and sink branches alike,
/// except that the tail's apply successors are not followed (the tail is the
/// semantic output of the path; its sink branches still are visited).
pub trait PreOrder {
    /// Node hook.
    fn visit_node(&mut self, node: &Node) -> Result<()>;
}

impl Path {
    /// Create a path from its head, discovering the tail by walking the
    /// apply subscriptions.
    ///
    /// Fails with *ambiguous tail* when the walk does not converge on a
    /// single terminal node and with *cyclic flow* on back-edges.
    pub fn new(head: Node) -> Result<Self> {
        Self::build(head, None)
    }

    /// Create a path from its head anchored at an expected tail.
    ///
    /// The expected node resolves ambiguous graphs; an expected future is
    /// substituted by the worker it resolved to.
    pub fn anchored(head: Node, tail: Node) -> Result<Self> {
        Self::build(head, Some(tail))
    }

    /// Path head node.
    pub fn head(&self) -> &Node {
        &self.head
    }

    /// Path tail node.
    pub fn tail(&self) -> &Node {
        &self.tail
    }

    /// Path mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn build(head: Node, expected: Option<Node>) -> Result<Self> {
        if head.szin() > 1 {
            return Err(Error::Topology(format!("Simple head required: {head:?}")));
        }
        let expected = match expected {
            Some(node) if node.is_future() => Some(node.resolved().ok_or_else(|| {
                Error::Topology(format!("Unresolved future tail: {node:?}"))
            })?),
            other => other,
        };
        let tail = Self::discover(&head, expected.as_ref(), &HashSet::new())?;
        if let Some(expected) = expected {
            if tail != expected {
                return Err(Error::Topology(format!(
                    "Ambiguous tail: expected {expected:?} not reached"
                )));
            }
        }
        if tail.szout() > 1 {
            return Err(Error::Topology(format!("Simple tail required: {tail:?}")));
        }
        let mode = if tail
            .outputs()
            .iter()
            .flatten()
            .any(|subscription| !subscription.port().is_apply())
        {
            Mode::Closure
        } else {
            Mode::Channel
        };
        Ok(Self { head, tail, mode })
    }

    // Recursive walk over the apply subscriptions down to the terminal node.
    // With an expected anchor the first branch reaching it wins; without one
    // the terminal set must be a singleton.
    fn discover(head: &Node, expected: Option<&Node>, chain: &HashSet<Node>) -> Result<Node> {
        if expected == Some(head) {
            return Ok(head.clone());
        }
        let subscribers = apply_subscribers(head);
        if subscribers.is_empty() {
            return Ok(head.clone());
        }
        let mut chain = chain.clone();
        chain.insert(head.clone());
        if subscribers.iter().any(|node| chain.contains(node)) {
            return Err(Error::Topology("Cyclic flow".to_string()));
        }
        let mut endings: Vec<Node> = Vec::new();
        for node in subscribers {
            let tail = Self::discover(&node, expected, &chain)?;
            if expected == Some(&tail) {
                return Ok(tail);
            }
            if !endings.contains(&tail) {
                endings.push(tail);
            }
        }
        if expected.is_none() && endings.len() != 1 {
            return Err(Error::Topology(format!(
                "Ambiguous tail: {} terminal nodes",
                endings.len()
            )));
        }
        Ok(endings.swap_remove(0))
    }

    /// Create a new path by appending `right`'s head to this path's tail.
    ///
    /// Only channels are extendable; extending a closure fails.
    pub fn extend(&self, right: &Path) -> Result<Path> {
        if self.mode == Mode::Closure {
            return Err(Error::Topology("Connecting closure path".to_string()));
        }
        right
            .head
            .subscribe(Port::Apply(0), &self.tail.publisher(0)?)?;
        Self::build(self.head.clone(), Some(right.tail.clone()))
    }

    /// Create a new path retracing this one up to its current physical tail
    /// (the graph may have grown since the path was constructed). A closure
    /// retraces to itself.
    pub fn retrace(&self) -> Result<Path> {
        let tail = match self.mode {
            Mode::Channel => Self::discover(&self.tail, None, &HashSet::new())?,
            Mode::Closure => self.tail.clone(),
        };
        Self::build(self.head.clone(), Some(tail))
    }

    /// Create a new path over the same head with the given tail.
    ///
    /// A closure only accepts its own tail.
    pub fn extend_to(&self, tail: &Node) -> Result<Path> {
        if self.mode == Mode::Closure && *tail != self.tail {
            return Err(Error::Topology("Connecting closure path".to_string()));
        }
        Self::build(self.head.clone(), Some(tail.clone()))
    }

    /// Subscribe the path's head to the given publisher.
    pub fn subscribe(&self, publisher: &Publishable) -> Result<()> {
        self.head.subscribe(Port::Apply(0), publisher)
    }

    /// Publishable endpoint of the path's tail.
    ///
    /// Closure publishers are restricted to training sinks.
    pub fn publisher(&self) -> Result<Publishable> {
        let publisher = self.tail.publisher(0)?;
        Ok(match self.mode {
            Mode::Channel => publisher,
            Mode::Closure => publisher.sinks_only(),
        })
    }

    /// Visitor acceptor.
    pub fn accept(&self, visitor: &mut dyn PreOrder) -> Result<()> {
        let mut seen = HashSet::new();
        self.scan(&self.head, HashSet::new(), &mut seen, visitor)
    }

    fn scan(
        &self,
        publisher: &Node,
        mut chain: HashSet<Node>,
        seen: &mut HashSet<Node>,
        visitor: &mut dyn PreOrder,
    ) -> Result<()> {
        visitor.visit_node(publisher)?;
        seen.insert(publisher.clone());
        let mut subscribers: Vec<Node> = Vec::new();
        for subscriptions in publisher.outputs() {
            for subscription in subscriptions {
                if seen.contains(subscription.node()) {
                    continue;
                }
                // The tail's apply successors belong to whatever comes after
                // this path; only its sink branches are ours.
                if *publisher == self.tail && subscription.port().is_apply() {
                    continue;
                }
                if !subscribers.contains(subscription.node()) {
                    subscribers.push(subscription.node().clone());
                }
            }
        }
        if subscribers.is_empty() {
            return Ok(());
        }
        chain.insert(publisher.clone());
        if subscribers.iter().any(|node| chain.contains(node)) {
            return Err(Error::Topology("Cyclic flow".to_string()));
        }
        for node in subscribers {
            if seen.contains(&node) {
                continue;
            }
            self.scan(&node, chain.clone(), seen, visitor)?;
        }
        Ok(())
    }

    /// Deep copy of the apply chain between head and tail.
    ///
    /// The copy shares no node with the original, its apply topology is
    /// isomorphic, and all sink branches are left behind (copied nodes carry
    /// no training subscriptions). Worker group identities are preserved.
    pub fn copy(&self) -> Result<Path> {
        let mut copies: HashMap<Node, Node> = HashMap::new();
        let mut stitched: HashSet<(Node, usize, Node)> = HashSet::new();
        self.mkcopy(&self.head, HashSet::new(), &mut copies, &mut stitched)?;
        let head = copies
            .get(&self.head)
            .cloned()
            .ok_or_else(|| Error::Topology("Copy did not reach the tail".to_string()))?;
        let tail = copies
            .get(&self.tail)
            .cloned()
            .ok_or_else(|| Error::Topology("Copy did not reach the tail".to_string()))?;
        Self::build(head, Some(tail))
    }

    // Walk the apply subscribers; every chain reaching the tail gets its
    // nodes copied and its internal edges re-subscribed among the copies.
    // Edges to nodes off the chain (sink branches) are ignored.
    fn mkcopy(
        &self,
        publisher: &Node,
        mut chain: HashSet<Node>,
        copies: &mut HashMap<Node, Node>,
        stitched: &mut HashSet<(Node, usize, Node)>,
    ) -> Result<()> {
        chain.insert(publisher.clone());
        if *publisher == self.tail {
            for orig in &chain {
                let publisher_copy = copies
                    .entry(orig.clone())
                    .or_insert_with(|| orig.copy())
                    .clone();
                for (index, subscriptions) in orig.outputs().iter().enumerate() {
                    for subscription in subscriptions {
                        if !chain.contains(subscription.node()) {
                            continue;
                        }
                        let edge = (orig.clone(), index, subscription.node().clone());
                        if !stitched.insert(edge) {
                            continue;
                        }
                        let subscriber_copy = copies
                            .entry(subscription.node().clone())
                            .or_insert_with(|| subscription.node().copy())
                            .clone();
                        subscriber_copy
                            .subscribe(subscription.port(), &publisher_copy.publisher(index)?)?;
                    }
                }
            }
        } else {
            for subscriber in apply_subscribers(publisher) {
                if chain.contains(&subscriber) {
                    return Err(Error::Topology("Cyclic flow".to_string()));
                }
                self.mkcopy(&subscriber, chain.clone(), copies, stitched)?;
            }
        }
        Ok(())
    }
}

// Deduplicated apply-port subscriber nodes, in subscription order.
fn apply_subscribers(node: &Node) -> Vec<Node> {
    let mut subscribers = Vec::new();
    for subscriptions in node.outputs() {
        for subscription in subscriptions {
            if subscription.port().is_apply() && !subscribers.contains(subscription.node()) {
                subscribers.push(subscription.node().clone());
            }
        }
    }
    subscribers
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::node::Spec;

    fn worker(name: &str, szin: usize, szout: usize) -> Node {
        Node::worker(Spec::new(name, serde_json::Value::Null), szin, szout)
    }

    fn chain(names: &[&str]) -> Vec<Node> {
        let nodes: Vec<Node> = names.iter().map(|name| worker(name, 1, 1)).collect();
        for pair in nodes.windows(2) {
            pair[1]
                .subscribe(Port::Apply(0), &pair[0].publisher(0).unwrap())
                .unwrap();
        }
        nodes
    }

    #[test]
    fn test_linear_discovery() {
        let nodes = chain(&["a", "b", "c"]);
        let path = Path::new(nodes[0].clone()).unwrap();
        assert_eq!(*path.tail(), nodes[2]);
        assert_eq!(path.mode(), Mode::Channel);
    }

    #[test]
    fn test_ambiguous_tail() {
        let head = worker("head", 1, 2);
        let left = worker("left", 1, 1);
        let right = worker("right", 1, 1);
        left.subscribe(Port::Apply(0), &head.publisher(0).unwrap())
            .unwrap();
        right
            .subscribe(Port::Apply(0), &head.publisher(1).unwrap())
            .unwrap();
        let err = Path::new(head.clone()).unwrap_err();
        assert!(err.to_string().contains("Ambiguous tail"));
        // Anchoring picks the wanted branch (but its tail must still be simple).
        let path = Path::anchored(head, left.clone()).unwrap();
        assert_eq!(*path.tail(), left);
    }

    #[test]
    fn test_head_arity_validation() {
        let fat = worker("fat", 2, 1);
        assert!(Path::new(fat).is_err());
    }

    #[test]
    fn test_closure_classification_and_extension() {
        let nodes = chain(&["a", "b"]);
        let trainer = worker("trainer", 1, 1);
        let labels = worker("labels", 0, 1);
        trainer
            .train(
                &nodes[1].publisher(0).unwrap(),
                &labels.publisher(0).unwrap(),
            )
            .unwrap();

        let path = Path::new(nodes[0].clone()).unwrap();
        assert_eq!(path.mode(), Mode::Closure);

        // Closures are not extendable...
        let right = Path::new(worker("right", 1, 1)).unwrap();
        let err = path.extend(&right).unwrap_err();
        assert!(err.to_string().contains("closure"));
        // ...but retrace to an equal path.
        assert_eq!(path.retrace().unwrap(), path);
        assert_eq!(path.extend_to(path.tail()).unwrap(), path);
    }

    #[test]
    fn test_closure_publisher_guarded() {
        let nodes = chain(&["a", "b"]);
        let trainer = worker("trainer", 1, 1);
        let labels = worker("labels", 0, 1);
        trainer
            .train(
                &nodes[1].publisher(0).unwrap(),
                &labels.publisher(0).unwrap(),
            )
            .unwrap();
        let path = Path::new(nodes[0].clone()).unwrap();

        let subscriber = worker("subscriber", 1, 1);
        let err = subscriber
            .subscribe(Port::Apply(0), &path.publisher().unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Topology(_)));
        let other = worker("other", 1, 1);
        other
            .subscribe(Port::Train, &path.publisher().unwrap())
            .unwrap();
    }

    #[test]
    fn test_channel_extension() {
        let left = chain(&["a", "b"]);
        let right = chain(&["c", "d"]);
        let path = Path::new(left[0].clone())
            .unwrap()
            .extend(&Path::new(right[0].clone()).unwrap())
            .unwrap();
        assert_eq!(*path.head(), left[0]);
        assert_eq!(*path.tail(), right[1]);
        // The underlying graph is now one chain.
        assert_eq!(*Path::new(left[0].clone()).unwrap().tail(), right[1]);
    }

    #[test]
    fn test_retrace_follows_growth() {
        let nodes = chain(&["a", "b"]);
        let path = Path::new(nodes[0].clone()).unwrap();
        let next = worker("c", 1, 1);
        next.subscribe(Port::Apply(0), &nodes[1].publisher(0).unwrap())
            .unwrap();
        let retraced = path.retrace().unwrap();
        assert_eq!(*retraced.tail(), next);
    }

    #[test]
    fn test_copy_isolation() {
        let nodes = chain(&["a", "b", "c"]);
        // Sink branch off the middle node must not make it into the copy.
        let trainer = worker("trainer", 1, 1);
        let labels = worker("labels", 0, 1);
        trainer
            .train(
                &nodes[1].publisher(0).unwrap(),
                &labels.publisher(0).unwrap(),
            )
            .unwrap();

        let path = Path::new(nodes[0].clone()).unwrap();
        let copy = path.copy().unwrap();

        assert_ne!(*copy.head(), nodes[0]);
        assert_ne!(*copy.tail(), nodes[2]);
        assert_eq!(copy.head().group(), nodes[0].group());
        assert_eq!(copy.mode(), Mode::Channel);

        // Isomorphic apply chain: head -> middle -> tail.
        let middle = &copy.head().output(0).unwrap()[0].node().clone();
        assert_eq!(copy.head().output(0).unwrap().len(), 1);
        assert_eq!(*middle.output(0).unwrap()[0].node(), *copy.tail());
        // The sink branch stayed behind.
        assert_eq!(middle.output(0).unwrap().len(), 1);
        assert!(copy.tail().output(0).unwrap().is_empty());
    }

    #[test]
    fn test_preorder_scope() {
        struct Names(Vec<String>);

        impl PreOrder for Names {
            fn visit_node(&mut self, node: &Node) -> Result<()> {
                self.0
                    .push(node.spec().map(|spec| spec.name().to_string()).unwrap_or_default());
                Ok(())
            }
        }

        let nodes = chain(&["a", "b", "c"]);
        // Sink branch off the tail is part of the path scope...
        let trainer = worker("trainer", 1, 1);
        let labels = worker("labels", 0, 1);
        trainer
            .train(
                &nodes[1].publisher(0).unwrap(),
                &labels.publisher(0).unwrap(),
            )
            .unwrap();
        // ...while apply successors beyond the anchored tail are not.
        let path = Path::anchored(nodes[0].clone(), nodes[1].clone()).unwrap();
        let mut names = Names(Vec::new());
        path.accept(&mut names).unwrap();
        assert!(names.0.contains(&"trainer".to_string()));
        assert!(!names.0.contains(&"c".to_string()));
        assert_eq!(names.0[0], "a");
    }

    #[test]
    fn test_future_headed_path() {
        let future = Node::future();
        let path = Path::new(future.clone()).unwrap();
        assert_eq!(path.mode(), Mode::Channel);

        // Extending a future-headed trivial path with a worker path parks the
        // subscription; binding the future afterwards rewires it.
        let right = Path::new(worker("w", 1, 1)).unwrap();
        let extended = path.extend(&right).unwrap();
        assert_eq!(*extended.tail(), *right.tail());

        let upstream = worker("u", 0, 1);
        future
            .subscribe(Port::Apply(0), &upstream.publisher(0).unwrap())
            .unwrap();
        assert_eq!(upstream.output(0).unwrap().len(), 1);
        assert_eq!(*upstream.output(0).unwrap()[0].node(), *right.head());
    }
}
