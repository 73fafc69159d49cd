// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Ports and publish/subscribe contracts between flow nodes
//!
//! A subscription is a directed edge from a publisher output to a named port
//! on a subscriber node. `Apply` ports carry data through the apply subgraph;
//! `Train` and `Label` ports are sinks consuming data for training without
//! passing anything forward.

use crate::error::{Error, Result};
use crate::flow::node::Node;

/// Named input port on a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Port {
    /// Indexed data-through port of the apply subgraph
    Apply(usize),
    /// Training features sink
    Train,
    /// Training labels sink
    Label,
}

impl Port {
    /// True for data-through ports.
    pub fn is_apply(&self) -> bool {
        matches!(self, Self::Apply(_))
    }
}

impl std::fmt::Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apply(index) => write!(f, "apply[{index}]"),
            Self::Train => write!(f, "train"),
            Self::Label => write!(f, "label"),
        }
    }
}

/// Directed edge descriptor: the subscriber node and the port subscribed.
#[derive(Clone, Debug)]
pub struct Subscription {
    node: Node,
    port: Port,
}

impl Subscription {
    pub(crate) fn new(node: Node, port: Port) -> Self {
        Self { node, port }
    }

    /// Subscribed node.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Subscribed port.
    pub fn port(&self) -> Port {
        self.port
    }
}

/// Publishable output endpoint of a node.
///
/// Obtained via [`Node::publisher`]; registering a [`Subscription`] against
/// it wires the edge into the graph. The closure-path variant (see
/// [`Publishable::sinks_only`]) refuses anything but `Train`/`Label`
/// subscriptions.
#[derive(Clone, Debug)]
pub struct Publishable {
    node: Node,
    index: usize,
    sinks_only: bool,
}

impl Publishable {
    pub(crate) fn new(node: Node, index: usize) -> Self {
        Self {
            node,
            index,
            sinks_only: false,
        }
    }

    /// Publishing node.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Published output index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Restrict this endpoint to `Train`/`Label` subscriptions.
    ///
    /// Used for closure-path publishers whose output must never feed the
    /// apply subgraph again.
    pub fn sinks_only(mut self) -> Self {
        self.sinks_only = true;
        self
    }

    /// Register an existing subscription against this publisher.
    ///
    /// Validates the port kind permitted by the source and the acyclicity of
    /// the apply subgraph. Subscriptions against an unresolved future output
    /// are parked and transferred once the future resolves.
    pub fn republish(&self, subscription: Subscription) -> Result<()> {
        if self.sinks_only && subscription.port().is_apply() {
            return Err(Error::Topology(format!(
                "Closure path publishing to {}",
                subscription.port()
            )));
        }
        // A resolved future is transparent: registrations pass through to the
        // endpoint it collapsed onto.
        if let Some((node, index)) = self.node.resolved_endpoint() {
            let mut delegate = Publishable::new(node, index);
            if self.sinks_only {
                delegate = delegate.sinks_only();
            }
            return delegate.republish(subscription);
        }
        if subscription.port().is_apply() && subscription.node().reaches(&self.node) {
            return Err(Error::Topology("Cyclic flow".to_string()));
        }
        self.node.publish(self.index, subscription)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::node::Spec;

    fn worker(szin: usize, szout: usize) -> Node {
        Node::worker(Spec::new("actor", serde_json::Value::Null), szin, szout)
    }

    #[test]
    fn test_apply_port_single_subscriber() {
        let source = worker(0, 1);
        let target = worker(1, 1);
        target
            .subscribe(Port::Apply(0), &source.publisher(0).unwrap())
            .unwrap();
        // Second subscription to the same port must be rejected.
        let another = worker(0, 1);
        let err = target
            .subscribe(Port::Apply(0), &another.publisher(0).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Topology(_)));
    }

    #[test]
    fn test_fanout_allowed() {
        let source = worker(0, 1);
        let left = worker(1, 1);
        let right = worker(1, 1);
        left.subscribe(Port::Apply(0), &source.publisher(0).unwrap())
            .unwrap();
        right
            .subscribe(Port::Apply(0), &source.publisher(0).unwrap())
            .unwrap();
        assert_eq!(source.output(0).unwrap().len(), 2);
    }

    #[test]
    fn test_cycle_rejected() {
        let a = worker(1, 1);
        let b = worker(1, 1);
        b.subscribe(Port::Apply(0), &a.publisher(0).unwrap())
            .unwrap();
        let err = a
            .subscribe(Port::Apply(0), &b.publisher(0).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Topology(_)));
    }

    #[test]
    fn test_sinks_only_guard() {
        let source = worker(0, 1);
        let trainee = worker(1, 1);
        let guarded = source.publisher(0).unwrap().sinks_only();
        let err = trainee.subscribe(Port::Apply(0), &guarded).unwrap_err();
        assert!(matches!(err, Error::Topology(_)));
        trainee.subscribe(Port::Train, &guarded).unwrap();
    }

    #[test]
    fn test_single_train_label_ports() {
        let features = worker(0, 1);
        let labels = worker(0, 1);
        let trainee = worker(1, 1);
        trainee
            .train(
                &features.publisher(0).unwrap(),
                &labels.publisher(0).unwrap(),
            )
            .unwrap();
        let err = trainee
            .subscribe(Port::Train, &features.publisher(0).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Topology(_)));
    }

    #[test]
    fn test_out_of_range_publisher() {
        let source = worker(0, 1);
        assert!(source.publisher(1).is_err());
    }
}
