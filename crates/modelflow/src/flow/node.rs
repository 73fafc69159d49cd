// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Flow graph nodes
//!
//! A node is either a [`Worker`](NodeKind) bound to an actor [`Spec`] or a
//! `Future` placeholder standing in for a node supplied later. Nodes are
//! cheap handles with pointer identity; the graph itself is distributed over
//! the nodes' output subscription lists.
//!
//! Workers forked off one another share a [`GroupId`]: they are the same
//! logical actor appearing on different tracks (train vs apply, or several
//! crossvalidation folds) and their persisted state is addressed per group.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::flow::port::{Port, Publishable, Subscription};

/// Actor specification: the name of the actor implementation together with
/// its hyper-parameters. The core never invokes actors itself; specs travel
/// through the compiled program to whatever runner executes it.
#[derive(Clone, Debug, PartialEq)]
pub struct Spec {
    name: String,
    params: serde_json::Value,
}

impl Spec {
    /// Describe an actor by name and hyper-parameters.
    pub fn new(name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Actor implementation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Actor hyper-parameters.
    pub fn params(&self) -> &serde_json::Value {
        &self.params
    }
}

impl std::fmt::Display for Spec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Identity shared by all forks of one logical worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(Uuid);

impl GroupId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
enum Kind {
    Worker { spec: Spec, group: GroupId },
    // An unresolved future parks subscriptions in its output list; resolving
    // transfers them to the recorded upstream endpoint.
    Future { resolved: Option<(Node, usize)> },
}

#[derive(Debug)]
struct Inner {
    szin: usize,
    szout: usize,
    output: Vec<Vec<Subscription>>,
    taken: HashSet<Port>,
    kind: Kind,
}

/// Handle to a flow graph node with pointer identity.
#[derive(Clone)]
pub struct Node {
    inner: Rc<RefCell<Inner>>,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.inner) as usize).hash(state);
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        match &inner.kind {
            Kind::Worker { spec, group } => write!(f, "Worker({spec}#{group})"),
            Kind::Future { resolved } => {
                write!(f, "Future(resolved={})", resolved.is_some())
            }
        }
    }
}

impl Node {
    fn create(szin: usize, szout: usize, kind: Kind) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                szin,
                szout,
                output: (0..szout).map(|_| Vec::new()).collect(),
                taken: HashSet::new(),
                kind,
            })),
        }
    }

    /// Create a worker node bound to an actor spec with the given apply
    /// in/out arity. The worker starts a fresh group.
    pub fn worker(spec: Spec, szin: usize, szout: usize) -> Self {
        Self::create(
            szin,
            szout,
            Kind::Worker {
                spec,
                group: GroupId::new(),
            },
        )
    }

    /// Create a future placeholder (single apply input and output).
    pub fn future() -> Self {
        Self::create(1, 1, Kind::Future { resolved: None })
    }

    /// Declared apply in-degree.
    pub fn szin(&self) -> usize {
        self.inner.borrow().szin
    }

    /// Declared apply out-degree.
    pub fn szout(&self) -> usize {
        self.inner.borrow().szout
    }

    /// Actor spec of a worker node.
    pub fn spec(&self) -> Option<Spec> {
        match &self.inner.borrow().kind {
            Kind::Worker { spec, .. } => Some(spec.clone()),
            Kind::Future { .. } => None,
        }
    }

    /// Group identity of a worker node.
    pub fn group(&self) -> Option<GroupId> {
        match &self.inner.borrow().kind {
            Kind::Worker { group, .. } => Some(*group),
            Kind::Future { .. } => None,
        }
    }

    /// True for future placeholders.
    pub fn is_future(&self) -> bool {
        matches!(self.inner.borrow().kind, Kind::Future { .. })
    }

    /// Worker a future placeholder has resolved to, following chained
    /// futures. `None` for unresolved futures; the node itself for workers.
    pub fn resolved(&self) -> Option<Node> {
        let mut node = self.clone();
        loop {
            let next = match &node.inner.borrow().kind {
                Kind::Worker { .. } => return Some(node.clone()),
                Kind::Future { resolved } => resolved.as_ref().map(|(node, _)| node.clone())?,
            };
            node = next;
        }
    }

    /// True for worker nodes with an incoming `Train` or `Label` edge.
    pub fn trained(&self) -> bool {
        let inner = self.inner.borrow();
        inner.taken.contains(&Port::Train) || inner.taken.contains(&Port::Label)
    }

    /// Publishable endpoint of the given output.
    pub fn publisher(&self, index: usize) -> Result<Publishable> {
        if index >= self.szout() {
            return Err(Error::Topology(format!(
                "Output {index} out of range for {self:?}"
            )));
        }
        Ok(Publishable::new(self.clone(), index))
    }

    /// Subscriptions currently registered on the given output.
    pub fn output(&self, index: usize) -> Result<Vec<Subscription>> {
        let inner = self.inner.borrow();
        inner
            .output
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Topology(format!("Output {index} out of range for {self:?}")))
    }

    /// Snapshot of all output subscription lists.
    pub fn outputs(&self) -> Vec<Vec<Subscription>> {
        self.inner.borrow().output.clone()
    }

    /// Subscribe the given input port of this node to a publisher endpoint.
    ///
    /// Apply ports accept at most one subscription and the edge must keep the
    /// apply subgraph acyclic. Subscribing the apply input of an unresolved
    /// future resolves it: all subscriptions parked on the future's output
    /// are republished against the upstream endpoint.
    pub fn subscribe(&self, port: Port, publisher: &Publishable) -> Result<()> {
        if publisher.node() == self {
            return Err(Error::Topology("Cyclic flow".to_string()));
        }
        match port {
            Port::Apply(index) => {
                if index >= self.szin() {
                    return Err(Error::Topology(format!(
                        "Port {port} out of range for {self:?}"
                    )));
                }
            }
            Port::Train | Port::Label => {
                if self.is_future() {
                    return Err(Error::Topology(format!(
                        "Future node cannot subscribe {port}"
                    )));
                }
            }
        }
        if !self.inner.borrow_mut().taken.insert(port) {
            return Err(Error::Topology(format!(
                "Port {port} already subscribed on {self:?}"
            )));
        }
        let result = if self.is_future() && port == Port::Apply(0) {
            self.resolve(publisher)
        } else {
            publisher.republish(Subscription::new(self.clone(), port))
        };
        if result.is_err() {
            self.inner.borrow_mut().taken.remove(&port);
        }
        result
    }

    /// Subscribe this worker's training sinks to the features and labels
    /// publishers.
    pub fn train(&self, features: &Publishable, labels: &Publishable) -> Result<()> {
        if self.is_future() {
            return Err(Error::Topology(format!("Training a future: {self:?}")));
        }
        self.subscribe(Port::Train, features)?;
        self.subscribe(Port::Label, labels)
    }

    /// Fork a structurally identical worker sharing this worker's group.
    ///
    /// Forks carry no subscriptions; they are fresh appearances of the same
    /// logical actor (its state is addressed once per group).
    pub fn fork(&self) -> Result<Node> {
        let inner = self.inner.borrow();
        match &inner.kind {
            Kind::Worker { spec, group } => Ok(Self::create(
                inner.szin,
                inner.szout,
                Kind::Worker {
                    spec: spec.clone(),
                    group: *group,
                },
            )),
            Kind::Future { .. } => Err(Error::Topology("Forking a future".to_string())),
        }
    }

    /// Deep structural clone: same arity (and group identity for workers),
    /// no subscriptions.
    pub fn copy(&self) -> Node {
        let inner = self.inner.borrow();
        match &inner.kind {
            Kind::Worker { spec, group } => Self::create(
                inner.szin,
                inner.szout,
                Kind::Worker {
                    spec: spec.clone(),
                    group: *group,
                },
            ),
            Kind::Future { .. } => Self::create(
                inner.szin,
                inner.szout,
                Kind::Future { resolved: None },
            ),
        }
    }

    // Endpoint a resolved future collapsed onto (single hop).
    pub(crate) fn resolved_endpoint(&self) -> Option<(Node, usize)> {
        match &self.inner.borrow().kind {
            Kind::Future { resolved } => resolved.clone(),
            Kind::Worker { .. } => None,
        }
    }

    /// True when `target` is apply-reachable from this node.
    pub(crate) fn reaches(&self, target: &Node) -> bool {
        if self == target {
            return true;
        }
        let outputs = self.outputs();
        outputs
            .iter()
            .flatten()
            .filter(|subscription| subscription.port().is_apply())
            .any(|subscription| subscription.node().reaches(target))
    }

    /// Register a subscription on the given output (invoked by
    /// [`Publishable::republish`] after its validations).
    pub(crate) fn publish(&self, index: usize, subscription: Subscription) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let slot = inner.output.get_mut(index).ok_or_else(|| {
            Error::Topology(format!("Output {index} out of range"))
        })?;
        slot.push(subscription);
        Ok(())
    }

    // Future resolution: record the upstream endpoint and transfer the
    // parked subscriptions onto it.
    fn resolve(&self, publisher: &Publishable) -> Result<()> {
        let parked = {
            let mut inner = self.inner.borrow_mut();
            match &mut inner.kind {
                Kind::Future { resolved } => {
                    if resolved.is_some() {
                        return Err(Error::Topology("Future already resolved".to_string()));
                    }
                    *resolved = Some((publisher.node().clone(), publisher.index()));
                }
                Kind::Worker { .. } => {
                    return Err(Error::Topology("Resolving a worker".to_string()))
                }
            }
            std::mem::take(&mut inner.output[0])
        };
        tracing::debug!(node = ?self, count = parked.len(), "Resolving future subscriptions");
        for subscription in parked {
            publisher.republish(subscription)?;
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> Spec {
        Spec::new("actor", serde_json::json!({"alpha": 1}))
    }

    #[test]
    fn test_worker_identity() {
        let node = Node::worker(spec(), 1, 1);
        assert_eq!(node, node.clone());
        assert_ne!(node, Node::worker(spec(), 1, 1));
        assert_eq!(node.spec().unwrap().name(), "actor");
    }

    #[test]
    fn test_fork_shares_group() {
        let node = Node::worker(spec(), 1, 2);
        let fork = node.fork().unwrap();
        assert_ne!(node, fork);
        assert_eq!(node.group(), fork.group());
        assert_eq!(fork.szout(), 2);
        assert!(fork.output(0).unwrap().is_empty());
    }

    #[test]
    fn test_copy_is_disconnected() {
        let node = Node::worker(spec(), 1, 1);
        let downstream = Node::worker(spec(), 1, 1);
        downstream
            .subscribe(Port::Apply(0), &node.publisher(0).unwrap())
            .unwrap();
        let copy = node.copy();
        assert_eq!(copy.group(), node.group());
        assert!(copy.output(0).unwrap().is_empty());
        assert_eq!(node.output(0).unwrap().len(), 1);
    }

    #[test]
    fn test_trained_flag() {
        let features = Node::worker(spec(), 0, 1);
        let labels = Node::worker(spec(), 0, 1);
        let trainee = Node::worker(spec(), 1, 1);
        assert!(!trainee.trained());
        trainee
            .train(
                &features.publisher(0).unwrap(),
                &labels.publisher(0).unwrap(),
            )
            .unwrap();
        assert!(trainee.trained());
    }

    #[test]
    fn test_future_resolution_transfers_subscriptions() {
        let future = Node::future();
        let downstream = Node::worker(spec(), 1, 1);
        downstream
            .subscribe(Port::Apply(0), &future.publisher(0).unwrap())
            .unwrap();

        let upstream = Node::worker(spec(), 0, 1);
        future
            .subscribe(Port::Apply(0), &upstream.publisher(0).unwrap())
            .unwrap();

        assert_eq!(future.resolved().unwrap(), upstream);
        let subscriptions = upstream.output(0).unwrap();
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(*subscriptions[0].node(), downstream);
    }

    #[test]
    fn test_chained_future_resolution() {
        let first = Node::future();
        let second = Node::future();
        let downstream = Node::worker(spec(), 1, 1);
        downstream
            .subscribe(Port::Apply(0), &second.publisher(0).unwrap())
            .unwrap();
        second
            .subscribe(Port::Apply(0), &first.publisher(0).unwrap())
            .unwrap();

        let upstream = Node::worker(spec(), 0, 1);
        first
            .subscribe(Port::Apply(0), &upstream.publisher(0).unwrap())
            .unwrap();

        assert_eq!(second.resolved().unwrap(), upstream);
        assert_eq!(upstream.output(0).unwrap().len(), 1);
    }

    #[test]
    fn test_future_rejects_sinks() {
        let future = Node::future();
        let upstream = Node::worker(spec(), 0, 1);
        let err = future
            .subscribe(Port::Train, &upstream.publisher(0).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Topology(_)));
        assert!(future.fork().is_err());
    }
}
