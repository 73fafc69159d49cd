// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Lowering of compiled paths into a symbol program
//!
//! The compiler collects all nodes of the given tracks, orders them
//! topologically (ties broken by worker group id, then discovery order) and
//! emits one invocation symbol per worker. State handling:
//!
//! - a trainer symbol for a group always precedes any applier of that group,
//! - a stateful group without an in-program trainer loads its persisted
//!   state immediately before its first applier,
//! - every trainer of a persisted group is followed by a dumper, and a
//!   final committer publishes the generation (tag written last).

use std::collections::HashMap;

use crate::asset::access::State;
use crate::error::{Error, Result};
use crate::flow::node::{GroupId, Node};
use crate::flow::path::Path;
use crate::flow::pipeline::nodes;
use crate::flow::port::Port;
use crate::runtime::code::{Instruction, Symbol};

/// Compile the given tracks into an ordered symbol program.
///
/// Train programs pass their train and label tracks together; apply
/// programs pass the single apply track. The optional state handle
/// addresses the persisted states of the composition's shared groups.
pub fn compile<'a>(
    tracks: impl IntoIterator<Item = &'a Path>,
    state: Option<&State>,
) -> Result<Vec<Symbol>> {
    // Union of all track nodes in discovery order.
    let mut order: Vec<Node> = Vec::new();
    for track in tracks {
        for node in nodes(track)? {
            if !order.contains(&node) {
                order.push(node);
            }
        }
    }
    for node in &order {
        if node.is_future() {
            return Err(Error::Topology(format!(
                "Unresolved future in compiled path: {node:?}"
            )));
        }
    }
    let position: HashMap<Node, usize> = order
        .iter()
        .enumerate()
        .map(|(index, node)| (node.clone(), index))
        .collect();

    // Incoming edges (port, publisher position) per node position.
    let mut incoming: Vec<Vec<(Port, usize)>> = vec![Vec::new(); order.len()];
    for (publisher, node) in order.iter().enumerate() {
        for subscriptions in node.outputs() {
            for subscription in subscriptions {
                if let Some(&subscriber) = position.get(subscription.node()) {
                    incoming[subscriber].push((subscription.port(), publisher));
                }
            }
        }
    }
    let mut indegree: Vec<usize> = incoming.iter().map(Vec::len).collect();

    // Trainers still waiting to be emitted, per group.
    let mut pending_trainers: HashMap<GroupId, usize> = HashMap::new();
    for node in &order {
        if node.trained() {
            let group = group_of(node)?;
            *pending_trainers.entry(group).or_insert(0) += 1;
        }
    }

    let mut symbols: Vec<Symbol> = Vec::new();
    let mut produced: Vec<Option<usize>> = vec![None; order.len()];
    let mut trainer_symbol: HashMap<GroupId, usize> = HashMap::new();
    let mut loader_symbol: HashMap<GroupId, usize> = HashMap::new();
    let mut dumpers: Vec<usize> = Vec::new();
    let mut emitted: Vec<bool> = vec![false; order.len()];

    for _ in 0..order.len() {
        let next = pick(&order, &indegree, &emitted, &pending_trainers)?;
        emitted[next] = true;
        let node = &order[next];
        let group = group_of(node)?;
        let spec = node
            .spec()
            .ok_or_else(|| Error::Topology(format!("Node without spec: {node:?}")))?;

        if node.trained() {
            let features = operand(&incoming[next], Port::Train, &produced)?;
            let labels = operand(&incoming[next], Port::Label, &produced)?;
            symbols.push(Symbol::new(
                Instruction::Trainer { spec, group },
                vec![features, labels],
            ));
            let trainer = symbols.len() - 1;
            produced[next] = Some(trainer);
            trainer_symbol.insert(group, trainer);
            if let Some(count) = pending_trainers.get_mut(&group) {
                *count -= 1;
            }
            if state.map_or(false, |state| state.contains(group)) {
                symbols.push(Symbol::new(Instruction::Dumper { group }, vec![trainer]));
                dumpers.push(symbols.len() - 1);
            }
        } else {
            let mut arguments = Vec::new();
            if let Some(&trainer) = trainer_symbol.get(&group) {
                arguments.push(trainer);
            } else if state.map_or(false, |state| state.contains(group)) {
                let loader = match loader_symbol.get(&group) {
                    Some(&loader) => loader,
                    None => {
                        let sid = state
                            .ok_or_else(|| Error::Missing("State handle".to_string()))?
                            .sid(group)?;
                        symbols.push(Symbol::new(Instruction::Loader { group, sid }, Vec::new()));
                        let loader = symbols.len() - 1;
                        loader_symbol.insert(group, loader);
                        loader
                    }
                };
                arguments.push(loader);
            }
            let mut inputs: Vec<(usize, usize)> = Vec::new();
            for (port, publisher) in &incoming[next] {
                if let Port::Apply(index) = port {
                    inputs.push((*index, operand_at(*publisher, &produced)?));
                }
            }
            inputs.sort_by_key(|(index, _)| *index);
            arguments.extend(inputs.into_iter().map(|(_, symbol)| symbol));
            symbols.push(Symbol::new(Instruction::Applier { spec, group }, arguments));
            produced[next] = Some(symbols.len() - 1);
        }

        for subscriptions in node.outputs() {
            for subscription in subscriptions {
                if let Some(&subscriber) = position.get(subscription.node()) {
                    indegree[subscriber] -= 1;
                }
            }
        }
    }

    if state.is_some() && !dumpers.is_empty() {
        symbols.push(Symbol::new(Instruction::Committer, dumpers));
    }
    tracing::debug!(count = symbols.len(), "Compiled symbol program");
    Ok(symbols)
}

fn group_of(node: &Node) -> Result<GroupId> {
    node.group()
        .ok_or_else(|| Error::Topology(format!("Node without group: {node:?}")))
}

// Next ready node: all operands emitted and no pending trainer of the same
// group ahead of an applier. Deterministic pick by (group id, discovery).
fn pick(
    order: &[Node],
    indegree: &[usize],
    emitted: &[bool],
    pending_trainers: &HashMap<GroupId, usize>,
) -> Result<usize> {
    let mut best: Option<(GroupId, usize)> = None;
    for (index, node) in order.iter().enumerate() {
        if emitted[index] || indegree[index] > 0 {
            continue;
        }
        let group = group_of(node)?;
        if !node.trained() && pending_trainers.get(&group).copied().unwrap_or(0) > 0 {
            continue;
        }
        if best.map_or(true, |(bg, bi)| (group, index) < (bg, bi)) {
            best = Some((group, index));
        }
    }
    best.map(|(_, index)| index).ok_or_else(|| {
        Error::Topology("Unsatisfiable ordering in compiled path".to_string())
    })
}

fn operand(edges: &[(Port, usize)], port: Port, produced: &[Option<usize>]) -> Result<usize> {
    let publisher = edges
        .iter()
        .find(|(candidate, _)| *candidate == port)
        .map(|(_, publisher)| *publisher)
        .ok_or_else(|| Error::Topology(format!("Missing {port} operand")))?;
    operand_at(publisher, produced)
}

fn operand_at(publisher: usize, produced: &[Option<usize>]) -> Result<usize> {
    produced[publisher]
        .ok_or_else(|| Error::Topology("Operand not yet produced".to_string()))
}
