use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::handler::Receive;
use crate::message::Actor;

/// Lifecycle hooks attached to a super-state.
///
/// Each hook fires exactly once per crossing of the super-state boundary and
/// never on transitions between substates of the same super-state.
#[async_trait]
pub trait Supervisor<A: Actor>: Send + Sync + 'static {
	async fn on_enter(&self, _actor: &mut A, _super_state: &str) {}

	async fn on_exit(&self, _actor: &mut A, _super_state: &str) {}
}

/// Super-state without lifecycle hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSupervision;

impl<A: Actor> Supervisor<A> for NoSupervision {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct StateId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SuperStateId(pub(crate) usize);

pub(crate) struct SuperStateNode<A: Actor> {
	pub(crate) name: String,
	pub(crate) supervisor: Arc<dyn Supervisor<A>>,
	pub(crate) substates: Vec<StateId>,
}

pub(crate) struct SubstateNode<A: Actor> {
	pub(crate) name: String,
	pub(crate) super_state: SuperStateId,
	pub(crate) traits: Vec<String>,
	pub(crate) decorators: Vec<String>,
	/// Traits, own handler, and decorators composed into one handler.
	pub(crate) handler: Receive<A>,
}

pub(crate) struct Tree<A: Actor> {
	pub(crate) super_states: Vec<SuperStateNode<A>>,
	pub(crate) substates: Vec<SubstateNode<A>>,
	pub(crate) by_name: HashMap<String, StateId>,
	pub(crate) initial: StateId,
}

/// Immutable, validated state tree shared by every [`Behavior`](crate::Behavior)
/// built from it.
pub struct StateMachine<A: Actor> {
	tree: Arc<Tree<A>>,
}

impl<A: Actor> Clone for StateMachine<A> {
	fn clone(&self) -> Self {
		Self {
			tree: Arc::clone(&self.tree),
		}
	}
}

impl<A: Actor> fmt::Debug for StateMachine<A> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut map = f.debug_map();
		for node in &self.tree.super_states {
			let names: Vec<_> = node.substates.iter().map(|id| self.substate(*id).name.as_str()).collect();
			map.entry(&node.name, &names);
		}
		map.finish()
	}
}

impl<A: Actor> StateMachine<A> {
	pub(crate) fn new(tree: Tree<A>) -> Self {
		Self { tree: Arc::new(tree) }
	}

	/// Name of the substate new behaviors start in.
	pub fn initial(&self) -> &str {
		&self.substate(self.tree.initial).name
	}

	/// Returns true if `name` is a declared substate.
	pub fn contains(&self, name: &str) -> bool {
		self.resolve(name).is_some()
	}

	/// Super-state owning the substate `name`.
	pub fn super_state_of(&self, name: &str) -> Option<&str> {
		let id = self.resolve(name)?;
		Some(&self.super_state(self.substate(id).super_state).name)
	}

	/// Super-state names in declaration order.
	pub fn super_states(&self) -> impl Iterator<Item = &str> {
		self.tree.super_states.iter().map(|node| node.name.as_str())
	}

	/// Substate names in declaration order.
	pub fn substates(&self) -> impl Iterator<Item = &str> {
		self.tree.substates.iter().map(|node| node.name.as_str())
	}

	/// Substates of one super-state, in declaration order.
	pub fn substates_of(&self, super_state: &str) -> Option<Vec<&str>> {
		let node = self.tree.super_states.iter().find(|node| node.name == super_state)?;
		Some(node.substates.iter().map(|id| self.substate(*id).name.as_str()).collect())
	}

	/// Trait names attached to a substate, in resolution order.
	pub fn traits_of(&self, name: &str) -> Option<&[String]> {
		self.resolve(name).map(|id| self.substate(id).traits.as_slice())
	}

	/// Decorator names applied to a substate, outermost first.
	pub fn decorators_of(&self, name: &str) -> Option<&[String]> {
		self.resolve(name).map(|id| self.substate(id).decorators.as_slice())
	}

	pub(crate) fn resolve(&self, name: &str) -> Option<StateId> {
		self.tree.by_name.get(name).copied()
	}

	pub(crate) fn initial_id(&self) -> StateId {
		self.tree.initial
	}

	pub(crate) fn substate(&self, id: StateId) -> &SubstateNode<A> {
		&self.tree.substates[id.0]
	}

	pub(crate) fn super_state(&self, id: SuperStateId) -> &SuperStateNode<A> {
		&self.tree.super_states[id.0]
	}
}
