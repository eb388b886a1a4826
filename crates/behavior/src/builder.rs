use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::decorator::Decorator;
use crate::error::BuildError;
use crate::handler::{Chain, Receive};
use crate::message::Actor;
use crate::tree::{StateId, StateMachine, SubstateNode, SuperStateId, SuperStateNode, Supervisor, Tree};

/// Declaration of one substate: its handler plus the traits and decorators
/// composed around it.
pub struct Substate<A: Actor> {
	name: String,
	handler: Receive<A>,
	traits: Vec<String>,
	decorators: Vec<String>,
}

impl<A: Actor> Substate<A> {
	pub fn new(name: impl Into<String>, handler: Receive<A>) -> Self {
		Self {
			name: name.into(),
			handler,
			traits: Vec::new(),
			decorators: Vec::new(),
		}
	}

	/// Attaches registered traits, tried in the given order before the
	/// substate's own handler.
	#[must_use]
	pub fn traits<I, S>(mut self, names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.traits.extend(names.into_iter().map(Into::into));
		self
	}

	/// Applies registered decorators. The first one is the outermost layer.
	#[must_use]
	pub fn decorators<I, S>(mut self, names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.decorators.extend(names.into_iter().map(Into::into));
		self
	}
}

struct SuperStateDecl<A: Actor> {
	name: String,
	supervisor: Arc<dyn Supervisor<A>>,
}

struct SubstateDecl<A: Actor> {
	owner: SuperStateId,
	substate: Substate<A>,
}

/// Declares a two-level state tree.
///
/// Super-states are opened with [`super_state`](Self::super_state); every
/// following [`substate`](Self::substate) belongs to the most recently opened
/// one. Names share one namespace across the whole tree. Trait, decorator and
/// initial-state references are resolved by [`build`](Self::build).
pub struct StateMachineBuilder<A: Actor> {
	initial: String,
	traits: HashMap<String, Receive<A>>,
	decorators: HashMap<String, Arc<dyn Decorator<A>>>,
	super_states: Vec<SuperStateDecl<A>>,
	substates: Vec<SubstateDecl<A>>,
	names: HashSet<String>,
}

impl<A: Actor> StateMachineBuilder<A> {
	/// Creates a builder whose behaviors start in `initial` when no state was
	/// persisted.
	pub fn new(initial: impl Into<String>) -> Self {
		Self {
			initial: initial.into(),
			traits: HashMap::new(),
			decorators: HashMap::new(),
			super_states: Vec::new(),
			substates: Vec::new(),
			names: HashSet::new(),
		}
	}

	/// Registers a named trait handler.
	pub fn add_trait(&mut self, name: impl Into<String>, handler: Receive<A>) -> Result<&mut Self, BuildError> {
		let name = name.into();
		if self.traits.contains_key(&name) {
			return Err(BuildError::DuplicateTrait(name));
		}
		self.traits.insert(name, handler);
		Ok(self)
	}

	/// Registers a named decorator.
	pub fn add_decorator(&mut self, name: impl Into<String>, decorator: impl Decorator<A>) -> Result<&mut Self, BuildError> {
		let name = name.into();
		if self.decorators.contains_key(&name) {
			return Err(BuildError::DuplicateDecorator(name));
		}
		self.decorators.insert(name, Arc::new(decorator));
		Ok(self)
	}

	/// Opens a super-state. Subsequent substates are nested under it.
	pub fn super_state(&mut self, name: impl Into<String>, supervisor: impl Supervisor<A>) -> Result<&mut Self, BuildError> {
		let name = name.into();
		self.claim(&name)?;
		self.super_states.push(SuperStateDecl {
			name,
			supervisor: Arc::new(supervisor),
		});
		Ok(self)
	}

	/// Declares a substate under the most recently opened super-state.
	pub fn substate(&mut self, substate: Substate<A>) -> Result<&mut Self, BuildError> {
		let Some(owner) = self.super_states.len().checked_sub(1) else {
			return Err(BuildError::OrphanSubstate(substate.name));
		};
		self.claim(&substate.name)?;
		self.substates.push(SubstateDecl {
			owner: SuperStateId(owner),
			substate,
		});
		Ok(self)
	}

	fn claim(&mut self, name: &str) -> Result<(), BuildError> {
		if !self.names.insert(name.to_string()) {
			return Err(BuildError::DuplicateState(name.to_string()));
		}
		Ok(())
	}

	/// Validates references and composes one handler per substate.
	pub fn build(self) -> Result<StateMachine<A>, BuildError> {
		let mut super_states: Vec<SuperStateNode<A>> = self
			.super_states
			.into_iter()
			.map(|decl| SuperStateNode {
				name: decl.name,
				supervisor: decl.supervisor,
				substates: Vec::new(),
			})
			.collect();

		let mut substates = Vec::with_capacity(self.substates.len());
		let mut by_name = HashMap::with_capacity(self.substates.len());
		for (index, SubstateDecl { owner, substate }) in self.substates.into_iter().enumerate() {
			let traits = substate
				.traits
				.iter()
				.map(|name| {
					self.traits.get(name).cloned().ok_or_else(|| BuildError::UnknownTrait {
						state: substate.name.clone(),
						name: name.clone(),
					})
				})
				.collect::<Result<Vec<_>, _>>()?;

			let mut handler: Receive<A> = if traits.is_empty() {
				substate.handler
			} else {
				Arc::new(Chain { traits, own: substate.handler })
			};
			for name in substate.decorators.iter().rev() {
				let decorator = self.decorators.get(name).ok_or_else(|| BuildError::UnknownDecorator {
					state: substate.name.clone(),
					name: name.clone(),
				})?;
				handler = decorator.decorate(handler);
			}

			let id = StateId(index);
			super_states[owner.0].substates.push(id);
			by_name.insert(substate.name.clone(), id);
			substates.push(SubstateNode {
				name: substate.name,
				super_state: owner,
				traits: substate.traits,
				decorators: substate.decorators,
				handler,
			});
		}

		let Some(initial) = by_name.get(&self.initial).copied() else {
			return Err(BuildError::UnknownState(self.initial));
		};

		tracing::debug!(
			super_states = super_states.len(),
			substates = substates.len(),
			initial = %self.initial,
			"behavior.machine.built"
		);

		Ok(StateMachine::new(Tree {
			super_states,
			substates,
			by_name,
			initial,
		}))
	}
}
