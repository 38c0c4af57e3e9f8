//! Finite-state mission engine.
//!
//! A mission is a graph of named [`State`]s.  Each state runs to completion
//! and returns one outcome from the set it declared; the transition table maps
//! `(state, outcome)` to the next state or to a [`Terminal`] marker.
//!
//! Graphs are validated once by [`GraphBuilder::build`]:
//!
//! | Check | Error |
//! |---|---|
//! | two states with one name | [`ConfigurationError::DuplicateState`] |
//! | transition to an unknown state | [`ConfigurationError::UnregisteredState`] |
//! | transition on an outcome the state never returns | [`ConfigurationError::UndeclaredOutcome`] |
//! | declared outcome without a transition | [`ConfigurationError::MissingTransition`] |
//! | exit outcome missing or not leading to a terminal | [`ConfigurationError::UnreachableExit`] |
//!
//! [`Engine::run`] then drives a validated graph.  The context type must
//! implement [`SafeStop`]; the engine calls it after every exit outcome and on
//! every way out of `run`, successful or not.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use rally_runtime::fsm::{Engine, GraphBuilder, Next, OutcomeKind, SafeStop, State, Terminal};
//! use rally_types::MissionError;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Step { Done, Exit }
//!
//! impl OutcomeKind for Step {
//!     fn exit() -> Self { Step::Exit }
//! }
//!
//! struct Robot { stopped: bool }
//! impl SafeStop for Robot {
//!     fn safe_stop(&mut self) { self.stopped = true; }
//! }
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl State<Robot, Step> for Hello {
//!     fn outcomes(&self) -> Vec<Step> { vec![Step::Done, Step::Exit] }
//!     async fn execute(&mut self, _robot: &mut Robot) -> Result<Step, MissionError> {
//!         Ok(Step::Done)
//!     }
//! }
//!
//! # tokio_test_block_on(async {
//! let graph = GraphBuilder::new()
//!     .add("HELLO", Hello, [(Step::Done, Next::COMPLETE), (Step::Exit, Next::EXIT)])
//!     .build()
//!     .unwrap();
//!
//! let mut robot = Robot { stopped: false };
//! let terminal = Engine::new(graph).run("HELLO", &mut robot).await.unwrap();
//! assert_eq!(terminal, Terminal::Complete);
//! assert!(robot.stopped);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use async_trait::async_trait;
use rally_types::{ConfigurationError, MissionError};
use tokio::sync::watch;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// A closed outcome type.  One variant is the global abort.
pub trait OutcomeKind: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    fn exit() -> Self;
}

/// A named unit of mission behaviour.
#[async_trait]
pub trait State<C: Send, O: OutcomeKind>: Send {
    /// Every outcome [`State::execute`] may return, including the exit
    /// outcome.
    fn outcomes(&self) -> Vec<O>;

    /// Run to completion.
    async fn execute(&mut self, ctx: &mut C) -> Result<O, MissionError>;
}

/// Bring the robot to a standstill.  Must not fail.
pub trait SafeStop {
    fn safe_stop(&mut self);
}

// ─────────────────────────────────────────────────────────────────────────────
// Transitions
// ─────────────────────────────────────────────────────────────────────────────

/// How a mission run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Complete,
    Exit,
}

/// Target of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    State(String),
    Terminal(Terminal),
}

impl Next {
    pub const COMPLETE: Next = Next::Terminal(Terminal::Complete);
    pub const EXIT: Next = Next::Terminal(Terminal::Exit);

    pub fn to(name: impl Into<String>) -> Self {
        Next::State(name.into())
    }
}

impl std::fmt::Display for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Next::State(name) => f.write_str(name),
            Next::Terminal(Terminal::Complete) => f.write_str("<complete>"),
            Next::Terminal(Terminal::Exit) => f.write_str("<exit>"),
        }
    }
}

struct Node<C, O> {
    state: Box<dyn State<C, O>>,
    outcomes: Vec<O>,
    transitions: HashMap<O, Next>,
}

// ─────────────────────────────────────────────────────────────────────────────
// GraphBuilder
// ─────────────────────────────────────────────────────────────────────────────

/// Collects states and their transition tables, then validates them.
pub struct GraphBuilder<C, O> {
    order: Vec<String>,
    nodes: HashMap<String, Node<C, O>>,
    duplicate: Option<String>,
}

impl<C: Send + 'static, O: OutcomeKind> GraphBuilder<C, O> {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            nodes: HashMap::new(),
            duplicate: None,
        }
    }

    /// Register `state` under `name` with its transition table.
    pub fn add(
        mut self,
        name: impl Into<String>,
        state: impl State<C, O> + 'static,
        transitions: impl IntoIterator<Item = (O, Next)>,
    ) -> Self {
        let name = name.into();
        if self.nodes.contains_key(&name) {
            self.duplicate.get_or_insert(name);
            return self;
        }
        let outcomes = state.outcomes();
        self.order.push(name.clone());
        self.nodes.insert(
            name,
            Node {
                state: Box::new(state),
                outcomes,
                transitions: transitions.into_iter().collect(),
            },
        );
        self
    }

    /// Validate and freeze the graph.
    pub fn build(self) -> Result<MissionGraph<C, O>, ConfigurationError> {
        if let Some(name) = self.duplicate {
            return Err(ConfigurationError::DuplicateState(name));
        }

        for name in &self.order {
            let node = &self.nodes[name];

            // Iterate declared outcomes first so errors are reported in a
            // stable order.
            for outcome in &node.outcomes {
                if !node.transitions.contains_key(outcome) {
                    return Err(ConfigurationError::MissingTransition {
                        state: name.clone(),
                        outcome: format!("{outcome:?}"),
                    });
                }
            }
            for (outcome, next) in &node.transitions {
                if !node.outcomes.contains(outcome) {
                    return Err(ConfigurationError::UndeclaredOutcome {
                        state: name.clone(),
                        outcome: format!("{outcome:?}"),
                    });
                }
                if let Next::State(target) = next
                    && !self.nodes.contains_key(target)
                {
                    return Err(ConfigurationError::UnregisteredState {
                        from: name.clone(),
                        to: target.clone(),
                    });
                }
            }
        }

        for name in &self.order {
            if !exit_reaches_terminal(&self.nodes, name) {
                return Err(ConfigurationError::UnreachableExit(name.clone()));
            }
        }

        Ok(MissionGraph {
            order: self.order,
            nodes: self.nodes,
        })
    }
}

impl<C: Send + 'static, O: OutcomeKind> Default for GraphBuilder<C, O> {
    fn default() -> Self {
        Self::new()
    }
}

/// Follow exit edges from `start`; they must end at a terminal without
/// looping.
fn exit_reaches_terminal<C, O: OutcomeKind>(nodes: &HashMap<String, Node<C, O>>, start: &str) -> bool {
    let mut visited = HashSet::new();
    let mut current = start;
    loop {
        if !visited.insert(current) {
            return false;
        }
        let Some(node) = nodes.get(current) else {
            return false;
        };
        match node.transitions.get(&O::exit()) {
            Some(Next::Terminal(_)) => return true,
            Some(Next::State(next)) => current = next,
            None => return false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MissionGraph
// ─────────────────────────────────────────────────────────────────────────────

/// A validated, immutable state graph.
pub struct MissionGraph<C, O> {
    order: Vec<String>,
    nodes: HashMap<String, Node<C, O>>,
}

impl<C, O: OutcomeKind> MissionGraph<C, O> {
    /// State names in registration order.
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Transitions of `name` in declared-outcome order.
    pub fn transitions(&self, name: &str) -> Vec<(O, Next)> {
        self.nodes
            .get(name)
            .map(|node| {
                node.outcomes
                    .iter()
                    .filter_map(|o| node.transitions.get(o).map(|n| (*o, n.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn next(&self, name: &str, outcome: O) -> Option<&Next> {
        self.nodes.get(name)?.transitions.get(&outcome)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Runs a [`MissionGraph`] one state at a time.
pub struct Engine<C, O> {
    graph: MissionGraph<C, O>,
    active: watch::Sender<Option<String>>,
}

impl<C: SafeStop + Send, O: OutcomeKind> Engine<C, O> {
    pub fn new(graph: MissionGraph<C, O>) -> Self {
        let (active, _) = watch::channel(None);
        Self { graph, active }
    }

    pub fn graph(&self) -> &MissionGraph<C, O> {
        &self.graph
    }

    /// Read-only view of the active state name (`None` while idle).
    pub fn observer(&self) -> watch::Receiver<Option<String>> {
        self.active.subscribe()
    }

    /// Run from `start` until a terminal marker is reached.
    pub async fn run(&mut self, start: &str, ctx: &mut C) -> Result<Terminal, MissionError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("mission", %run_id, start);
        let result = self.drive(start, ctx).instrument(span).await;

        ctx.safe_stop();
        self.active.send_replace(None);

        match &result {
            Ok(terminal) => info!(%run_id, ?terminal, "mission finished"),
            Err(e) => error!(%run_id, error = %e, "mission aborted"),
        }
        result
    }

    async fn drive(&mut self, start: &str, ctx: &mut C) -> Result<Terminal, MissionError> {
        if !self.graph.contains(start) {
            return Err(ConfigurationError::UnknownStart(start.to_string()).into());
        }

        let mut current = start.to_string();
        loop {
            self.active.send_replace(Some(current.clone()));

            let node = self
                .graph
                .nodes
                .get_mut(&current)
                .ok_or_else(|| ConfigurationError::UnknownStart(current.clone()))?;

            let outcome = node
                .state
                .execute(ctx)
                .instrument(info_span!("state", name = %current))
                .await?;

            if !node.outcomes.contains(&outcome) {
                return Err(ConfigurationError::UndeclaredOutcome {
                    state: current,
                    outcome: format!("{outcome:?}"),
                }
                .into());
            }
            if outcome == O::exit() {
                ctx.safe_stop();
            }

            let next = node.transitions.get(&outcome).cloned().ok_or_else(|| {
                ConfigurationError::MissingTransition {
                    state: current.clone(),
                    outcome: format!("{outcome:?}"),
                }
            })?;

            info!(from = %current, ?outcome, to = %next, "transition");
            match next {
                Next::State(name) => current = name,
                Next::Terminal(terminal) => return Ok(terminal),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
