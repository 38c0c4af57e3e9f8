//! `rally-runtime` – mission engine and course behaviour.
//!
//! # Modules
//!
//! - [`fsm`] – generic state machine: [`GraphBuilder`][fsm::GraphBuilder]
//!   validates the transition tables, [`Engine`][fsm::Engine] runs them.
//! - [`mission`] – [`Mission`][mission::Mission], the context every state
//!   receives: device handles, sensor readers, configuration and the
//!   [`MissionContext`][context::MissionContext] scratch record.
//! - [`states`] – line following, turns, detection stops, marker search,
//!   box push and navigation legs.
//! - [`graphs`] – the racer and ultra course graphs.
//! - [`config`] – mission thresholds, waypoints and launch selection.
//! - [`sim`] – kinematic simulator and synthetic sensor source.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing].
//!
//! # Safe stop
//!
//! Whatever way a run ends (completion, exit, cancellation or error), the
//! engine issues a zero velocity command before returning.

pub mod config;
pub mod context;
pub mod fsm;
pub mod graphs;
pub mod mission;
pub mod sim;
pub mod states;
pub mod telemetry;

#[cfg(test)]
mod testkit;
