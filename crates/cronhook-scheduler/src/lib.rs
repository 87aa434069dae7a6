//! `cronhook-scheduler`: cron parsing and the multi-tenant trigger engine.
//!
//! # Overview
//!
//! Expressions are parsed into a [`Schedule`] and stored per tenant in the
//! [`JobRegistry`]. A [`TriggerEngine`] runs one dispatch loop that sleeps
//! until the earliest pending fire, claims every due job from the registry
//! and hands each one to an [`Executor`] on its own task.
//!
//! # Modules
//!
//! | Module       | Contents                                               |
//! |--------------|--------------------------------------------------------|
//! | `expression` | Five/six-field cron parser, canonical form             |
//! | `schedule`   | Next matching instant after a reference time           |
//! | `registry`   | Tenant → job → status map, fire tickets                |
//! | `engine`     | Dispatch loop lifecycle (`start`/`stop`/`reload`)      |
//! | `executor`   | HTTP GET per firing, outcome recording                 |
//! | `clock`      | Wall clock and Tokio virtual clock                     |

pub mod clock;
pub mod engine;
pub mod error;
pub mod executor;
pub mod expression;
pub mod registry;
pub mod schedule;
pub mod types;

pub use clock::{Clock, SystemClock, TokioClock};
pub use engine::TriggerEngine;
pub use error::{Result, SchedulerError};
pub use executor::{Executor, HttpExecutor};
pub use expression::{Field, Schedule};
pub use registry::JobRegistry;
pub use schedule::next_occurrence;
pub use types::{Job, JobStatus, Outcome, Upsert};
