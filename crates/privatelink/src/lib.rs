//! Private-link network topology declaration.
//!
//! This crate declares the desired state of a small cloud topology and hands
//! it to an external reconciler:
//!
//! - **Consumer network** - an isolated address space holding a client instance
//!   and an interface endpoint
//! - **Provider network** - a second address space holding a web server behind
//!   a network load balancer
//! - **Private link** - an endpoint service fronting the balancer, so the
//!   consumer reaches it without any peering or public routing
//!
//! ## Construction
//!
//! [`build_stack`] is a pure function: the same [`StackConfig`] always yields
//! the same [`ResourceGraph`]. Every cross-resource reference is a named
//! [`ResourceId`] resolved by a lookup pass, so dangling references, address
//! overlaps and cycles fail with a [`DeclarationError`] before anything is
//! sent to a [`Reconciler`].
//!
//! ```rust,ignore
//! use privatelink::{build_stack, Plan, StackConfig};
//!
//! let graph = build_stack("private-link", &StackConfig::default())?;
//! let plan = Plan::from_graph(&graph);
//! println!("{}", plan.to_json()?);
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cidr;
pub mod config;
pub mod error;
pub mod graph;
pub mod plan;
pub mod reconciler;
pub mod resources;
pub mod stack;

pub use cidr::Ipv4Cidr;
pub use config::{GlobalOptions, StackConfig, WebServerConfig};
pub use error::DeclarationError;
pub use graph::{GraphBuilder, ResourceGraph};
pub use plan::{Plan, PlanDiff};
pub use reconciler::{deploy, ApplyReport, DeployError, ReconcileError, Reconciler};
pub use resources::{Resource, ResourceId, ResourceKind};
pub use stack::build_stack;
