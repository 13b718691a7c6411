//! Main module for the form editing engine
//!
//! Leaves first: [`ident`] parses and formats path identifiers, [`dom`] holds
//! the element tree the identifiers live in, [`renumber`] rewrites identifier
//! indices across sibling runs, [`containers`] drives the per-container
//! presence state machines, [`tree`] and [`mirror`] keep the navigation tree
//! in lock-step with the form, and [`editor`] is the facade that wires it all
//! together. [`wire`] carries the add/copy/paste network contracts.

pub mod containers;
pub mod dom;
pub mod editor;
pub mod error;
pub mod fragment;
pub mod ident;
pub mod mirror;
pub mod renumber;
pub mod tree;
pub mod wire;
