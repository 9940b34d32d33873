//! Adapters implementing the domain ports against concrete infrastructure.

pub mod sqlite;
