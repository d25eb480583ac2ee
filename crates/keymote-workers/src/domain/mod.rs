//! Domain layer: the worker line protocol and its parsed commands.

pub mod command;
