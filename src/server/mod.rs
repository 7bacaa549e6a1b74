//! Server sub commands.

pub mod rest;
