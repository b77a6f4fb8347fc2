// ABOUTME: Library crate for the Indirex remote meter terminal, exposing the public API for testing and embedding

//! Remote terminal client for Indirex meters.
//!
//! A [`terminal::TerminalSession`] binds one WebSocket connection to the SSH
//! relay to one terminal screen. The [`app`] module hosts a session in the
//! local terminal.

pub mod app;
pub mod config;
pub mod identity;
pub mod terminal;
