//! Test helpers for miu-engine integration tests
//!
//! Provides reusable test infrastructure:
//! - MemoryStore: in-process `Store` + `Tracking` with inspectable state
//! - FakeResolver / ContentProbe: scripted media resolution
//! - FakeTransport: records transport calls and injects transport events
//! - TestEngine: starts an engine over the fakes and polls its state

#![allow(dead_code)]

pub mod fakes;
pub mod harness;
pub mod memory_store;

pub use fakes::{ContentProbe, FakeResolver, FakeTransport};
pub use harness::{next_event, test_config, TestEngine};
pub use memory_store::MemoryStore;
