// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Parent-chain tracker.
//!
//! One tracker instance per configured parent chain. Each instance owns a
//! connector to the real blockchain, walks new blocks backward from the
//! announced top until it meets an already-known ancestor, extracts
//! commitment and delegate transactions into content-addressed parent
//! blocks, and advertises each newly confirmed tip on the process-wide
//! parent manager.

pub mod config;
pub mod connector;
pub mod error;
pub mod fjall_store;
pub mod manager;
pub mod memory_store;
pub mod metrics;
pub mod node;
pub mod processor;
pub mod sim_connector;
pub mod store;
pub mod tracker;
pub mod types;
