// ABOUTME: Core types and constants for the Gatekeeper OIDC authorization server
// ABOUTME: Foundation crate with error handling, protocol constants, and persistence models
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Gatekeeper Core
//!
//! Shared types for the authorization server. This crate is designed to change
//! infrequently, enabling incremental compilation benefits in the workspace.
//!
//! ## Modules
//!
//! - **errors**: Unified error handling with `AppError` and `ErrorCode`
//! - **constants**: Protocol constants organized by domain
//! - **models**: Records persisted by the store backends

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Protocol constants organized by domain
pub mod constants;

/// Persistence models (clients, users, codes, sessions, consents)
pub mod models;
