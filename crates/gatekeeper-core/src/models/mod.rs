// ABOUTME: Persistence models for the authorization server stores
// ABOUTME: Re-exports clients, users, codes, flow and SSO sessions, consents, refresh records
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Data Models
//!
//! Records owned by the store layer. Every record with a lifetime exposes an
//! `is_expired(now)` check so that expiry is decided on read, not by the sweeper.

mod client;
mod code;
mod consent;
mod fingerprint;
mod flow;
mod refresh;
mod sso;
mod user;

pub use client::OAuth2Client;
pub use code::AuthorizationCode;
pub use consent::UserConsent;
pub use fingerprint::Fingerprint;
pub use flow::FlowSession;
pub use refresh::RefreshTokenRecord;
pub use sso::SsoSession;
pub use user::User;
