// ABOUTME: Security utilities shared by the HTTP surface
// ABOUTME: SSO session cookies and credential / fingerprint header parsing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// Secure cookie building and parsing
pub mod cookies;
/// Authorization header and fingerprint extraction
pub mod headers;
