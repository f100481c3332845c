// ABOUTME: Utility modules for common functionality across the application
// ABOUTME: Contains the injectable clock and HTML error page rendering
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Injectable time source for expiry decisions
pub mod clock;
/// Minimal escaped HTML pages for errors that must not redirect
pub mod html;
