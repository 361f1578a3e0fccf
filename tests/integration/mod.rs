//! Integration tests for the gateway
//!
//! Each test drives the real router; upstream providers are wiremock servers.

mod health;
mod messages;
mod routing;
