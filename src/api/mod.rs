//! HTTP route definitions
//!
//! `/healthz` for liveness and `/api/webhook/{webhook_id}` for put.io
//! transfer notifications.

pub mod health;
pub mod webhook;
