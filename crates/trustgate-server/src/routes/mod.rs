//! HTTP route handlers for the `Trustgate` API.

pub mod sys;
pub mod users;
