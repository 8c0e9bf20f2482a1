//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence concerns so route
//! handlers can stay focused on request parsing, auth plumbing and response
//! shapes. Model-facing services take `&dyn TextModel` so they can be driven
//! by a mock in tests.

pub mod annotation;
pub mod article;
pub mod auth;
pub mod image;
pub mod image_store;
pub mod paragraph;
pub mod prompts;
pub mod relay;
pub mod root_analysis;
pub mod session;
