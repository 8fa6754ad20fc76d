//! Parley
//!
//! Interactive terminal chat for locally compiled language models. The
//! session loop is generic over a [`engine::ChatEngine`] backend; model
//! artifacts are resolved on disk by [`locator::ModelLocator`] and
//! streamed replies are repainted incrementally by
//! [`render::DiffRenderer`].

pub mod cli;
pub mod config;
pub mod engine;
pub mod locator;
pub mod render;
pub mod session;
