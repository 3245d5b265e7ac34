//! Language-model providers for MathTutor.
//!
//! All providers implement the `mathtutor_core::Provider` trait; the
//! loaders in [`loader`] construct them from configuration.

#[cfg(feature = "local")]
pub mod local;
pub mod loader;
pub mod openai_compat;

#[cfg(feature = "local")]
pub use loader::LocalLoader;
pub use loader::{RemoteLoader, build_loader};
#[cfg(feature = "local")]
pub use local::LocalProvider;
pub use openai_compat::OpenAiCompatProvider;
