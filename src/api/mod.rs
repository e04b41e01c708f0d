//! Client for the remote todo store.

mod client;
mod error;
mod remote;
mod types;

pub use client::{ApiClient, TODOS};
pub use error::ApiError;
pub use remote::Remote;
pub use types::{NewTodo, Todo};
