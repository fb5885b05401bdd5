//! Build-time generators: GraphQL SDL from SQL migrations, and typed data
//! hooks from route configs.

pub mod config;
pub mod hooks;
pub mod js;
pub mod naming;
pub mod sdl;
pub mod sql;
pub mod zod;

pub use config::{HooksConfig, SdlConfig};
