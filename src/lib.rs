// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod assessment;
pub mod config;
pub mod history;
pub mod proctor;
pub mod runtime;
pub mod session;
pub mod submit;
pub mod util;
