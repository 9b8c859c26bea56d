//! Renderer module - supervises gmediarender and decodes its status output.
//!
//! Architecture:
//! - `process.rs` - Renderer binary detection and command line
//! - `supervisor.rs` - Keeps the renderer alive and streams its stdout lines
//! - `protocol.rs` - Line decoding into typed renderer events
//! - `didl.rs` - DIDL-Lite track metadata documents

mod didl;
mod process;
mod protocol;
mod supervisor;

pub use process::{find_renderer, ProcessError, RendererCommand, DEFAULT_RENDERER};
pub use protocol::{parse, parse_line, LineOutcome, ProtocolError, RendererEvent};
pub use supervisor::{ProcessState, RendererSupervisor, RESTART_DELAY};
