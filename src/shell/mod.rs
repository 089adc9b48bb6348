//! Bridge between action execution and one interactive shell process.
//!
//! | Module     | Contents                                            |
//! |------------|-----------------------------------------------------|
//! | `bridge`   | `ShellBridge`: init, serialized command execution   |
//! | `osc`      | Sentinel sequence scanner                           |
//! | `terminal` | `Terminal`, `ProcessRuntime`, `ShellProcess` traits |
//! | `local`    | Local bash runtime over pipes                       |

mod bridge;
mod local;
pub mod osc;
mod terminal;
#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{BridgeOptions, ExecutionResult, ExecutionState, ShellBridge};
pub use local::LocalShellRuntime;
pub use terminal::{
    BufferTerminal, ProcessRuntime, ShellProcess, SpawnedShell, StdoutTerminal, Terminal,
    TerminalSize,
};
