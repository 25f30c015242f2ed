//! Interactive remote shell execution
//!
//! One [`RemoteShellChannel`] per target connection: SSH transport, an
//! interactive shell channel, and the output assembly that turns raw shell
//! bytes into line-structured, throttled chunks.

pub mod assembler;
pub mod channel;

pub use assembler::{AssemblerEvent, OutputAssembler};
pub use channel::{JobOutcome, RemoteShellChannel};
