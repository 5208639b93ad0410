//! Per-connection tasks
//!
//! Every accepted connection runs three tasks joined by bounded queues:
//!
//! ```text
//!   TCP read half ──► FrameReader ──► inbound ──► Session ──► outbound ──► FrameWriter ──► TCP write half
//!                          ▲                          │           ▲
//!                          └──── read deadline ◄──────┘           └──── other sessions (fan-out)
//! ```
//!
//! All three stop when the connection's closed flag is set.

pub mod deadline;
pub mod reader;
pub mod session;
pub mod writer;

pub use deadline::{read_deadline, DeadlineSetter, DeadlineWatch};
pub use reader::FrameReader;
pub use session::Session;
pub use writer::{FrameWriter, WriteOutcome};
