//! Privileged command channel adapters for FerroRep
//!
//! A [`ShellChannel`] hands each command string to a launcher program such as
//! `su -c`, `sudo -n sh -c` or a broker client, and streams back its output.
//! Any transport that preserves the order of one command's own output can
//! stand in for it by implementing [`CommandChannel`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use ferrorep_channel::{shell_quote, ShellChannel};
//! use ferrorep_types::CommandChannel;
//!
//! # async fn example() -> ferrorep_types::Result<()> {
//! let channel = ShellChannel::local();
//! let output = channel
//!     .execute_with_output(&format!("ls {}", shell_quote("/tmp/my dir")))
//!     .await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod quote;
mod shell;

pub use ferrorep_types::{CommandChannel, CommandStream};
pub use quote::shell_quote;
pub use shell::ShellChannel;
