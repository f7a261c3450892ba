//! voxrun: voice question answering on top of an assistant-run API.
//!
//! A spoken or typed question is posted to a conversation thread, an
//! assistant run is driven to completion (polling or streaming), tool calls
//! the run asks for are answered locally, and the assistant's text reply is
//! returned.
//!
//! # Quick Start
//!
//! ```no_run
//! use voxrun::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> voxrun::error::Result<()> {
//! let config = VoxConfig::load()?;
//! let session = AssistantSession::from_config(&config).await?;
//! let reply = session
//!     .ask("How many bags of rice are in stock?", &CancellationToken::new())
//!     .await?;
//! println!("{}", reply.text);
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod history;
pub mod prelude;
pub mod run;
pub mod session;
pub mod stream;
pub mod thread;
pub mod tools;
pub mod transport;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
