//! Channel collaborators — the delivery surfaces the executor and funnel
//! engine invoke.
//!
//! Every provider is an opaque, retryable, idempotent-by-convention
//! collaborator behind the `ChannelInvoker` trait. Providers here are
//! development stubs that record analytics; production swaps in real API
//! clients with the same trait surface.

pub mod analytics;
pub mod dispatcher;
pub mod email;
pub mod invoker;
pub mod send_time;
pub mod social;
pub mod video;
pub mod webhook;

pub use dispatcher::ChannelDispatcher;
pub use invoker::{ChannelInvoker, InvokeReceipt};
pub use send_time::{ExactSchedule, FixedHourStrategy, SendTimeStrategy};
