//! Error handling shared across the workspace.
//!
//! Errors describe themselves through [`ErrorClassification`], which lets the
//! retry helper decide whether another attempt is worth making.
//!
//! ```rust,ignore
//! use gecko_common::error::{retry_with_fixed_delay, RetryPolicy};
//!
//! let body = retry_with_fixed_delay("coins_markets", RetryPolicy::new(3, delay), || {
//!     client.get_once(url.clone())
//! })
//! .await;
//! ```

mod common;
mod traits;

pub use common::*;
pub use traits::*;
