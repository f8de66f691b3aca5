//! # Wix Client
//!
//! Client for the Wix REST query endpoints used to back-fill salon data.
//!
//! This crate provides:
//! - A cursor-paginated query API over bookings, contacts, orders and products
//! - Retry with exponential backoff and jitter for transient failures
//! - Error classification for retry decisions
//!
//! # Examples
//!
//! ```rust,no_run
//! use wix_client::{ClientConfig, WixClient, WixQueryApi, WixResource};
//!
//! # async fn example() -> Result<(), wix_client::ApiError> {
//! let client = WixClient::new(ClientConfig::default(), "api-token")?;
//! let page = client.query_page(WixResource::Bookings, None, 100).await?;
//! println!("{} bookings, next cursor {:?}", page.items.len(), page.next_cursor);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::{ClientConfig, QueryPage, RetryPolicy, WixClient, WixQueryApi, WixResource};
pub use error::ApiError;
