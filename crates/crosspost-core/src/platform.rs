//! The `Publisher` trait: the platform side of the bot.
//!
//! Implemented by `crosspost-platforms`. A publisher logs in once per
//! account, then sends already-rendered content through that session.

use std::future::Future;

use crate::{account::Account, settings::Visibility};

/// A single outgoing post.
#[derive(Debug, Clone, Copy)]
pub struct Outgoing<'a> {
  /// Rendered content, receiver prefix included.
  pub content:    &'a str,
  /// Identifier previously returned for this account. When set the platform
  /// update path is taken (status edit, or quote post on Bluesky).
  pub prior_id:   Option<&'a str>,
  pub visibility: Visibility,
}

pub trait Publisher: Send + Sync {
  /// A logged-in client for one account.
  type Session: Send + Sync;
  type Error: std::error::Error + Send + Sync + 'static;

  /// Log in as `account`. Returns `Ok(None)` when the credentials are
  /// incomplete; the caller logs and moves on.
  fn instantiate<'a>(
    &'a self,
    account: &'a Account,
  ) -> impl Future<Output = Result<Option<Self::Session>, Self::Error>> + Send + 'a;

  /// Publish `post`. `Ok(None)` means the platform accepted the call but
  /// returned nothing that identifies the new post.
  fn send_post<'a>(
    &'a self,
    session: &'a Self::Session,
    post: Outgoing<'a>,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  /// Push the profile fields of `account` to the live platform.
  fn update_account<'a>(
    &'a self,
    account: &'a Account,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}
