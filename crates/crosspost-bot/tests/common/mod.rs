//! Shared fixtures: an in-memory store and a scripted publisher.

#![allow(dead_code)]

use std::{
  collections::HashSet,
  fmt,
  sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use crosspost_core::{
  account::{Account, Host, NewAccount},
  platform::{Outgoing, Publisher},
  settings::Visibility,
  store::BotStore,
};
use crosspost_store_sqlite::SqliteStore;

pub async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.expect("in-memory store")
}

pub async fn mastodon(store: &SqliteStore, uid: &str) -> Account {
  store
    .insert_account(NewAccount::new(uid, "https://botsin.space", format!("token-{uid}")))
    .await
    .unwrap()
}

pub async fn bluesky(store: &SqliteStore, uid: &str) -> Account {
  let mut new = NewAccount::new(uid, "https://bsky.social", format!("pw-{uid}"));
  new.host = Host::Bluesky;
  store.insert_account(new).await.unwrap()
}

/// One recorded `send_post` call.
#[derive(Debug, Clone)]
pub struct Sent {
  pub uid:        String,
  pub host:       Host,
  pub content:    String,
  pub prior_id:   Option<String>,
  pub visibility: Visibility,
}

#[derive(Debug)]
pub struct Refused(pub String);

impl fmt::Display for Refused {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "refused by {}", self.0)
  }
}

impl std::error::Error for Refused {}

/// A publisher that accepts everything except the uids it is told to fail.
/// Platform ids are `"<uid>-<n>"` with a global counter.
#[derive(Default)]
pub struct FakePublisher {
  failing:    Mutex<HashSet<String>>,
  no_session: Mutex<HashSet<String>>,
  bad_login:  Mutex<HashSet<String>>,
  sent:       Mutex<Vec<Sent>>,
  profiles:   Mutex<Vec<String>>,
  logins:     AtomicUsize,
  counter:    AtomicUsize,
}

impl FakePublisher {
  pub fn fail(&self, uid: &str) { self.failing.lock().unwrap().insert(uid.to_owned()); }

  pub fn recover(&self, uid: &str) { self.failing.lock().unwrap().remove(uid); }

  pub fn without_session(&self, uid: &str) {
    self.no_session.lock().unwrap().insert(uid.to_owned());
  }

  pub fn reject_login(&self, uid: &str) {
    self.bad_login.lock().unwrap().insert(uid.to_owned());
  }

  pub fn sent(&self) -> Vec<Sent> { self.sent.lock().unwrap().clone() }

  pub fn sent_by(&self, uid: &str) -> Vec<Sent> {
    self.sent().into_iter().filter(|s| s.uid == uid).collect()
  }

  pub fn profiles(&self) -> Vec<String> { self.profiles.lock().unwrap().clone() }

  pub fn logins(&self) -> usize { self.logins.load(Ordering::SeqCst) }
}

impl Publisher for FakePublisher {
  type Session = Account;
  type Error = Refused;

  async fn instantiate(&self, account: &Account) -> Result<Option<Account>, Refused> {
    self.logins.fetch_add(1, Ordering::SeqCst);
    if self.bad_login.lock().unwrap().contains(&account.uid) {
      return Err(Refused(account.uid.clone()));
    }
    if self.no_session.lock().unwrap().contains(&account.uid) {
      return Ok(None);
    }
    Ok(Some(account.clone()))
  }

  async fn send_post(&self, session: &Account, post: Outgoing<'_>) -> Result<Option<String>, Refused> {
    if self.failing.lock().unwrap().contains(&session.uid) {
      return Err(Refused(session.uid.clone()));
    }
    self.sent.lock().unwrap().push(Sent {
      uid:        session.uid.clone(),
      host:       session.host,
      content:    post.content.to_owned(),
      prior_id:   post.prior_id.map(str::to_owned),
      visibility: post.visibility,
    });
    let n = self.counter.fetch_add(1, Ordering::SeqCst);
    Ok(Some(format!("{}-{n}", session.uid)))
  }

  async fn update_account(&self, account: &Account) -> Result<bool, Refused> {
    if self.failing.lock().unwrap().contains(&account.uid) {
      return Err(Refused(account.uid.clone()));
    }
    self.profiles.lock().unwrap().push(account.uid.clone());
    Ok(true)
  }
}
