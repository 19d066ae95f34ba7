//! In-memory directory used by unit tests

use crate::error::DirectoryError;
use crate::ldap::pool::{ConnectionAcquirer, DirectoryConnection};
use crate::ldap::types::DirectoryEntry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const ADMIN_DN: &str = "cn=admin,dc=example,dc=com";
pub const ADMIN_PASSWORD: &str = "admin";

#[derive(Default)]
struct Counters {
    acquisitions: AtomicUsize,
    searches: AtomicUsize,
    releases: AtomicUsize,
}

/// Directory fake that counts every acquisition
#[derive(Default)]
pub struct FakeDirectory {
    /// DN -> password
    accounts: Mutex<HashMap<String, String>>,
    /// search filter -> entries
    entries: Mutex<HashMap<String, Vec<DirectoryEntry>>>,
    filters_seen: Arc<Mutex<Vec<String>>>,
    down: AtomicBool,
    search_fails: AtomicBool,
    user_binds_fail: AtomicBool,
    counters: Arc<Counters>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        let directory = Self::default();
        directory.add_account(ADMIN_DN, ADMIN_PASSWORD);
        directory
    }

    pub fn add_account(&self, dn: &str, password: &str) {
        self.accounts
            .lock()
            .unwrap()
            .insert(dn.to_string(), password.to_string());
    }

    /// Register a user found by `filter`
    pub fn add_user(&self, filter: &str, dn: &str, password: &str) {
        self.add_account(dn, password);
        self.add_entry(filter, dn);
    }

    /// Make `filter` match one more entry
    pub fn add_entry(&self, filter: &str, dn: &str) {
        self.entries
            .lock()
            .unwrap()
            .entry(filter.to_string())
            .or_default()
            .push(DirectoryEntry::new(dn));
    }

    /// Every acquisition fails as unreachable
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn set_search_fails(&self, fails: bool) {
        self.search_fails.store(fails, Ordering::SeqCst);
    }

    /// Binds as anyone but the admin fail as unreachable
    pub fn set_user_binds_fail(&self, fails: bool) {
        self.user_binds_fail.store(fails, Ordering::SeqCst);
    }

    pub fn acquisitions(&self) -> usize {
        self.counters.acquisitions.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.counters.searches.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }

    pub fn filters_seen(&self) -> Vec<String> {
        self.filters_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionAcquirer for FakeDirectory {
    async fn acquire(
        &self,
        bind_dn: Option<&str>,
        password: Option<&str>,
    ) -> Result<Box<dyn DirectoryConnection>, DirectoryError> {
        self.counters.acquisitions.fetch_add(1, Ordering::SeqCst);

        if self.down.load(Ordering::SeqCst) {
            return Err(DirectoryError::unreachable("connection refused"));
        }

        if let Some(dn) = bind_dn {
            if dn != ADMIN_DN && self.user_binds_fail.load(Ordering::SeqCst) {
                return Err(DirectoryError::unreachable("bind timed out"));
            }

            let accounts = self.accounts.lock().unwrap();
            if accounts.get(dn).map(String::as_str) != Some(password.unwrap_or_default()) {
                return Err(DirectoryError::InvalidCredentials);
            }
        }

        let entries = self.entries.lock().unwrap().clone();

        Ok(Box::new(FakeConnection {
            entries,
            search_fails: self.search_fails.load(Ordering::SeqCst),
            filters_seen: self.filters_seen.clone(),
            counters: self.counters.clone(),
        }))
    }
}

struct FakeConnection {
    entries: HashMap<String, Vec<DirectoryEntry>>,
    search_fails: bool,
    filters_seen: Arc<Mutex<Vec<String>>>,
    counters: Arc<Counters>,
}

#[async_trait]
impl DirectoryConnection for FakeConnection {
    async fn search(
        &mut self,
        _base_dn: &str,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        self.counters.searches.fetch_add(1, Ordering::SeqCst);
        self.filters_seen.lock().unwrap().push(filter.to_string());

        if self.search_fails {
            return Err(DirectoryError::unreachable("search timed out"));
        }

        Ok(self.entries.get(filter).cloned().unwrap_or_default())
    }

    async fn release(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}
