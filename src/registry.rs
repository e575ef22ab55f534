//! Accepted credentials and their traffic counters.
//!
//! Every credential is enrolled in two forms: the 56-byte hex SHA-224 key
//! and its `Basic <base64>` encoding, so either form validates. Counters are
//! kept per form and merged when enumerating.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::relay::Traffic;
use crate::trojan::gen_key;
use crate::util::base64;

/// Length of `"Basic " + base64(key)` for a 56-byte key.
pub const AUTH_LEN: usize = 82;

fn basic_form(key: &str) -> String {
    format!("Basic {}", base64(key.as_bytes()))
}

#[derive(Debug, Default)]
pub struct Registry {
    users: RwLock<HashSet<String>>,
    usage: RwLock<HashMap<String, Traffic>>,
    total_up: AtomicU64,
    total_down: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&self, key: &str) {
        let basic = basic_form(key);
        let mut users = self.users.write();
        users.insert(basic);
        users.insert(key.to_owned());
    }

    pub fn add(&self, password: &str) {
        self.add_key(&gen_key(password));
    }

    /// Removes both forms of `key` together with their counters.
    pub fn del_key(&self, key: &str) {
        let basic = basic_form(key);
        let mut users = self.users.write();
        users.remove(&basic);
        users.remove(key);

        let mut usage = self.usage.write();
        usage.remove(&basic);
        usage.remove(key);
    }

    pub fn del(&self, password: &str) {
        self.del_key(&gen_key(password));
    }

    pub fn validate(&self, key: &str) -> bool {
        self.users.read().contains(key)
    }

    pub fn consume(&self, key: &str, traffic: Traffic) {
        {
            let mut usage = self.usage.write();
            let row = usage.entry(key.to_owned()).or_default();
            row.up += traffic.up;
            row.down += traffic.down;
        }

        self.total_up.fetch_add(traffic.up, Ordering::Relaxed);
        self.total_down.fetch_add(traffic.down, Ordering::Relaxed);
    }

    /// Calls `f(key, up, down)` once per enrolled user.
    ///
    /// Only raw keys are visited; the counters recorded under the `Basic`
    /// form are folded into the totals of the raw key.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&str, u64, u64),
    {
        let users = self.users.read();
        for key in users.iter().filter(|k| k.len() != AUTH_LEN) {
            let traffic = self.usage(key) + self.usage(&basic_form(key));
            f(key, traffic.up, traffic.down);
        }
    }

    /// Counters recorded under exactly this form of the credential.
    pub fn usage(&self, key: &str) -> Traffic {
        self.usage.read().get(key).copied().unwrap_or_default()
    }

    pub fn total(&self) -> Traffic {
        Traffic {
            up: self.total_up.load(Ordering::Relaxed),
            down: self.total_down.load(Ordering::Relaxed),
        }
    }

    /// Number of enrolled users, counted the way [`Registry::range`] visits them.
    pub fn len(&self) -> usize {
        self.users
            .read()
            .iter()
            .filter(|k| k.len() != AUTH_LEN)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
