//! Shared server state
//!
//! One [`Context`] per server, shared by the accept loop, the tick loop and
//! every connection.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::{Mutex, MutexGuard};

use crate::config::ServerConfig;
use crate::core::Clock;
use crate::diagnostics::Diagnostics;
use crate::network::ddos::IpReputation;
use crate::servers::game::dispatch::Dispatcher;
use crate::session::{Registry, SessionId};
use crate::world::World;

/// Which connection each logged-in account belongs to.
#[derive(Default)]
pub struct AccountBindings {
    inner: Mutex<HashMap<i32, SessionId>>,
}

impl AccountBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Held while a connection releases its player and account, so a
    /// concurrent login sees either the old binding or none.
    pub fn lock(&self) -> MutexGuard<'_, HashMap<i32, SessionId>> {
        self.inner.lock()
    }

    /// Binds `account` to `session`, returning the previous holder.
    pub fn bind(&self, account: i32, session: SessionId) -> Option<SessionId> {
        self.inner.lock().insert(account, session)
    }

    pub fn session_for(&self, account: i32) -> Option<SessionId> {
        self.inner.lock().get(&account).copied()
    }
}

pub struct Context {
    pub config: ServerConfig,
    pub clock: Clock,
    pub registry: Registry,
    pub accounts: AccountBindings,
    pub ip_reputation: Arc<dyn IpReputation>,
    pub diagnostics: Diagnostics,
    pub world: Arc<dyn World>,
    pub dispatcher: Dispatcher,
    /// Decoded once at startup from `version_hashes` and `version_files`.
    pub version_hashes: Vec<Vec<u8>>,
}

impl Context {
    pub fn new(
        config: ServerConfig,
        clock: Clock,
        world: Arc<dyn World>,
        ip_reputation: Arc<dyn IpReputation>,
        diagnostics: Diagnostics,
    ) -> Result<Self> {
        config.validate()?;
        let version_hashes = config.accepted_version_hashes()?;

        Ok(Self {
            registry: Registry::new(config.max_connections),
            accounts: AccountBindings::new(),
            dispatcher: Dispatcher::game(),
            version_hashes,
            config,
            clock,
            world,
            ip_reputation,
            diagnostics,
        })
    }
}
