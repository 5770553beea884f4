//! Controller lifecycle state and the clients it controls.

use std::time::Instant;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use url::Url;

// ==================== Worker State ====================

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerState {
    /// Constructed, no lifecycle event seen yet.
    #[default]
    Parsed,
    /// Install event in progress.
    Installing,
    /// Installed, waiting for activation.
    Installed,
    /// Activate event in progress.
    Activating,
    /// Active and intercepting fetches.
    Activated,
    /// Replaced by another version.
    Redundant,
}

/// Lifecycle bookkeeping.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: WorkerState,
    skip_waiting: bool,
    state_changed_at: Instant,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: WorkerState::Parsed,
            skip_waiting: false,
            state_changed_at: Instant::now(),
        }
    }
}

impl Lifecycle {
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Time of last state change.
    pub fn state_changed_at(&self) -> Instant {
        self.state_changed_at
    }

    pub fn set_state(&mut self, state: WorkerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    /// Ask the host to activate without waiting for old clients to close.
    pub fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting
    }

    pub fn is_active(&self) -> bool {
        self.state == WorkerState::Activated
    }
}

// ==================== Clients ====================

/// A page the controller may serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Client ID.
    pub id: String,
    /// Client URL.
    pub url: Url,
    /// Cache version of the controller serving this client, if any.
    pub controller: Option<String>,
}

impl Client {
    /// An uncontrolled client.
    pub fn new(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            controller: None,
        }
    }
}

/// Clients known to the controller.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Take control of every client. Returns how many changed controller.
    pub fn claim(&mut self, controller: &str) -> usize {
        let mut changed = 0;
        for client in self.clients.values_mut() {
            if client.controller.as_deref() != Some(controller) {
                client.controller = Some(controller.to_string());
                changed += 1;
            }
        }
        changed
    }

    /// Clients served by the given controller version.
    pub fn controlled_by(&self, controller: &str) -> Vec<&Client> {
        self.clients
            .values()
            .filter(|c| c.controller.as_deref() == Some(controller))
            .collect()
    }
}
