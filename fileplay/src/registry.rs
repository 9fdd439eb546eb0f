//! Player registry
//!
//! Fixed-capacity table of players addressed by integer handle. A handle is
//! the slot index, so it is unique among live players; invalid handles
//! simply find nothing.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::host;
use crate::playback::{Player, Renderer};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

type TeardownHook = Box<dyn Fn() + Send + Sync>;

/// Table of live players
pub struct PlayerRegistry {
    slots: RwLock<Vec<Option<Arc<Player>>>>,
    config: EngineConfig,
    teardown: Mutex<Vec<TeardownHook>>,
}

impl PlayerRegistry {
    pub fn new(config: EngineConfig) -> Self {
        info!("Player registry created with {} slots", config.max_players);
        Self {
            slots: RwLock::new(vec![None; config.max_players]),
            config,
            teardown: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.max_players
    }

    /// Create a player in the first free slot and return its handle
    pub fn instantiate(&self) -> Result<usize> {
        let mut slots = self.write_slots();
        let handle = slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::CapacityExceeded(self.config.max_players))?;
        slots[handle] = Some(Arc::new(Player::new(handle, &self.config)));
        debug!("Instantiated player {}", handle);
        Ok(handle)
    }

    /// Unload and remove a player. Returns false for an unknown handle.
    ///
    /// Removing the last player runs the registered teardown hooks.
    pub fn destroy(&self, handle: usize) -> bool {
        let (player, remaining) = {
            let mut slots = self.write_slots();
            let Some(player) = slots.get_mut(handle).and_then(Option::take) else {
                return false;
            };
            (player, slots.iter().filter(|slot| slot.is_some()).count())
        };

        player.unload();
        debug!("Destroyed player {}", handle);

        if remaining == 0 {
            let hooks = self.teardown.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if !hooks.is_empty() {
                info!("Last player destroyed, running {} teardown hooks", hooks.len());
            }
            for hook in hooks.iter() {
                hook();
            }
        }
        true
    }

    pub fn lookup(&self, handle: usize) -> Option<Arc<Player>> {
        self.read_slots().get(handle).cloned().flatten()
    }

    /// Claim the render endpoint of a player
    pub fn renderer(&self, handle: usize) -> Option<Renderer> {
        self.lookup(handle)?.renderer()
    }

    pub fn player_count(&self) -> usize {
        self.read_slots().iter().filter(|slot| slot.is_some()).count()
    }

    /// Handles of all live players, ascending
    pub fn handles(&self) -> Vec<usize> {
        self.read_slots()
            .iter()
            .enumerate()
            .filter_map(|(handle, slot)| slot.as_ref().map(|_| handle))
            .collect()
    }

    /// Adopt a new host sample rate and re-cue every open player so its
    /// next block is converted against the new rate
    pub fn set_host_sample_rate(&self, rate: u32) {
        if rate == 0 {
            return;
        }
        host::set_sample_rate(rate);
        for player in self.read_slots().iter().flatten() {
            player.rebase_sample_rate();
        }
    }

    /// Register a hook run whenever the last player is destroyed
    pub fn on_teardown(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.teardown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(hook));
    }

    fn read_slots(&self) -> RwLockReadGuard<'_, Vec<Option<Arc<Player>>>> {
        self.slots.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_slots(&self) -> RwLockWriteGuard<'_, Vec<Option<Arc<Player>>>> {
        self.slots.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for PlayerRegistry {
    fn drop(&mut self) {
        for handle in self.handles() {
            self.destroy(handle);
        }
    }
}
