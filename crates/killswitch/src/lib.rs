//! Kill Switch (C6): a single process-wide boolean, served from a
//! volatile cache with a durable fallback in `GovernorState`. When
//! engaged, the pipeline short-circuits at layer 1 with `block`/`risk=100`.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use gov_domain::error::Result;
use gov_domain::governor::{GovernorFlag, KILL_SWITCH_KEY};
use gov_domain::trace::TraceEvent;
use gov_domain::traits::{Clock, Principal, Store};

pub struct KillSwitch {
    volatile: AtomicBool,
    write_lock: Mutex<()>,
}

impl KillSwitch {
    pub fn new(initial: bool) -> Self {
        Self { volatile: AtomicBool::new(initial), write_lock: Mutex::new(()) }
    }

    /// Current cached state. Never blocks, never touches the store.
    pub fn is_engaged(&self) -> bool {
        self.volatile.load(Ordering::SeqCst)
    }

    /// Loads the persisted flag into the volatile cache, e.g. at startup.
    /// Leaves the cache unchanged if the store has no record yet.
    pub async fn load_from_store(&self, store: &dyn Store) -> Result<()> {
        if let Some(flag) = store.get_governor_flag(KILL_SWITCH_KEY).await? {
            self.volatile.store(flag.value, Ordering::SeqCst);
        }
        Ok(())
    }

    pub async fn engage(&self, store: &dyn Store, clock: &dyn Clock, actor: &Principal) -> Result<()> {
        self.set(true, store, clock, actor).await
    }

    pub async fn release(&self, store: &dyn Store, clock: &dyn Clock, actor: &Principal) -> Result<()> {
        self.set(false, store, clock, actor).await
    }

    async fn set(&self, value: bool, store: &dyn Store, clock: &dyn Clock, actor: &Principal) -> Result<()> {
        {
            let _guard = self.write_lock.lock();
            self.volatile.store(value, Ordering::SeqCst);
        }
        let flag = GovernorFlag {
            key: KILL_SWITCH_KEY.to_string(),
            value,
            updated_at: clock.now(),
            actor_id: actor.actor_id.clone(),
        };
        store.put_governor_flag(flag).await?;
        TraceEvent::KillSwitchToggled { engaged: value, actor_id: actor.actor_id.clone() }.emit();
        Ok(())
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new(false)
    }
}
