//! ---
//! ta_section: "01-core-functionality"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Authoritative in-memory state for the test agent."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use test_agent_common::config::FactsConfig;
use test_agent_common::model::{IntegrationState, ServiceKind, ServiceRunState};
use tracing::debug;

/// Values fixed at construction and never mutated by remote callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFacts {
    pub mock_mode: bool,
    pub version: String,
    pub model_id: String,
}

impl From<&FactsConfig> for StaticFacts {
    fn from(config: &FactsConfig) -> Self {
        Self {
            mock_mode: config.mock_mode,
            version: config.version.clone(),
            model_id: config.model_id.clone(),
        }
    }
}

impl Default for StaticFacts {
    fn default() -> Self {
        Self::from(&FactsConfig::default())
    }
}

/// Consistent copy of the mutable fields, taken under a single lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub integration: IntegrationState,
    pub run_states: BTreeMap<ServiceKind, ServiceRunState>,
}

#[derive(Debug)]
struct StoreInner {
    integration: IntegrationState,
    run_states: HashMap<ServiceKind, ServiceRunState>,
    facts: StaticFacts,
}

/// Single source of truth for integration mode, per-kind run state, and static facts.
///
/// Every accessor takes the one store-wide lock for the duration of a single
/// read or write and never holds it across an await point.
#[derive(Debug)]
pub struct StateStore {
    inner: Mutex<StoreInner>,
}

impl StateStore {
    pub fn new(facts: StaticFacts) -> Self {
        let run_states = ServiceKind::TRACKED
            .iter()
            .map(|kind| (*kind, ServiceRunState::Unknown))
            .collect();
        Self {
            inner: Mutex::new(StoreInner {
                integration: IntegrationState::Idle,
                run_states,
                facts,
            }),
        }
    }

    /// Untracked kinds read back as [`ServiceRunState::Unknown`].
    pub fn get_run_state(&self, kind: ServiceKind) -> ServiceRunState {
        let inner = self.inner.lock();
        inner
            .run_states
            .get(&kind)
            .copied()
            .unwrap_or(ServiceRunState::Unknown)
    }

    /// Unconditional overwrite; any state may follow any state.
    pub fn set_run_state(&self, kind: ServiceKind, state: ServiceRunState) {
        let previous = {
            let mut inner = self.inner.lock();
            inner.run_states.insert(kind, state)
        };
        debug!(service_kind = %kind, ?previous, state = %state, "run state updated");
    }

    pub fn get_integration_state(&self) -> IntegrationState {
        self.inner.lock().integration
    }

    pub fn set_integration_state(&self, state: IntegrationState) {
        let previous = {
            let mut inner = self.inner.lock();
            std::mem::replace(&mut inner.integration, state)
        };
        debug!(%previous, state = %state, "integration state updated");
    }

    pub fn get_static_facts(&self) -> StaticFacts {
        self.inner.lock().facts.clone()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.lock();
        StoreSnapshot {
            integration: inner.integration,
            run_states: inner
                .run_states
                .iter()
                .map(|(kind, state)| (*kind, *state))
                .collect(),
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(StaticFacts::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use strum::IntoEnumIterator;

    #[test]
    fn fresh_store_reports_unknown_for_every_kind() {
        let store = StateStore::default();
        for kind in ServiceKind::iter() {
            assert_eq!(store.get_run_state(kind), ServiceRunState::Unknown);
        }
        assert_eq!(store.get_integration_state(), IntegrationState::Idle);
    }

    #[test]
    fn seeds_tracked_kinds_only() {
        let snapshot = StateStore::default().snapshot();
        assert_eq!(
            snapshot.run_states.keys().copied().collect::<Vec<_>>(),
            ServiceKind::TRACKED.to_vec()
        );
    }

    #[test]
    fn any_state_may_follow_any_state() {
        let store = StateStore::default();
        for from in ServiceRunState::iter() {
            for to in ServiceRunState::iter() {
                store.set_run_state(ServiceKind::Navigation, from);
                store.set_run_state(ServiceKind::Navigation, to);
                assert_eq!(store.get_run_state(ServiceKind::Navigation), to);
            }
        }
    }

    #[test]
    fn unknown_kind_becomes_tracked_once_written() {
        let store = StateStore::default();
        store.set_run_state(ServiceKind::Unknown, ServiceRunState::Running);
        assert_eq!(
            store.get_run_state(ServiceKind::Unknown),
            ServiceRunState::Running
        );
        assert_eq!(store.snapshot().run_states.len(), 4);
    }

    #[test]
    fn static_facts_are_stable() {
        let facts = StaticFacts {
            mock_mode: false,
            version: "2.0.0".into(),
            model_id: "model-x".into(),
        };
        let store = StateStore::new(facts.clone());
        store.set_integration_state(IntegrationState::Av);
        store.set_run_state(ServiceKind::Inference, ServiceRunState::Error);
        assert_eq!(store.get_static_facts(), facts);
        assert_eq!(store.get_static_facts(), store.get_static_facts());
    }

    #[test]
    fn concurrent_writers_leave_one_of_the_written_values() {
        let store = Arc::new(StateStore::default());
        let writers: Vec<_> = (0..8)
            .map(|idx| {
                let store = store.clone();
                thread::spawn(move || {
                    let state = if idx % 2 == 0 {
                        ServiceRunState::Running
                    } else {
                        ServiceRunState::Stopped
                    };
                    for _ in 0..1_000 {
                        store.set_run_state(ServiceKind::Trajectory, state);
                        let observed = store.get_run_state(ServiceKind::Trajectory);
                        assert!(matches!(
                            observed,
                            ServiceRunState::Running | ServiceRunState::Stopped
                        ));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        assert!(matches!(
            store.get_run_state(ServiceKind::Trajectory),
            ServiceRunState::Running | ServiceRunState::Stopped
        ));
    }
}
