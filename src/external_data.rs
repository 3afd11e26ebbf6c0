//! Host-supplied DataRef buffers, tracked by name so they survive patch swaps.

use std::collections::BTreeMap;

use cadenza_core::{data_ref_index, DataType, EngineCore, Event, Patcher};

use crate::{Error, Result};

/// Receives a host buffer back once the engine no longer uses it.
pub type ReleaseCallback = Box<dyn FnOnce(String, Vec<u8>) + Send>;

struct ExternalEntry {
    data_type: DataType,
    release: ReleaseCallback,
}

/// A buffer waiting to be handed back. Run it after the control permit is dropped.
pub(crate) struct PendingRelease {
    name: String,
    buffer: Vec<u8>,
    release: ReleaseCallback,
}

impl PendingRelease {
    pub(crate) fn run(self) {
        (self.release)(self.name, self.buffer);
    }
}

pub(crate) fn run_all(releases: Vec<PendingRelease>) {
    for release in releases {
        release.run();
    }
}

#[derive(Default)]
pub(crate) struct ExternalDataMap {
    entries: BTreeMap<String, ExternalEntry>,
}

impl ExternalDataMap {
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Hand `buffer` to the patch's DataRef `name`. A buffer previously supplied for the
    /// same name is returned for release.
    pub(crate) fn set(
        &mut self,
        core: &mut EngineCore,
        name: &str,
        buffer: Vec<u8>,
        data_type: DataType,
        release: ReleaseCallback,
    ) -> std::result::Result<Option<PendingRelease>, (Error, PendingRelease)> {
        let index = data_ref_index(core.patcher(), name);
        let data_ref = index.and_then(|i| core.patcher_mut().data_ref_mut(i));
        let Some(data_ref) = data_ref else {
            let unknown = PendingRelease {
                name: name.to_string(),
                buffer,
                release,
            };
            return Err((Error::UnknownDataRef(name.to_string()), unknown));
        };

        data_ref.set_data_type(data_type);
        let previous = data_ref.set_data(buffer, false);
        let previous_entry = self.entries.insert(
            name.to_string(),
            ExternalEntry { data_type, release },
        );

        if let Some(index) = index {
            schedule_update(core, index);
        }
        Ok(match (previous, previous_entry) {
            (Some(buffer), Some(entry)) => Some(PendingRelease {
                name: name.to_string(),
                buffer,
                release: entry.release,
            }),
            _ => None,
        })
    }

    /// Take the host buffer for `name` back out of the patch.
    pub(crate) fn release(&mut self, core: &mut EngineCore, name: &str) -> Result<PendingRelease> {
        let entry = self
            .entries
            .remove(name)
            .ok_or_else(|| Error::UnknownDataRef(name.to_string()))?;
        let index = data_ref_index(core.patcher(), name);
        let buffer = index
            .and_then(|i| core.patcher_mut().data_ref_mut(i))
            .and_then(|d| d.take_data())
            .unwrap_or_default();
        if let Some(index) = index {
            schedule_update(core, index);
        }
        Ok(PendingRelease {
            name: name.to_string(),
            buffer,
            release: entry.release,
        })
    }

    /// Move host buffers from `old` into the newly attached patch of `core`, matching by
    /// name. Names the new patch does not expose are released.
    pub(crate) fn revalidate(
        &mut self,
        core: &mut EngineCore,
        old: &mut dyn Patcher,
    ) -> Vec<PendingRelease> {
        let mut releases = Vec::new();
        let names: Vec<String> = self.entries.keys().cloned().collect();
        for name in names {
            let buffer = data_ref_index(old, &name)
                .and_then(|i| old.data_ref_mut(i))
                .and_then(|d| d.take_data())
                .unwrap_or_default();

            match data_ref_index(core.patcher(), &name) {
                Some(index) => {
                    let Some(entry) = self.entries.get(&name) else {
                        continue;
                    };
                    let data_type = entry.data_type;
                    if let Some(data_ref) = core.patcher_mut().data_ref_mut(index) {
                        data_ref.set_data_type(data_type);
                        data_ref.set_data(buffer, false);
                    }
                    schedule_update(core, index);
                }
                None => {
                    if let Some(entry) = self.entries.remove(&name) {
                        tracing::debug!("Releasing external data '{}' not used by new patch", name);
                        releases.push(PendingRelease {
                            name,
                            buffer,
                            release: entry.release,
                        });
                    }
                }
            }
        }
        releases
    }

    /// Take every host buffer back.
    pub(crate) fn release_all(&mut self, core: &mut EngineCore) -> Vec<PendingRelease> {
        let names: Vec<String> = self.entries.keys().cloned().collect();
        names
            .iter()
            .filter_map(|name| self.release(core, name).ok())
            .collect()
    }
}

/// Indices belong to the attached patch, so the event is addressed to it and erased if that
/// patch is replaced before it runs.
fn schedule_update(core: &mut EngineCore, index: usize) {
    let event = Event::data_ref_updated(index, core.current_time()).with_target(core.target());
    core.schedule_event(event);
}
