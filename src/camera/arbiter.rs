//! Capture Resource Arbiter
//!
//! Owns a fixed table of consumer slots. Every mutation recomputes the active
//! binding set with [`select_active`] and rebinds the device. Slots pushed out
//! of the active set keep their request and come back automatically once a
//! higher-priority slot is cleared.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::camera::device::{CaptureDevice, CaptureProvider, DeviceCharacteristics, DeviceSelector};
use crate::camera::query;
use crate::camera::request::CaptureRequest;
use crate::constants::MAX_CONCURRENT_BINDINGS;
use crate::error::CaptureError;

/// Competing uses of the capture device, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConsumerSlot {
    Record = 0,
    Analyze = 1,
    Preview = 2,
}

impl ConsumerSlot {
    pub const ALL: [ConsumerSlot; 3] = [ConsumerSlot::Record, ConsumerSlot::Analyze, ConsumerSlot::Preview];

    /// Lower is higher priority
    pub fn priority(self) -> usize {
        self as usize
    }
}

/// Slot table indexed by priority
pub type SlotTable<T> = [Option<T>; 3];

/// Top `MAX_CONCURRENT_BINDINGS` populated slots in priority order
pub fn select_active<T: Clone>(table: &SlotTable<T>) -> Vec<(ConsumerSlot, T)> {
    ConsumerSlot::ALL
        .iter()
        .filter_map(|slot| table[slot.priority()].clone().map(|req| (*slot, req)))
        .take(MAX_CONCURRENT_BINDINGS)
        .collect()
}

struct ArbiterState {
    slots: SlotTable<Arc<CaptureRequest>>,
    active: Vec<ConsumerSlot>,
    selector: DeviceSelector,
    device_id: Option<String>,
}

/// Arbitrates the single capture device among consumer slots
pub struct CaptureArbiter {
    device: CaptureDevice,
    state: Mutex<ArbiterState>,
}

impl CaptureArbiter {
    /// Create an arbiter over `provider`, selecting the first device in
    /// switching order
    pub fn new(provider: Arc<dyn CaptureProvider>) -> Result<Self, CaptureError> {
        let device_id = query::next_device_id(&provider.devices(), None);
        let selector = match &device_id {
            Some(id) => DeviceSelector::require_id(id.clone()),
            None => {
                warn!("No capture device enumerated, using provider default");
                DeviceSelector::any()
            }
        };

        Ok(Self {
            device: CaptureDevice::new(provider)?,
            state: Mutex::new(ArbiterState {
                slots: [None, None, None],
                active: Vec::new(),
                selector,
                device_id,
            }),
        })
    }

    /// Store `request` in `slot` and rebind. Re-attaching replaces the
    /// previous request without a detach.
    pub fn attach(&self, slot: ConsumerSlot, request: Arc<CaptureRequest>) {
        let mut state = self.state.lock();
        state.slots[slot.priority()] = Some(request);

        if !self.device.is_started() {
            self.device.start();
        }
        self.rebind(&mut state);
        debug!(slot = ?slot, active = ?state.active, "Attached");
    }

    /// Clear `slot`; stops the device when nothing is left to bind
    pub fn detach(&self, slot: ConsumerSlot) {
        let mut state = self.state.lock();
        state.slots[slot.priority()] = None;

        if state.slots.iter().all(Option::is_none) {
            state.active.clear();
            self.device.unbind_all();
            self.device.stop();
            debug!(slot = ?slot, "Detached last slot, device stopped");
            return;
        }

        self.rebind(&mut state);
        debug!(slot = ?slot, active = ?state.active, "Detached");
    }

    /// Switch to device `id` and rebind active requests against it
    pub fn set_device(&self, id: &str) {
        let mut state = self.state.lock();
        info!(device = id, "Capture device changed");
        state.selector = DeviceSelector::require_id(id);
        state.device_id = Some(id.to_string());

        if !state.active.is_empty() {
            self.rebind(&mut state);
        }
    }

    /// Move to the next device in switching order
    pub fn switch_next_device(&self) -> Option<String> {
        let current = self.current_device_id();
        let devices = self.device.provider().devices();
        let next = query::next_device_id(&devices, current.as_deref())?;
        if current.as_deref() != Some(next.as_str()) {
            self.set_device(&next);
        }
        Some(next)
    }

    /// Slot holds a request, whether or not it is currently bound
    pub fn is_attached(&self, slot: ConsumerSlot) -> bool {
        self.state.lock().slots[slot.priority()].is_some()
    }

    /// Slots in the active binding set, in priority order
    pub fn active_slots(&self) -> Vec<ConsumerSlot> {
        self.state.lock().active.clone()
    }

    pub fn current_device_id(&self) -> Option<String> {
        self.state.lock().device_id.clone()
    }

    /// Capabilities of the current device
    ///
    /// Prefers the device the last binding landed on. Blocks until the
    /// provider first becomes ready.
    pub fn characteristics(&self) -> Option<DeviceCharacteristics> {
        let id = self.device.bound_device().or_else(|| self.current_device_id());
        match id {
            Some(id) => self.device.characteristics(&id),
            None => {
                warn!("Unable to query characteristics: no device selected");
                None
            }
        }
    }

    pub fn device(&self) -> &CaptureDevice {
        &self.device
    }

    /// Wait for queued device commands to finish
    pub async fn sync(&self) {
        self.device.sync().await;
    }

    fn rebind(&self, state: &mut ArbiterState) {
        let selected = select_active(&state.slots);
        state.active = selected.iter().map(|(slot, _)| *slot).collect();
        let requests = selected.into_iter().map(|(_, req)| req).collect();
        self.device.bind(state.selector.clone(), requests);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table(record: bool, analyze: bool, preview: bool) -> SlotTable<ConsumerSlot> {
        [
            record.then_some(ConsumerSlot::Record),
            analyze.then_some(ConsumerSlot::Analyze),
            preview.then_some(ConsumerSlot::Preview),
        ]
    }

    fn slots(active: Vec<(ConsumerSlot, ConsumerSlot)>) -> Vec<ConsumerSlot> {
        active.into_iter().map(|(slot, _)| slot).collect()
    }

    #[test]
    fn priority_order() {
        assert!(ConsumerSlot::Record.priority() < ConsumerSlot::Analyze.priority());
        assert!(ConsumerSlot::Analyze.priority() < ConsumerSlot::Preview.priority());
    }

    #[test]
    fn all_three_keeps_top_two() {
        let active = slots(select_active(&table(true, true, true)));
        assert_eq!(active, vec![ConsumerSlot::Record, ConsumerSlot::Analyze]);
    }

    #[test]
    fn preview_restored_when_analyze_cleared() {
        let active = slots(select_active(&table(true, false, true)));
        assert_eq!(active, vec![ConsumerSlot::Record, ConsumerSlot::Preview]);
    }

    #[test]
    fn empty_table_selects_nothing() {
        assert!(select_active(&table(false, false, false)).is_empty());
    }

    proptest! {
        #[test]
        fn active_set_is_top_two_of_populated(ops in prop::collection::vec((0usize..3, any::<bool>()), 0..64)) {
            let mut t: SlotTable<ConsumerSlot> = [None, None, None];
            for (index, attach) in ops {
                let slot = ConsumerSlot::ALL[index];
                t[index] = attach.then_some(slot);

                let active = slots(select_active(&t));
                let expected: Vec<ConsumerSlot> = ConsumerSlot::ALL
                    .iter()
                    .copied()
                    .filter(|s| t[s.priority()].is_some())
                    .take(2)
                    .collect();

                prop_assert!(active.len() <= MAX_CONCURRENT_BINDINGS);
                prop_assert_eq!(active, expected);
            }
        }
    }
}
