//! Registry of per-device control groups.
//!
//! Each controlled device owns one group: its [`ThermalManager`] (which in
//! turn owns the probe manager) and its [`OffsetEngine`]. Groups are keyed
//! solely by [`PhysicalId`]. The display identifier is a label carried for
//! logging and may change at any time without affecting lookups.
//!
//! The registry is an explicit value handed to whoever needs it, typically
//! as an `Arc<ThermalRegistry>`.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::device::{DisplayId, PhysicalId};
use crate::offset::OffsetEngine;
use crate::thermal::ThermalManager;

/// The thermal components of one device.
#[derive(Debug)]
pub struct DeviceGroup {
    physical_id: PhysicalId,
    label: RwLock<DisplayId>,
    manager: Mutex<ThermalManager>,
    offset: Mutex<OffsetEngine>,
}

impl DeviceGroup {
    /// Group a manager and engine under the manager's device identifier.
    pub fn new(label: DisplayId, manager: ThermalManager, offset: OffsetEngine) -> Self {
        let physical_id = manager.device().clone();
        if offset.device() != &physical_id {
            tracing::warn!(
                device = %physical_id,
                offset_device = %offset.device(),
                "Offset engine was built for a different device"
            );
        }
        Self {
            physical_id,
            label: RwLock::new(label),
            manager: Mutex::new(manager),
            offset: Mutex::new(offset),
        }
    }

    pub fn physical_id(&self) -> &PhysicalId {
        &self.physical_id
    }

    pub fn label(&self) -> DisplayId {
        self.label.read().clone()
    }

    pub fn set_label(&self, label: DisplayId) {
        *self.label.write() = label;
    }

    pub fn manager(&self) -> &Mutex<ThermalManager> {
        &self.manager
    }

    pub fn offset(&self) -> &Mutex<OffsetEngine> {
        &self.offset
    }
}

/// Concurrent map from physical identifier to device group.
#[derive(Debug, Default)]
pub struct ThermalRegistry {
    groups: DashMap<PhysicalId, Arc<DeviceGroup>>,
}

impl ThermalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group, replacing any group registered for the same device.
    pub fn register(&self, group: DeviceGroup) -> Arc<DeviceGroup> {
        let group = Arc::new(group);
        let id = group.physical_id().clone();
        if self.groups.insert(id.clone(), Arc::clone(&group)).is_some() {
            tracing::warn!(device = %id, "Replaced existing device group");
        } else {
            tracing::debug!(device = %id, label = %group.label(), "Device group registered");
        }
        group
    }

    pub fn get(&self, id: &PhysicalId) -> Option<Arc<DeviceGroup>> {
        self.groups.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &PhysicalId) -> Option<Arc<DeviceGroup>> {
        self.groups.remove(id).map(|(_, group)| group)
    }

    /// Change a device's display label. Returns false if it is not registered.
    pub fn rename(&self, id: &PhysicalId, label: DisplayId) -> bool {
        match self.get(id) {
            Some(group) => {
                tracing::info!(device = %id, from = %group.label(), to = %label, "Device relabelled");
                group.set_label(label);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &PhysicalId) -> bool {
        self.groups.contains_key(id)
    }

    /// Registered identifiers in sorted order.
    pub fn ids(&self) -> Vec<PhysicalId> {
        let mut ids: Vec<_> = self.groups.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
