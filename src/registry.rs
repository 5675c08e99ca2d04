//! Registered devices, formatted and mounted by id.

use anyhow::{Context, Result};
use log::{info, warn};

use crate::{
    error::ErrorKind,
    format,
    rfs::Rfs,
    storage::{BlockStorage, Device, DeviceId},
};

/// The maximum number of devices a registry holds.
pub const MAX_DEVICES: usize = 10;

enum Slot<S: BlockStorage> {
    Idle(Device<S>),
    /// The device is owned by a mounted [`Rfs`] until it is unmounted.
    Mounted,
}

/// The devices known to the system. Mounting a device moves it into the [`Rfs`]; unmounting
/// hands it back.
pub struct DeviceRegistry<S: BlockStorage> {
    slots: Vec<Slot<S>>,
}

impl<S: BlockStorage> DeviceRegistry<S> {
    pub fn new() -> Self {
        DeviceRegistry { slots: Vec::new() }
    }

    /// Registers `storage` under `name` and returns its id.
    pub fn register(&mut self, name: impl Into<String>, storage: S) -> Result<DeviceId> {
        if self.slots.len() >= MAX_DEVICES {
            return Err(anyhow::Error::new(ErrorKind::RegistryFull)
                .context(format!("at most {MAX_DEVICES} devices can be registered")));
        }

        let id = self.slots.len();
        let device = Device::new(id, name, storage);
        info!("registered device {} as #{id}", device.name());

        self.slots.push(Slot::Idle(device));
        Ok(id)
    }

    /// The device `id`, unless it is mounted.
    pub fn device(&self, id: DeviceId) -> Result<&Device<S>> {
        match self.slots.get(id) {
            Some(Slot::Idle(device)) => Ok(device),
            _ => Err(no_such_device(id)),
        }
    }

    /// Formats the device `id` with an empty RFS.
    pub fn format(&mut self, id: DeviceId) -> Result<()> {
        match self.slots.get_mut(id) {
            Some(Slot::Idle(device)) => format::format(device),
            _ => Err(no_such_device(id)),
        }
    }

    /// Mounts the device `id`. On failure the device stays registered and idle.
    pub fn mount(&mut self, id: DeviceId) -> Result<Rfs<S>> {
        let slot = self.slots.get_mut(id).ok_or_else(|| no_such_device(id))?;

        let Slot::Idle(device) = std::mem::replace(slot, Slot::Mounted) else {
            return Err(no_such_device(id));
        };

        Rfs::try_mount(device).map_err(|(err, device)| {
            *slot = Slot::Idle(device);
            err.context(format!("mounting device #{id}"))
        })
    }

    /// Unmounts `rfs` and returns its device to its slot. The device goes back to its slot even
    /// when the final sync fails.
    pub fn unmount(&mut self, rfs: Rfs<S>) -> Result<()> {
        let id = rfs.device().id();

        let slot = self
            .slots
            .get_mut(id)
            .filter(|slot| matches!(slot, Slot::Mounted))
            .ok_or_else(|| no_such_device(id))
            .context("device does not belong to this registry")?;

        match rfs.try_unmount() {
            Ok(device) => {
                *slot = Slot::Idle(device);
                Ok(())
            }
            Err((err, rfs)) => {
                warn!("device #{id} detached without syncing its bitmap");
                *slot = Slot::Idle(rfs.into_device());
                Err(err.context(format!("unmounting device #{id}")))
            }
        }
    }
}

impl<S: BlockStorage> Default for DeviceRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

fn no_such_device(id: DeviceId) -> anyhow::Error {
    anyhow::Error::new(ErrorKind::NoSuchDevice).context(format!("no idle device #{id}"))
}
