//! 设备槽
//!
//! 进程内"一个设备供所有表面共享"的便捷持有者。
//! 设备本身仍然以 `Arc<dyn GraphicsDevice>` 显式注入给每个表面，
//! 槽只负责保证同一时间最多存在一个存活的设备。

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tracing::info;

use crate::core::config::GraphicsBackend;
use crate::core::error::{GraphicsError, Result};
use super::device::{GraphicsDevice, GraphicsDeviceOptions};

static GLOBAL_SLOT: OnceLock<DeviceSlot> = OnceLock::new();

/// 设备槽
#[derive(Default)]
pub struct DeviceSlot {
    device: Mutex<Option<Arc<dyn GraphicsDevice>>>,
}

impl DeviceSlot {
    /// 创建空槽
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级的共享槽
    pub fn global() -> &'static DeviceSlot {
        GLOBAL_SLOT.get_or_init(DeviceSlot::new)
    }

    /// 按后端创建设备并放入槽中
    pub fn init(
        &self,
        backend: GraphicsBackend,
        options: GraphicsDeviceOptions,
    ) -> Result<Arc<dyn GraphicsDevice>> {
        self.init_with(|| super::create_device(backend, options))
    }

    /// 用自定义工厂创建设备
    ///
    /// 槽中已有存活设备时返回 `DeviceAlreadyInitialized`，不会替换旧设备，
    /// 工厂也不会被调用。已释放的设备可以被新设备取代。
    pub fn init_with<F>(&self, factory: F) -> Result<Arc<dyn GraphicsDevice>>
    where
        F: FnOnce() -> Result<Arc<dyn GraphicsDevice>>,
    {
        let mut slot = self.lock();
        if let Some(existing) = slot.as_ref() {
            if !existing.is_disposed() {
                return Err(GraphicsError::DeviceAlreadyInitialized.into());
            }
        }

        let device = factory()?;
        info!(backend = device.backend().name(), "Graphics device initialized");
        *slot = Some(Arc::clone(&device));
        Ok(device)
    }

    /// 当前设备
    pub fn device(&self) -> Result<Arc<dyn GraphicsDevice>> {
        match self.lock().as_ref() {
            Some(device) if !device.is_disposed() => Ok(Arc::clone(device)),
            _ => Err(GraphicsError::DeviceDisposed.into()),
        }
    }

    /// 是否持有存活的设备
    pub fn is_initialized(&self) -> bool {
        self.lock().as_ref().map_or(false, |d| !d.is_disposed())
    }

    /// 释放设备（幂等）
    pub fn dispose(&self) {
        if let Some(device) = self.lock().take() {
            if !device.is_disposed() {
                device.dispose();
                info!(backend = device.backend().name(), "Graphics device disposed");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<dyn GraphicsDevice>>> {
        self.device.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::HeadlessDevice;

    fn headless() -> Result<Arc<dyn GraphicsDevice>> {
        Ok(Arc::new(HeadlessDevice::default()))
    }

    #[test]
    fn test_init_once() {
        let slot = DeviceSlot::new();
        assert!(slot.device().err().unwrap().is_device_disposed());

        let first = slot.init_with(headless).unwrap();
        assert!(slot.is_initialized());

        let err = slot.init_with(headless).err().unwrap();
        assert!(matches!(
            err,
            crate::core::error::DistSurfaceError::Graphics(GraphicsError::DeviceAlreadyInitialized)
        ));

        // 旧设备仍在槽中
        assert!(Arc::ptr_eq(&first, &slot.device().unwrap()));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let slot = DeviceSlot::new();
        let device = slot.init(GraphicsBackend::Headless, GraphicsDeviceOptions::default()).unwrap();

        slot.dispose();
        slot.dispose();

        assert!(device.is_disposed());
        assert!(slot.device().err().unwrap().is_device_disposed());
        assert!(device.create_command_list().unwrap_err().is_device_disposed());
    }

    #[test]
    fn test_reinit_after_dispose() {
        let slot = DeviceSlot::new();
        slot.init_with(headless).unwrap();
        slot.dispose();

        assert!(slot.init_with(headless).is_ok());
    }
}
