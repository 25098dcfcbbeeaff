//! RAII wrappers over the runtime object model
//!
//! [`Fpga`] enumerates platforms and devices and owns named [`Context`]s.
//! Everything else borrows a context: [`Buffer`], [`Kernel`] and
//! [`CommandQueue`] cannot outlive the context they were created against.

mod binary;
mod buffer;
mod context;
mod host;
mod kernel;
mod queue;

pub use binary::BinaryReader;
pub use buffer::Buffer;
pub use context::Context;
pub use host::{HostMemory, HOST_MEMORY_ALIGNMENT};
pub use kernel::Kernel;
pub use queue::{CommandQueue, SyncMode};

use crate::error::{Error, ObjectKind, Result};
use crate::runtime::{BinaryStatus, ContextProperties, DeviceType, Runtime};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

/// Enumerated platforms/devices plus a registry of named contexts
pub struct Fpga<R: Runtime> {
    runtime: Rc<R>,
    platforms: Vec<R::Platform>,
    devices: HashMap<R::Platform, Vec<R::Device>>,
    contexts: HashMap<String, Context<R>>,
}

impl<R: Runtime> Fpga<R> {
    /// Enumerates every platform and all of its devices
    pub fn new(runtime: R) -> Result<Self> {
        Self::with_device_type(runtime, DeviceType::All)
    }

    /// Enumerates every platform, keeping only devices of `device_type`
    pub fn with_device_type(runtime: R, device_type: DeviceType) -> Result<Self> {
        let platforms = runtime.platform_ids()?;
        let mut devices = HashMap::with_capacity(platforms.len());
        for &platform in &platforms {
            let ids = runtime.device_ids(platform, device_type)?;
            tracing::debug!(?platform, devices = ids.len(), "platform enumerated");
            devices.insert(platform, ids);
        }
        tracing::info!(platforms = platforms.len(), ?device_type, "compute platforms enumerated");

        Ok(Self {
            runtime: Rc::new(runtime),
            platforms,
            devices,
            contexts: HashMap::new(),
        })
    }

    pub fn platforms(&self) -> &[R::Platform] {
        &self.platforms
    }

    pub fn devices(&self, platform: R::Platform) -> Result<&[R::Device]> {
        self.devices
            .get(&platform)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::not_found(ObjectKind::Platform, format!("{platform:?}")))
    }

    pub fn first_platform(&self) -> Result<R::Platform> {
        self.platforms
            .first()
            .copied()
            .ok_or_else(|| Error::not_found(ObjectKind::Platform, "first"))
    }

    /// First device of the first platform
    pub fn first_device(&self) -> Result<R::Device> {
        let platform = self.first_platform()?;
        self.devices(platform)?
            .first()
            .copied()
            .ok_or_else(|| Error::not_found(ObjectKind::Device, "first"))
    }

    pub fn platform_name(&self, platform: R::Platform) -> Result<String> {
        self.runtime.platform_name(platform)
    }

    pub fn device_name(&self, device: R::Device) -> Result<String> {
        self.runtime.device_name(device)
    }

    /// Creates and registers a context under `name`
    ///
    /// Fails with [`Error::AlreadyExists`] if the name is taken; the existing
    /// context is left untouched.
    pub fn create_context(
        &mut self,
        name: &str,
        devices: &[R::Device],
        properties: ContextProperties<R::Platform>,
    ) -> Result<&mut Context<R>> {
        if self.contexts.contains_key(name) {
            return Err(Error::already_exists(ObjectKind::Context, name));
        }
        let context = Context::new(Rc::clone(&self.runtime), name, devices, &properties)?;
        tracing::info!(context = name, devices = devices.len(), "context created");
        Ok(self.contexts.entry(name.to_string()).or_insert(context))
    }

    pub fn context(&self, name: &str) -> Result<&Context<R>> {
        self.contexts
            .get(name)
            .ok_or_else(|| Error::not_found(ObjectKind::Context, name))
    }

    pub fn context_mut(&mut self, name: &str) -> Result<&mut Context<R>> {
        self.contexts
            .get_mut(name)
            .ok_or_else(|| Error::not_found(ObjectKind::Context, name))
    }

    pub fn contexts(&self) -> impl Iterator<Item = &str> {
        self.contexts.keys().map(String::as_str)
    }

    /// Loads a bitstream into the named context
    pub fn load_binary_program<P: AsRef<Path>>(
        &mut self,
        context_name: &str,
        program_name: &str,
        path: P,
    ) -> Result<Vec<BinaryStatus>> {
        self.context_mut(context_name)?.load_program(program_name, path)
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::SimRuntime;

    #[test]
    fn empty_runtime_has_no_first_device() {
        let fpga = Fpga::new(SimRuntime::new()).unwrap();
        assert!(fpga.platforms().is_empty());
        assert!(matches!(
            fpga.first_platform().unwrap_err(),
            Error::NotFound { kind: ObjectKind::Platform, .. }
        ));
        assert!(matches!(
            fpga.first_device().unwrap_err(),
            Error::NotFound { kind: ObjectKind::Platform, .. }
        ));
    }

    #[test]
    fn platform_without_devices_has_no_first_device() {
        let fpga = Fpga::with_device_type(SimRuntime::fpga_board(), DeviceType::Gpu).unwrap();
        assert_eq!(fpga.platforms().len(), 1);
        assert!(matches!(
            fpga.first_device().unwrap_err(),
            Error::NotFound { kind: ObjectKind::Device, .. }
        ));
    }

    #[test]
    fn enumerates_devices_per_platform() {
        let rt = SimRuntime::new()
            .with_platform("a", &["a0", "a1"])
            .with_platform_of_type("b", DeviceType::Cpu, &["b0"]);
        let fpga = Fpga::new(rt).unwrap();
        let names: Vec<String> = fpga
            .platforms()
            .iter()
            .map(|&p| fpga.platform_name(p).unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(fpga.devices(fpga.platforms()[0]).unwrap().len(), 2);
        assert_eq!(fpga.device_name(fpga.first_device().unwrap()).unwrap(), "a0");
    }

    #[test]
    fn duplicate_context_keeps_the_first() {
        let mut fpga = Fpga::new(SimRuntime::fpga_board()).unwrap();
        let device = fpga.first_device().unwrap();
        let first = fpga
            .create_context("Context1", &[device], ContextProperties::default())
            .unwrap()
            .handle();

        let err = fpga
            .create_context("Context1", &[device], ContextProperties::default())
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { kind: ObjectKind::Context, .. }));
        assert_eq!(fpga.context("Context1").unwrap().handle(), first);
        assert_eq!(fpga.contexts().count(), 1);
    }

    #[test]
    fn unknown_context_is_not_found() {
        let mut fpga = Fpga::new(SimRuntime::fpga_board()).unwrap();
        assert!(matches!(
            fpga.context("missing").unwrap_err(),
            Error::NotFound { kind: ObjectKind::Context, .. }
        ));
        let err = fpga
            .load_binary_program("missing", "prog", "/nonexistent.aocx")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: ObjectKind::Context, .. }));
    }

    #[test]
    fn empty_device_set_is_rejected() {
        let mut fpga = Fpga::new(SimRuntime::fpga_board()).unwrap();
        let err = fpga
            .create_context("ctx", &[], ContextProperties::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(fpga.context("ctx").is_err());
    }

    #[test]
    fn context_bound_to_platform() {
        let mut fpga = Fpga::new(SimRuntime::fpga_board()).unwrap();
        let platform = fpga.first_platform().unwrap();
        let device = fpga.first_device().unwrap();
        let properties = ContextProperties { platform: Some(platform) };
        assert!(fpga.create_context("ctx", &[device], properties).is_ok());
    }
}
