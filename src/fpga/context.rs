//! Execution context and its loaded programs

use super::binary::BinaryReader;
use crate::error::{Error, ObjectKind, Result};
use crate::runtime::{BinaryStatus, ContextProperties, Runtime};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

/// A native context spanning a set of devices, owning the programs loaded
/// into it
pub struct Context<R: Runtime> {
    name: String,
    runtime: Rc<R>,
    handle: R::Context,
    devices: Vec<R::Device>,
    programs: HashMap<String, R::Program>,
}

impl<R: Runtime> Context<R> {
    pub(crate) fn new(
        runtime: Rc<R>,
        name: &str,
        devices: &[R::Device],
        properties: &ContextProperties<R::Platform>,
    ) -> Result<Self> {
        if devices.is_empty() {
            return Err(Error::invalid_argument(format!("context `{name}` needs at least one device")));
        }
        let handle = runtime.create_context(devices, properties)?;

        Ok(Self {
            name: name.to_string(),
            runtime,
            handle,
            devices: devices.to_vec(),
            programs: HashMap::new(),
        })
    }

    /// Loads a precompiled bitstream for every device of the context and
    /// registers it under `program_name`
    pub fn load_program<P: AsRef<Path>>(&mut self, program_name: &str, path: P) -> Result<Vec<BinaryStatus>> {
        if self.programs.contains_key(program_name) {
            return Err(Error::already_exists(ObjectKind::Program, program_name));
        }
        let binary = BinaryReader::open(path)?;

        let (program, binary_status) =
            self.runtime
                .create_program_with_binary(self.handle, &self.devices, binary.as_bytes())?;
        if let Err(e) = self.runtime.build_program(program, &self.devices) {
            if let Err(release) = self.runtime.release_program(program) {
                tracing::warn!(program = program_name, error = %release, "failed to release unbuilt program");
            }
            return Err(e);
        }

        tracing::info!(
            context = %self.name,
            program = program_name,
            path = %binary.path().display(),
            size = binary.len(),
            "program loaded"
        );
        self.programs.insert(program_name.to_string(), program);
        Ok(binary_status)
    }

    pub fn program(&self, name: &str) -> Result<R::Program> {
        self.programs
            .get(name)
            .copied()
            .ok_or_else(|| Error::not_found(ObjectKind::Program, name))
    }

    pub fn programs(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn devices(&self) -> &[R::Device] {
        &self.devices
    }

    pub fn device(&self, index: usize) -> Result<R::Device> {
        self.devices
            .get(index)
            .copied()
            .ok_or_else(|| Error::not_found(ObjectKind::Device, format!("#{index} of context `{}`", self.name)))
    }

    pub fn handle(&self) -> R::Context {
        self.handle
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }
}

impl<R: Runtime> Drop for Context<R> {
    fn drop(&mut self) {
        for (name, program) in self.programs.drain() {
            if let Err(e) = self.runtime.release_program(program) {
                tracing::warn!(program = %name, error = %e, "failed to release program");
            }
        }
        if let Err(e) = self.runtime.release_context(self.handle) {
            tracing::warn!(context = %self.name, error = %e, "failed to release context");
        }
        tracing::debug!(context = %self.name, "context released");
    }
}

impl<R: Runtime> std::fmt::Debug for Context<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("devices", &self.devices)
            .field("programs", &self.programs.keys().collect::<Vec<_>>())
            .finish()
    }
}
