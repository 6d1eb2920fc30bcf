//! Resolution of the host imports exposed to guest bytecode.
pub(crate) mod abi_resolver;
pub mod error;
pub(crate) mod function_index;
pub(crate) mod memory_resolver;

use parity_wasm::elements::Module;
use wasmi::{ImportsBuilder, MemoryRef, ModuleInstance, ModuleRef};

use crate::execution;
use abi_resolver::ViewModuleImportResolver;
use memory_resolver::MemoryResolver;

/// Instantiates a preprocessed module against the view-call host ABI.
///
/// Returns the instance, the host-provided linear memory, and the names of
/// any imports the ABI does not know about; calling one of those reports
/// `notImplemented` instead of failing instantiation, so modules built
/// against newer host revisions still run as long as their view paths stay
/// within the supported surface.
pub(crate) fn instance_and_memory(
    parity_module: Module,
    max_memory: u32,
) -> Result<(ModuleRef, MemoryRef, Vec<String>), execution::Error> {
    let module = wasmi::Module::from_parity_wasm_module(parity_module)
        .map_err(|error| execution::Error::Instantiation(error.to_string()))?;
    let resolver = ViewModuleImportResolver::new(max_memory);
    let mut imports = ImportsBuilder::new();
    imports.push_resolver("env", &resolver);
    let not_started_module = ModuleInstance::new(&module, &imports)
        .map_err(|error| execution::Error::Instantiation(error.to_string()))?;

    // A start section would run guest code outside the invoked method and
    // before the bridge is in place.
    if not_started_module.has_start() {
        return Err(execution::Error::UnsupportedWasmStart);
    }

    let instance = not_started_module.not_started_instance().clone();
    let memory = resolver.memory_ref()?;
    Ok((instance, memory, resolver.take_unresolved_imports()))
}
