//! Preprocessing of Wasm modules.
use parity_wasm::elements::{self, Instruction, Module, TableType};
use pwasm_utils::{self, stack_height};
use thiserror::Error;

/// We only allow maximum of 4k function pointers in a table section.
pub const DEFAULT_MAX_TABLE_SIZE: u32 = 4096;
/// Maximum number of elements that can appear as immediate value to the
/// br_table instruction.
pub const DEFAULT_BR_TABLE_MAX_SIZE: u32 = 256;

/// An error emitted while validating a Wasm module.
#[derive(Debug, Clone, Error)]
pub enum WasmValidationError {
    /// Initial table size outside allowed bounds.
    #[error("initial table size {actual} exceeds allowed maximum {max}")]
    InitialTableSizeExceeded {
        /// Allowed maximum table size.
        max: u32,
        /// Actual initial table size in the Wasm.
        actual: u32,
    },
    /// Maximum table size outside allowed bounds.
    #[error("maximum table size {actual} exceeds allowed maximum {max}")]
    MaxTableSizeExceeded {
        /// Allowed maximum table size.
        max: u32,
        /// Actual maximum table size in the Wasm.
        actual: u32,
    },
    /// Number of the tables in a Wasm must be at most one.
    #[error("the number of tables must be at most one")]
    MoreThanOneTable,
    /// Length of a br_table exceeded the maximum allowed size.
    #[error("maximum br_table size exceeds allowed bounds (expected {max} but found {actual})")]
    BrTableSizeExceeded {
        /// Maximum allowed br_table length.
        max: u32,
        /// Actual size of the largest br_table in the code.
        actual: usize,
    },
}

/// An error emitted by the Wasm preprocessor.
#[derive(Debug, Clone, Error)]
pub enum PreprocessingError {
    /// Unable to deserialize Wasm bytes.
    #[error("deserialization error: {0}")]
    Deserialize(String),
    /// Stack limiter was unable to instrument the binary.
    #[error("stack limiter error")]
    StackLimiter,
    /// Wasm bytes is missing memory section.
    #[error("memory section should exist")]
    MissingMemorySection,
    /// Wasm validation did not pass.
    #[error("invalid wasm: {0}")]
    InvalidWasm(#[from] WasmValidationError),
}

impl From<elements::Error> for PreprocessingError {
    fn from(error: elements::Error) -> Self {
        PreprocessingError::Deserialize(error.to_string())
    }
}

/// True if the module declares at least one linear memory of its own.
fn has_memory_section(module: &Module) -> bool {
    module
        .memory_section()
        .map_or(false, |section| !section.entries().is_empty())
}

/// Normalizes the optional table section against the table-size ceiling.
///
/// A table entry without a maximum is pinned to the ceiling so the
/// interpreter can never grow it unboundedly.
fn ensure_table_size_limit(module: &mut Module) -> Result<(), WasmValidationError> {
    let Some(section) = module.table_section_mut() else {
        return Ok(());
    };
    if section.entries().len() > 1 {
        return Err(WasmValidationError::MoreThanOneTable);
    }
    let Some(table) = section.entries_mut().first_mut() else {
        return Ok(());
    };

    let initial = table.limits().initial();
    if initial > DEFAULT_MAX_TABLE_SIZE {
        return Err(WasmValidationError::InitialTableSizeExceeded {
            max: DEFAULT_MAX_TABLE_SIZE,
            actual: initial,
        });
    }
    match table.limits().maximum() {
        None => *table = TableType::new(initial, Some(DEFAULT_MAX_TABLE_SIZE)),
        Some(maximum) if maximum > DEFAULT_MAX_TABLE_SIZE => {
            return Err(WasmValidationError::MaxTableSizeExceeded {
                max: DEFAULT_MAX_TABLE_SIZE,
                actual: maximum,
            });
        }
        Some(_) => {}
    }
    Ok(())
}

/// Rejects any `br_table` whose immediate jump table exceeds the limit.
fn ensure_br_table_size_limit(module: &Module) -> Result<(), WasmValidationError> {
    let bodies = module
        .code_section()
        .map(|code| code.bodies())
        .unwrap_or_default();
    for body in bodies {
        for instruction in body.code().elements() {
            let Instruction::BrTable(branch_data) = instruction else {
                continue;
            };
            if branch_data.table.len() > DEFAULT_BR_TABLE_MAX_SIZE as usize {
                return Err(WasmValidationError::BrTableSizeExceeded {
                    max: DEFAULT_BR_TABLE_MAX_SIZE,
                    actual: branch_data.table.len(),
                });
            }
        }
    }
    Ok(())
}

/// Preprocesses Wasm bytes and returns a module ready for instantiation.
///
/// This process consists of a few steps:
/// - Validate that the given bytes contain a non-empty memory section and
///   normalize the table section limits.
/// - Externalize the module's linear memory so the host-provided memory
///   (and with it the configured page ceiling) is the only memory the guest
///   can touch.
/// - Ensure that the code has a maximum stack height.
///
/// View calls are not gas metered, so no opcode instrumentation happens
/// here; wall-clock and memory ceilings bound an invocation instead.
pub fn preprocess(
    max_memory_pages: u32,
    max_stack_height: u32,
    module_bytes: &[u8],
) -> Result<Module, PreprocessingError> {
    let mut module = deserialize(module_bytes)?;

    // Memory externalization below requires an internal memory to move;
    // checking up front also keeps `externalize_mem` from panicking on a
    // memoryless module.
    if !has_memory_section(&module) {
        return Err(PreprocessingError::MissingMemorySection);
    }

    ensure_table_size_limit(&mut module)?;
    ensure_br_table_size_limit(&module)?;

    // `pwasm-utils` 0.19.0 links against parity-wasm 0.42, while this crate
    // (and wasmi) use 0.45; the two `elements::Module` types are distinct at
    // the type level, so we bridge across the version boundary via a
    // serialize/deserialize round trip.
    let module_bytes = module.into_bytes()?;
    let bridged_module = pwasm_utils::parity_wasm::deserialize_buffer::<
        pwasm_utils::parity_wasm::elements::Module,
    >(&module_bytes)
    .map_err(|e| PreprocessingError::Deserialize(e.to_string()))?;
    let bridged_module = pwasm_utils::externalize_mem(bridged_module, None, max_memory_pages);
    let bridged_module = stack_height::inject_limiter(bridged_module, max_stack_height)
        .map_err(|_| PreprocessingError::StackLimiter)?;
    let bridged_bytes = bridged_module
        .to_bytes()
        .map_err(|e| PreprocessingError::Deserialize(e.to_string()))?;
    let module = parity_wasm::deserialize_buffer::<Module>(&bridged_bytes)?;
    Ok(module)
}

/// Returns a parity Module from the given bytes without making
/// modifications or checking limits.
pub fn deserialize(module_bytes: &[u8]) -> Result<Module, PreprocessingError> {
    parity_wasm::deserialize_buffer::<Module>(module_bytes).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wat(source: &str) -> Vec<u8> {
        wabt::wat2wasm(source).expect("should parse wat")
    }

    #[test]
    fn rejects_module_without_memory_section() {
        let module_bytes = wat(r#"(module (func (export "call")))"#);
        match preprocess(64, 64 * 1024, &module_bytes).unwrap_err() {
            PreprocessingError::MissingMemorySection => (),
            error => panic!("expected MissingMemorySection, got {:?}", error),
        }
    }

    #[test]
    fn rejects_oversized_table() {
        let module_bytes = wat(&format!(
            r#"(module
                (table {} funcref)
                (memory 1)
                (func (export "call")))"#,
            DEFAULT_MAX_TABLE_SIZE + 1
        ));
        match preprocess(64, 64 * 1024, &module_bytes).unwrap_err() {
            PreprocessingError::InvalidWasm(WasmValidationError::InitialTableSizeExceeded {
                ..
            }) => (),
            error => panic!("expected InitialTableSizeExceeded, got {:?}", error),
        }
    }

    #[test]
    fn externalizes_linear_memory() {
        let module_bytes = wat(r#"(module (memory 1) (func (export "call")))"#);
        let module = preprocess(64, 64 * 1024, &module_bytes).expect("should preprocess");
        let imports = module
            .import_section()
            .expect("should have imports")
            .entries();
        assert!(imports
            .iter()
            .any(|import| import.module() == "env" && import.field() == "memory"));
    }

    #[test]
    fn rejects_garbage_bytes() {
        match preprocess(64, 64 * 1024, b"not wasm at all").unwrap_err() {
            PreprocessingError::Deserialize(_) => (),
            error => panic!("expected Deserialize, got {:?}", error),
        }
    }
}
