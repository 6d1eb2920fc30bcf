//! WASM host function resolver for the view-call ABI.
use std::cell::RefCell;

use wasmi::{
    memory_units::Pages, Error as InterpreterError, FuncInstance, FuncRef, MemoryDescriptor,
    MemoryInstance, MemoryRef, ModuleImportResolver, Signature, ValueType,
};

use super::{
    error::ResolverError,
    function_index::{FunctionIndex, UNKNOWN_IMPORT_BASE},
    memory_resolver::MemoryResolver,
};

pub(crate) struct ViewModuleImportResolver {
    memory: RefCell<Option<MemoryRef>>,
    max_memory: u32,
    /// Imports outside the known ABI, in resolution order; entry `i` is
    /// dispatched as host function `UNKNOWN_IMPORT_BASE + i`.
    unresolved_imports: RefCell<Vec<String>>,
}

impl ViewModuleImportResolver {
    pub(crate) fn new(max_memory: u32) -> Self {
        Self {
            memory: RefCell::new(None),
            max_memory,
            unresolved_imports: RefCell::new(Vec::new()),
        }
    }

    /// Consumes the names recorded for imports outside the known ABI.
    pub(crate) fn take_unresolved_imports(&self) -> Vec<String> {
        self.unresolved_imports.take()
    }
}

impl MemoryResolver for ViewModuleImportResolver {
    fn memory_ref(&self) -> Result<MemoryRef, ResolverError> {
        self.memory
            .borrow()
            .as_ref()
            .map(Clone::clone)
            .ok_or(ResolverError::NoImportedMemory)
    }
}

impl ModuleImportResolver for ViewModuleImportResolver {
    fn resolve_func(
        &self,
        field_name: &str,
        signature: &Signature,
    ) -> Result<FuncRef, InterpreterError> {
        let func_ref = match field_name {
            "input" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 1][..], None),
                FunctionIndex::Input.into(),
            ),
            "register_len" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 1][..], Some(ValueType::I64)),
                FunctionIndex::RegisterLen.into(),
            ),
            "read_register" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 2][..], None),
                FunctionIndex::ReadRegister.into(),
            ),
            "value_return" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 2][..], None),
                FunctionIndex::ValueReturn.into(),
            ),
            "log_utf8" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 2][..], None),
                FunctionIndex::LogUtf8.into(),
            ),
            "log_utf16" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 2][..], None),
                FunctionIndex::LogUtf16.into(),
            ),
            "panic" => FuncInstance::alloc_host(
                Signature::new(&[][..], None),
                FunctionIndex::Panic.into(),
            ),
            "panic_utf8" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 2][..], None),
                FunctionIndex::PanicUtf8.into(),
            ),
            "abort" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 4][..], None),
                FunctionIndex::Abort.into(),
            ),
            "current_account_id" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 1][..], None),
                FunctionIndex::CurrentAccountId.into(),
            ),
            "predecessor_account_id" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 1][..], None),
                FunctionIndex::PredecessorAccountId.into(),
            ),
            "signer_account_id" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 1][..], None),
                FunctionIndex::SignerAccountId.into(),
            ),
            "block_index" => FuncInstance::alloc_host(
                Signature::new(&[][..], Some(ValueType::I64)),
                FunctionIndex::BlockIndex.into(),
            ),
            "block_timestamp" => FuncInstance::alloc_host(
                Signature::new(&[][..], Some(ValueType::I64)),
                FunctionIndex::BlockTimestamp.into(),
            ),
            "account_balance" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 1][..], None),
                FunctionIndex::AccountBalance.into(),
            ),
            "account_locked_balance" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 1][..], None),
                FunctionIndex::AccountLockedBalance.into(),
            ),
            "storage_usage" => FuncInstance::alloc_host(
                Signature::new(&[][..], Some(ValueType::I64)),
                FunctionIndex::StorageUsage.into(),
            ),
            "storage_read" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 3][..], Some(ValueType::I64)),
                FunctionIndex::StorageRead.into(),
            ),
            "storage_has_key" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 2][..], Some(ValueType::I64)),
                FunctionIndex::StorageHasKey.into(),
            ),
            "storage_iter_prefix" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 2][..], Some(ValueType::I64)),
                FunctionIndex::StorageIterPrefix.into(),
            ),
            "storage_iter_range" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 4][..], Some(ValueType::I64)),
                FunctionIndex::StorageIterRange.into(),
            ),
            "storage_iter_next" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 3][..], Some(ValueType::I64)),
                FunctionIndex::StorageIterNext.into(),
            ),
            "attached_deposit" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 1][..], None),
                FunctionIndex::AttachedDeposit.into(),
            ),
            "prepaid_gas" => FuncInstance::alloc_host(
                Signature::new(&[][..], Some(ValueType::I64)),
                FunctionIndex::PrepaidGas.into(),
            ),
            "used_gas" => FuncInstance::alloc_host(
                Signature::new(&[][..], Some(ValueType::I64)),
                FunctionIndex::UsedGas.into(),
            ),
            "random_seed" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 1][..], None),
                FunctionIndex::RandomSeed.into(),
            ),
            "sha256" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 3][..], None),
                FunctionIndex::Sha256.into(),
            ),
            "storage_write" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 5][..], Some(ValueType::I64)),
                FunctionIndex::StorageWrite.into(),
            ),
            "storage_remove" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 3][..], Some(ValueType::I64)),
                FunctionIndex::StorageRemove.into(),
            ),
            "promise_create" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 8][..], Some(ValueType::I64)),
                FunctionIndex::PromiseCreate.into(),
            ),
            "promise_then" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 9][..], Some(ValueType::I64)),
                FunctionIndex::PromiseThen.into(),
            ),
            "promise_and" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 2][..], Some(ValueType::I64)),
                FunctionIndex::PromiseAnd.into(),
            ),
            "promise_batch_create" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 2][..], Some(ValueType::I64)),
                FunctionIndex::PromiseBatchCreate.into(),
            ),
            "promise_batch_then" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 3][..], Some(ValueType::I64)),
                FunctionIndex::PromiseBatchThen.into(),
            ),
            "promise_results_count" => FuncInstance::alloc_host(
                Signature::new(&[][..], Some(ValueType::I64)),
                FunctionIndex::PromiseResultsCount.into(),
            ),
            "promise_result" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 2][..], Some(ValueType::I64)),
                FunctionIndex::PromiseResult.into(),
            ),
            "promise_return" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I64; 1][..], None),
                FunctionIndex::PromiseReturn.into(),
            ),
            _ => {
                // An import beyond the known ABI. Link it with the
                // signature the module asked for; invoking it reports
                // `notImplemented` so the caller can fall back upstream.
                let mut unresolved = self.unresolved_imports.borrow_mut();
                let index = UNKNOWN_IMPORT_BASE + unresolved.len();
                unresolved.push(field_name.to_string());
                FuncInstance::alloc_host(signature.clone(), index)
            }
        };
        Ok(func_ref)
    }

    fn resolve_memory(
        &self,
        field_name: &str,
        descriptor: &MemoryDescriptor,
    ) -> Result<MemoryRef, InterpreterError> {
        if field_name != "memory" {
            return Err(InterpreterError::Instantiation(format!(
                "unexpected memory import `{field_name}`"
            )));
        }

        let mut slot = self.memory.borrow_mut();
        if slot.is_some() {
            return Err(InterpreterError::Instantiation(
                "module imports more than one linear memory".into(),
            ));
        }

        // Preprocessing rewrites the memory entry with an explicit maximum;
        // treat a missing one as the ceiling anyway so a hand-built module
        // cannot sidestep the limit. Pages are 64 KiB.
        let initial = descriptor.initial();
        let maximum = descriptor.maximum().unwrap_or(self.max_memory);
        if initial > maximum || maximum > self.max_memory {
            return Err(InterpreterError::Instantiation(format!(
                "module requested {initial}..{maximum} pages, ceiling is {} pages",
                self.max_memory
            )));
        }

        let memory = MemoryInstance::alloc(
            Pages(initial as usize),
            descriptor.maximum().map(|pages| Pages(pages as usize)),
        )?;
        *slot = Some(memory.clone());
        Ok(memory)
    }
}
