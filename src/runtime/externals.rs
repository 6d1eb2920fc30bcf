//! Dispatch of guest host-function calls into the bridge.
use wasmi::{Externals, RuntimeArgs, RuntimeValue, Trap};

use super::{args::Args, Runtime};
use crate::{
    execution::Error,
    resolvers::function_index::{FunctionIndex, UNKNOWN_IMPORT_BASE},
    storage::VersionedStore,
};

impl<S> Externals for Runtime<S>
where
    S: VersionedStore,
{
    fn invoke_index(
        &mut self,
        index: usize,
        args: RuntimeArgs,
    ) -> Result<Option<RuntimeValue>, Trap> {
        if index >= UNKNOWN_IMPORT_BASE {
            let name = self
                .unresolved_import_name(index - UNKNOWN_IMPORT_BASE)
                .unwrap_or("<unknown import>")
                .to_string();
            return Err(self.not_implemented(&name).into());
        }

        let func = FunctionIndex::try_from(index)
            .map_err(|_| Error::Interpreter(format!("unknown host function index {index}")))?;

        match func {
            FunctionIndex::Input => {
                // args(0) = register to receive the call's argument blob
                let (register_id,) = Args::parse(args)?;
                self.input(register_id)?;
                Ok(None)
            }

            FunctionIndex::RegisterLen => {
                // args(0) = register to measure
                let (register_id,) = Args::parse(args)?;
                let len = self.register_len(register_id);
                Ok(Some(RuntimeValue::I64(len as i64)))
            }

            FunctionIndex::ReadRegister => {
                // args(0) = register to copy out
                // args(1) = destination pointer in Wasm memory
                let (register_id, ptr) = Args::parse(args)?;
                self.read_register(register_id, ptr)?;
                Ok(None)
            }

            FunctionIndex::ValueReturn => {
                // args(0) = length of the return value
                // args(1) = pointer to the return value in Wasm memory
                let (len, ptr) = Args::parse(args)?;
                self.value_return(len, ptr)?;
                Ok(None)
            }

            FunctionIndex::LogUtf8 => {
                // args(0) = length of the log message
                // args(1) = pointer to the UTF-8 message in Wasm memory
                let (len, ptr) = Args::parse(args)?;
                self.log_utf8(len, ptr)?;
                Ok(None)
            }

            FunctionIndex::LogUtf16 => {
                // args(0) = length of the log message in bytes
                // args(1) = pointer to the UTF-16LE message in Wasm memory
                let (len, ptr) = Args::parse(args)?;
                self.log_utf16(len, ptr)?;
                Ok(None)
            }

            FunctionIndex::Panic => Err(self.guest_panic().into()),

            FunctionIndex::PanicUtf8 => {
                // args(0) = length of the panic message
                // args(1) = pointer to the UTF-8 message in Wasm memory
                let (len, ptr) = Args::parse(args)?;
                Err(self.guest_panic_utf8(len, ptr).into())
            }

            FunctionIndex::Abort => {
                // args(0) = pointer to the UTF-16 message
                // args(1) = pointer to the UTF-16 filename
                // args(2) = line, args(3) = column
                let (msg_ptr, filename_ptr, line, col): (u32, u32, u32, u32) = Args::parse(args)?;
                Err(self.guest_abort(msg_ptr, filename_ptr, line, col).into())
            }

            FunctionIndex::CurrentAccountId => {
                // args(0) = register to receive the contract identifier
                let (register_id,) = Args::parse(args)?;
                self.current_account_id(register_id)?;
                Ok(None)
            }

            FunctionIndex::PredecessorAccountId | FunctionIndex::SignerAccountId => {
                // args(0) = register to receive the (empty) account id
                let (register_id,) = Args::parse(args)?;
                self.empty_account_id(register_id)?;
                Ok(None)
            }

            FunctionIndex::BlockIndex => {
                Ok(Some(RuntimeValue::I64(self.block_index() as i64)))
            }

            // The keyspace carries no per-height timestamps, so this is
            // part of the unsupported surface rather than a bridge value.
            FunctionIndex::BlockTimestamp => Err(self.not_implemented("block_timestamp").into()),

            FunctionIndex::AccountBalance => {
                // args(0) = pointer receiving the u128 little-endian balance
                let (balance_ptr,) = Args::parse(args)?;
                self.account_balance(balance_ptr)?;
                Ok(None)
            }

            FunctionIndex::AccountLockedBalance => {
                // args(0) = pointer receiving the u128 little-endian balance
                let (balance_ptr,) = Args::parse(args)?;
                self.account_locked_balance(balance_ptr)?;
                Ok(None)
            }

            FunctionIndex::StorageUsage => {
                let usage = self.storage_usage()?;
                Ok(Some(RuntimeValue::I64(usage as i64)))
            }

            FunctionIndex::StorageRead => {
                // args(0) = length of the storage key
                // args(1) = pointer to the storage key in Wasm memory
                // args(2) = register to receive the value
                let (key_len, key_ptr, register_id) = Args::parse(args)?;
                let found = self.storage_read(key_len, key_ptr, register_id)?;
                Ok(Some(RuntimeValue::I64(found as i64)))
            }

            FunctionIndex::StorageHasKey => {
                // args(0) = length of the storage key
                // args(1) = pointer to the storage key in Wasm memory
                let (key_len, key_ptr) = Args::parse(args)?;
                let found = self.storage_has_key(key_len, key_ptr)?;
                Ok(Some(RuntimeValue::I64(found as i64)))
            }

            FunctionIndex::StorageIterPrefix => {
                // args(0) = length of the key prefix
                // args(1) = pointer to the key prefix in Wasm memory
                let (prefix_len, prefix_ptr) = Args::parse(args)?;
                let iterator_id = self.storage_iter_prefix(prefix_len, prefix_ptr)?;
                Ok(Some(RuntimeValue::I64(iterator_id as i64)))
            }

            FunctionIndex::StorageIterRange => {
                // args(0) = length of the start key, args(1) = its pointer
                // args(2) = length of the end key, args(3) = its pointer
                let (start_len, start_ptr, end_len, end_ptr) = Args::parse(args)?;
                let iterator_id = self.storage_iter_range(start_len, start_ptr, end_len, end_ptr)?;
                Ok(Some(RuntimeValue::I64(iterator_id as i64)))
            }

            FunctionIndex::StorageIterNext => {
                // args(0) = iterator to advance
                // args(1) = register to receive the key
                // args(2) = register to receive the value
                let (iterator_id, key_register_id, value_register_id) = Args::parse(args)?;
                let produced =
                    self.storage_iter_next(iterator_id, key_register_id, value_register_id)?;
                Ok(Some(RuntimeValue::I64(produced as i64)))
            }

            // Write paths, value transfers, gas introspection and
            // cross-contract promises are the coordinator's signal to fall
            // back to an authoritative node.
            FunctionIndex::AttachedDeposit => Err(self.not_implemented("attached_deposit").into()),
            FunctionIndex::PrepaidGas => Err(self.not_implemented("prepaid_gas").into()),
            FunctionIndex::UsedGas => Err(self.not_implemented("used_gas").into()),
            FunctionIndex::RandomSeed => Err(self.not_implemented("random_seed").into()),
            FunctionIndex::Sha256 => Err(self.not_implemented("sha256").into()),
            FunctionIndex::StorageWrite => Err(self.not_implemented("storage_write").into()),
            FunctionIndex::StorageRemove => Err(self.not_implemented("storage_remove").into()),
            FunctionIndex::PromiseCreate => Err(self.not_implemented("promise_create").into()),
            FunctionIndex::PromiseThen => Err(self.not_implemented("promise_then").into()),
            FunctionIndex::PromiseAnd => Err(self.not_implemented("promise_and").into()),
            FunctionIndex::PromiseBatchCreate => {
                Err(self.not_implemented("promise_batch_create").into())
            }
            FunctionIndex::PromiseBatchThen => {
                Err(self.not_implemented("promise_batch_then").into())
            }
            FunctionIndex::PromiseResultsCount => {
                Err(self.not_implemented("promise_results_count").into())
            }
            FunctionIndex::PromiseResult => Err(self.not_implemented("promise_result").into()),
            FunctionIndex::PromiseReturn => Err(self.not_implemented("promise_return").into()),
        }
    }
}
