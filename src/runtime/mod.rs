//! Per-call state of the host bridge exposed to guest bytecode.
//!
//! The bridge is a register machine: host functions that produce bytes
//! write them into a guest-named register instead of guest memory, and the
//! guest copies them out with `read_register` after checking the length.
//! One [`Runtime`] value exists per invocation and is dropped afterwards,
//! so no host-visible state survives a call.
mod args;
mod externals;

use std::{
    collections::{HashMap, VecDeque},
    time::Instant,
};

use tracing::trace;
use wasmi::MemoryRef;

use crate::{
    execution::Error,
    shared::account::AccountRecord,
    storage::{keyspace, Snapshot, VersionedStore, SCAN_CURSOR_START},
};

/// Storage keys pulled from the store per scan step while serving guest
/// iterators.
const ITER_SCAN_BATCH: usize = 64;

/// Immutable facts about the invocation the bridge serves.
pub(crate) struct RuntimeContext {
    /// The contract whose method is executing.
    pub contract_id: String,
    /// Argument blob delivered to the guest through `input`.
    pub input: Vec<u8>,
    /// The pinned block height; every state read resolves against it.
    pub block_height: u64,
    /// Wall-clock bound for this invocation.
    pub deadline: Instant,
}

/// An open guest storage iterator.
struct StorageIter {
    /// Store-side scan pattern (`data:{C}:{prefix}*`).
    pattern: Vec<u8>,
    /// Half-open `[start, end)` bound on the contract-chosen key, used by
    /// range iterators.
    bounds: Option<(Vec<u8>, Vec<u8>)>,
    cursor: Vec<u8>,
    buffered: VecDeque<(Vec<u8>, Vec<u8>)>,
    exhausted: bool,
}

impl StorageIter {
    fn over_prefix(contract_id: &str, prefix: &[u8]) -> Self {
        StorageIter {
            pattern: keyspace::data_scan_pattern(contract_id, prefix),
            bounds: None,
            cursor: SCAN_CURSOR_START.to_vec(),
            buffered: VecDeque::new(),
            exhausted: false,
        }
    }

    fn over_range(contract_id: &str, start: Vec<u8>, end: Vec<u8>) -> Self {
        StorageIter {
            pattern: keyspace::data_scan_pattern(contract_id, b""),
            bounds: Some((start, end)),
            cursor: SCAN_CURSOR_START.to_vec(),
            buffered: VecDeque::new(),
            exhausted: false,
        }
    }
}

/// Represents the runtime properties of one guest invocation.
pub(crate) struct Runtime<S> {
    context: RuntimeContext,
    snapshot: Snapshot<S>,
    memory: MemoryRef,
    registers: HashMap<u64, Vec<u8>>,
    logs: Vec<String>,
    return_value: Option<Vec<u8>>,
    iterators: HashMap<u64, StorageIter>,
    next_iterator_id: u64,
    /// Names of imports linked outside the known ABI, addressed by
    /// function indices past `UNKNOWN_IMPORT_BASE`.
    unresolved_imports: Vec<String>,
}

impl<S: VersionedStore> Runtime<S> {
    /// Creates a fresh bridge for one invocation.
    pub(crate) fn new(
        context: RuntimeContext,
        snapshot: Snapshot<S>,
        memory: MemoryRef,
        unresolved_imports: Vec<String>,
    ) -> Self {
        Runtime {
            context,
            snapshot,
            memory,
            registers: HashMap::new(),
            logs: Vec::new(),
            return_value: None,
            iterators: HashMap::new(),
            next_iterator_id: 0,
            unresolved_imports,
        }
    }

    /// Consumes the bridge, yielding the return-value buffer and logs.
    pub(crate) fn into_output(self) -> (Vec<u8>, Vec<String>) {
        (self.return_value.unwrap_or_default(), self.logs)
    }

    fn check_deadline(&self) -> Result<(), Error> {
        if Instant::now() >= self.context.deadline {
            return Err(Error::Timeout);
        }
        Ok(())
    }

    /// Returns bytes from the WASM memory instance.
    fn bytes_from_mem(&self, ptr: u64, len: u64) -> Result<Vec<u8>, Error> {
        let ptr = u32::try_from(ptr)
            .map_err(|_| Error::MemoryAccess(format!("pointer {ptr} exceeds address space")))?;
        let len = usize::try_from(len)
            .map_err(|_| Error::MemoryAccess(format!("length {len} exceeds address space")))?;
        self.memory
            .get(ptr, len)
            .map_err(|error| Error::MemoryAccess(error.to_string()))
    }

    /// Writes bytes into the WASM memory instance.
    fn bytes_to_mem(&self, ptr: u64, bytes: &[u8]) -> Result<(), Error> {
        let ptr = u32::try_from(ptr)
            .map_err(|_| Error::MemoryAccess(format!("pointer {ptr} exceeds address space")))?;
        self.memory
            .set(ptr, bytes)
            .map_err(|error| Error::MemoryAccess(error.to_string()))
    }

    fn set_register(&mut self, register_id: u64, bytes: Vec<u8>) {
        self.registers.insert(register_id, bytes);
    }

    /// The account record of the executing contract at the pinned height.
    fn account(&mut self) -> Result<AccountRecord, Error> {
        let contract_id = self.context.contract_id.clone();
        let record = self
            .snapshot
            .account_record(&contract_id)?
            .ok_or(Error::AccountNotFound(contract_id))?;
        AccountRecord::from_bytes(&record).map_err(|error| {
            Error::Storage(crate::storage::Error::Corrupt(error.to_string()))
        })
    }

    // Register machine.

    pub(crate) fn input(&mut self, register_id: u64) -> Result<(), Error> {
        let input = self.context.input.clone();
        self.set_register(register_id, input);
        Ok(())
    }

    pub(crate) fn register_len(&self, register_id: u64) -> u64 {
        match self.registers.get(&register_id) {
            Some(bytes) => bytes.len() as u64,
            None => u64::MAX,
        }
    }

    pub(crate) fn read_register(&mut self, register_id: u64, ptr: u64) -> Result<(), Error> {
        let bytes = self
            .registers
            .get(&register_id)
            .cloned()
            .ok_or(Error::InvalidRegister(register_id))?;
        self.bytes_to_mem(ptr, &bytes)
    }

    // Results and logs.

    pub(crate) fn value_return(&mut self, len: u64, ptr: u64) -> Result<(), Error> {
        self.return_value = Some(self.bytes_from_mem(ptr, len)?);
        Ok(())
    }

    pub(crate) fn log_utf8(&mut self, len: u64, ptr: u64) -> Result<(), Error> {
        let bytes = self.bytes_from_mem(ptr, len)?;
        let entry = String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?;
        trace!(contract_id = %self.context.contract_id, log = %entry, "guest log");
        self.logs.push(entry);
        Ok(())
    }

    pub(crate) fn log_utf16(&mut self, len: u64, ptr: u64) -> Result<(), Error> {
        let entry = self.utf16_from_mem(ptr, len)?;
        trace!(contract_id = %self.context.contract_id, log = %entry, "guest log");
        self.logs.push(entry);
        Ok(())
    }

    fn utf16_from_mem(&self, ptr: u64, len: u64) -> Result<String, Error> {
        let bytes = self.bytes_from_mem(ptr, len)?;
        if bytes.len() % 2 != 0 {
            return Err(Error::InvalidUtf16);
        }
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).map_err(|_| Error::InvalidUtf16)
    }

    // Controlled aborts.

    pub(crate) fn guest_panic(&self) -> Error {
        Error::GuestPanic("explicit guest panic".to_string())
    }

    pub(crate) fn guest_panic_utf8(&self, len: u64, ptr: u64) -> Error {
        match self
            .bytes_from_mem(ptr, len)
            .and_then(|bytes| String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8))
        {
            Ok(message) => Error::GuestPanic(message),
            Err(error) => error,
        }
    }

    /// Builds the structured abort message. Strings follow the
    /// AssemblyScript layout: UTF-16LE data at `ptr`, byte length as a
    /// 32-bit little-endian integer at `ptr - 4`; a null pointer means the
    /// string is absent.
    pub(crate) fn guest_abort(&self, msg_ptr: u32, filename_ptr: u32, line: u32, col: u32) -> Error {
        let message = match self.abort_string(msg_ptr) {
            Ok(message) => message,
            Err(error) => return error,
        };
        let filename = match self.abort_string(filename_ptr) {
            Ok(filename) => filename,
            Err(error) => return error,
        };
        Error::GuestAbort(format!("abort: {filename}:{line}:{col} {message}"))
    }

    fn abort_string(&self, ptr: u32) -> Result<String, Error> {
        if ptr == 0 {
            return Ok(String::new());
        }
        if ptr < 4 {
            return Err(Error::MemoryAccess(format!(
                "abort string pointer {ptr} has no length header"
            )));
        }
        let header = self.bytes_from_mem(u64::from(ptr - 4), 4)?;
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        self.utf16_from_mem(u64::from(ptr), u64::from(len))
    }

    // Call environment.

    pub(crate) fn current_account_id(&mut self, register_id: u64) -> Result<(), Error> {
        let contract_id = self.context.contract_id.clone().into_bytes();
        self.set_register(register_id, contract_id);
        Ok(())
    }

    /// View calls have no signer or predecessor; both read back as the
    /// empty byte string.
    pub(crate) fn empty_account_id(&mut self, register_id: u64) -> Result<(), Error> {
        self.set_register(register_id, Vec::new());
        Ok(())
    }

    pub(crate) fn block_index(&self) -> u64 {
        self.context.block_height
    }

    pub(crate) fn account_balance(&mut self, balance_ptr: u64) -> Result<(), Error> {
        let amount = self.account()?.amount;
        self.bytes_to_mem(balance_ptr, &amount.to_le_bytes())
    }

    pub(crate) fn account_locked_balance(&mut self, balance_ptr: u64) -> Result<(), Error> {
        let locked = self.account()?.locked;
        self.bytes_to_mem(balance_ptr, &locked.to_le_bytes())
    }

    pub(crate) fn storage_usage(&mut self) -> Result<u64, Error> {
        Ok(self.account()?.storage_usage)
    }

    // Storage reads.

    pub(crate) fn storage_read(
        &mut self,
        key_len: u64,
        key_ptr: u64,
        register_id: u64,
    ) -> Result<u64, Error> {
        self.check_deadline()?;
        let key = self.bytes_from_mem(key_ptr, key_len)?;
        let contract_id = self.context.contract_id.clone();
        match self.snapshot.storage_read(&contract_id, &key)? {
            Some(value) => {
                self.set_register(register_id, value);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    pub(crate) fn storage_has_key(&mut self, key_len: u64, key_ptr: u64) -> Result<u64, Error> {
        self.check_deadline()?;
        let key = self.bytes_from_mem(key_ptr, key_len)?;
        let contract_id = self.context.contract_id.clone();
        match self.snapshot.storage_read(&contract_id, &key)? {
            Some(_) => Ok(1),
            None => Ok(0),
        }
    }

    // Storage iterators.

    pub(crate) fn storage_iter_prefix(
        &mut self,
        prefix_len: u64,
        prefix_ptr: u64,
    ) -> Result<u64, Error> {
        let prefix = self.bytes_from_mem(prefix_ptr, prefix_len)?;
        let iter = StorageIter::over_prefix(&self.context.contract_id, &prefix);
        Ok(self.insert_iterator(iter))
    }

    pub(crate) fn storage_iter_range(
        &mut self,
        start_len: u64,
        start_ptr: u64,
        end_len: u64,
        end_ptr: u64,
    ) -> Result<u64, Error> {
        let start = self.bytes_from_mem(start_ptr, start_len)?;
        let end = self.bytes_from_mem(end_ptr, end_len)?;
        let iter = StorageIter::over_range(&self.context.contract_id, start, end);
        Ok(self.insert_iterator(iter))
    }

    fn insert_iterator(&mut self, iter: StorageIter) -> u64 {
        let iterator_id = self.next_iterator_id;
        self.next_iterator_id += 1;
        self.iterators.insert(iterator_id, iter);
        iterator_id
    }

    pub(crate) fn storage_iter_next(
        &mut self,
        iterator_id: u64,
        key_register_id: u64,
        value_register_id: u64,
    ) -> Result<u64, Error> {
        self.check_deadline()?;
        let mut iter = self
            .iterators
            .remove(&iterator_id)
            .ok_or(Error::InvalidIterator(iterator_id))?;
        let produced = self.advance_iterator(&mut iter);
        self.iterators.insert(iterator_id, iter);
        match produced? {
            Some((key, value)) => {
                self.set_register(key_register_id, key);
                self.set_register(value_register_id, value);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn advance_iterator(
        &mut self,
        iter: &mut StorageIter,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, Error> {
        loop {
            if let Some(entry) = iter.buffered.pop_front() {
                return Ok(Some(entry));
            }
            if iter.exhausted {
                return Ok(None);
            }

            let contract_id = self.context.contract_id.clone();
            let (next_cursor, entries) = self.snapshot.scan_data_keys(
                &contract_id,
                &iter.pattern,
                &iter.cursor,
                ITER_SCAN_BATCH,
            )?;
            iter.exhausted = next_cursor == SCAN_CURSOR_START;
            iter.cursor = next_cursor;

            for (storage_key, value) in entries {
                // Entries without a live value at the pinned height are
                // invisible to the guest.
                let Some(value) = value else { continue };
                if let Some((start, end)) = &iter.bounds {
                    if storage_key < *start || storage_key >= *end {
                        continue;
                    }
                }
                iter.buffered.push_back((storage_key, value));
            }
        }
    }

    // Unsupported surface.

    pub(crate) fn not_implemented(&self, host_function: &str) -> Error {
        trace!(
            contract_id = %self.context.contract_id,
            host_function,
            "guest called unsupported host function"
        );
        Error::NotImplemented(host_function.to_string())
    }

    pub(crate) fn unresolved_import_name(&self, index: usize) -> Option<&str> {
        self.unresolved_imports.get(index).map(String::as_str)
    }
}
