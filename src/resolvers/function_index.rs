//! Host function indices for the view-call ABI.
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Indices at and above this value name imports outside the known ABI;
/// they resolve to stubs that report `notImplemented` when called.
pub(crate) const UNKNOWN_IMPORT_BASE: usize = 1_000;

/// Enum representing unique IDs of the host functions in the view-call ABI.
///
/// The trailing group past `StorageIterNext` exists so that modules linking
/// write-side or cross-contract imports still instantiate; invoking any of
/// them reports `notImplemented`, which signals the caller to retry against
/// an authoritative node.
#[derive(Debug, PartialEq, Eq, FromPrimitive, Clone, Copy)]
#[repr(usize)]
pub(crate) enum FunctionIndex {
    Input,
    RegisterLen,
    ReadRegister,
    ValueReturn,
    LogUtf8,
    LogUtf16,
    Panic,
    PanicUtf8,
    Abort,
    CurrentAccountId,
    PredecessorAccountId,
    SignerAccountId,
    BlockIndex,
    BlockTimestamp,
    AccountBalance,
    AccountLockedBalance,
    StorageUsage,
    StorageRead,
    StorageHasKey,
    StorageIterPrefix,
    StorageIterRange,
    StorageIterNext,
    AttachedDeposit,
    PrepaidGas,
    UsedGas,
    RandomSeed,
    Sha256,
    StorageWrite,
    StorageRemove,
    PromiseCreate,
    PromiseThen,
    PromiseAnd,
    PromiseBatchCreate,
    PromiseBatchThen,
    PromiseResultsCount,
    PromiseResult,
    PromiseReturn,
}

impl From<FunctionIndex> for usize {
    fn from(index: FunctionIndex) -> usize {
        // The enum is a plain `repr(usize)` list without explicit
        // discriminants, so the cast is the discriminant.
        index as usize
    }
}

impl TryFrom<usize> for FunctionIndex {
    type Error = &'static str;
    fn try_from(value: usize) -> Result<Self, Self::Error> {
        FromPrimitive::from_usize(value).ok_or("no host function at this index")
    }
}
