//! Record store for the storefront bot.
//!
//! Holds the persisted aggregate (user records, event counters, admin-log index,
//! remote message ids), the fixed package catalogue, and the voucher ledger.
//! Every mutation goes through [`StoreHandle`], which serializes the
//! load-modify-save cycle so overlapping interactions cannot lose updates.

pub mod catalogue;
pub mod model;
pub mod store;
pub mod vouchers;

pub use catalogue::{
    MediaType, PackageKey, PackageKeyError, PriceCatalogue, Segment, PACKAGE_AMOUNTS,
};
pub use model::{
    AdminLogEntry, Aggregate, DiscountDescriptor, DiscountKind, EventName, UserRecord,
};
pub use store::{AggregateStore, JsonFileStore, MemoryStore, StoreHandle};
pub use vouchers::{
    JsonVoucherFile, MemoryVoucherLedger, VoucherLedger, VoucherLedgerStore, VoucherProvider,
    VoucherStore,
};

#[cfg(test)]
mod tests;
