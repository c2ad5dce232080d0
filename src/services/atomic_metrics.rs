use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    OrdersCreated,
    CapturesPerformed,
    AlreadyCaptured,
    PurchasesRecorded,
    DuplicatePurchases,
    Declined,
    ReconcileFailures,
    MetadataUnrecoverable,
}

#[derive(Debug, Default)]
pub struct AtomicMetrics {
    orders_created: AtomicU64,
    captures_performed: AtomicU64,
    already_captured: AtomicU64,
    purchases_recorded: AtomicU64,
    duplicate_purchases: AtomicU64,
    declined: AtomicU64,
    reconcile_failures: AtomicU64,
    metadata_unrecoverable: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub orders_created: u64,
    pub captures_performed: u64,
    pub already_captured: u64,
    pub purchases_recorded: u64,
    pub duplicate_purchases: u64,
    pub declined: u64,
    pub reconcile_failures: u64,
    pub metadata_unrecoverable: u64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::OrdersCreated => &self.orders_created,
            Counter::CapturesPerformed => &self.captures_performed,
            Counter::AlreadyCaptured => &self.already_captured,
            Counter::PurchasesRecorded => &self.purchases_recorded,
            Counter::DuplicatePurchases => &self.duplicate_purchases,
            Counter::Declined => &self.declined,
            Counter::ReconcileFailures => &self.reconcile_failures,
            Counter::MetadataUnrecoverable => &self.metadata_unrecoverable,
        }
    }

    pub fn increment(&self, counter: Counter) {
        self.counter(counter).fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counter(counter).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            orders_created: self.get(Counter::OrdersCreated),
            captures_performed: self.get(Counter::CapturesPerformed),
            already_captured: self.get(Counter::AlreadyCaptured),
            purchases_recorded: self.get(Counter::PurchasesRecorded),
            duplicate_purchases: self.get(Counter::DuplicatePurchases),
            declined: self.get(Counter::Declined),
            reconcile_failures: self.get(Counter::ReconcileFailures),
            metadata_unrecoverable: self.get(Counter::MetadataUnrecoverable),
        }
    }
}
