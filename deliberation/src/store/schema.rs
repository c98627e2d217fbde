//! Table definitions for the snapshot store
//!
//! Each table provides logical separation of one entity type while
//! sharing the same snapshot file.

/// Table for reviewed items, keyed by reference string.
pub const TABLE_ITEMS: &str = "reviewed_items";

/// Table for ballots, keyed by ballot id.
pub const TABLE_BALLOTS: &str = "ballots";

/// Table for recorded outcomes, keyed by outcome id.
pub const TABLE_OUTCOMES: &str = "outcomes";

/// Table for decision-scheme records, keyed by record id.
pub const TABLE_SCHEMES: &str = "decision_schemes";

/// Table for retrospectives, keyed by record id.
pub const TABLE_RETROSPECTIVES: &str = "retrospectives";

/// All table names.
pub const ALL_TABLES: &[&str] = &[
    TABLE_ITEMS,
    TABLE_BALLOTS,
    TABLE_OUTCOMES,
    TABLE_SCHEMES,
    TABLE_RETROSPECTIVES,
];
