//! Entity catalog: which tables exist, how each store names their fields, and
//! which column is the upsert key.
//!
//! The two stores disagree on naming. The hosted store uses `snake_case`
//! columns; the local backend returns `PascalCase` keys straight from its
//! MySQL schema, and older screens still emit legacy names such as
//! `Particulars`. Every entity therefore declares a list of [`FieldMapping`]s
//! that ties a single canonical name to each store's native name plus any
//! extra aliases seen in the wild.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// An entity row, opaque apart from its field names.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Which backing store a record is read from or written to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Store {
    /// Hosted primary store.
    Remote,
    /// Local backend API (offline fallback).
    Local,
}

impl core::fmt::Display for Store {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Store::Remote => f.write_str("remote"),
            Store::Local => f.write_str("local"),
        }
    }
}

/// Entity types routed between the two stores.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Product,
    Sale,
    User,
    StockEntry,
    AuditLog,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Product,
        EntityKind::Sale,
        EntityKind::User,
        EntityKind::StockEntry,
        EntityKind::AuditLog,
    ];

    pub fn descriptor(self) -> &'static EntityDescriptor {
        match self {
            EntityKind::Product => &PRODUCTS,
            EntityKind::Sale => &SALES,
            EntityKind::User => &USERS,
            EntityKind::StockEntry => &STOCK_ENTRIES,
            EntityKind::AuditLog => &AUDIT_LOGS,
        }
    }

    /// Resolve a table name as either store spells it.
    pub fn from_table(name: &str) -> DomainResult<Self> {
        Self::ALL
            .into_iter()
            .find(|k| {
                let d = k.descriptor();
                d.remote_table == name || d.local_resource == name
            })
            .ok_or_else(|| DomainError::unknown_table(name))
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.descriptor().remote_table)
    }
}

/// One canonical field and every name it goes by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub canonical: &'static str,
    pub remote: &'static str,
    pub local: &'static str,
    /// Legacy or alternate spellings accepted on read, never written.
    pub aliases: &'static [&'static str],
}

impl FieldMapping {
    pub const fn new(canonical: &'static str, remote: &'static str, local: &'static str) -> Self {
        Self {
            canonical,
            remote,
            local,
            aliases: &[],
        }
    }

    pub const fn with_aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    /// The name this field has in the given store.
    pub fn native(&self, store: Store) -> &'static str {
        match store {
            Store::Remote => self.remote,
            Store::Local => self.local,
        }
    }

    /// Every accepted spelling, in lookup priority order.
    pub fn candidates(&self) -> impl Iterator<Item = &'static str> + '_ {
        [self.canonical, self.remote, self.local]
            .into_iter()
            .chain(self.aliases.iter().copied())
    }
}

/// Static description of one routed entity.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    /// Table name in the hosted store.
    pub remote_table: &'static str,
    /// Resource segment of the local backend endpoints.
    pub local_resource: &'static str,
    /// Canonical name of the field used as the upsert conflict key.
    pub unique_key: &'static str,
    pub fields: &'static [FieldMapping],
    /// Whether a failed remote read is retried against the local backend
    /// while nominally online. Only products do this.
    pub fallback_to_local: bool,
}

impl EntityDescriptor {
    pub fn field(&self, canonical: &str) -> Option<&'static FieldMapping> {
        self.fields.iter().find(|f| f.canonical == canonical)
    }

    /// The unique key column as the given store names it.
    pub fn native_key(&self, store: Store) -> &'static str {
        self.field(self.unique_key)
            .map(|f| f.native(store))
            .unwrap_or(self.unique_key)
    }

    /// The table/resource name in the given store.
    pub fn table_in(&self, store: Store) -> &'static str {
        match store {
            Store::Remote => self.remote_table,
            Store::Local => self.local_resource,
        }
    }
}

static PRODUCTS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Product,
    remote_table: "products",
    local_resource: "products",
    unique_key: "product_id",
    fields: &[
        FieldMapping::new("product_id", "product_id", "ProductID").with_aliases(&["id", "ProductId"]),
        FieldMapping::new("name", "product_name", "ProductName")
            .with_aliases(&["Particulars", "particulars"]),
        FieldMapping::new("generic_name", "generic_name", "GenericName"),
        FieldMapping::new("category", "category", "Category"),
        FieldMapping::new("barcode", "barcode", "Barcode"),
        FieldMapping::new("unit_price", "unit_price", "UnitPrice")
            .with_aliases(&["price", "SellingPrice", "Rate"]),
        FieldMapping::new("quantity", "quantity", "Quantity").with_aliases(&["stock", "Stock"]),
        FieldMapping::new("expiry_date", "expiry_date", "ExpiryDate").with_aliases(&["Expiry"]),
        FieldMapping::new("updated_at", "updated_at", "UpdatedAt"),
    ],
    fallback_to_local: true,
};

static SALES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Sale,
    remote_table: "sales",
    local_resource: "sales",
    unique_key: "sale_id",
    fields: &[
        FieldMapping::new("sale_id", "sale_id", "SaleID").with_aliases(&["id", "InvoiceNo"]),
        FieldMapping::new("product_id", "product_id", "ProductID"),
        FieldMapping::new("product_name", "product_name", "ProductName")
            .with_aliases(&["Particulars"]),
        FieldMapping::new("quantity", "quantity", "Quantity").with_aliases(&["QtySold"]),
        FieldMapping::new("unit_price", "unit_price", "UnitPrice"),
        FieldMapping::new("total_amount", "total_amount", "TotalAmount")
            .with_aliases(&["Amount", "total"]),
        FieldMapping::new("sold_by", "sold_by", "SoldBy").with_aliases(&["Cashier"]),
        FieldMapping::new("sold_at", "sold_at", "SaleDate").with_aliases(&["created_at", "DateSold"]),
    ],
    fallback_to_local: false,
};

static USERS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::User,
    remote_table: "users",
    local_resource: "users",
    unique_key: "username",
    fields: &[
        FieldMapping::new("user_id", "user_id", "UserID").with_aliases(&["id"]),
        FieldMapping::new("username", "username", "Username"),
        FieldMapping::new("full_name", "full_name", "FullName").with_aliases(&["Name"]),
        FieldMapping::new("role", "role", "Role").with_aliases(&["AccountType"]),
        FieldMapping::new("status", "status", "Status"),
        FieldMapping::new("created_at", "created_at", "CreatedAt"),
    ],
    fallback_to_local: false,
};

static STOCK_ENTRIES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::StockEntry,
    remote_table: "stock_entries",
    local_resource: "stock",
    unique_key: "entry_id",
    fields: &[
        FieldMapping::new("entry_id", "entry_id", "StockID").with_aliases(&["id", "EntryID"]),
        FieldMapping::new("product_id", "product_id", "ProductID"),
        FieldMapping::new("quantity", "quantity", "Quantity").with_aliases(&["QtyAdded"]),
        FieldMapping::new("batch_no", "batch_no", "BatchNo"),
        FieldMapping::new("expiry_date", "expiry_date", "ExpiryDate"),
        FieldMapping::new("supplier", "supplier", "Supplier"),
        FieldMapping::new("received_at", "received_at", "DateReceived")
            .with_aliases(&["created_at"]),
    ],
    fallback_to_local: false,
};

static AUDIT_LOGS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::AuditLog,
    remote_table: "audit_logs",
    local_resource: "audit_logs",
    unique_key: "log_id",
    fields: &[
        FieldMapping::new("log_id", "log_id", "LogID").with_aliases(&["id"]),
        FieldMapping::new("username", "username", "Username").with_aliases(&["user"]),
        FieldMapping::new("action", "action", "Action"),
        FieldMapping::new("details", "details", "Details").with_aliases(&["Description"]),
        FieldMapping::new("logged_at", "logged_at", "Timestamp")
            .with_aliases(&["created_at", "LogDate"]),
    ],
    fallback_to_local: false,
};
