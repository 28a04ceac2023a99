//! ERP record → local record mapping.
//!
//! The ERP is inconsistent about field names across versions and endpoints
//! (`Id`/`ID`, `BarCode`/`Barcode`, `QuotationRef`/`QuatationRef`, ...). Each
//! local field lists the names it may arrive under; the first one present
//! with a non-null value wins. Nested arrays carry their own tables.

use crate::sync::models::SyncScope;
use crate::{ErpLinkError, Result};
use serde_json::{Map, Value};

/// One local field and its ERP aliases in priority order.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    pub local: &'static str,
    pub aliases: &'static [&'static str],
    /// Mapping for the elements of an array-valued field.
    pub nested: Option<&'static [FieldMap]>,
}

const fn field(local: &'static str, aliases: &'static [&'static str]) -> FieldMap {
    FieldMap {
        local,
        aliases,
        nested: None,
    }
}

const fn list(
    local: &'static str,
    aliases: &'static [&'static str],
    nested: &'static [FieldMap],
) -> FieldMap {
    FieldMap {
        local,
        aliases,
        nested: Some(nested),
    }
}

/// One component of a natural key.
#[derive(Debug, Clone, Copy)]
pub struct KeyPart {
    pub field: &'static str,
    /// Absent optional parts are encoded as `null`, which is itself a key value.
    pub required: bool,
}

const fn key(field: &'static str) -> KeyPart {
    KeyPart {
        field,
        required: true,
    }
}

const fn optional_key(field: &'static str) -> KeyPart {
    KeyPart {
        field,
        required: false,
    }
}

/// Field table and natural key of one scope.
#[derive(Debug)]
pub struct ScopeSchema {
    pub scope: SyncScope,
    pub fields: &'static [FieldMap],
    pub key: &'static [KeyPart],
}

const TRACINGS: &[FieldMap] = &[
    field("tracingId", &["TracingId", "TracingRef", "Id"]),
    field("title", &["Title"]),
    field("isSelectable", &["IsSelectable"]),
];

const TRACING_INVENTORIES: &[FieldMap] = &[
    field("tracingRef", &["TracingRef", "TracingId"]),
    field("inventory", &["Inventory"]),
];

const PROPERTY_VALUES: &[FieldMap] = &[
    field("propertyRef", &["PropertyRef", "PropertyId"]),
    field("value", &["Value"]),
];

const ADDRESSES: &[FieldMap] = &[
    field("customerAddressId", &["CustomerAddressId", "Id", "ID"]),
    field("guid", &["Guid", "GUID"]),
    field("title", &["Title"]),
    field("isMain", &["IsMain"]),
    field("cityRef", &["CityRef"]),
    field("address", &["Address"]),
    field("zipCode", &["ZipCode"]),
    field("latitude", &["Latitude"]),
    field("longitude", &["Longitude"]),
];

const INVOICE_ITEMS: &[FieldMap] = &[
    field("invoiceItemId", &["InvoiceItemId", "Id", "ID"]),
    field("itemRef", &["ItemRef"]),
    field("tracingRef", &["TracingRef"]),
    field("tracingTitle", &["TracingTitle"]),
    field("quantity", &["Quantity"]),
    field("secondaryQuantity", &["SecondaryQuantity"]),
    field("fee", &["Fee"]),
    field("price", &["Price"]),
    field("discount", &["Discount"]),
    field("tax", &["Tax"]),
    field("duty", &["Duty"]),
    field("addition", &["Addition"]),
    field("netPrice", &["NetPrice"]),
    field("discountInvoiceItemRef", &["DiscountInvoiceItemRef"]),
    field("productPackRef", &["ProductPackRef"]),
    field("productPackQuantity", &["ProductPackQuantity"]),
];

static ITEMS: ScopeSchema = ScopeSchema {
    scope: SyncScope::Items,
    fields: &[
        field("itemId", &["Id", "ID", "id"]),
        field("code", &["Code"]),
        field("barcode", &["BarCode", "Barcode"]),
        field("title", &["Title"]),
        field("isActive", &["IsActive"]),
        field("isSellable", &["IsSellable"]),
        field("type", &["Type"]),
        field("unitId", &["UnitRef", "UnitId"]),
        field("secondaryUnitId", &["SecondaryUnitRef", "SecondaryUnitId"]),
        field("unitsRatio", &["UnitsRatio"]),
        field("weight", &["Weight"]),
        field("volume", &["Volume"]),
        field("isTaxExempt", &["IsTaxExempt"]),
        field("taxRate", &["TaxRate"]),
        field("dutyRate", &["DutyRate"]),
        field("saleGroupRef", &["SaleGroupRef"]),
        list("tracings", &["Tracings"], TRACINGS),
        list("tracingInventories", &["TracingInventories"], TRACING_INVENTORIES),
        field("totalInventory", &["TotalInventory"]),
        list("propertyValues", &["PropertyValues"], PROPERTY_VALUES),
        field("brokerSellable", &["BrokerSellable"]),
    ],
    key: &[key("itemId")],
};

static INVENTORIES: ScopeSchema = ScopeSchema {
    scope: SyncScope::Inventories,
    fields: &[
        field("itemRef", &["ItemRef"]),
        field("stockRef", &["StockRef"]),
        field("tracingRef", &["TracingRef"]),
        field("quantity", &["Quantity"]),
    ],
    key: &[key("itemRef"), key("stockRef"), optional_key("tracingRef")],
};

static PRICE_NOTES: ScopeSchema = ScopeSchema {
    scope: SyncScope::PriceNotes,
    fields: &[
        field("priceNoteItemId", &["Id", "ID", "PriceNoteItemId"]),
        field("saleTypeRef", &["SaleTypeRef"]),
        field("itemRef", &["ItemRef"]),
        field("tracingRef", &["TracingRef"]),
        field("unitRef", &["UnitRef"]),
        field("fee", &["Fee"]),
        field("canChangeInvoiceFee", &["CanChangeInvoiceFee"]),
        field("canChangeInvoiceDiscount", &["CanChangeInvoiceDiscount"]),
        field("customerGroupingRef", &["CustomerGroupingRef"]),
        field("upperMargin", &["UpperMargin"]),
        field("lowerMargin", &["LowerMargin"]),
        field("additionRate", &["AdditionRate"]),
    ],
    key: &[key("priceNoteItemId")],
};

static CUSTOMERS: ScopeSchema = ScopeSchema {
    scope: SyncScope::Customers,
    fields: &[
        field("customerId", &["Id", "ID", "CustomerId"]),
        field("guid", &["Guid", "GUID", "GuidString"]),
        field("title", &["Title"]),
        field("code", &["Code"]),
        field("phoneNumber", &["PhoneNumber"]),
        field("remainder", &["Remainder"]),
        field("creditRemainder", &["CreditRemainder"]),
        field("customerType", &["CustomerType"]),
        field("name", &["Name"]),
        field("lastName", &["LastName"]),
        field("birthDate", &["BirthDate"]),
        field("nationalId", &["NationalId"]),
        field("economicCode", &["EconomicCode"]),
        field("version", &["Version"]),
        field("groupingRef", &["GroupingRef"]),
        field("discountRate", &["DiscountRate"]),
        list("addresses", &["Addresses"], ADDRESSES),
    ],
    key: &[key("customerId")],
};

static INVOICES: ScopeSchema = ScopeSchema {
    scope: SyncScope::Invoices,
    fields: &[
        field("invoiceId", &["Id", "ID", "InvoiceId"]),
        field("orderRef", &["OrderRef"]),
        field("quotationRef", &["QuotationRef", "QuatationRef"]),
        field("number", &["Number"]),
        field("date", &["Date"]),
        field("customerRef", &["CustomerRef"]),
        field("currencyRef", &["CurrencyRef"]),
        field("rate", &["Rate"]),
        field("saleTypeRef", &["SaleTypeRef"]),
        field("addressRef", &["AddressRef"]),
        field("price", &["Price"]),
        field("tax", &["Tax"]),
        field("duty", &["Duty"]),
        field("discount", &["Discount"]),
        field("addition", &["Addition"]),
        field("netPrice", &["NetPrice"]),
        list("invoiceItems", &["InvoiceItems"], INVOICE_ITEMS),
    ],
    key: &[key("invoiceId")],
};

static QUOTATIONS: ScopeSchema = ScopeSchema {
    scope: SyncScope::Quotations,
    fields: &[
        field("id", &["Id", "ID", "QuotationId", "id"]),
        field("guid", &["Guid", "GUID"]),
        field("number", &["Number"]),
        field("date", &["Date"]),
        field("currencyRef", &["CurrencyRef"]),
        field("customerRef", &["CustomerRef"]),
        field("addressRef", &["AddressRef"]),
        field("saleTypeRef", &["SaleTypeRef"]),
        field("discountOnCustomer", &["DiscountOnCustomer"]),
        field("price", &["Price"]),
        field("discount", &["Discount"]),
        field("tax", &["Tax"]),
        field("duty", &["Duty"]),
        field("addition", &["Addition"]),
        field("netPrice", &["NetPrice"]),
        field("status", &["Status"]),
    ],
    key: &[key("id")],
};

/// Field table and key definition for `scope`.
pub fn schema(scope: SyncScope) -> &'static ScopeSchema {
    match scope {
        SyncScope::Items => &ITEMS,
        SyncScope::Inventories => &INVENTORIES,
        SyncScope::PriceNotes => &PRICE_NOTES,
        SyncScope::Customers => &CUSTOMERS,
        SyncScope::Invoices => &INVOICES,
        SyncScope::Quotations => &QUOTATIONS,
    }
}

/// A remote record translated to local field names, ready to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    pub natural_key: String,
    pub payload: Value,
}

/// First alias present with a non-null value, else the first one present.
fn resolve<'a>(record: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|alias| record.get(*alias))
        .find(|value| !value.is_null())
        .or_else(|| aliases.iter().find_map(|alias| record.get(*alias)))
}

fn map_fields(fields: &[FieldMap], record: &Map<String, Value>) -> Map<String, Value> {
    let mut mapped = Map::new();
    for field in fields {
        let Some(value) = resolve(record, field.aliases) else {
            continue;
        };
        let value = match (field.nested, value) {
            (Some(nested), Value::Array(elements)) => Value::Array(
                elements
                    .iter()
                    .map(|element| match element {
                        Value::Object(inner) => Value::Object(map_fields(nested, inner)),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            _ => value.clone(),
        };
        mapped.insert(field.local.to_string(), value);
    }
    mapped
}

fn key_part(
    scope: SyncScope,
    part: &KeyPart,
    payload: &Map<String, Value>,
) -> Result<Option<String>> {
    match payload.get(part.field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        None | Some(Value::Null) if !part.required => Ok(None),
        _ => Err(ErpLinkError::InvalidResponse(format!(
            "{} record has no usable {}",
            scope, part.field
        ))),
    }
}

/// A single-part key is the bare value. Composite keys are a JSON array of
/// their parts, so separators inside values cannot make two keys collide.
fn encode_natural_key(parts: &[Option<String>]) -> Result<String> {
    match parts {
        [Some(single)] => Ok(single.clone()),
        _ => serde_json::to_string(parts).map_err(|e| {
            ErpLinkError::InvalidResponse(format!("Cannot encode natural key: {}", e))
        }),
    }
}

impl ScopeSchema {
    /// Translate one remote record and compute its natural key.
    pub fn map_record(&self, raw: &Value) -> Result<MappedRecord> {
        let record = raw.as_object().ok_or_else(|| {
            ErpLinkError::InvalidResponse(format!("{} record is not an object", self.scope))
        })?;

        let payload = map_fields(self.fields, record);
        let parts = self
            .key
            .iter()
            .map(|part| key_part(self.scope, part, &payload))
            .collect::<Result<Vec<_>>>()?;
        let natural_key = encode_natural_key(&parts)?;

        Ok(MappedRecord {
            natural_key,
            payload: Value::Object(payload),
        })
    }

    /// Translate a whole collection; fails on the first unusable record.
    pub fn map_collection(&self, raw: &[Value]) -> Result<Vec<MappedRecord>> {
        raw.iter().map(|record| self.map_record(record)).collect()
    }
}
