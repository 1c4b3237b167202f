//! Multi-strategy field extraction over OCR output.
//!
//! Strategy order, per field: ordered regex cascade (first match wins), then
//! context-window classification for dates/locations, then table fallback for
//! anything still null. The whole pass is a pure function of its inputs.

pub mod patterns;

pub use patterns::{BolField, DateClass, LocationClass, PatternLibrary};

use serde::{Deserialize, Serialize};
use crate::ocr::OcrTable;

/// Canonical extracted field map. Values are the raw matched strings; no
/// unit or date normalization is applied. Serialized with camelCase keys and
/// explicit nulls, matching the document record's wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFields {
    pub bol_number: Option<String>,
    pub po_number: Option<String>,
    pub carrier: Option<String>,
    pub trailer_number: Option<String>,
    pub ship_date: Option<String>,
    pub delivery_date: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub weight: Option<String>,
    pub item_count: Option<String>,
}

const ALL_FIELDS: [BolField; 10] = [
    BolField::BolNumber,
    BolField::PoNumber,
    BolField::Carrier,
    BolField::TrailerNumber,
    BolField::ShipDate,
    BolField::DeliveryDate,
    BolField::Origin,
    BolField::Destination,
    BolField::Weight,
    BolField::ItemCount,
];

impl ExtractedFields {
    fn slot(&mut self, field: BolField) -> &mut Option<String> {
        match field {
            BolField::BolNumber => &mut self.bol_number,
            BolField::PoNumber => &mut self.po_number,
            BolField::Carrier => &mut self.carrier,
            BolField::TrailerNumber => &mut self.trailer_number,
            BolField::ShipDate => &mut self.ship_date,
            BolField::DeliveryDate => &mut self.delivery_date,
            BolField::Origin => &mut self.origin,
            BolField::Destination => &mut self.destination,
            BolField::Weight => &mut self.weight,
            BolField::ItemCount => &mut self.item_count,
        }
    }

    fn get(&self, field: BolField) -> Option<&str> {
        match field {
            BolField::BolNumber => self.bol_number.as_deref(),
            BolField::PoNumber => self.po_number.as_deref(),
            BolField::Carrier => self.carrier.as_deref(),
            BolField::TrailerNumber => self.trailer_number.as_deref(),
            BolField::ShipDate => self.ship_date.as_deref(),
            BolField::DeliveryDate => self.delivery_date.as_deref(),
            BolField::Origin => self.origin.as_deref(),
            BolField::Destination => self.destination.as_deref(),
            BolField::Weight => self.weight.as_deref(),
            BolField::ItemCount => self.item_count.as_deref(),
        }
    }

    /// True when no field was extracted
    pub fn is_empty(&self) -> bool {
        ALL_FIELDS.iter().all(|f| self.get(*f).is_none())
    }
}

/// Width of the context window inspected before a date/location value
const CONTEXT_WINDOW_BYTES: usize = 20;

/// Applies the pattern cascades and table fallback to OCR output.
///
/// Total and deterministic: identical `(text, tables)` always produce an
/// identical field map, and no input shape causes an error.
pub struct FieldExtractor {
    patterns: PatternLibrary,
}

impl FieldExtractor {
    pub fn new() -> Self {
        Self {
            patterns: PatternLibrary::new(),
        }
    }

    /// Extract all canonical fields from OCR text and tables
    pub fn extract(&self, text: &str, tables: &[OcrTable]) -> ExtractedFields {
        let mut fields = ExtractedFields::default();

        // Pass 1: regex cascades, first non-empty capture wins per field
        for field in ALL_FIELDS {
            if let Some(cascade) = self.patterns.cascade(field) {
                *fields.slot(field) = first_capture(cascade, text);
            }
        }

        // Pass 2: context-classified date and location values; the first
        // match of each class wins and later matches never overwrite
        self.assign_dates(text, &mut fields);
        self.assign_locations(text, &mut fields);

        // Pass 3: table fallback fills only what is still null
        for field in ALL_FIELDS {
            if fields.get(field).is_none() {
                *fields.slot(field) = table_lookup(tables, field);
            }
        }

        fields
    }

    fn assign_dates(&self, text: &str, fields: &mut ExtractedFields) {
        for caps in self.patterns.date_value.captures_iter(text) {
            let m = match caps.get(1) {
                Some(m) => m,
                None => continue,
            };
            let window = context_window(text, m.start());
            let target = match patterns::classify_date(window) {
                Some(DateClass::Ship) => BolField::ShipDate,
                Some(DateClass::Delivery) => BolField::DeliveryDate,
                None => continue,
            };
            let slot = fields.slot(target);
            if slot.is_none() {
                *slot = Some(clean_value(m.as_str())).filter(|v| !v.is_empty());
            }
        }
    }

    fn assign_locations(&self, text: &str, fields: &mut ExtractedFields) {
        for caps in self.patterns.location_value.captures_iter(text) {
            let m = match caps.get(1) {
                Some(m) => m,
                None => continue,
            };
            let window = context_window(text, m.start());
            let target = match patterns::classify_location(window) {
                Some(LocationClass::Origin) => BolField::Origin,
                Some(LocationClass::Destination) => BolField::Destination,
                None => continue,
            };
            let slot = fields.slot(target);
            if slot.is_none() {
                *slot = Some(clean_value(m.as_str())).filter(|v| !v.is_empty());
            }
        }
    }
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold an ordered pattern list with short-circuit: first non-empty capture wins
fn first_capture(cascade: &[regex::Regex], text: &str) -> Option<String> {
    cascade.iter().find_map(|re| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| clean_value(m.as_str()))
            .filter(|v| !v.is_empty())
    })
}

/// Up to [`CONTEXT_WINDOW_BYTES`] of text preceding a captured value
fn context_window(text: &str, value_start: usize) -> &str {
    let mut start = value_start.saturating_sub(CONTEXT_WINDOW_BYTES);
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    &text[start..value_start]
}

/// Trim and strip trailing punctuation, as the OCR text often carries
/// line-noise terminators
fn clean_value(raw: &str) -> String {
    raw.trim()
        .trim_end_matches([',', '.', ':', ';'])
        .trim_end()
        .to_string()
}

/// Table fallback: the first row whose label column matches a field synonym
/// supplies the value column. Malformed rows (fewer than 2 columns) are
/// skipped, never an error.
fn table_lookup(tables: &[OcrTable], field: BolField) -> Option<String> {
    let synonyms = PatternLibrary::table_synonyms(field);
    tables
        .iter()
        .flat_map(|table| table.rows.iter())
        .find(|row| {
            row.len() >= 2 && {
                let label = row[0].to_lowercase();
                synonyms.iter().any(|syn| label.contains(syn))
            }
        })
        .map(|row| clean_value(&row[1]))
        .filter(|v| !v.is_empty())
}
