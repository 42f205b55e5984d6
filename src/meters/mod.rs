//! # Meters and Field Extraction
//!
//! A `Meter` is the live decoding state for one physical meter: the driver's
//! field declarations, the configured key, and the latest extracted values.
//! Drivers are data plus closures rather than subclasses: a driver
//! constructor installs `FieldInfo` declarations (and optionally a
//! manufacturer-specific content parser) into the meter, and the shared
//! engine here does matching, scaling, unit conversion, status folding and
//! JSON rendering.
//!
//! Field extraction walks the telegram's DVEntry map once per field: the
//! `index_nr`-th entry satisfying the `FieldMatcher` wins. A field name
//! containing `{tariff_counter}`-style placeholders extracts once per
//! matching entry instead, expanding one field per counter value.

pub mod drivers;
pub mod formula;
pub mod registry;
pub mod translate;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::logging::{log_debug, log_warn};
use crate::payload::dv::{DvEntry, MeasurementType};
use crate::payload::vif::{
    is_inside_vif_range, vif_unit_and_exponent, VifRange, VIF_MANUFACTURER_CODE,
};
use crate::telegram::crypto::AesKey;
use crate::telegram::{manufacturer_name, AboutTelegram, Telegram};
use crate::units::{convert, Quantity, Unit};
use translate::{tpl_status_tokens, Lookup};

bitflags! {
    /// How a field participates in the rendered outputs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PrintProperties: u32 {
        /// Participates in the tabular field output.
        const FIELD = 0x01;
        /// Participates in the JSON output.
        const JSON = 0x02;
        const IMPORTANT = 0x04;
        /// Omitted entirely when not present in the telegram.
        const OPTIONAL = 0x08;
        /// Folds into, and renders as, the combined status.
        const STATUS = 0x10;
        const DEPRECATED = 0x20;
        const HIDE = 0x40;
        /// Contributes tokens to the combined status without rendering.
        const INJECT_INTO_STATUS = 0x80;
        /// The combined status also carries the TPL status byte.
        const INCLUDE_TPL_STATUS = 0x100;
    }
}

pub const DEFAULT_PRINT_PROPERTIES: PrintProperties =
    PrintProperties::JSON.union(PrintProperties::FIELD);

/// Whether the VIF exponent is applied to the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VifScaling {
    Auto,
    None,
}

/// Whether the raw binary value is decoded as two's complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifSignedness {
    Signed,
    Unsigned,
}

/// Declarative selector for DVEntries.
#[derive(Debug, Clone, Default)]
pub struct FieldMatcher {
    dif_vif_key: Option<&'static str>,
    measurement: Option<MeasurementType>,
    vif_range: Option<VifRange>,
    storage_nr: Option<(u64, u64)>,
    tariff_nr: Option<(u32, u32)>,
    subunit_nr: Option<(u32, u32)>,
    combinables: Vec<u16>,
    any_combinables: bool,
    index_nr: usize,
}

impl FieldMatcher {
    pub fn build() -> FieldMatcher {
        FieldMatcher {
            index_nr: 1,
            ..Default::default()
        }
    }

    /// Exact DIF/VIF hex key; all other checks are ignored.
    pub fn difvif(mut self, key: &'static str) -> Self {
        self.dif_vif_key = Some(key);
        self
    }

    pub fn measurement(mut self, mt: MeasurementType) -> Self {
        self.measurement = Some(mt);
        self
    }

    pub fn vif_range(mut self, vr: VifRange) -> Self {
        self.vif_range = Some(vr);
        self
    }

    pub fn storage(mut self, nr: u64) -> Self {
        self.storage_nr = Some((nr, nr));
        self
    }

    pub fn storage_range(mut self, from: u64, to: u64) -> Self {
        self.storage_nr = Some((from, to));
        self
    }

    pub fn any_storage(mut self) -> Self {
        self.storage_nr = None;
        self
    }

    pub fn tariff(mut self, nr: u32) -> Self {
        self.tariff_nr = Some((nr, nr));
        self
    }

    pub fn tariff_range(mut self, from: u32, to: u32) -> Self {
        self.tariff_nr = Some((from, to));
        self
    }

    pub fn subunit(mut self, nr: u32) -> Self {
        self.subunit_nr = Some((nr, nr));
        self
    }

    pub fn index(mut self, nr: usize) -> Self {
        self.index_nr = nr;
        self
    }

    /// Require a plain combinable VIFE such as backward-flow (0x3C).
    pub fn combinable(mut self, vife: u16) -> Self {
        self.combinables.push(vife);
        self
    }

    /// Require a manufacturer-specific combinable `FF nn`, written the way
    /// drivers see it: `0x7Fnn`.
    pub fn combinable_raw(mut self, raw: u16) -> Self {
        self.combinables.push(raw);
        self
    }

    /// Accept entries regardless of their combinable modifiers.
    pub fn any_combinables(mut self) -> Self {
        self.any_combinables = true;
        self
    }

    fn matches(&self, base_key: &str, e: &DvEntry) -> bool {
        if let Some(key) = self.dif_vif_key {
            return base_key == key;
        }
        if let Some(mt) = self.measurement {
            if mt != MeasurementType::Any && e.measurement != mt {
                return false;
            }
        }
        if let Some(vr) = self.vif_range {
            if !is_inside_vif_range(e.vif, vr) {
                return false;
            }
        }
        if let Some((from, to)) = self.storage_nr {
            if e.storage_nr < from || e.storage_nr > to {
                return false;
            }
        }
        if let Some((from, to)) = self.tariff_nr {
            if e.tariff_nr < from || e.tariff_nr > to {
                return false;
            }
        }
        if let Some((from, to)) = self.subunit_nr {
            if e.subunit_nr < from || e.subunit_nr > to {
                return false;
            }
        }
        if !self.any_combinables {
            // The entry's modifiers must be exactly the requested ones;
            // an unrequested modifier changes the meaning of the value.
            let mut have = e.combinables.clone();
            let mut want = self.combinables.clone();
            have.sort_unstable();
            want.sort_unstable();
            if have != want {
                return false;
            }
        }
        true
    }
}

/// What kind of value a field carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Numeric,
    Text,
    TextWithLookup,
    Calculated,
    /// No extractor of its own; rendered from the combined status tokens.
    Status,
}

/// Static per-driver description of one output field.
pub struct FieldInfo {
    name: &'static str,
    #[allow(dead_code)]
    help: &'static str,
    props: PrintProperties,
    quantity: Quantity,
    display_unit: Option<Unit>,
    vif_scaling: VifScaling,
    dif_signedness: DifSignedness,
    matcher: Option<FieldMatcher>,
    lookup: Option<Lookup>,
    formula: Option<&'static str>,
    kind: FieldKind,
}

impl FieldInfo {
    fn display_unit(&self) -> Unit {
        self.display_unit.unwrap_or(self.quantity.default_unit())
    }

    fn is_template(&self) -> bool {
        self.name.contains('{')
    }

    /// The JSON key this field renders under.
    fn json_name(&self) -> String {
        match self.kind {
            FieldKind::Numeric | FieldKind::Calculated => {
                format!("{}_{}", self.name, self.display_unit().suffix())
            }
            _ => self.name.to_string(),
        }
    }
}

/// A value stored on the meter for one rendered field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Numeric { value: f64, unit: Unit },
    Text(String),
}

/// Configuration a meter is created from.
#[derive(Debug, Clone, Default)]
pub struct MeterInfo {
    pub name: String,
    pub id: String,
    /// 32 hex digits, or empty/`NOKEY` for unencrypted meters.
    pub key: String,
    pub driver_name: String,
}

type ProcessContentFn = fn(&mut Meter, &mut Telegram) -> bool;

/// Live decoding state for one meter.
pub struct Meter {
    name: String,
    driver_name: String,
    #[allow(dead_code)]
    id_expression: String,
    key: Option<AesKey>,
    field_infos: Vec<FieldInfo>,
    process_content: Option<ProcessContentFn>,
    /// (json name, value, index of the declaring field).
    values: Vec<(String, FieldValue, usize)>,
    status_tokens: Vec<String>,
    matched_id: String,
    media: &'static str,
    timestamp: DateTime<Utc>,
    num_updates: u32,
}

/// Build a meter from its configuration via the driver registry.
pub fn create_meter(mi: &MeterInfo) -> Result<Meter, DecodeError> {
    let di = registry::registry()
        .find_by_name(&mi.driver_name)
        .ok_or(DecodeError::CreateMeter)?;

    let key = match mi.key.as_str() {
        "" | "NOKEY" => None,
        hex => Some(AesKey::from_hex(hex).map_err(|_| DecodeError::CreateMeter)?),
    };

    let mut meter = Meter {
        name: mi.name.clone(),
        driver_name: di.name.to_string(),
        id_expression: mi.id.clone(),
        key,
        field_infos: Vec::new(),
        process_content: None,
        values: Vec::new(),
        status_tokens: Vec::new(),
        matched_id: String::new(),
        media: "unknown",
        timestamp: Utc::now(),
        num_updates: 0,
    };
    (di.constructor)(&mut meter);
    Ok(meter)
}

impl Meter {
    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn num_updates(&self) -> u32 {
        self.num_updates
    }

    /// Decode one frame: header, decryption, DV walk, field extraction.
    ///
    /// Returns the analyzed telegram and whether it was fully handled;
    /// a decryption failure or a payload with nothing parseable reports
    /// `handled = false` while preserving the telegram for diagnostics.
    pub fn handle_telegram(
        &mut self,
        about: AboutTelegram,
        frame: Vec<u8>,
    ) -> Result<(Telegram, bool), DecodeError> {
        let mut t = Telegram::new(about, frame);
        t.parse_header()?;
        t.decrypt(self.key.as_ref())?;

        self.values.clear();
        self.status_tokens.clear();
        self.matched_id = t.id().to_string();
        self.media = t.media();
        self.timestamp = Utc::now();

        if t.decryption_failed {
            return Ok((t, false));
        }

        t.walk();

        let mut handled = true;
        if t.mfct_payload {
            match self.process_content {
                Some(pc) => {
                    if pc(self, &mut t) {
                        let all = t.content_bytes();
                        t.mark_understood(all);
                    }
                }
                None => log_debug("manufacturer specific payload with no content parser"),
            }
        } else if t.walk_halted_at.is_some() && t.entries.is_empty() {
            handled = false;
        }

        self.extract_fields(&t);
        self.num_updates += 1;
        Ok((t, handled))
    }

    // ---- driver-facing builder API -------------------------------------

    pub fn set_process_content(&mut self, f: ProcessContentFn) {
        self.process_content = Some(f);
    }

    pub fn add_numeric_field_with_extractor(
        &mut self,
        name: &'static str,
        help: &'static str,
        props: PrintProperties,
        quantity: Quantity,
        vif_scaling: VifScaling,
        dif_signedness: DifSignedness,
        matcher: FieldMatcher,
    ) {
        self.field_infos.push(FieldInfo {
            name,
            help,
            props,
            quantity,
            display_unit: None,
            vif_scaling,
            dif_signedness,
            matcher: Some(matcher),
            lookup: None,
            formula: None,
            kind: FieldKind::Numeric,
        });
    }

    /// Numeric extractor rendered in an explicit unit instead of the
    /// quantity default.
    #[allow(clippy::too_many_arguments)]
    pub fn add_numeric_field_with_extractor_and_unit(
        &mut self,
        name: &'static str,
        help: &'static str,
        props: PrintProperties,
        quantity: Quantity,
        vif_scaling: VifScaling,
        dif_signedness: DifSignedness,
        matcher: FieldMatcher,
        unit: Unit,
    ) {
        self.field_infos.push(FieldInfo {
            name,
            help,
            props,
            quantity,
            display_unit: Some(unit),
            vif_scaling,
            dif_signedness,
            matcher: Some(matcher),
            lookup: None,
            formula: None,
            kind: FieldKind::Numeric,
        });
    }

    /// Numeric field whose value is computed from other fields.
    pub fn add_numeric_field_with_calculator(
        &mut self,
        name: &'static str,
        help: &'static str,
        props: PrintProperties,
        quantity: Quantity,
        formula: &'static str,
    ) {
        self.field_infos.push(FieldInfo {
            name,
            help,
            props,
            quantity,
            display_unit: None,
            vif_scaling: VifScaling::None,
            dif_signedness: DifSignedness::Unsigned,
            matcher: None,
            lookup: None,
            formula: Some(formula),
            kind: FieldKind::Calculated,
        });
    }

    /// Numeric field with no extractor; a manufacturer-specific content
    /// parser fills it in.
    pub fn add_numeric_field(
        &mut self,
        name: &'static str,
        quantity: Quantity,
        props: PrintProperties,
        help: &'static str,
    ) {
        self.field_infos.push(FieldInfo {
            name,
            help,
            props,
            quantity,
            display_unit: None,
            vif_scaling: VifScaling::None,
            dif_signedness: DifSignedness::Unsigned,
            matcher: None,
            lookup: None,
            formula: None,
            kind: FieldKind::Numeric,
        });
    }

    pub fn add_string_field_with_extractor(
        &mut self,
        name: &'static str,
        help: &'static str,
        props: PrintProperties,
        matcher: FieldMatcher,
    ) {
        self.field_infos.push(FieldInfo {
            name,
            help,
            props,
            quantity: Quantity::Text,
            display_unit: None,
            vif_scaling: VifScaling::None,
            dif_signedness: DifSignedness::Unsigned,
            matcher: Some(matcher),
            lookup: None,
            formula: None,
            kind: FieldKind::Text,
        });
    }

    pub fn add_string_field_with_extractor_and_lookup(
        &mut self,
        name: &'static str,
        help: &'static str,
        props: PrintProperties,
        matcher: FieldMatcher,
        lookup: Lookup,
    ) {
        self.field_infos.push(FieldInfo {
            name,
            help,
            props,
            quantity: Quantity::Text,
            display_unit: None,
            vif_scaling: VifScaling::None,
            dif_signedness: DifSignedness::Unsigned,
            matcher: Some(matcher),
            lookup: Some(lookup),
            formula: None,
            kind: FieldKind::TextWithLookup,
        });
    }

    /// Plain string field: either filled by a content parser, or (with
    /// `STATUS`) rendered from the combined status tokens.
    pub fn add_string_field(
        &mut self,
        name: &'static str,
        help: &'static str,
        props: PrintProperties,
    ) {
        let kind = if props.contains(PrintProperties::STATUS) {
            FieldKind::Status
        } else {
            FieldKind::Text
        };
        self.field_infos.push(FieldInfo {
            name,
            help,
            props,
            quantity: Quantity::Text,
            display_unit: None,
            vif_scaling: VifScaling::None,
            dif_signedness: DifSignedness::Unsigned,
            matcher: None,
            lookup: None,
            formula: None,
            kind,
        });
    }

    /// Install the standard matchers for well-known library fields, given
    /// as the comma-separated list used by driver declarations
    /// (`"meter_date,fabrication_no,total_m3"`).
    pub fn add_optional_library_fields(&mut self, names: &str) {
        let props = PrintProperties::JSON | PrintProperties::OPTIONAL;
        for name in names.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match name {
                "meter_date" => self.add_string_field_with_extractor(
                    "meter_date",
                    "Date when the meter sent the telegram.",
                    props,
                    FieldMatcher::build()
                        .measurement(MeasurementType::Instantaneous)
                        .vif_range(VifRange::Date)
                        .storage(0),
                ),
                "meter_datetime" => self.add_string_field_with_extractor(
                    "meter_datetime",
                    "Date and time when the meter sent the telegram.",
                    props,
                    FieldMatcher::build()
                        .measurement(MeasurementType::Instantaneous)
                        .vif_range(VifRange::DateTime)
                        .storage(0),
                ),
                "fabrication_no" => self.add_string_field_with_extractor(
                    "fabrication_no",
                    "Fabrication number.",
                    props,
                    FieldMatcher::build()
                        .measurement(MeasurementType::Instantaneous)
                        .vif_range(VifRange::FabricationNo),
                ),
                "on_time_h" => self.add_numeric_field_with_extractor(
                    "on_time",
                    "How long the meter has been powered.",
                    props,
                    Quantity::Time,
                    VifScaling::Auto,
                    DifSignedness::Unsigned,
                    FieldMatcher::build()
                        .measurement(MeasurementType::Instantaneous)
                        .vif_range(VifRange::OnTime),
                ),
                "on_time_at_error_h" => self.add_numeric_field_with_extractor(
                    "on_time_at_error",
                    "How long the meter has been in an error state.",
                    props,
                    Quantity::Time,
                    VifScaling::Auto,
                    DifSignedness::Unsigned,
                    FieldMatcher::build()
                        .measurement(MeasurementType::AtError)
                        .vif_range(VifRange::OnTime),
                ),
                "operating_time_h" => self.add_numeric_field_with_extractor(
                    "operating_time",
                    "How long the meter has been measuring.",
                    props,
                    Quantity::Time,
                    VifScaling::Auto,
                    DifSignedness::Unsigned,
                    FieldMatcher::build()
                        .measurement(MeasurementType::Instantaneous)
                        .vif_range(VifRange::OperatingTime),
                ),
                "total_m3" => self.add_numeric_field_with_extractor(
                    "total",
                    "The total media volume consumption recorded by this meter.",
                    props | PrintProperties::FIELD | PrintProperties::IMPORTANT,
                    Quantity::Volume,
                    VifScaling::Auto,
                    DifSignedness::Unsigned,
                    FieldMatcher::build()
                        .measurement(MeasurementType::Instantaneous)
                        .vif_range(VifRange::Volume)
                        .storage(0),
                ),
                "total_backward_m3" => self.add_numeric_field_with_extractor(
                    "total_backward",
                    "The total media volume flowing backward.",
                    props,
                    Quantity::Volume,
                    VifScaling::Auto,
                    DifSignedness::Unsigned,
                    FieldMatcher::build()
                        .measurement(MeasurementType::Instantaneous)
                        .vif_range(VifRange::Volume)
                        .storage(0)
                        .combinable(0x3C),
                ),
                "volume_flow_m3h" => self.add_numeric_field_with_extractor(
                    "volume_flow",
                    "The current flow of media through the meter.",
                    props,
                    Quantity::Flow,
                    VifScaling::Auto,
                    DifSignedness::Unsigned,
                    FieldMatcher::build()
                        .measurement(MeasurementType::Instantaneous)
                        .vif_range(VifRange::VolumeFlow),
                ),
                "firmware_version" => self.add_string_field_with_extractor(
                    "firmware_version",
                    "Firmware version of the meter.",
                    props,
                    FieldMatcher::build().vif_range(VifRange::FirmwareVersion),
                ),
                "model_version" => self.add_string_field_with_extractor(
                    "model_version",
                    "Model and version of the meter.",
                    props,
                    FieldMatcher::build().vif_range(VifRange::ModelVersion),
                ),
                "parameter_set" => self.add_string_field_with_extractor(
                    "parameter_set",
                    "Parameter set identification.",
                    props,
                    FieldMatcher::build().vif_range(VifRange::ParameterSet),
                ),
                "manufacturer" => self.add_string_field_with_extractor(
                    "manufacturer",
                    "Manufacturer code stored in the telegram.",
                    props,
                    FieldMatcher::build().vif_range(VifRange::Manufacturer),
                ),
                other => log_warn(&format!("unknown library field {other}")),
            }
        }
    }

    // ---- content-parser value setters ----------------------------------

    pub fn set_numeric_value(&mut self, name: &str, unit: Unit, value: f64) {
        match self.field_index(name) {
            Some(idx) => {
                let json_name = format!("{name}_{}", unit.suffix());
                self.values
                    .push((json_name, FieldValue::Numeric { value, unit }, idx));
            }
            None => log_warn(&format!("driver set unknown numeric field {name}")),
        }
    }

    pub fn set_string_value(&mut self, name: &str, value: &str) {
        match self.field_index(name) {
            Some(idx) => {
                self.values
                    .push((name.to_string(), FieldValue::Text(value.to_string()), idx));
            }
            None => log_warn(&format!("driver set unknown string field {name}")),
        }
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.field_infos.iter().position(|fi| fi.name == name)
    }

    /// A stored numeric value by its JSON name, for calculators and tests.
    pub fn numeric_value(&self, json_name: &str) -> Option<(f64, Unit)> {
        self.values.iter().find_map(|(n, v, _)| match v {
            FieldValue::Numeric { value, unit } if n == json_name => Some((*value, *unit)),
            _ => None,
        })
    }

    /// A stored string value by its JSON name.
    pub fn string_value(&self, json_name: &str) -> Option<&str> {
        self.values.iter().find_map(|(n, v, _)| match v {
            FieldValue::Text(s) if n == json_name => Some(s.as_str()),
            _ => None,
        })
    }

    // ---- extraction ----------------------------------------------------

    fn extract_fields(&mut self, t: &Telegram) {
        let mut new_values: Vec<(String, FieldValue, usize)> = Vec::new();
        let mut tokens: Vec<String> = Vec::new();

        for (idx, fi) in self.field_infos.iter().enumerate() {
            let matcher = match &fi.matcher {
                Some(m) => m,
                None => continue,
            };

            let matches: Vec<&DvEntry> = t
                .entries
                .iter()
                .filter(|(key, e)| matcher.matches(base_key(key), e))
                .map(|(_, e)| e)
                .collect();

            if fi.is_template() {
                for entry in &matches {
                    if let Some((name, value)) = extract_one(fi, entry, true) {
                        new_values.push((name, value, idx));
                    }
                }
                continue;
            }

            let Some(entry) = matches.get(matcher.index_nr.saturating_sub(1)) else {
                continue;
            };
            if let Some((name, value)) = extract_one(fi, entry, false) {
                if fi
                    .props
                    .intersects(PrintProperties::STATUS | PrintProperties::INJECT_INTO_STATUS)
                {
                    if let FieldValue::Text(s) = &value {
                        tokens.extend(status_tokens_from(s));
                    }
                    if fi.props.contains(PrintProperties::INJECT_INTO_STATUS)
                        && !fi.props.contains(PrintProperties::JSON)
                    {
                        continue;
                    }
                }
                new_values.push((name, value, idx));
            }
        }

        self.values.extend(new_values);
        self.status_tokens = tokens;
        self.extract_calculated_fields();
    }

    fn extract_calculated_fields(&mut self) {
        for idx in 0..self.field_infos.len() {
            let fi = &self.field_infos[idx];
            let Some(f) = fi.formula else { continue };
            let unit = fi.display_unit();
            let resolver = |name: &str| self.numeric_value(name);
            let Some(v) = formula::evaluate(f, &resolver) else {
                log_debug(&format!("formula for {} did not evaluate", fi.name));
                continue;
            };
            let Some(value) = v.to_unit(unit) else {
                log_warn(&format!("formula for {} has the wrong unit", fi.name));
                continue;
            };
            let json_name = self.field_infos[idx].json_name();
            self.values
                .push((json_name, FieldValue::Numeric { value, unit }, idx));
        }
    }

    // ---- rendering -----------------------------------------------------

    /// The combined status: tokens from every status source, deduplicated,
    /// sorted and joined; `OK` when the set is empty.
    fn combined_status(&self, t: &Telegram) -> String {
        let mut tokens: Vec<String> = self.status_tokens.clone();
        let include_tpl = self
            .field_infos
            .iter()
            .any(|fi| fi.props.contains(PrintProperties::INCLUDE_TPL_STATUS));
        if include_tpl {
            tokens.extend(tpl_status_tokens(t.tpl_sts));
        }
        tokens.retain(|s| !s.is_empty() && s != "OK");
        tokens.sort();
        tokens.dedup();
        if tokens.is_empty() {
            "OK".to_string()
        } else {
            tokens.join(" ")
        }
    }

    /// Serialize the named field set into the decode response shape.
    pub fn print_meter_json(&self, t: &Telegram) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("media".into(), Value::String(self.media.to_string()));
        out.insert("meter".into(), Value::String(self.driver_name.clone()));
        out.insert("name".into(), Value::String(self.name.clone()));
        out.insert("id".into(), Value::String(self.matched_id.clone()));

        for (idx, fi) in self.field_infos.iter().enumerate() {
            if !fi.props.contains(PrintProperties::JSON)
                || fi.props.contains(PrintProperties::HIDE)
            {
                continue;
            }

            if fi.kind == FieldKind::Status || fi.props.contains(PrintProperties::STATUS) {
                out.insert(
                    fi.name.to_string(),
                    Value::String(self.combined_status(t)),
                );
                continue;
            }

            let mut any = false;
            for (name, value, widx) in &self.values {
                if *widx != idx {
                    continue;
                }
                any = true;
                out.insert(name.clone(), field_value_to_json(value));
            }

            if !any && !fi.is_template() && !fi.props.contains(PrintProperties::OPTIONAL) {
                out.insert(fi.json_name(), Value::Null);
            }
        }

        out.insert(
            "timestamp".into(),
            Value::String(self.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
        out
    }
}

/// Map keys carry `_2` suffixes for duplicates; matching uses the bare key.
fn base_key(key: &str) -> &str {
    key.split('_').next().unwrap_or(key)
}

fn status_tokens_from(s: &str) -> Vec<String> {
    s.split_whitespace()
        .filter(|tok| *tok != "OK" && !tok.is_empty())
        .map(str::to_string)
        .collect()
}

fn field_value_to_json(v: &FieldValue) -> Value {
    match v {
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::Numeric { value, .. } => number_to_json(*value),
    }
}

/// Integral values render without a decimal point, the way meter readings
/// are usually written.
fn number_to_json(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < 9e15 {
        Value::Number((v as i64).into())
    } else {
        serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
    }
}

/// Apply a power-of-ten exponent. Negative exponents divide so that BCD
/// readings keep their exact decimal representation.
fn apply_exponent(raw: f64, exp: i32) -> f64 {
    if exp >= 0 {
        raw * 10f64.powi(exp)
    } else {
        raw / 10f64.powi(-exp)
    }
}

/// Extract one field value from one entry. Returns the rendered name and
/// the value.
fn extract_one(fi: &FieldInfo, e: &DvEntry, expand: bool) -> Option<(String, FieldValue)> {
    let name = if expand {
        expand_name(fi, e)
    } else {
        fi.name.to_string()
    };

    match fi.kind {
        FieldKind::TextWithLookup => {
            let raw = e.as_u64()?;
            let s = fi.lookup.as_ref()?.translate(raw);
            Some((name, FieldValue::Text(s)))
        }
        FieldKind::Text => {
            let s = extract_text(e)?;
            Some((name, FieldValue::Text(s)))
        }
        FieldKind::Numeric => {
            if fi.quantity == Quantity::PointInTime {
                let s = e.as_date_string()?;
                let json_name = format!("{name}_{}", fi.display_unit().suffix());
                return Some((json_name, FieldValue::Text(s)));
            }
            let (value, unit) = extract_numeric(fi, e)?;
            let json_name = format!("{name}_{}", unit.suffix());
            Some((json_name, FieldValue::Numeric { value, unit }))
        }
        FieldKind::Calculated | FieldKind::Status => None,
    }
}

fn extract_numeric(fi: &FieldInfo, e: &DvEntry) -> Option<(f64, Unit)> {
    let signed = fi.dif_signedness == DifSignedness::Signed;
    let raw = e.as_double(signed)?;
    let display = fi.display_unit();

    match fi.vif_scaling {
        VifScaling::None => Some((raw, display)),
        VifScaling::Auto => {
            let (source_unit, exp) = vif_unit_and_exponent(e.vif)?;
            let scaled = apply_exponent(raw, exp);
            let converted = convert(scaled, source_unit, display)?;
            Some((converted, display))
        }
    }
}

fn extract_text(e: &DvEntry) -> Option<String> {
    if e.vif == 0x6C || e.vif == 0x6D {
        return e.as_date_string();
    }
    if e.vif == VIF_MANUFACTURER_CODE {
        let code = e.as_u64()?;
        return Some(manufacturer_name(code as u16));
    }
    e.as_text()
}

fn expand_name(fi: &FieldInfo, e: &DvEntry) -> String {
    fi.name
        .replace("{tariff_counter}", &e.tariff_nr.to_string())
        .replace("{storage_counter}", &e.storage_nr.to_string())
        .replace("{subunit_counter}", &e.subunit_nr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_key() {
        assert_eq!(base_key("0413"), "0413");
        assert_eq!(base_key("0413_2"), "0413");
    }

    #[test]
    fn test_number_rendering() {
        assert_eq!(number_to_json(2651.0), Value::Number(2651.into()));
        assert_eq!(
            number_to_json(6.408),
            Value::Number(serde_json::Number::from_f64(6.408).unwrap())
        );
    }

    #[test]
    fn test_apply_exponent_keeps_decimals_exact() {
        assert_eq!(apply_exponent(244444442.0, -3), 244444.442);
        assert_eq!(apply_exponent(6408.0, -3), 6.408);
        assert_eq!(apply_exponent(7599.0, -2), 75.99);
        assert_eq!(apply_exponent(5.0, 2), 500.0);
    }

    #[test]
    fn test_matcher_combinable_exactness() {
        let plain = DvEntry {
            offset: 0,
            dif: 0x0C,
            measurement: MeasurementType::Instantaneous,
            vif: 0x13,
            combinables: vec![],
            storage_nr: 0,
            tariff_nr: 0,
            subunit_nr: 0,
            key: "0C13".into(),
            data: vec![0x59, 0, 0, 0],
        };
        let mut backward = plain.clone();
        backward.combinables = vec![0x3C];
        backward.key = "0C933C".into();

        let total = FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::Volume);
        assert!(total.matches("0C13", &plain));
        assert!(!total.matches("0C933C", &backward));

        let back = FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::Volume)
            .combinable(0x3C);
        assert!(!back.matches("0C13", &plain));
        assert!(back.matches("0C933C", &backward));

        let anyc = FieldMatcher::build()
            .vif_range(VifRange::Volume)
            .any_combinables();
        assert!(anyc.matches("0C13", &plain));
        assert!(anyc.matches("0C933C", &backward));
    }
}
