use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{AvitoFields, Equipment, Transmission};

/// Upper bound for `specs.mileage_km`, inclusive.
pub const MAX_MILEAGE_KM: f64 = 160_000.0;
/// Closed range for `payment_per_month_rub`.
pub const MIN_PAYMENT_PER_MONTH_RUB: f64 = 5_000.0;
pub const MAX_PAYMENT_PER_MONTH_RUB: f64 = 25_000.0;
/// Descriptions shorter than this produce an advisory finding only.
pub const MIN_DESCRIPTION_CHARS: usize = 200;

/// Whether a finding blocks a submission or is advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocking,
    Warning,
}

/// The bound a numeric field was checked against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Limit {
    Max { max: f64 },
    Range { min: f64, max: f64 },
}

impl Limit {
    pub fn admits(&self, value: f64) -> bool {
        match *self {
            Limit::Max { max } => value <= max,
            Limit::Range { min, max } => (min..=max).contains(&value),
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Max { max } => write!(f, "<= {max}"),
            Limit::Range { min, max } => write!(f, "[{min}, {max}]"),
        }
    }
}

/// What is wrong with one equipment section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistProblem {
    Missing,
    NotAnArray,
    Unexpected,
}

impl fmt::Display for ChecklistProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecklistProblem::Missing => write!(f, "missing"),
            ChecklistProblem::NotAnArray => write!(f, "not an array"),
            ChecklistProblem::Unexpected => write!(f, "not a known section"),
        }
    }
}

/// A single rule violation, named by the dotted path of the offending field.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("{field}: required field is missing")]
    MissingField { field: String },

    #[error("{field}: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("{field}: {observed} is outside {limit}")]
    OutOfRange {
        field: String,
        limit: Limit,
        observed: f64,
    },

    #[error("{field}: {observed:?} is not one of {allowed:?}")]
    EnumViolation {
        field: String,
        allowed: Vec<String>,
        observed: String,
    },

    #[error("{field}: section {section} is {problem}")]
    IncompleteChecklist {
        field: String,
        section: String,
        problem: ChecklistProblem,
    },

    #[error("{field}: not accepted when moving to {target}")]
    UnexpectedField { field: String, target: String },

    #[error("{field}: {observed_chars} characters, at least {min_chars} recommended")]
    DescriptionTooShort {
        field: String,
        min_chars: usize,
        observed_chars: usize,
    },
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        ValidationError::MissingField {
            field: field.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ValidationError::DescriptionTooShort { .. } => Severity::Warning,
            _ => Severity::Blocking,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            ValidationError::MissingField { field }
            | ValidationError::TypeMismatch { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::EnumViolation { field, .. }
            | ValidationError::IncompleteChecklist { field, .. }
            | ValidationError::UnexpectedField { field, .. }
            | ValidationError::DescriptionTooShort { field, .. } => field,
        }
    }
}

/// Outcome of checking one candidate structure.
///
/// Warnings never change the pass/fail outcome; they ride along in both variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationResult {
    Valid {
        warnings: Vec<ValidationError>,
    },
    Invalid {
        errors: Vec<ValidationError>,
        warnings: Vec<ValidationError>,
    },
}

impl ValidationResult {
    pub fn from_findings(findings: Vec<ValidationError>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) = findings
            .into_iter()
            .partition(|f| f.severity() == Severity::Blocking);
        if errors.is_empty() {
            ValidationResult::Valid { warnings }
        } else {
            ValidationResult::Invalid { errors, warnings }
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid { .. })
    }

    /// Blocking findings; empty when valid.
    pub fn errors(&self) -> &[ValidationError] {
        match self {
            ValidationResult::Valid { .. } => &[],
            ValidationResult::Invalid { errors, .. } => errors,
        }
    }

    pub fn warnings(&self) -> &[ValidationError] {
        match self {
            ValidationResult::Valid { warnings } | ValidationResult::Invalid { warnings, .. } => {
                warnings
            }
        }
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        match self {
            ValidationResult::Valid { .. } => Vec::new(),
            ValidationResult::Invalid { errors, .. } => errors,
        }
    }
}

/// Checks a candidate AI result. Every rule runs; nothing short-circuits.
pub fn validate_ai_result(candidate: &Value) -> ValidationResult {
    let Some(root) = root_object(candidate) else {
        return ValidationResult::from_findings(vec![not_an_object(candidate)]);
    };
    let mut c = Checker::default();

    c.string(root, "", "title", Text::NonEmpty);
    if let Some(description) = c.string(root, "", "description", Text::Any) {
        let observed_chars = description.chars().count();
        if observed_chars < MIN_DESCRIPTION_CHARS {
            c.push(ValidationError::DescriptionTooShort {
                field: "description".into(),
                min_chars: MIN_DESCRIPTION_CHARS,
                observed_chars,
            });
        }
    }

    if let Some(specs) = c.object(root, "", "specs") {
        c.string(specs, "specs", "engine", Text::Any);
        c.specs_fields(specs, "specs", Presence::Required);
    }
    if let Some(equipment) = c.object(root, "", "equipment") {
        c.equipment(equipment, "equipment");
    }
    if let Some(fields) = c.object(root, "", "avito_fields") {
        c.marketplace_fields(fields, "avito_fields");
    }

    ValidationResult::from_findings(c.findings)
}

/// Checks a marketplace mapping: the ten required marketplace fields plus any
/// specs-derived values it carries.
pub fn validate_avito_mapping(candidate: &Value) -> ValidationResult {
    let Some(root) = root_object(candidate) else {
        return ValidationResult::from_findings(vec![not_an_object(candidate)]);
    };
    let mut c = Checker::default();
    c.marketplace_fields(root, "");
    c.specs_fields(root, "", Presence::Optional);
    ValidationResult::from_findings(c.findings)
}

fn root_object(candidate: &Value) -> Option<&Map<String, Value>> {
    candidate.as_object()
}

fn not_an_object(candidate: &Value) -> ValidationError {
    ValidationError::TypeMismatch {
        field: "$".into(),
        expected: "object".into(),
        found: json_kind(candidate).into(),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Text {
    Any,
    NonEmpty,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Presence {
    Required,
    Optional,
}

#[derive(Default)]
struct Checker {
    findings: Vec<ValidationError>,
}

impl Checker {
    fn push(&mut self, finding: ValidationError) {
        self.findings.push(finding);
    }

    // Absent and null both count as missing.
    fn field<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        prefix: &str,
        key: &str,
        presence: Presence,
    ) -> Option<&'a Value> {
        match obj.get(key) {
            Some(Value::Null) | None => {
                if presence == Presence::Required {
                    self.push(ValidationError::missing(join(prefix, key)));
                }
                None
            }
            Some(value) => Some(value),
        }
    }

    fn mismatch(&mut self, prefix: &str, key: &str, expected: &str, found: &Value) {
        self.push(ValidationError::TypeMismatch {
            field: join(prefix, key),
            expected: expected.into(),
            found: json_kind(found).into(),
        });
    }

    fn object<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        prefix: &str,
        key: &str,
    ) -> Option<&'a Map<String, Value>> {
        let value = self.field(obj, prefix, key, Presence::Required)?;
        match value.as_object() {
            Some(inner) => Some(inner),
            None => {
                self.mismatch(prefix, key, "object", value);
                None
            }
        }
    }

    fn string<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        prefix: &str,
        key: &str,
        text: Text,
    ) -> Option<&'a str> {
        self.string_with(obj, prefix, key, text, Presence::Required)
    }

    fn string_with<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        prefix: &str,
        key: &str,
        text: Text,
        presence: Presence,
    ) -> Option<&'a str> {
        let value = self.field(obj, prefix, key, presence)?;
        let Some(s) = value.as_str() else {
            self.mismatch(prefix, key, "string", value);
            return None;
        };
        if text == Text::NonEmpty && s.trim().is_empty() {
            self.push(ValidationError::missing(join(prefix, key)));
            return None;
        }
        Some(s)
    }

    fn number(
        &mut self,
        obj: &Map<String, Value>,
        prefix: &str,
        key: &str,
        presence: Presence,
    ) -> Option<f64> {
        let value = self.field(obj, prefix, key, presence)?;
        match value.as_f64() {
            Some(n) => Some(n),
            None => {
                self.mismatch(prefix, key, "number", value);
                None
            }
        }
    }

    fn bounded(
        &mut self,
        obj: &Map<String, Value>,
        prefix: &str,
        key: &str,
        limit: Limit,
        presence: Presence,
    ) {
        if let Some(observed) = self.number(obj, prefix, key, presence) {
            if !limit.admits(observed) {
                self.push(ValidationError::OutOfRange {
                    field: join(prefix, key),
                    limit,
                    observed,
                });
            }
        }
    }

    fn specs_fields(&mut self, obj: &Map<String, Value>, prefix: &str, presence: Presence) {
        self.number(obj, prefix, "year", presence);
        self.number(obj, prefix, "horsepower", presence);
        self.bounded(
            obj,
            prefix,
            "mileage_km",
            Limit::Max {
                max: MAX_MILEAGE_KM,
            },
            presence,
        );
        if let Some(code) = self.string_with(obj, prefix, "transmission", Text::Any, presence) {
            if Transmission::from_code(code).is_none() {
                self.push(ValidationError::EnumViolation {
                    field: join(prefix, "transmission"),
                    allowed: Transmission::ALL.iter().map(|t| t.code().to_string()).collect(),
                    observed: code.to_string(),
                });
            }
        }
    }

    fn equipment(&mut self, obj: &Map<String, Value>, path: &str) {
        for section in Equipment::SECTIONS {
            let problem = match obj.get(section) {
                None | Some(Value::Null) => Some(ChecklistProblem::Missing),
                Some(Value::Array(items)) => {
                    for (i, item) in items.iter().enumerate() {
                        if !item.is_string() {
                            self.mismatch(path, &format!("{section}[{i}]"), "string", item);
                        }
                    }
                    None
                }
                Some(_) => Some(ChecklistProblem::NotAnArray),
            };
            if let Some(problem) = problem {
                self.push(ValidationError::IncompleteChecklist {
                    field: join(path, section),
                    section: section.to_string(),
                    problem,
                });
            }
        }
        for key in obj.keys() {
            if !Equipment::SECTIONS.contains(&key.as_str()) {
                self.push(ValidationError::IncompleteChecklist {
                    field: join(path, key),
                    section: key.clone(),
                    problem: ChecklistProblem::Unexpected,
                });
            }
        }
    }

    fn marketplace_fields(&mut self, obj: &Map<String, Value>, prefix: &str) {
        for key in AvitoFields::REQUIRED {
            match key {
                "price_rub" | "owners" => {
                    self.number(obj, prefix, key, Presence::Required);
                }
                "payment_per_month_rub" => self.bounded(
                    obj,
                    prefix,
                    key,
                    Limit::Range {
                        min: MIN_PAYMENT_PER_MONTH_RUB,
                        max: MAX_PAYMENT_PER_MONTH_RUB,
                    },
                    Presence::Required,
                ),
                _ => {
                    self.string(obj, prefix, key, Text::NonEmpty);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn long_description() -> String {
        "Автомобиль в отличном состоянии, обслуживался у официального дилера. ".repeat(4)
    }

    pub(crate) fn valid_ai_result() -> Value {
        json!({
            "title": "Toyota Camry 2.5 AT, 2018",
            "description": long_description(),
            "specs": {"year": 2018, "transmission": "AT", "engine": "2.5 бензин", "horsepower": 181, "mileage_km": 98000},
            "equipment": {
                "comfort": ["Климат-контроль", "Подогрев сидений"],
                "interior": ["Кожа"],
                "security": ["Сигнализация"],
                "exterior": [],
                "assist": ["Круиз-контроль"],
                "visibility": ["LED фары"],
                "safety": ["8 подушек"],
                "multimedia": ["CarPlay"]
            },
            "avito_fields": {
                "category": "Автомобили", "brand": "Toyota", "model": "Camry", "price_rub": 2450000,
                "city": "Москва", "body_type": "Седан", "drive_type": "Передний", "color": "Чёрный",
                "owners": 2, "payment_per_month_rub": 24000
            }
        })
    }

    pub(crate) fn valid_mapping() -> Value {
        json!({
            "title": "Toyota Camry 2.5 AT, 2018",
            "description": long_description(),
            "photos": ["data/b1/01.jpg"],
            "category": "Автомобили", "brand": "Toyota", "model": "Camry", "price_rub": 2450000,
            "city": "Москва", "body_type": "Седан", "drive_type": "Передний", "color": "Чёрный",
            "owners": 2, "payment_per_month_rub": 24000
        })
    }

    #[test]
    fn valid_result_has_no_findings() {
        let result = validate_ai_result(&valid_ai_result());
        assert_eq!(result, ValidationResult::Valid { warnings: vec![] });
    }

    #[test]
    fn revalidation_is_stable() {
        let candidate = valid_ai_result();
        let first = validate_ai_result(&candidate);
        let second = validate_ai_result(&candidate);
        assert!(first.is_valid());
        assert_eq!(first, second);
    }

    #[test]
    fn mileage_over_limit_is_out_of_range() {
        let mut candidate = valid_ai_result();
        candidate["specs"]["mileage_km"] = json!(161000);
        let result = validate_ai_result(&candidate);
        assert!(!result.is_valid());
        assert_eq!(
            result.errors(),
            &[ValidationError::OutOfRange {
                field: "specs.mileage_km".into(),
                limit: Limit::Max { max: 160000.0 },
                observed: 161000.0,
            }]
        );
        assert_eq!(
            result.errors()[0].to_string(),
            "specs.mileage_km: 161000 is outside <= 160000"
        );
    }

    #[test]
    fn mileage_at_limit_passes() {
        let mut candidate = valid_ai_result();
        candidate["specs"]["mileage_km"] = json!(160000);
        assert!(validate_ai_result(&candidate).is_valid());
    }

    #[test]
    fn payment_outside_range_is_out_of_range() {
        let mut candidate = valid_ai_result();
        candidate["avito_fields"]["payment_per_month_rub"] = json!(30000);
        let result = validate_ai_result(&candidate);
        assert_eq!(
            result.errors(),
            &[ValidationError::OutOfRange {
                field: "avito_fields.payment_per_month_rub".into(),
                limit: Limit::Range {
                    min: 5000.0,
                    max: 25000.0
                },
                observed: 30000.0,
            }]
        );
        assert_eq!(
            result.errors()[0].to_string(),
            "avito_fields.payment_per_month_rub: 30000 is outside [5000, 25000]"
        );
    }

    #[test]
    fn payment_range_is_closed() {
        for edge in [5000, 25000] {
            let mut candidate = valid_ai_result();
            candidate["avito_fields"]["payment_per_month_rub"] = json!(edge);
            assert!(validate_ai_result(&candidate).is_valid(), "{edge} should pass");
        }
        let mut candidate = valid_ai_result();
        candidate["avito_fields"]["payment_per_month_rub"] = json!(4999.5);
        assert!(!validate_ai_result(&candidate).is_valid());
    }

    #[test]
    fn missing_equipment_section_is_incomplete_checklist() {
        let mut candidate = valid_ai_result();
        candidate["equipment"]
            .as_object_mut()
            .unwrap()
            .remove("multimedia");
        let result = validate_ai_result(&candidate);
        assert_eq!(
            result.errors(),
            &[ValidationError::IncompleteChecklist {
                field: "equipment.multimedia".into(),
                section: "multimedia".into(),
                problem: ChecklistProblem::Missing,
            }]
        );
    }

    #[test]
    fn equipment_section_must_be_array_of_strings() {
        let mut candidate = valid_ai_result();
        candidate["equipment"]["safety"] = json!("ABS");
        candidate["equipment"]["comfort"] = json!(["Климат", 3]);
        candidate["equipment"]["extras"] = json!([]);
        let errors = validate_ai_result(&candidate).into_errors();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::IncompleteChecklist {
            field: "equipment.safety".into(),
            section: "safety".into(),
            problem: ChecklistProblem::NotAnArray,
        }));
        assert!(errors.contains(&ValidationError::TypeMismatch {
            field: "equipment.comfort[1]".into(),
            expected: "string".into(),
            found: "number".into(),
        }));
        assert!(errors.contains(&ValidationError::IncompleteChecklist {
            field: "equipment.extras".into(),
            section: "extras".into(),
            problem: ChecklistProblem::Unexpected,
        }));
    }

    #[test]
    fn unknown_transmission_lists_allowed_set() {
        let mut candidate = valid_ai_result();
        candidate["specs"]["transmission"] = json!("DSG");
        let errors = validate_ai_result(&candidate).into_errors();
        assert_eq!(
            errors,
            vec![ValidationError::EnumViolation {
                field: "specs.transmission".into(),
                allowed: vec!["MT".into(), "AT".into(), "CVT".into(), "AMT".into()],
                observed: "DSG".into(),
            }]
        );
    }

    #[test]
    fn short_description_is_only_a_warning() {
        let mut candidate = valid_ai_result();
        candidate["description"] = json!("Продаю машину.");
        let result = validate_ai_result(&candidate);
        assert!(result.is_valid());
        assert_eq!(result.warnings().len(), 1);
        assert_eq!(result.warnings()[0].severity(), Severity::Warning);
        assert_eq!(result.warnings()[0].field(), "description");
    }

    #[test]
    fn all_blocking_checks_are_reported_together() {
        let mut candidate = valid_ai_result();
        candidate["specs"]["mileage_km"] = json!(200000);
        candidate["specs"]["transmission"] = json!("auto");
        candidate["specs"]["year"] = json!("2018");
        candidate["avito_fields"]["payment_per_month_rub"] = json!(1000);
        candidate["avito_fields"]["owners"] = json!(null);
        candidate["equipment"].as_object_mut().unwrap().remove("assist");
        candidate["description"] = json!("коротко");

        let result = validate_ai_result(&candidate);
        let fields: Vec<&str> = result.errors().iter().map(|e| e.field()).collect();
        assert_eq!(result.errors().len(), 6, "{fields:?}");
        for expected in [
            "specs.mileage_km",
            "specs.transmission",
            "specs.year",
            "avito_fields.payment_per_month_rub",
            "avito_fields.owners",
            "equipment.assist",
        ] {
            assert!(fields.contains(&expected), "missing {expected} in {fields:?}");
        }
        assert_eq!(result.warnings().len(), 1);
    }

    #[test]
    fn missing_and_mistyped_top_level_fields() {
        let candidate = json!({
            "title": "",
            "description": 5,
            "specs": [],
            "avito_fields": {}
        });
        let errors = validate_ai_result(&candidate).into_errors();
        assert!(errors.contains(&ValidationError::missing("title")));
        assert!(errors.contains(&ValidationError::missing("equipment")));
        assert!(errors.contains(&ValidationError::TypeMismatch {
            field: "description".into(),
            expected: "string".into(),
            found: "number".into(),
        }));
        assert!(errors.contains(&ValidationError::TypeMismatch {
            field: "specs".into(),
            expected: "object".into(),
            found: "array".into(),
        }));
        // An empty avito_fields object still reports each of its fields.
        assert!(errors.contains(&ValidationError::missing("avito_fields.brand")));
        assert!(errors.contains(&ValidationError::missing(
            "avito_fields.payment_per_month_rub"
        )));
    }

    #[test]
    fn non_object_candidate() {
        let result = validate_ai_result(&json!("just text"));
        assert_eq!(
            result.into_errors(),
            vec![ValidationError::TypeMismatch {
                field: "$".into(),
                expected: "object".into(),
                found: "string".into(),
            }]
        );
    }

    #[test]
    fn valid_mapping_passes() {
        assert!(validate_avito_mapping(&valid_mapping()).is_valid());
    }

    #[test]
    fn mapping_reports_each_missing_marketplace_field() {
        let mut mapping = valid_mapping();
        let obj = mapping.as_object_mut().unwrap();
        obj.remove("city");
        obj.remove("owners");
        obj.insert("color".into(), json!(""));
        let errors = validate_avito_mapping(&mapping).into_errors();
        assert_eq!(
            errors,
            vec![
                ValidationError::missing("city"),
                ValidationError::missing("color"),
                ValidationError::missing("owners"),
            ]
        );
    }

    #[test]
    fn empty_mapping_misses_all_ten_fields() {
        let errors = validate_avito_mapping(&json!({})).into_errors();
        assert_eq!(errors.len(), 10);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ValidationError::MissingField { .. })));
    }

    #[test]
    fn marketplace_checks_follow_the_required_keys() {
        let errors = validate_avito_mapping(&json!({})).into_errors();
        let fields: Vec<&str> = errors.iter().map(|e| e.field()).collect();
        assert_eq!(fields, AvitoFields::REQUIRED.to_vec());

        let mut mapping = valid_mapping();
        mapping["price_rub"] = json!("дорого");
        mapping["brand"] = json!(7);
        let fields: Vec<String> = validate_avito_mapping(&mapping)
            .into_errors()
            .iter()
            .map(|e| e.field().to_string())
            .collect();
        assert_eq!(fields, vec!["brand", "price_rub"]);
    }

    #[test]
    fn mapping_checks_carried_specs_values() {
        let mut mapping = valid_mapping();
        mapping["mileage_km"] = json!(170000);
        mapping["transmission"] = json!("CVT");
        mapping["payment_per_month_rub"] = json!(26000);
        let errors = validate_avito_mapping(&mapping).into_errors();
        let fields: Vec<&str> = errors.iter().map(|e| e.field()).collect();
        assert_eq!(fields, vec!["payment_per_month_rub", "mileage_km"]);
    }

    #[test]
    fn validation_error_serializes_with_kind_tag() {
        let err = ValidationError::missing("specs.year");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value, json!({"kind": "missing_field", "field": "specs.year"}));
    }
}
