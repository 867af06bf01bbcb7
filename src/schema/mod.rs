//! Structural and business rules for AI-generated listing content and
//! marketplace mappings.
//!
//! Both validators are pure functions over untyped JSON so that malformed
//! candidates can be diagnosed completely in one pass.

mod types;
mod validator;

pub use types::{AiResult, AvitoFields, Equipment, Specs, Transmission};
pub use validator::{
    ChecklistProblem, Limit, MAX_MILEAGE_KM, MAX_PAYMENT_PER_MONTH_RUB, MIN_DESCRIPTION_CHARS,
    MIN_PAYMENT_PER_MONTH_RUB, Severity, ValidationError, ValidationResult, validate_ai_result,
    validate_avito_mapping,
};
pub(crate) use validator::json_kind;

#[cfg(test)]
pub(crate) use validator::tests::{valid_ai_result, valid_mapping};
