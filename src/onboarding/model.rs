//! Onboarding form payload and its normalization.
//!
//! The landing page (and older clients) submit the same logical fields under
//! several names. Each field is resolved by trying its aliases in priority
//! order and taking the first truthy value, then defaults are applied.

use serde::Serialize;
use serde_json::Value;

use crate::error::ValidationError;

pub const DEFAULT_PARENT_NAME: &str = "Veli";
pub const DEFAULT_GRADE_CODE: &str = "G8";
pub const DEFAULT_GOAL: &str = "LGS";

const STUDENT_NAME_KEYS: &[&str] = &["student_name", "studentName", "student", "name"];
const PARENT_NAME_KEYS: &[&str] = &["parent_name", "parentName", "parent"];
const STUDENT_PHONE_KEYS: &[&str] = &["student_phone", "studentPhone", "phone", "mobile"];
const PARENT_PHONE_KEYS: &[&str] = &["parent_phone", "parentPhone", "guardian_phone"];
const GRADE_CODE_KEYS: &[&str] = &["grade_code", "gradeCode"];
const GOAL_KEYS: &[&str] = &["goal"];
const REFERRAL_CODE_KEYS: &[&str] = &["referral_code", "ref", "referral"];

/// Payload forwarded to the upstream onboarding endpoint.
///
/// Fields carry the submitted JSON value unchanged, so a numeric phone stays
/// a number on the wire. Optional fields are left out entirely when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedPayload {
    pub parent_name: Value,
    pub student_name: Value,
    pub grade_code: Value,
    pub student_phone: Value,
    pub goal: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_phone: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<Value>,
}

/// Normalization result before the required fields are checked.
///
/// Echoed back to the caller when validation fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftPayload {
    pub parent_name: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<Value>,
    pub grade_code: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_phone: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_phone: Option<Value>,
    pub goal: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<Value>,
}

impl DraftPayload {
    /// Resolve every field from a raw request body.
    pub fn from_body(body: &Value) -> Self {
        Self {
            parent_name: first_truthy(body, PARENT_NAME_KEYS)
                .unwrap_or_else(|| Value::from(DEFAULT_PARENT_NAME)),
            student_name: first_truthy(body, STUDENT_NAME_KEYS),
            grade_code: first_truthy(body, GRADE_CODE_KEYS)
                .unwrap_or_else(|| Value::from(DEFAULT_GRADE_CODE)),
            student_phone: first_truthy(body, STUDENT_PHONE_KEYS),
            parent_phone: first_truthy(body, PARENT_PHONE_KEYS),
            goal: first_truthy(body, GOAL_KEYS).unwrap_or_else(|| Value::from(DEFAULT_GOAL)),
            referral_code: first_truthy(body, REFERRAL_CODE_KEYS),
        }
    }

    /// Promote to a forwardable payload, or hand the draft back if a
    /// required field is missing.
    pub fn finish(self) -> Result<NormalizedPayload, Self> {
        match (self.student_name.clone(), self.student_phone.clone()) {
            (Some(student_name), Some(student_phone)) => Ok(NormalizedPayload {
                parent_name: self.parent_name,
                student_name,
                grade_code: self.grade_code,
                student_phone,
                goal: self.goal,
                parent_phone: self.parent_phone,
                referral_code: self.referral_code,
            }),
            _ => Err(self),
        }
    }
}

/// Normalize a raw request body into the upstream payload.
pub fn normalize(body: &Value) -> Result<NormalizedPayload, ValidationError> {
    DraftPayload::from_body(body)
        .finish()
        .map_err(|draft| ValidationError::MissingFields {
            received: body.clone(),
            normalized: serde_json::to_value(&draft).unwrap_or(Value::Null),
        })
}

/// First alias holding a truthy value, in priority order.
fn first_truthy(body: &Value, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .filter_map(|key| body.get(*key))
        .find(|value| is_truthy(value))
        .map(integral_as_integer)
}

/// JavaScript truthiness: only `null`, `false`, `0` and `""` are falsy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Whole-valued floats (`5.55e3`) are re-encoded as integers so they go out
/// as `5550`, not `5550.0`.
fn integral_as_integer(value: &Value) -> Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

    match value {
        Value::Number(n) if !n.is_i64() && !n.is_u64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => Value::from(f as i64),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}
