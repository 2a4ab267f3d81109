//! Rule Validation - the only constructor of typed rules
//!
//! Raw rules arrive from an untrusted producer. Each rule is checked in
//! isolation; the first failing rule short-circuits the whole list.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::operations::{Operation, OperationTable, TransformKind, ValueRange};
use crate::schema::{BlockFamily, Landmark};

/// Untrusted rule as produced by the interpretation collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRule {
    #[serde(default)]
    pub operation: Option<Value>,
    #[serde(default, alias = "value_cm")]
    pub value_cm: Option<RawValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Other(Value),
}

impl RawRule {
    pub fn new(operation: &str, value_cm: f64) -> Self {
        Self {
            operation: Some(Value::String(operation.to_string())),
            value_cm: Some(RawValue::Number(value_cm)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    EmptyRuleset,
    InvalidOperation,
    MissingValue,
    NonNumericValue,
    OutOfRange,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Rule list is empty")]
    EmptyRuleset,

    #[error("Rule {index}: unsupported operation")]
    InvalidOperation { index: usize, operation: Option<String> },

    #[error("Rule {index} ({operation}): valueCm is required")]
    MissingValue { index: usize, operation: Operation },

    #[error("Rule {index} ({operation}): valueCm must be a finite number")]
    NonNumericValue { index: usize, operation: Operation },

    #[error("Rule {index} ({operation}): {value} cm outside [{}, {}]", .range.min_cm, .range.max_cm)]
    OutOfRange {
        index: usize,
        operation: Operation,
        value: f64,
        range: ValueRange,
    },
}

impl ValidationError {
    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            ValidationError::EmptyRuleset => ValidationErrorKind::EmptyRuleset,
            ValidationError::InvalidOperation { .. } => ValidationErrorKind::InvalidOperation,
            ValidationError::MissingValue { .. } => ValidationErrorKind::MissingValue,
            ValidationError::NonNumericValue { .. } => ValidationErrorKind::NonNumericValue,
            ValidationError::OutOfRange { .. } => ValidationErrorKind::OutOfRange,
        }
    }

    pub fn rule_index(&self) -> Option<usize> {
        match self {
            ValidationError::EmptyRuleset => None,
            ValidationError::InvalidOperation { index, .. }
            | ValidationError::MissingValue { index, .. }
            | ValidationError::NonNumericValue { index, .. }
            | ValidationError::OutOfRange { index, .. } => Some(*index),
        }
    }

    /// Offending operation name, when the rule named one.
    pub fn operation_name(&self) -> Option<String> {
        match self {
            ValidationError::EmptyRuleset => None,
            ValidationError::InvalidOperation { operation, .. } => operation.clone(),
            ValidationError::MissingValue { operation, .. }
            | ValidationError::NonNumericValue { operation, .. }
            | ValidationError::OutOfRange { operation, .. } => Some(operation.to_string()),
        }
    }
}

/// A rule that passed validation. Only [`RuleValidator`] builds these.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedRule {
    index: usize,
    family: BlockFamily,
    operation: Operation,
    value_cm: f64,
}

impl ValidatedRule {
    /// Position of the rule in the submitted list.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn family(&self) -> BlockFamily {
        self.family
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn value_cm(&self) -> f64 {
        self.value_cm
    }

    /// Signed centimeter displacement along the operation's axis.
    pub fn signed_cm(&self) -> f64 {
        self.value_cm * self.operation.direction()
    }

    pub fn kind(&self) -> TransformKind {
        self.operation.kind()
    }

    pub fn target(&self) -> Landmark {
        self.operation.target()
    }
}

pub struct RuleValidator<'a> {
    table: &'a OperationTable,
}

impl<'a> RuleValidator<'a> {
    pub fn new(table: &'a OperationTable) -> Self {
        Self { table }
    }

    pub fn validate(&self, raw_rules: &[RawRule], family: BlockFamily) -> Result<Vec<ValidatedRule>, ValidationError> {
        if raw_rules.is_empty() {
            return Err(ValidationError::EmptyRuleset);
        }

        raw_rules
            .iter()
            .enumerate()
            .map(|(index, raw)| self.validate_one(index, raw, family))
            .collect()
    }

    fn validate_one(&self, index: usize, raw: &RawRule, family: BlockFamily) -> Result<ValidatedRule, ValidationError> {
        let operation = parse_operation(index, raw.operation.as_ref())?;

        let value_cm = match &raw.value_cm {
            None | Some(RawValue::Other(Value::Null)) => {
                return Err(ValidationError::MissingValue { index, operation });
            }
            Some(RawValue::Number(n)) if n.is_finite() => *n,
            Some(_) => return Err(ValidationError::NonNumericValue { index, operation }),
        };

        let range = self.table.range(operation);
        if !range.contains(value_cm) {
            return Err(ValidationError::OutOfRange {
                index,
                operation,
                value: value_cm,
                range,
            });
        }

        Ok(ValidatedRule {
            index,
            family,
            operation,
            value_cm,
        })
    }
}

fn parse_operation(index: usize, raw: Option<&Value>) -> Result<Operation, ValidationError> {
    let name = match raw {
        Some(Value::String(s)) => s.trim(),
        _ => return Err(ValidationError::InvalidOperation { index, operation: None }),
    };

    name.parse::<Operation>().map_err(|_| ValidationError::InvalidOperation {
        index,
        operation: Some(name.to_string()),
    })
}

#[cfg(test)]
pub(crate) fn validated(index: usize, family: BlockFamily, operation: Operation, value_cm: f64) -> ValidatedRule {
    ValidatedRule {
        index,
        family,
        operation,
        value_cm,
    }
}
