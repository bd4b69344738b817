//! TOML schema validation for pluggable implementations.
//!
//! Each backend (storage, ledger, source, connector, time-lock, execution)
//! describes its table with a [`Schema`] and its factory validates the raw
//! `toml::Value` before constructing anything.

use crate::utils::{parse_address, parse_amount};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

impl ValidationError {
	fn nested(self, parent: &str) -> Self {
		match self {
			ValidationError::MissingField(f) => {
				ValidationError::MissingField(format!("{}.{}", parent, f))
			}
			ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
				field: format!("{}.{}", parent, field),
				message,
			},
			ValidationError::TypeMismatch {
				field,
				expected,
				actual,
			} => ValidationError::TypeMismatch {
				field: format!("{}.{}", parent, field),
				expected,
				actual,
			},
		}
	}
}

#[derive(Debug)]
pub enum FieldType {
	String,
	Integer { min: Option<i64>, max: Option<i64> },
	Float { min: Option<f64> },
	Boolean,
	/// 0x-prefixed 20-byte hex string.
	Address,
	/// `http://` or `https://` URL string.
	Url,
	/// Non-negative base-unit amount written as a decimal string.
	Amount,
	Array(Box<FieldType>),
	Table(Schema),
}

pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a check that runs after the type check passed.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		check_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML table against this schema. Unknown keys are allowed.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| mismatch("root", "table", config))?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

fn mismatch(field: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
	ValidationError::InvalidValue {
		field: field.to_string(),
		message: message.into(),
	}
}

fn check_type(name: &str, value: &toml::Value, expected: &FieldType) -> Result<(), ValidationError> {
	match expected {
		FieldType::String => {
			value.as_str().ok_or_else(|| mismatch(name, "string", value))?;
		}
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| mismatch(name, "integer", value))?;
			if let Some(min) = min.filter(|min| int_val < *min) {
				return Err(invalid(
					name,
					format!("Value {} is less than minimum {}", int_val, min),
				));
			}
			if let Some(max) = max.filter(|max| int_val > *max) {
				return Err(invalid(
					name,
					format!("Value {} is greater than maximum {}", int_val, max),
				));
			}
		}
		FieldType::Float { min } => {
			let float_val = value
				.as_float()
				.or_else(|| value.as_integer().map(|v| v as f64))
				.ok_or_else(|| mismatch(name, "number", value))?;
			if let Some(min) = min.filter(|min| float_val < *min) {
				return Err(invalid(
					name,
					format!("Value {} is less than minimum {}", float_val, min),
				));
			}
		}
		FieldType::Boolean => {
			value.as_bool().ok_or_else(|| mismatch(name, "boolean", value))?;
		}
		FieldType::Address => {
			let text = value.as_str().ok_or_else(|| mismatch(name, "string", value))?;
			if parse_address(text).is_none() {
				return Err(invalid(name, "must be a 0x-prefixed 20-byte address"));
			}
		}
		FieldType::Url => {
			let text = value.as_str().ok_or_else(|| mismatch(name, "string", value))?;
			if !(text.starts_with("http://") || text.starts_with("https://")) {
				return Err(invalid(name, "URL must start with http:// or https://"));
			}
		}
		FieldType::Amount => {
			let text = value.as_str().ok_or_else(|| mismatch(name, "string", value))?;
			parse_amount(text).map_err(|message| invalid(name, message))?;
		}
		FieldType::Array(inner) => {
			let items = value.as_array().ok_or_else(|| mismatch(name, "array", value))?;
			for (i, item) in items.iter().enumerate() {
				check_type(&format!("{}[{}]", name, i), item, inner)?;
			}
		}
		FieldType::Table(schema) => {
			schema.validate(value).map_err(|e| e.nested(name))?;
		}
	}

	Ok(())
}

/// Schema published by every pluggable implementation.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}
