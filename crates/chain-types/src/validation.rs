//! Schema checks for the raw TOML handed to implementation factories.
//!
//! Factories receive an untyped `toml::Value` taken from a config section
//! such as `[storage.implementations.file]` or `[chains.ethereum]`. Before
//! constructing anything they run it through a [`Schema`] so a typo in a
//! field name or a negative timeout is reported with the offending path
//! instead of surfacing later as a confusing runtime failure.

use thiserror::Error;

/// Errors produced while validating a config section.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
	/// A required field is absent.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// The field is present but its value is rejected.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// The field has the wrong TOML type.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: String,
	},
	/// The section could not be deserialised into its typed form.
	#[error("Failed to deserialize config: {0}")]
	DeserializationError(String),
}

impl ValidationError {
	/// Prefixes the field path with `parent.`.
	fn nested(self, parent: &str) -> Self {
		match self {
			ValidationError::MissingField(f) => {
				ValidationError::MissingField(format!("{}.{}", parent, f))
			},
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
			other => other,
		}
	}

	fn mismatch(field: &str, expected: &'static str, value: &toml::Value) -> Self {
		ValidationError::TypeMismatch {
			field: field.to_string(),
			expected,
			actual: value.type_str().to_string(),
		}
	}

	fn invalid(field: &str, message: impl Into<String>) -> Self {
		ValidationError::InvalidValue {
			field: field.to_string(),
			message: message.into(),
		}
	}
}

/// Expected shape of a config value.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Non-empty string starting with `http://`, `https://`, `ws://` or `wss://`.
	Url,
	/// String restricted to a fixed set of values.
	OneOf(&'static [&'static str]),
	/// Integer within optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	/// Float (integers are accepted too) within optional inclusive bounds.
	Float { min: Option<f64>, max: Option<f64> },
	Boolean,
	Array(Box<FieldType>),
	Table(Schema),
}

/// Extra check run after the type check passes.
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
			.field("has_validator", &self.validator.is_some())
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
			validator(value).map_err(|msg| ValidationError::invalid(&self.name, msg))?;
		}
		Ok(())
	}
}

/// Required and optional fields of one config table.
#[derive(Debug, Default)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Checks presence of required fields, then the type and custom
	/// validator of every field that is present. Nested tables report
	/// errors with a dotted path such as `auth.token`.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::mismatch("root", "table", config))?;

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

fn check_type(name: &str, value: &toml::Value, expected: &FieldType) -> Result<(), ValidationError> {
	match expected {
		FieldType::String => {
			value
				.as_str()
				.ok_or_else(|| ValidationError::mismatch(name, "string", value))?;
		},
		FieldType::Url => {
			let url = value
				.as_str()
				.ok_or_else(|| ValidationError::mismatch(name, "string", value))?;
			let has_scheme = ["http://", "https://", "ws://", "wss://"]
				.iter()
				.any(|scheme| url.starts_with(scheme) && url.len() > scheme.len());
			if !has_scheme {
				return Err(ValidationError::invalid(
					name,
					format!("'{}' is not an http(s) or ws(s) URL", url),
				));
			}
		},
		FieldType::OneOf(allowed) => {
			let s = value
				.as_str()
				.ok_or_else(|| ValidationError::mismatch(name, "string", value))?;
			if !allowed.contains(&s) {
				return Err(ValidationError::invalid(
					name,
					format!("'{}' is not one of {}", s, allowed.join(", ")),
				));
			}
		},
		FieldType::Integer { min, max } => {
			let n = value
				.as_integer()
				.ok_or_else(|| ValidationError::mismatch(name, "integer", value))?;
			if let Some(min) = min.filter(|min| n < *min) {
				return Err(ValidationError::invalid(
					name,
					format!("Value {} is less than minimum {}", n, min),
				));
			}
			if let Some(max) = max.filter(|max| n > *max) {
				return Err(ValidationError::invalid(
					name,
					format!("Value {} is greater than maximum {}", n, max),
				));
			}
		},
		FieldType::Float { min, max } => {
			let n = value
				.as_float()
				.or_else(|| value.as_integer().map(|i| i as f64))
				.ok_or_else(|| ValidationError::mismatch(name, "float", value))?;
			if let Some(min) = min.filter(|min| n < *min) {
				return Err(ValidationError::invalid(
					name,
					format!("Value {} is less than minimum {}", n, min),
				));
			}
			if let Some(max) = max.filter(|max| n > *max) {
				return Err(ValidationError::invalid(
					name,
					format!("Value {} is greater than maximum {}", n, max),
				));
			}
		},
		FieldType::Boolean => {
			value
				.as_bool()
				.ok_or_else(|| ValidationError::mismatch(name, "boolean", value))?;
		},
		FieldType::Array(inner) => {
			let items = value
				.as_array()
				.ok_or_else(|| ValidationError::mismatch(name, "array", value))?;
			for (i, item) in items.iter().enumerate() {
				check_type(&format!("{}[{}]", name, i), item, inner)?;
			}
		},
		FieldType::Table(schema) => {
			schema.validate(value).map_err(|e| e.nested(name))?;
		},
	}

	Ok(())
}

/// Validator for one implementation's config section.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

impl ConfigSchema for Schema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::validate(self, config)
	}
}
