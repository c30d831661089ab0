//! Validation of raw TOML tables handed to pluggable backends.
//!
//! Each backend receives its `[<section>.implementations.<name>]` table as a
//! `toml::Value` and declares a [`Schema`] for it through [`ConfigSchema`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("'{0}' is required")]
	MissingField(String),
	#[error("'{field}' is invalid: {message}")]
	InvalidValue { field: String, message: String },
	#[error("'{field}' should be {expected}, found {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: &'static str,
	},
}

/// Expected shape of a configuration value.
#[derive(Debug)]
pub enum FieldType {
	String,
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	Array(Box<FieldType>),
}

impl FieldType {
	fn expected(&self) -> &'static str {
		match self {
			FieldType::String => "a string",
			FieldType::Integer { .. } => "an integer",
			FieldType::Boolean => "a boolean",
			FieldType::Array(_) => "an array",
		}
	}

	/// Checks `value` against this type; `path` names it in errors.
	fn check(&self, path: &str, value: &toml::Value) -> Result<(), ValidationError> {
		let matches = match self {
			FieldType::String => value.is_str(),
			FieldType::Boolean => value.is_bool(),
			FieldType::Integer { .. } => value.is_integer(),
			FieldType::Array(_) => value.is_array(),
		};
		if !matches {
			return Err(ValidationError::TypeMismatch {
				field: path.to_string(),
				expected: self.expected(),
				actual: value.type_str(),
			});
		}

		match (self, value) {
			(FieldType::Integer { min, max }, toml::Value::Integer(n)) => {
				let out_of_range = min.is_some_and(|min| *n < min) || max.is_some_and(|max| *n > max);
				if out_of_range {
					return Err(ValidationError::InvalidValue {
						field: path.to_string(),
						message: format!(
							"{} is outside {}..={}",
							n,
							min.map_or("".to_string(), |m| m.to_string()),
							max.map_or("".to_string(), |m| m.to_string())
						),
					});
				}
			},
			(FieldType::Array(item_type), toml::Value::Array(items)) => {
				for (i, item) in items.iter().enumerate() {
					item_type.check(&format!("{}[{}]", path, i), item)?;
				}
			},
			_ => {},
		}
		Ok(())
	}
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
		write!(f, "Field({}: {:?})", self.name, self.field_type)
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
		self.field_type.check(&self.name, value)?;
		match &self.validator {
			Some(validator) => validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			}),
			None => Ok(()),
		}
	}
}

/// Required and optional fields of one configuration table. Keys the schema
/// does not mention are ignored.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let Some(table) = config.as_table() else {
			return Err(ValidationError::TypeMismatch {
				field: "<root>".to_string(),
				expected: "a table",
				actual: config.type_str(),
			});
		};

		for field in &self.required {
			match table.get(&field.name) {
				Some(value) => field.check(value)?,
				None => return Err(ValidationError::MissingField(field.name.clone())),
			}
		}
		self.optional
			.iter()
			.filter_map(|field| table.get(&field.name).map(|value| (field, value)))
			.try_for_each(|(field, value)| field.check(value))
	}
}

/// Implemented by every backend to validate its configuration table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn table(s: &str) -> toml::Value {
		toml::from_str(s).unwrap()
	}

	#[test]
	fn test_missing_required_field() {
		let schema = Schema::new(vec![Field::new("server_token", FieldType::String)], vec![]);
		let err = schema.validate(&table("other = 1")).unwrap_err();
		assert!(matches!(err, ValidationError::MissingField(f) if f == "server_token"));
	}

	#[test]
	fn test_integer_bounds() {
		let schema = Schema::new(
			vec![],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(120),
				},
			)],
		);
		assert!(schema.validate(&table("timeout_seconds = 30")).is_ok());
		assert!(schema.validate(&table("timeout_seconds = 0")).is_err());
		assert!(schema.validate(&table("timeout_seconds = 500")).is_err());
		assert!(schema.validate(&table("timeout_seconds = \"30\"")).is_err());
	}

	#[test]
	fn test_custom_validator() {
		let schema = Schema::new(
			vec![Field::new("base_url", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(url) if url.starts_with("https://") => Ok(()),
					_ => Err("must use https".to_string()),
				}
			})],
			vec![],
		);
		assert!(schema.validate(&table("base_url = \"https://api\"")).is_ok());
		let err = schema
			.validate(&table("base_url = \"http://api\""))
			.unwrap_err();
		assert!(err.to_string().contains("must use https"));
	}

	#[test]
	fn test_array_items_checked() {
		let schema = Schema::new(
			vec![Field::new(
				"recipients",
				FieldType::Array(Box::new(FieldType::String)),
			)],
			vec![],
		);
		assert!(schema.validate(&table("recipients = [\"a\", \"b\"]")).is_ok());
		let err = schema.validate(&table("recipients = [\"a\", 2]")).unwrap_err();
		assert!(err.to_string().contains("recipients[1]"));
	}
}
